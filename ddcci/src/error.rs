/*!
Error types for the DDC/CI protocol engine.

Every failure is scoped to one logical transaction. Nothing here is retried by
the library; callers decide whether a failed read or write is worth repeating.
*/

use thiserror::Error;

/// Common result type used throughout the crate
pub type Result<T> = std::result::Result<T, DdcError>;

/// Failures reported by the bus transport
#[derive(Error, Debug)]
pub enum BusError {
    /// I/O errors from the underlying device node
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport specific failure (driver error, device not present, ...)
    #[error("transport error: {0}")]
    Transport(String),

    /// The requested kind of bus cannot be opened on this platform
    #[error("unsupported bus: {0}")]
    Unsupported(String),
}

impl BusError {
    /// Create a transport error from any displayable driver error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Violations found while validating a reply frame
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("ACK invalid: expected {expected:#04x}, got {received:#04x}")]
    AckInvalid { expected: u8, received: u8 },

    #[error("malformed length byte {0:#04x}")]
    MalformedLength(u8),

    #[error("invalid checksum: computed {computed:#04x}, received {received:#04x}")]
    ChecksumError { computed: u8, received: u8 },

    #[error("invalid response type {0:#04x}")]
    UnexpectedReplyType(u8),

    #[error("received data for unrequested control {received:#04x} (requested {requested:#04x})")]
    ControlMismatch { requested: u8, received: u8 },

    #[error("truncated response: need {needed} bytes, got {available}")]
    TruncatedResponse { needed: usize, available: usize },
}

/// Top level error returned by [`DdcciDevice`](crate::DdcciDevice) operations
#[derive(Error, Debug)]
pub enum DdcError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transaction withdrawn from the queue before it reached the bus
    #[error("transaction cancelled")]
    Cancelled,

    /// The reply phase of a read did not arrive in time
    #[error("timed out waiting for reply")]
    Timeout,

    #[error("invalid bus address {0:#04x}: must be 7-bit")]
    InvalidAddress(u8),

    /// The scheduler worker is gone (device dropped or worker panicked)
    #[error("transaction scheduler is closed")]
    SchedulerClosed,

    #[error("configuration error: {0}")]
    Config(String),
}

impl DdcError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The protocol violation behind this error, if any
    pub fn protocol(&self) -> Option<ProtocolError> {
        match self {
            Self::Protocol(e) => Some(*e),
            _ => None,
        }
    }
}
