/*!
# DDC/CI Protocol Engine

Query and control monitor settings (brightness, contrast, ...) over the
Display Data Channel Command Interface.

## Core Types

- [`DdcciDevice`] - display handle exposing `read` and `write`
- [`TransactionScheduler`] - serialized, rate limited bus access
- [`Frame`] - checksum-terminated outgoing frame
- [`ReadResult`] - validated value/maximum pair

## Modules

- [`checksum`] - direction-seeded XOR checksum
- [`frame`] - frame building and reply validation
- [`scheduler`] - FIFO transaction queue with settle delays
- [`transport`] - bus transport trait and Linux i2c-dev backend
- [`control`] - names for common control codes
- [`error`] - error types
*/

pub mod address;
pub mod checksum;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod frame;
pub mod scheduler;
pub mod transport;

// Re-export commonly used types
pub use address::BusAddress;
pub use checksum::Direction;
pub use config::DeviceConfig;
pub use device::DdcciDevice;
pub use error::{BusError, DdcError, ProtocolError, Result};
pub use frame::{Frame, LengthPolicy, ReadResult};
pub use scheduler::{Ticket, Timing, TransactionId, TransactionScheduler};
pub use transport::{Bus, BusTransport};

/// Protocol constants
pub mod protocol {
    /// First byte of every host frame
    pub const MAGIC_1: u8 = 0x51;

    /// Flag bit carried by every length byte
    pub const MAGIC_2: u8 = 0x80;

    /// Set VCP feature
    pub const DDCCI_COMMAND_WRITE: u8 = 0x03;

    /// Get VCP feature
    pub const DDCCI_COMMAND_READ: u8 = 0x01;

    /// Get VCP feature reply
    pub const DDCCI_REPLY_READ: u8 = 0x02;

    /// Bus address displays answer DDC/CI on
    pub const DEFAULT_DDCCI_ADDR: u8 = 0x37;

    /// Largest payload a length byte may announce
    pub const MAX_DATA_LENGTH: usize = 32;

    /// Settling time after a write, in milliseconds
    pub const WRITE_DELAY_MS: u64 = 60;

    /// Settling time after a read request or reply, in milliseconds
    pub const READ_DELAY_MS: u64 = 60;

    /// How long a completed read request holds the bus for its reply, in milliseconds
    pub const REPLY_TIMEOUT_MS: u64 = 500;
}
