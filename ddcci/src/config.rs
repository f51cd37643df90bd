/*!
Device configuration.
*/

use crate::address::BusAddress;
use crate::error::{DdcError, Result};
use crate::frame::LengthPolicy;
use crate::protocol;
use crate::scheduler::Timing;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-display settings: address, timing and reply strictness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// 7-bit bus address of the display
    pub address: u8,

    /// Pause after a write, in milliseconds
    pub write_delay_ms: u64,

    /// Pause around the reply phase of a read, in milliseconds
    pub read_delay_ms: u64,

    /// How long a read waits for its reply phase, in milliseconds
    pub reply_timeout_ms: u64,

    /// Treatment of reply length bytes missing the 0x80 flag
    pub length_policy: LengthPolicy,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: protocol::DEFAULT_DDCCI_ADDR,
            write_delay_ms: protocol::WRITE_DELAY_MS,
            read_delay_ms: protocol::READ_DELAY_MS,
            reply_timeout_ms: protocol::REPLY_TIMEOUT_MS,
            length_policy: LengthPolicy::Strict,
        }
    }
}

impl DeviceConfig {
    /// Check ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        BusAddress::new(self.address)?;
        if self.reply_timeout_ms == 0 {
            return Err(DdcError::config("reply_timeout_ms must be greater than zero"));
        }
        Ok(())
    }

    /// Validated display address
    pub fn bus_address(&self) -> Result<BusAddress> {
        BusAddress::new(self.address)
    }

    /// Scheduler timing derived from the millisecond settings
    pub fn timing(&self) -> Timing {
        Timing {
            write_delay: Duration::from_millis(self.write_delay_ms),
            read_delay: Duration::from_millis(self.read_delay_ms),
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
        }
    }
}
