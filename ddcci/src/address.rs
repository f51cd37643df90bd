/*!
7-bit bus addresses.
*/

use crate::error::{DdcError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 7-bit I2C address of a DDC/CI capable display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BusAddress(u8);

impl BusAddress {
    /// Highest valid 7-bit address
    pub const MAX: u8 = 0x7F;

    /// Validate and wrap a raw address
    pub fn new(address: u8) -> Result<Self> {
        if address > Self::MAX {
            return Err(DdcError::InvalidAddress(address));
        }
        Ok(Self(address))
    }

    /// The raw 7-bit value
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for BusAddress {
    fn default() -> Self {
        Self(crate::protocol::DEFAULT_DDCCI_ADDR)
    }
}

impl TryFrom<u8> for BusAddress {
    type Error = DdcError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BusAddress> for u8 {
    fn from(address: BusAddress) -> Self {
        address.0
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_range() {
        assert_eq!(BusAddress::new(0x00).unwrap().get(), 0x00);
        assert_eq!(BusAddress::new(0x7F).unwrap().get(), 0x7F);
        assert!(matches!(BusAddress::new(0x80), Err(DdcError::InvalidAddress(0x80))));
        assert_eq!(BusAddress::default().get(), 0x37);
        assert_eq!(BusAddress::default().to_string(), "0x37");
    }
}
