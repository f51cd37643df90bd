/*!
Bus transports.

The protocol engine only needs two operations from the bus: write a block of
bytes to the display and read a given number of bytes back. Anything that can
do that for a fixed 7-bit address implements [`BusTransport`].
*/

use crate::address::BusAddress;
use crate::error::BusError;
use std::fmt;
use std::path::PathBuf;

/// Raw byte access to one display on an I2C-style bus
pub trait BusTransport: Send {
    /// Address of the display this handle talks to
    fn address(&self) -> BusAddress;

    /// Write `bytes` as a single bus transfer
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError>;

    /// Read exactly `len` bytes in a single bus transfer
    fn read(&mut self, len: usize) -> Result<Vec<u8>, BusError>;
}

/// Where a device finds its bus
pub enum Bus {
    /// Adapter number, opened as `/dev/i2c-N`
    Number(u32),
    /// Path to an i2c-dev device node
    Path(PathBuf),
    /// Already open transport; its own address is used
    Handle(Box<dyn BusTransport>),
}

impl Bus {
    /// Device node path for numbered and path buses
    pub fn device_path(&self) -> Option<PathBuf> {
        match self {
            Bus::Number(n) => Some(numbered_path(*n)),
            Bus::Path(path) => Some(path.clone()),
            Bus::Handle(_) => None,
        }
    }

    /// Resolve into an open transport for `address`
    ///
    /// `address` is ignored for [`Bus::Handle`], which already has one.
    pub fn open(self, address: BusAddress) -> Result<Box<dyn BusTransport>, BusError> {
        match self {
            Bus::Handle(handle) => Ok(handle),
            Bus::Number(n) => open_device(numbered_path(n), address),
            Bus::Path(path) => open_device(path, address),
        }
    }
}

fn numbered_path(n: u32) -> PathBuf {
    PathBuf::from(format!("/dev/i2c-{}", n))
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bus::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Bus::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Bus::Handle(handle) => f.debug_tuple("Handle").field(&handle.address()).finish(),
        }
    }
}

impl From<u32> for Bus {
    fn from(n: u32) -> Self {
        Bus::Number(n)
    }
}

impl From<PathBuf> for Bus {
    fn from(path: PathBuf) -> Self {
        Bus::Path(path)
    }
}

impl From<Box<dyn BusTransport>> for Bus {
    fn from(handle: Box<dyn BusTransport>) -> Self {
        Bus::Handle(handle)
    }
}

#[cfg(target_os = "linux")]
fn open_device(path: PathBuf, address: BusAddress) -> Result<Box<dyn BusTransport>, BusError> {
    Ok(Box::new(linux::LinuxI2cBus::open(path, address)?))
}

#[cfg(not(target_os = "linux"))]
fn open_device(path: PathBuf, _address: BusAddress) -> Result<Box<dyn BusTransport>, BusError> {
    Err(BusError::Unsupported(format!(
        "{}: i2c-dev buses are only available on Linux",
        path.display()
    )))
}

#[cfg(target_os = "linux")]
pub use linux::LinuxI2cBus;

#[cfg(target_os = "linux")]
mod linux {
    use super::BusTransport;
    use crate::address::BusAddress;
    use crate::error::BusError;
    use i2cdev::core::I2CDevice;
    use i2cdev::linux::LinuxI2CDevice;
    use std::path::{Path, PathBuf};
    use tracing::info;

    /// Display reached through a Linux i2c-dev node
    pub struct LinuxI2cBus {
        device: LinuxI2CDevice,
        address: BusAddress,
        path: PathBuf,
    }

    impl LinuxI2cBus {
        /// Open `path` and bind it to `address`
        pub fn open<P: AsRef<Path>>(path: P, address: BusAddress) -> Result<Self, BusError> {
            let path = path.as_ref().to_path_buf();
            let device = LinuxI2CDevice::new(&path, u16::from(address.get()))
                .map_err(|e| BusError::transport(format!("{}: {}", path.display(), e)))?;

            info!("Opened {} at address {}", path.display(), address);
            Ok(Self { device, address, path })
        }

        /// Device node this bus was opened from
        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl BusTransport for LinuxI2cBus {
        fn address(&self) -> BusAddress {
            self.address
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
            self.device
                .write(bytes)
                .map_err(|e| BusError::transport(e.to_string()))
        }

        fn read(&mut self, len: usize) -> Result<Vec<u8>, BusError> {
            let mut buf = vec![0u8; len];
            self.device
                .read(&mut buf)
                .map_err(|e| BusError::transport(e.to_string()))?;
            Ok(buf)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockBus;
    use super::*;

    #[test]
    fn test_numbered_bus_path() {
        assert_eq!(Bus::Number(3).device_path(), Some(PathBuf::from("/dev/i2c-3")));
        assert_eq!(
            Bus::from(PathBuf::from("/dev/i2c-7")).device_path(),
            Some(PathBuf::from("/dev/i2c-7"))
        );
    }

    #[test]
    fn test_handle_keeps_its_own_address() {
        let (bus, _handle) = MockBus::new(0x50);
        let bus = Bus::Handle(Box::new(bus));
        assert!(bus.device_path().is_none());
        assert_eq!(format!("{:?}", bus), "Handle(BusAddress(80))");

        let transport = bus.open(BusAddress::default()).unwrap();
        assert_eq!(transport.address().get(), 0x50);
    }

    #[test]
    fn test_missing_device_node_fails() {
        let bus = Bus::Path(PathBuf::from("/nonexistent/i2c-bus"));
        assert!(bus.open(BusAddress::default()).is_err());
    }
}
