/*!
DDC/CI device handle.

[`DdcciDevice`] binds a bus transport and a display address to a
[`TransactionScheduler`]. All methods take `&self`, so one device can be shared
between threads; the scheduler keeps their bus traffic in order.
*/

use crate::address::BusAddress;
use crate::config::DeviceConfig;
use crate::control;
use crate::error::{DdcError, Result};
use crate::frame::{self, LengthPolicy, ReadResult};
use crate::scheduler::{Ticket, TransactionId, TransactionKind, TransactionScheduler};
use crate::transport::{Bus, BusTransport};
use tracing::{debug, info};

/// A display reachable over DDC/CI
pub struct DdcciDevice {
    address: BusAddress,
    policy: LengthPolicy,
    scheduler: TransactionScheduler,
}

impl DdcciDevice {
    /// Open the display at the default address 0x37 with default timing
    pub fn open(bus: impl Into<Bus>) -> Result<Self> {
        Self::with_config(bus, &DeviceConfig::default())
    }

    /// Open the display described by `config` on `bus`
    ///
    /// For [`Bus::Handle`] the handle's own address wins over `config.address`.
    pub fn with_config(bus: impl Into<Bus>, config: &DeviceConfig) -> Result<Self> {
        config.validate()?;
        let bus = bus.into();
        debug!("opening {:?}", bus);
        let transport = bus.open(config.bus_address()?)?;
        Ok(Self::from_transport(transport, config))
    }

    /// Wrap an already open transport
    pub fn from_transport(transport: Box<dyn BusTransport>, config: &DeviceConfig) -> Self {
        let address = transport.address();
        let scheduler = TransactionScheduler::new(transport, config.timing());
        info!("DDC/CI device ready at address {}", address);

        Self {
            address,
            policy: config.length_policy,
            scheduler,
        }
    }

    pub fn address(&self) -> BusAddress {
        self.address
    }

    /// Set `control` to `value`
    pub fn write(&self, control: u8, value: u16) -> Result<()> {
        self.submit_write(control, value)?.wait()
    }

    /// Queue a write without waiting for it
    ///
    /// The ticket's id can be passed to [`DdcciDevice::cancel`] while the
    /// write is still queued.
    pub fn submit_write(&self, control: u8, value: u16) -> Result<Ticket<()>> {
        let frame = frame::build_write(self.address, control, value);
        self.scheduler.submit(TransactionKind::Write, frame)
    }

    /// Withdraw a queued transaction; its ticket fails with [`DdcError::Cancelled`]
    ///
    /// No effect once the transaction has been dispatched.
    pub fn cancel(&self, id: TransactionId) -> Result<()> {
        self.scheduler.cancel(id)
    }

    /// Current and maximum value of `control`
    pub fn read(&self, control: u8) -> Result<ReadResult> {
        let request = frame::build_read(self.address, control);
        let ticket = self.scheduler.submit(TransactionKind::ReadRequest, request)?;
        let owner = ticket.id();
        ticket.wait()?;

        let reply = self.scheduler.submit_follow_up(owner, control, self.policy)?;
        let reply_id = reply.id();
        let timing = self.scheduler.timing();

        match reply.wait_timeout(timing.read_delay + timing.reply_timeout) {
            Err(DdcError::Timeout) => {
                // only takes effect if the reply read has not started yet
                if let Err(e) = self.scheduler.cancel(reply_id) {
                    debug!("could not withdraw reply read {}: {}", reply_id.get(), e);
                }
                Err(DdcError::Timeout)
            }
            other => other,
        }
    }

    /// Current value of `control`, without the maximum
    pub fn read_value(&self, control: u8) -> Result<u16> {
        self.read(control).map(|r| r.value)
    }

    pub fn brightness(&self) -> Result<ReadResult> {
        self.read(control::BRIGHTNESS)
    }

    pub fn set_brightness(&self, value: u16) -> Result<()> {
        self.write(control::BRIGHTNESS, value)
    }

    pub fn contrast(&self) -> Result<ReadResult> {
        self.read(control::CONTRAST)
    }

    pub fn set_contrast(&self, value: u16) -> Result<()> {
        self.write(control::CONTRAST, value)
    }

    /// Cancel all queued work; in-flight transfers still complete
    pub fn reset(&self) -> Result<()> {
        self.scheduler.reset()
    }
}
