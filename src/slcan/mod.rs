//! SLCAN adapter support
//!
//! [SlCanChannel] exposes an [SlCanDevice] as a [CanChannel], so the software
//! ISO-TP layer (and with it the UDS client) can run over any SLCAN compatible
//! USB-serial adapter:
//!
//! ```no_run
//! use uds_stack::isotp::{IsoTpSettings, SoftwareIsoTp};
//! use uds_stack::slcan::{SlCanChannel, SlCanDevice};
//! use uds_stack::uds::{UdsClient, UdsClientOptions};
//!
//! let port = serialport::new("/dev/ttyUSB0", 115_200)
//!     .timeout(std::time::Duration::from_millis(10))
//!     .open()
//!     .unwrap();
//! let device = SlCanDevice::new(port, 1000);
//! let channel = SlCanChannel::new(device);
//! let isotp = SoftwareIsoTp::new(Box::new(channel));
//! let mut client = UdsClient::new_over_iso_tp(
//!     UdsClientOptions::default(),
//!     Box::new(isotp),
//!     IsoTpSettings::default(),
//! )
//! .unwrap();
//! let vin = client.read_data_by_identifier(0xF190).unwrap();
//! ```
//!
//! NOTE: extended (29bit) CAN identifiers are encoded per the SLCAN grammar,
//! but this module has mainly been exercised with standard identifiers.

use std::time::{Duration, Instant};

use crate::channel::{CanChannel, CanFrame, ChannelError, ChannelResult, PacketChannel};

pub mod device;

pub use device::{SlCanDevice, SlCanError};

/// [CanChannel] implementation over an SLCAN device.
///
/// The channel is synchronous: frames are read off the adapter when the
/// higher layers poll for them
#[derive(Debug)]
pub struct SlCanChannel {
    device: SlCanDevice,
    cfg: Option<(u32, bool)>,
    is_open: bool,
}

unsafe impl Send for SlCanChannel {}
unsafe impl Sync for SlCanChannel {}

impl SlCanChannel {
    /// Creates a new CAN channel over an SLCAN device
    pub fn new(device: SlCanDevice) -> Self {
        Self {
            device,
            cfg: None,
            is_open: false,
        }
    }
}

impl PacketChannel<CanFrame> for SlCanChannel {
    fn open(&mut self) -> ChannelResult<()> {
        let (baud, _) = self.cfg.ok_or(ChannelError::ConfigurationError)?;
        self.device.open(baud)?;
        self.is_open = true;
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        if self.is_open {
            self.device.close()?;
            self.is_open = false;
        }
        Ok(())
    }

    fn write_packets(&mut self, packets: Vec<CanFrame>, _timeout_ms: u32) -> ChannelResult<()> {
        if !self.is_open {
            return Err(ChannelError::InterfaceNotOpen);
        }
        for p in packets {
            self.device.write(p)?;
        }
        Ok(())
    }

    fn read_packets(&mut self, max: usize, timeout_ms: u32) -> ChannelResult<Vec<CanFrame>> {
        if !self.is_open {
            return Err(ChannelError::InterfaceNotOpen);
        }
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        let mut res = Vec::new();
        loop {
            match self.device.read() {
                Ok(f) => {
                    res.push(f);
                    if res.len() >= max {
                        break;
                    }
                }
                Err(SlCanError::ReadTimeout) => {
                    if Instant::now() >= deadline {
                        break;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(res)
    }

    fn clear_rx_buffer(&mut self) -> ChannelResult<()> {
        self.device.clear_rx_queue();
        Ok(())
    }

    fn clear_tx_buffer(&mut self) -> ChannelResult<()> {
        Ok(())
    }
}

impl CanChannel for SlCanChannel {
    fn set_can_cfg(&mut self, baud: u32, use_extended: bool) -> ChannelResult<()> {
        if self.is_open {
            // The adapter's bitrate cannot change while the channel is open
            return Err(ChannelError::ConfigurationError);
        }
        self.cfg = Some((baud, use_extended));
        Ok(())
    }
}
