//! Module for logical communication channels with an ECU
//!
//! Currently, the following channel types are defined:
//! * [PayloadChannel] - Basic channel for moving whole diagnostic payloads
//! * [IsoTPChannel] - IsoTP (ISO15765) channel
//! * [PacketChannel] - Channel for moving individual network packets
//! * [CanChannel] - Packet channel moving raw CAN frames

/// Communication channel result
pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, thiserror::Error)]
/// Error produced by a communication channel
pub enum ChannelError {
    /// Underlying IO Error with channel
    #[error("IO error")]
    IOError(
        #[from]
        #[source]
        std::io::Error,
    ),
    /// Timeout when writing data to the channel
    #[error("timeout writing to channel")]
    WriteTimeout,
    /// Timeout when reading from the channel
    #[error("timeout reading from channel")]
    ReadTimeout,
    /// The channel's Rx buffer is empty. Only applies when read timeout is 0
    #[error("channel's receive buffer is empty")]
    BufferEmpty,
    /// The channel's Tx buffer is full
    #[error("channel's transmit buffer is full")]
    BufferFull,
    /// Unsupported channel request
    #[error("unsupported channel request")]
    UnsupportedRequest,
    /// The interface is not open
    #[error("channel's interface is not open")]
    InterfaceNotOpen,
    /// Channel opened prior to being configured
    #[error("channel opened prior to being configured")]
    ConfigurationError,
    /// The remote peer aborted an ISO-TP transfer, or exhausted the
    /// allowed number of flow-control wait frames
    #[error("transfer aborted by remote peer")]
    Aborted,
    /// An ISO-TP consecutive frame arrived out of order
    #[error("consecutive frame sequence error (want 0x{want:X}, got 0x{got:X})")]
    SequenceError {
        /// Sequence number that was expected
        want: u8,
        /// Sequence number that arrived
        got: u8,
    },
    /// Other miscellaneous channel error
    #[error("{0}")]
    Other(String),
}

/// A payload channel is a way for a device to have a bi-directional communication
/// link with a specific ECU, moving whole diagnostic payloads rather than
/// individual network packets
pub trait PayloadChannel: Send + Sync {
    /// This function opens the interface.
    /// It is ONLY called after set_ids and any other configuration function
    fn open(&mut self) -> ChannelResult<()>;

    /// Closes and destroys the channel
    fn close(&mut self) -> ChannelResult<()>;

    /// Configures the channel with specific IDs for communicating with an ECU
    ///
    /// ## Parameters
    /// * send - Send ID (ECU will listen for data with this ID)
    /// * recv - Receiving ID (ECU will send data with this ID)
    fn set_ids(&mut self, send: u32, recv: u32) -> ChannelResult<()>;

    /// Attempts to read a payload from the channel.
    ///
    /// The contents being read do not include any protocol related bytes,
    /// just the payload destined for the diagnostic application
    ///
    /// ## Parameters
    /// * timeout_ms - Timeout for reading. If a value of 0 is used, it instructs
    ///   the channel to immediately return with whatever was already received
    fn read_bytes(&mut self, timeout_ms: u32) -> ChannelResult<Vec<u8>>;

    /// Attempts to write a payload to the channel.
    ///
    /// The contents being sent are just the raw payload; the implementor adds
    /// whatever protocol bytes are necessary on the wire.
    ///
    /// ## Parameters
    /// * addr - Target address of the message
    /// * buffer - The buffer of bytes to write to the channel
    /// * timeout_ms - Timeout for writing. If a value of 0 is used, it tells the
    ///   channel to write without checking if data was actually written
    fn write_bytes(&mut self, addr: u32, buffer: &[u8], timeout_ms: u32) -> ChannelResult<()>;

    /// Attempts to write a payload to the channel, then listen for the channel's response
    ///
    /// ## Parameters
    /// * addr - Target address of the message
    /// * buffer - The buffer of bytes to write to the channel as the request
    /// * write_timeout_ms - Timeout for writing
    /// * read_timeout_ms - Timeout for reading the response
    fn read_write_bytes(
        &mut self,
        addr: u32,
        buffer: &[u8],
        write_timeout_ms: u32,
        read_timeout_ms: u32,
    ) -> ChannelResult<Vec<u8>> {
        self.write_bytes(addr, buffer, write_timeout_ms)?;
        self.read_bytes(read_timeout_ms)
    }

    /// Tells the channel to clear its Rx buffer,
    /// wiping any pending messages so that [PayloadChannel::read_bytes] does not
    /// return them
    fn clear_rx_buffer(&mut self) -> ChannelResult<()>;

    /// Tells the channel to clear its Tx buffer,
    /// wiping any messages that are queued to be sent to the ECU
    fn clear_tx_buffer(&mut self) -> ChannelResult<()>;
}

/// Extended trait for [PayloadChannel] when utilizing ISO-TP to send data to the ECU
pub trait IsoTPChannel: PayloadChannel {
    /// Sets the ISO-TP specific configuration for the channel
    ///
    /// ## Parameters
    /// * cfg - The configuration of the ISO-TP channel
    fn set_iso_tp_cfg(&mut self, cfg: crate::isotp::IsoTpSettings) -> ChannelResult<()>;
}

/// A PacketChannel is a way for a device to send and receive individual network
/// packets across an ECU network. Unlike [PayloadChannel], this channel type is
/// unfiltered, so all network traffic may be visible and filtering should be done
/// in software. Most protocols that implement [PayloadChannel] are actually
/// higher-level packet channels which use multiple packets to send larger
/// payloads. Such is the case with ISO-TP over CAN.
pub trait PacketChannel<T: Packet>: Send + Sync {
    /// Opens the channel. From this point forward packets can flow, so data has
    /// to be polled regularly to avoid the device's internal buffer filling up
    fn open(&mut self) -> ChannelResult<()>;

    /// Closes the channel. Once closed, no more traffic
    /// can be polled or written to the channel
    fn close(&mut self) -> ChannelResult<()>;

    /// Writes a list of packets to the raw interface
    fn write_packets(&mut self, packets: Vec<T>, timeout_ms: u32) -> ChannelResult<()>;

    /// Reads up to `max` packets from the raw interface, waiting at most
    /// `timeout_ms`. An empty list is a valid result when nothing arrived in time
    fn read_packets(&mut self, max: usize, timeout_ms: u32) -> ChannelResult<Vec<T>>;

    /// Tells the channel to clear its Rx buffer
    fn clear_rx_buffer(&mut self) -> ChannelResult<()>;

    /// Tells the channel to clear its Tx buffer
    fn clear_tx_buffer(&mut self) -> ChannelResult<()>;
}

/// Packet channel for sending and receiving individual CAN frames
pub trait CanChannel: PacketChannel<CanFrame> {
    /// Sets the CAN network configuration
    ///
    /// ## Parameters
    /// * baud - Baud rate of the CAN network
    /// * use_extended - Use extended (29bit) CAN identifiers on the network
    fn set_can_cfg(&mut self, baud: u32, use_extended: bool) -> ChannelResult<()>;
}

impl<T: PayloadChannel + ?Sized> PayloadChannel for Box<T> {
    fn open(&mut self) -> ChannelResult<()> {
        T::open(self)
    }

    fn close(&mut self) -> ChannelResult<()> {
        T::close(self)
    }

    fn set_ids(&mut self, send: u32, recv: u32) -> ChannelResult<()> {
        T::set_ids(self, send, recv)
    }

    fn read_bytes(&mut self, timeout_ms: u32) -> ChannelResult<Vec<u8>> {
        T::read_bytes(self, timeout_ms)
    }

    fn write_bytes(&mut self, addr: u32, buffer: &[u8], timeout_ms: u32) -> ChannelResult<()> {
        T::write_bytes(self, addr, buffer, timeout_ms)
    }

    fn clear_rx_buffer(&mut self) -> ChannelResult<()> {
        T::clear_rx_buffer(self)
    }

    fn clear_tx_buffer(&mut self) -> ChannelResult<()> {
        T::clear_tx_buffer(self)
    }
}

impl<T: IsoTPChannel + ?Sized> IsoTPChannel for Box<T> {
    fn set_iso_tp_cfg(&mut self, cfg: crate::isotp::IsoTpSettings) -> ChannelResult<()> {
        T::set_iso_tp_cfg(self, cfg)
    }
}

impl<X: Packet, T: PacketChannel<X> + ?Sized> PacketChannel<X> for Box<T> {
    fn open(&mut self) -> ChannelResult<()> {
        T::open(self)
    }

    fn close(&mut self) -> ChannelResult<()> {
        T::close(self)
    }

    fn write_packets(&mut self, packets: Vec<X>, timeout_ms: u32) -> ChannelResult<()> {
        T::write_packets(self, packets, timeout_ms)
    }

    fn read_packets(&mut self, max: usize, timeout_ms: u32) -> ChannelResult<Vec<X>> {
        T::read_packets(self, max, timeout_ms)
    }

    fn clear_rx_buffer(&mut self) -> ChannelResult<()> {
        T::clear_rx_buffer(self)
    }

    fn clear_tx_buffer(&mut self) -> ChannelResult<()> {
        T::clear_tx_buffer(self)
    }
}

impl<T: CanChannel + ?Sized> CanChannel for Box<T> {
    fn set_can_cfg(&mut self, baud: u32, use_extended: bool) -> ChannelResult<()> {
        T::set_can_cfg(self, baud, use_extended)
    }
}

/// This trait is for packets that are used by [PacketChannel]
pub trait Packet: Send + Sync + Sized {
    /// Returns the address of the packet
    fn get_address(&self) -> u32;
    /// Returns the data of the packet
    fn get_data(&self) -> &[u8];
    /// Sets the address of the packet
    fn set_address(&mut self, address: u32);
    /// Sets the data of the packet
    fn set_data(&mut self, data: &[u8]);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// CAN frame
pub struct CanFrame {
    id: u32,
    dlc: u8,
    data: [u8; 8],
    ext: bool,
}

impl CanFrame {
    /// Creates a new CAN frame given data and an ID.
    ///
    /// ## Parameters
    /// * id - The CAN ID of the frame
    /// * data - The data of the frame. Limited to 8 bytes
    /// * is_ext - Indication if the frame shall use extended (29bit) addressing
    ///
    /// NOTE: If `id` is greater than 0x7FF, extended addressing is enabled
    /// regardless of `is_ext`.
    pub fn new(id: u32, data: &[u8], is_ext: bool) -> Self {
        let max = std::cmp::min(8, data.len());
        let mut tmp = [0u8; 8];
        tmp[0..max].copy_from_slice(&data[0..max]);
        Self {
            id,
            dlc: max as u8,
            data: tmp,
            ext: is_ext || id > 0x7FF,
        }
    }

    /// Returns true if the CAN frame uses extended (29bit) addressing
    pub fn is_extended(&self) -> bool {
        self.ext
    }
}

impl Packet for CanFrame {
    fn get_address(&self) -> u32 {
        self.id
    }

    fn get_data(&self) -> &[u8] {
        &self.data[0..self.dlc as usize]
    }

    fn set_address(&mut self, address: u32) {
        self.id = address;
    }

    fn set_data(&mut self, data: &[u8]) {
        let max = std::cmp::min(8, data.len());
        self.data[0..max].copy_from_slice(&data[0..max]);
        self.dlc = max as u8;
    }
}
