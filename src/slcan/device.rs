//! Implements the serial-line CAN (SLCAN) adapter protocol.
//!
//! SLCAN devices speak an ASCII protocol over a serial port: commands and
//! frames are records terminated by carriage return, and a bell character
//! (0x07) signals that the adapter rejected the last command.

use std::{
    collections::VecDeque,
    fmt::{Debug, Formatter, Result as FmtResult},
    io::{Read, Write},
    sync::Arc,
    time::Instant,
};

use serialport::SerialPort;

use crate::channel::{CanFrame, ChannelError, Packet};

const MAX_RECORD_SIZE: usize = 32;
const HEX: [u8; 16] = *b"0123456789ABCDEF";

#[derive(Debug, Clone, thiserror::Error)]
/// Error produced by an SLCAN device
pub enum SlCanError {
    /// IO Error
    #[error("IO error")]
    IOError(
        #[from]
        #[source]
        Arc<std::io::Error>,
    ),
    /// Unsupported CAN bus speed
    #[error("Unsupported speed")]
    UnsupportedSpeed,
    /// Read timeout
    #[error("Read timeout")]
    ReadTimeout,
    /// Rx queue full
    #[error("Rx queue full")]
    RxQueueFull,
    /// Received record could not be decoded
    #[error("Decoding failed")]
    DecodingFailed,
    /// Adapter rejected the command (bell received)
    #[error("Not acknowledged")]
    NotAcknowledged,
}

/// SLCAN result
pub type SlCanResult<T> = Result<T, SlCanError>;

/// One record read back from the adapter
enum SlCanRecord {
    /// Empty record, the adapter acknowledged the last command
    Ack,
    /// A CAN frame received from the bus
    Frame(CanFrame),
}

/// SLCAN device over a serial port.
///
/// The port's read timeout governs how long a single poll for incoming
/// bytes blocks; [crate::slcan::SlCanChannel] layers its own deadlines on top.
pub struct SlCanDevice {
    port: Box<dyn SerialPort>,
    rx_queue: VecDeque<CanFrame>,
    rx_queue_limit: usize,
    record_buf: Vec<u8>,
}

impl Debug for SlCanDevice {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "SlCanDevice on {}",
            self.port.name().unwrap_or_else(|| "<unnamed port>".into())
        )
    }
}

impl SlCanDevice {
    /// Creates a new SLCAN device
    ///
    /// ## Parameters
    /// * port - The serial port the adapter is attached to
    /// * rx_queue_limit - Maximum number of CAN frames buffered while the
    ///   device waits for command acknowledgements
    pub fn new(port: Box<dyn SerialPort>, rx_queue_limit: usize) -> Self {
        SlCanDevice {
            port,
            rx_queue: VecDeque::new(),
            rx_queue_limit,
            record_buf: Vec::with_capacity(MAX_RECORD_SIZE),
        }
    }

    /// Reads bytes off the port until one whole record is complete.
    /// A partial record survives across calls, so a slow adapter does not
    /// corrupt framing.
    fn poll_record(&mut self) -> SlCanResult<SlCanRecord> {
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(1) => {}
                Ok(_) => return Err(SlCanError::ReadTimeout),
                Err(e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    return Err(SlCanError::ReadTimeout)
                }
                Err(e) => return Err(SlCanError::IOError(Arc::new(e))),
            }
            match byte[0] {
                0x07 => {
                    self.record_buf.clear();
                    return Err(SlCanError::NotAcknowledged);
                }
                b'\r' => {
                    if self.record_buf.is_empty() {
                        return Ok(SlCanRecord::Ack);
                    }
                    let record = std::mem::take(&mut self.record_buf);
                    return parse_record(&record).map(SlCanRecord::Frame);
                }
                b => {
                    if self.record_buf.len() == MAX_RECORD_SIZE {
                        self.record_buf.clear();
                        return Err(SlCanError::DecodingFailed);
                    }
                    self.record_buf.push(b);
                }
            }
        }
    }

    /// Sends a command record and waits for the adapter's acknowledgement.
    /// CAN frames arriving in the meantime are queued and returned by later
    /// [SlCanDevice::read] calls.
    fn send_command_with_ack(&mut self, cmd: &[u8]) -> SlCanResult<()> {
        self.port
            .write_all(cmd)
            .map_err(|e| SlCanError::IOError(Arc::new(e)))?;
        let start = Instant::now();
        while start.elapsed().as_millis() <= 1000 {
            match self.poll_record() {
                Ok(SlCanRecord::Ack) => return Ok(()),
                Ok(SlCanRecord::Frame(f)) => {
                    if self.rx_queue.len() >= self.rx_queue_limit {
                        return Err(SlCanError::RxQueueFull);
                    }
                    self.rx_queue.push_back(f);
                }
                Err(SlCanError::ReadTimeout) => {}
                Err(e) => return Err(e),
            }
        }
        Err(SlCanError::ReadTimeout)
    }

    /// Sets the CAN bus speed and opens the SLCAN channel
    pub fn open(&mut self, can_speed: u32) -> SlCanResult<()> {
        self.send_command_with_ack(bitrate_command(can_speed)?.as_ref())?;
        self.send_command_with_ack(b"O\r")
    }

    /// Closes the SLCAN channel
    pub fn close(&mut self) -> SlCanResult<()> {
        self.send_command_with_ack(b"C\r")
    }

    /// Reads one CAN frame from the device, either from the internal queue or
    /// fresh off the port
    pub fn read(&mut self) -> SlCanResult<CanFrame> {
        if let Some(f) = self.rx_queue.pop_front() {
            return Ok(f);
        }
        match self.poll_record()? {
            SlCanRecord::Frame(f) => Ok(f),
            // A stray ack with no command outstanding is noise
            SlCanRecord::Ack => Err(SlCanError::DecodingFailed),
        }
    }

    /// Sends one CAN frame to the device
    pub fn write(&mut self, frame: CanFrame) -> SlCanResult<()> {
        self.send_command_with_ack(&encode_frame(&frame))
    }

    /// Clears the internal receive queue
    pub fn clear_rx_queue(&mut self) {
        self.rx_queue.clear();
    }
}

/// Encodes a CAN frame into its SLCAN wire record (including the terminator)
pub(crate) fn encode_frame(frame: &CanFrame) -> Vec<u8> {
    let data = frame.get_data();
    let mut buf = Vec::with_capacity(2 * data.len() + 11);
    if frame.is_extended() {
        buf.push(b'T');
        for b in frame.get_address().to_be_bytes() {
            buf.push(HEX[b as usize >> 4]);
            buf.push(HEX[b as usize & 0xF]);
        }
    } else {
        buf.push(b't');
        let id = frame.get_address() & 0x7FF;
        buf.push(HEX[(id >> 8) as usize]);
        buf.push(HEX[(id >> 4) as usize & 0xF]);
        buf.push(HEX[id as usize & 0xF]);
    }
    buf.push(HEX[data.len() & 0xF]);
    for d in data {
        buf.push(HEX[*d as usize >> 4]);
        buf.push(HEX[*d as usize & 0xF]);
    }
    buf.push(b'\r');
    buf
}

/// Parses one SLCAN record (without the terminator) into a CAN frame
pub(crate) fn parse_record(buf: &[u8]) -> SlCanResult<CanFrame> {
    let (id_len, extended) = match buf.first() {
        Some(b't') => (3usize, false),
        Some(b'T') => (8usize, true),
        _ => return Err(SlCanError::DecodingFailed),
    };
    if buf.len() < id_len + 2 {
        return Err(SlCanError::DecodingFailed);
    }
    let mut id = 0u32;
    for &c in &buf[1..1 + id_len] {
        id = id << 4 | hex_nibble(c)? as u32;
    }
    let dlc = hex_nibble(buf[1 + id_len])? as usize;
    if dlc > 8 || buf.len() < id_len + 2 + dlc * 2 {
        return Err(SlCanError::DecodingFailed);
    }
    let mut data = [0u8; 8];
    let payload = &buf[id_len + 2..];
    for (i, pair) in payload.chunks_exact(2).take(dlc).enumerate() {
        data[i] = hex_nibble(pair[0])? << 4 | hex_nibble(pair[1])?;
    }
    Ok(CanFrame::new(id, &data[..dlc], extended))
}

/// Maps a CAN bus speed to the adapter's bitrate selection record
fn bitrate_command(can_speed: u32) -> SlCanResult<[u8; 3]> {
    match can_speed {
        10_000 => Ok(*b"S0\r"),
        20_000 => Ok(*b"S1\r"),
        50_000 => Ok(*b"S2\r"),
        100_000 => Ok(*b"S3\r"),
        125_000 => Ok(*b"S4\r"),
        250_000 => Ok(*b"S5\r"),
        500_000 => Ok(*b"S6\r"),
        800_000 => Ok(*b"S7\r"),
        1_000_000 => Ok(*b"S8\r"),
        83_333 => Ok(*b"S9\r"), // Not part of the original standard
        _ => Err(SlCanError::UnsupportedSpeed),
    }
}

fn hex_nibble(hex: u8) -> SlCanResult<u8> {
    match hex {
        b'0'..=b'9' => Ok(hex - b'0'),
        b'a'..=b'f' => Ok(hex - b'a' + 10),
        b'A'..=b'F' => Ok(hex - b'A' + 10),
        _ => Err(SlCanError::DecodingFailed),
    }
}

impl From<SlCanError> for ChannelError {
    fn from(value: SlCanError) -> Self {
        match value {
            SlCanError::IOError(err) => ChannelError::Other(format!("IO error: {err}")),
            SlCanError::ReadTimeout => ChannelError::ReadTimeout,
            _ => ChannelError::Other(value.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_standard_frame() {
        let frame = CanFrame::new(0x7E0, &[0x02, 0x3E, 0x80], false);
        assert_eq!(encode_frame(&frame), b"t7E03023E80\r");
    }

    #[test]
    fn encode_extended_frame() {
        let frame = CanFrame::new(0x18DA10F1, &[0xAA], true);
        assert_eq!(encode_frame(&frame), b"T18DA10F11AA\r");
    }

    #[test]
    fn parse_standard_frame() {
        let frame = parse_record(b"t7E8403AABBCC").unwrap();
        assert_eq!(frame.get_address(), 0x7E8);
        assert!(!frame.is_extended());
        assert_eq!(frame.get_data(), [0x03, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn parse_extended_frame() {
        let frame = parse_record(b"T18DAF110201122").unwrap();
        assert_eq!(frame.get_address(), 0x18DAF110);
        assert!(frame.is_extended());
        assert_eq!(frame.get_data(), [0x11, 0x22]);
    }

    #[test]
    fn roundtrip() {
        let frame = CanFrame::new(0x123, &[0xDE, 0xAD, 0xBE, 0xEF], false);
        let mut record = encode_frame(&frame);
        record.pop(); // strip terminator
        assert_eq!(parse_record(&record).unwrap(), frame);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_record(b"X123").is_err());
        assert!(parse_record(b"t7E8").is_err());
        assert!(parse_record(b"t7E89").is_err()); // dlc 9
        assert!(parse_record(b"t7E82ZZ").is_err());
    }

    #[test]
    fn bitrate_table() {
        assert_eq!(bitrate_command(500_000).unwrap(), *b"S6\r");
        assert_eq!(bitrate_command(1_000_000).unwrap(), *b"S8\r");
        assert!(matches!(
            bitrate_command(123),
            Err(SlCanError::UnsupportedSpeed)
        ));
    }
}
