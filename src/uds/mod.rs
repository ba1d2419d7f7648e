//! Module for UDS (Unified diagnostic services - ISO14229)
//!
//! Theoretically, this module should be compliant with any ECU which implements
//! UDS (Typically any ECU produced after 2006 supports this)

use std::time::Instant;

use automotive_diag::uds::UdsErrorByte;
use automotive_diag::ByteWrapper;
use log::{debug, error, warn};

use crate::{
    channel::{ChannelError, IsoTPChannel, PayloadChannel},
    isotp::IsoTpSettings,
    DiagError, DiagServerResult,
};

pub mod clear_diagnostic_information;
pub mod communication_control;
pub mod control_dtc_setting;
pub mod data_transfer;
pub mod diagnostic_session_control;
pub mod ecu_reset;
pub mod read_data_by_identifier;
pub mod read_dtc_information;
pub mod read_memory_by_address;
pub mod request_file_transfer;
pub mod routine_control;
pub mod security_access;
pub mod tester_present;
pub mod write_data_by_identifier;
pub mod write_memory_by_address;


pub use communication_control::{CommunicationControlType, CommunicationType};
pub use control_dtc_setting::DtcSettingType;
pub use diagnostic_session_control::{SessionTiming, UDSSessionType};
pub use ecu_reset::ResetType;
pub use read_dtc_information::{DtcCount, DtcExtendedDataRecord, DtcSubFunction};
pub use request_file_transfer::{FileInfo, FileOperationMode, FileTransferInfo};
pub use routine_control::{RoutineControlType, RoutineResult};

use crate::dtc::DTCFormatType;

/// Sub-function modifier requesting that the ECU suppresses its positive response
pub const SUPPRESS_POS_RESP: u8 = 0x80;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
/// UDS command service IDs
pub enum UDSCommand {
    /// Diagnostic session control. See [diagnostic_session_control]
    DiagnosticSessionControl = 0x10,
    /// ECU Reset. See [ecu_reset]
    ECUReset = 0x11,
    /// Clears diagnostic information (DTCs) from the ECU. See [clear_diagnostic_information]
    ClearDiagnosticInformation = 0x14,
    /// Reads diagnostic trouble codes and their statuses. See [read_dtc_information]
    ReadDTCInformation = 0x19,
    /// Reads data from the ECU by a 2 byte identifier. See [read_data_by_identifier]
    ReadDataByIdentifier = 0x22,
    /// Reads data from ECU memory by address. See [read_memory_by_address]
    ReadMemoryByAddress = 0x23,
    /// Reads scaling data from the ECU by a 2 byte identifier
    ReadScalingDataByIdentifier = 0x24,
    /// Security access. See [security_access]
    SecurityAccess = 0x27,
    /// Controls normal communication functionality of the ECU. See [communication_control]
    CommunicationControl = 0x28,
    /// Reads data from the ECU at a periodic rate
    ReadDataByPeriodicIdentifier = 0x2A,
    /// Dynamically defines a new data identifier
    DynamicallyDefineDataIdentifier = 0x2C,
    /// Writes data to the ECU by a 2 byte identifier. See [write_data_by_identifier]
    WriteDataByIdentifier = 0x2E,
    /// Substitutes an input/output value on the ECU
    InputOutputControlByIdentifier = 0x2F,
    /// Starts, stops and queries routines on the ECU. See [routine_control]
    RoutineControl = 0x31,
    /// Requests a data download to the ECU. See [data_transfer]
    RequestDownload = 0x34,
    /// Requests a data upload from the ECU
    RequestUpload = 0x35,
    /// Transfers one block of a download or upload. See [data_transfer]
    TransferData = 0x36,
    /// Terminates a download or upload. See [data_transfer]
    RequestTransferExit = 0x37,
    /// Transfers a file to or from the ECU's file system. See [request_file_transfer]
    RequestFileTransfer = 0x38,
    /// Writes data to ECU memory by address. See [write_memory_by_address]
    WriteMemoryByAddress = 0x3D,
    /// Tester present command. See [tester_present]
    TesterPresent = 0x3E,
    /// Reads or modifies the ECUs timing parameters
    AccessTimingParameters = 0x83,
    /// Transmits data with extended security
    SecuredDataTransmission = 0x84,
    /// Turns DTC recording on or off. See [control_dtc_setting]
    ControlDTCSettings = 0x85,
    /// Requests the ECU to report an event-triggered response
    ResponseOnEvent = 0x86,
    /// Controls the communication baud rate of the ECU
    LinkControl = 0x87,
}

impl From<UDSCommand> for u8 {
    fn from(cmd: UDSCommand) -> Self {
        cmd as u8
    }
}

/// Looks up the human readable definition of a negative response code
/// according to ISO14229
pub fn lookup_uds_nrc(code: u8) -> String {
    match UdsErrorByte::from(code) {
        ByteWrapper::Standard(e) => format!("{e:?}"),
        ByteWrapper::Extended(b) => format!("Unknown NRC 0x{b:02X}"),
    }
}

/// Encodes a 4 byte address / 4 byte size pair behind its
/// addressAndLengthFormatIdentifier, as used by the memory and download services
pub(crate) fn encode_address_and_length(address: u32, size: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.push(0x44);
    out.extend_from_slice(&address.to_be_bytes());
    out.extend_from_slice(&size.to_be_bytes());
    out
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// UDS client options
pub struct UdsClientOptions {
    /// ECU Send ID (the ID the ECU listens on)
    pub send_id: u32,
    /// ECU Receive ID (the ID the ECU responds with)
    pub recv_id: u32,
    /// Maximum time to wait for the first response to a request (P2_server), in ms
    pub p2_timeout_ms: u32,
    /// Maximum time to wait for a response after the ECU reported
    /// request-received-response-pending (P2*_server), in ms
    pub p2_star_timeout_ms: u32,
    /// Write timeout in ms
    pub write_timeout_ms: u32,
    /// Maximum number of consecutive response-pending frames tolerated before
    /// the request is abandoned
    pub max_pending_responses: u32,
}

impl Default for UdsClientOptions {
    fn default() -> Self {
        Self {
            send_id: 0x07E0,
            recv_id: 0x07E8,
            p2_timeout_ms: 1000,
            p2_star_timeout_ms: 5000,
            write_timeout_ms: 1000,
            max_pending_responses: 10,
        }
    }
}

#[derive(Debug, Clone)]
/// UDS message payload
pub struct UdsCmd {
    bytes: Vec<u8>,
    response_required: bool,
}

impl UdsCmd {
    /// Creates a new UDS payload from a service ID and its arguments
    pub fn new(sid: UDSCommand, args: &[u8], need_response: bool) -> Self {
        let mut b: Vec<u8> = Vec::with_capacity(args.len() + 1);
        b.push(sid.into());
        b.extend_from_slice(args);
        Self {
            bytes: b,
            response_required: need_response,
        }
    }

    /// Returns the service ID byte of the payload
    pub fn get_sid_byte(&self) -> u8 {
        self.bytes[0]
    }

    /// Returns the raw bytes of the payload as they go on the wire
    pub fn to_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns true if the client shall await an ECU response for this payload
    pub fn requires_response(&self) -> bool {
        self.response_required
    }
}

/// UDS diagnostic client.
///
/// The client owns an ISO-TP channel to the ECU and performs one request at a
/// time: encode, transmit, await the response (honouring the response-pending
/// protocol), then decode. It is stateless across requests apart from its
/// configured timeouts and the most recently requested session mode and
/// reported session timing.
pub struct UdsClient {
    channel: Box<dyn IsoTPChannel>,
    settings: UdsClientOptions,
    pub(crate) session_mode: UDSSessionType,
    pub(crate) session_timing: Option<SessionTiming>,
    pub(crate) dtc_format: Option<DTCFormatType>,
}

impl std::fmt::Debug for UdsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdsClient")
            .field("settings", &self.settings)
            .field("session_mode", &self.session_mode)
            .field("session_timing", &self.session_timing)
            .finish()
    }
}

impl UdsClient {
    /// Creates a new UDS client over an ISO-TP connection with the ECU.
    ///
    /// This will configure the channel with the settings provided in both
    /// `settings` and `channel_cfg`, then open it.
    ///
    /// ## Parameters
    /// * settings - UDS client settings
    /// * channel - ISO-TP communication channel with the ECU
    /// * channel_cfg - The settings to use for the ISO-TP channel
    pub fn new_over_iso_tp(
        settings: UdsClientOptions,
        mut channel: Box<dyn IsoTPChannel>,
        channel_cfg: IsoTpSettings,
    ) -> DiagServerResult<Self> {
        channel.set_iso_tp_cfg(channel_cfg)?;
        channel.set_ids(settings.send_id, settings.recv_id)?;
        channel.open()?;
        Ok(Self {
            channel,
            settings,
            session_mode: UDSSessionType::Default,
            session_timing: None,
            dtc_format: None,
        })
    }

    /// Returns the current settings used by the client
    pub fn get_settings(&self) -> UdsClientOptions {
        self.settings
    }

    /// Returns the session mode most recently requested from the ECU
    pub fn current_session_mode(&self) -> UDSSessionType {
        self.session_mode
    }

    /// Returns the session timing parameters most recently reported by the ECU,
    /// if a session change has completed since the client was created
    pub fn current_session_timing(&self) -> Option<SessionTiming> {
        self.session_timing
    }

    /// Send a command to the ECU, and receive its response
    ///
    /// ## Parameters
    /// * sid - The service ID of the command
    /// * args - The arguments for the service
    ///
    /// ## Returns
    /// If the function is successful, and the ECU responds with an OK response
    /// (containing data), then the full ECU response is returned. The response
    /// will begin with the sid + 0x40
    pub fn execute_command_with_response(
        &mut self,
        sid: UDSCommand,
        args: &[u8],
    ) -> DiagServerResult<Vec<u8>> {
        self.exec_command(UdsCmd::new(sid, args, true))
    }

    /// Send a command to the ECU without awaiting a response.
    ///
    /// This is the transmission mode for requests whose sub-function carries the
    /// suppress-positive-response bit
    pub fn execute_command(&mut self, sid: UDSCommand, args: &[u8]) -> DiagServerResult<()> {
        self.exec_command(UdsCmd::new(sid, args, false)).map(|_| ())
    }

    /// Attempts to send a raw payload of bytes to the ECU, and return its full response
    pub fn send_byte_array_with_response(&mut self, payload: &[u8]) -> DiagServerResult<Vec<u8>> {
        if payload.is_empty() {
            return Err(DiagError::ParameterInvalid);
        }
        self.exec_command(UdsCmd {
            bytes: payload.to_vec(),
            response_required: true,
        })
    }

    /// Attempts to send a raw payload of bytes to the ECU without polling for a response
    pub fn send_byte_array(&mut self, payload: &[u8]) -> DiagServerResult<()> {
        if payload.is_empty() {
            return Err(DiagError::ParameterInvalid);
        }
        self.exec_command(UdsCmd {
            bytes: payload.to_vec(),
            response_required: false,
        })
        .map(|_| ())
    }

    /// Internal function for sending a UDS payload to the ECU and processing its
    /// response according to the request state machine
    fn exec_command(&mut self, cmd: UdsCmd) -> DiagServerResult<Vec<u8>> {
        let target = cmd.get_sid_byte();
        // Wipe any stale traffic from an earlier request so late arrivals cannot
        // be attributed to this one
        self.channel.clear_tx_buffer()?;
        self.channel.clear_rx_buffer()?;

        debug!("sending request {:02X?}", cmd.to_bytes());
        self.channel.write_bytes(
            self.settings.send_id,
            cmd.to_bytes(),
            self.settings.write_timeout_ms,
        )?;
        if !cmd.requires_response() {
            debug!("request does not require a response, send only");
            return Ok(Vec::new());
        }

        let mut timeout_ms = self.settings.p2_timeout_ms;
        let mut pending: u32 = 0;
        loop {
            let start = Instant::now();
            let res = match self.channel.read_bytes(timeout_ms) {
                Ok(r) => r,
                Err(ChannelError::ReadTimeout) | Err(ChannelError::BufferEmpty) => {
                    warn!(
                        "no response from ECU within {timeout_ms} ms ({} pending frames seen)",
                        pending
                    );
                    return Err(DiagError::Timeout);
                }
                Err(e) => return Err(e.into()),
            };
            debug!(
                "ECU response after {} ms: {:02X?}",
                start.elapsed().as_millis(),
                res
            );
            if res.is_empty() {
                return Err(DiagError::EmptyResponse);
            }
            if res[0] == 0x7F {
                if res.len() < 3 {
                    return Err(DiagError::InvalidResponseLength);
                }
                if res[1] != target {
                    error!(
                        "negative response for SID 0x{:02X}, but request was 0x{target:02X}",
                        res[1]
                    );
                    return Err(DiagError::WrongMessage);
                }
                if res[2] == 0x78 {
                    // requestCorrectlyReceivedResponsePending. Not an error, the
                    // ECU needs more time; restart the response timer with P2*
                    pending += 1;
                    if pending > self.settings.max_pending_responses {
                        warn!(
                            "ECU exceeded {} response-pending frames, giving up",
                            self.settings.max_pending_responses
                        );
                        return Err(DiagError::Timeout);
                    }
                    debug!("ECU response pending ({pending}), awaiting with P2* deadline");
                    timeout_ms = self.settings.p2_star_timeout_ms;
                    continue;
                }
                error!("ECU negative response 0x{:02X}", res[2]);
                return Err(DiagError::ECUError {
                    code: res[2],
                    def: Some(lookup_uds_nrc(res[2])),
                });
            }
            if res[0] != target.wrapping_add(0x40) {
                error!(
                    "ECU SID mismatch. Request SID was 0x{target:02X}, response SID was 0x{:02X}",
                    res[0]
                );
                return Err(DiagError::WrongMessage);
            }
            return Ok(res);
        }
    }
}

impl Drop for UdsClient {
    fn drop(&mut self) {
        if let Err(e) = self.channel.close() {
            warn!("could not close ISO-TP channel on client teardown: {e}");
        }
    }
}
