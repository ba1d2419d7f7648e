//!  Provides methods to manipulate the ECUs diagnostic session mode

use crate::{DiagError, DiagServerResult};

use super::{UDSCommand, UdsClient};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
/// UDS diagnostic session modes. Handled by SID 0x10
pub enum UDSSessionType {
    /// Default diagnostic session mode (ECU is normally in this mode on startup).
    /// This session type does not require the client to send TesterPresent messages
    Default,

    /// This diagnostic session mode enables all diagnostic services related to flashing or programming
    /// the ECU
    Programming,

    /// This diagnostic session mode enables all diagnostic services and allows adjusting
    /// ECU values
    Extended,

    /// This diagnostic session enables all diagnostic services required to support safety system-related functions
    SafetySystem,

    /// Custom session type. This covers both vehicleManufacturerSpecific modes (0x40-0x5F) and systemSupplierSpecific modes (0x60-0x7E).
    Other(u8),
}

impl From<UDSSessionType> for u8 {
    fn from(from: UDSSessionType) -> u8 {
        match from {
            UDSSessionType::Default => 0x01,
            UDSSessionType::Programming => 0x02,
            UDSSessionType::Extended => 0x03,
            UDSSessionType::SafetySystem => 0x04,
            UDSSessionType::Other(x) => x,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Session timing parameters reported by the ECU when entering a session
pub struct SessionTiming {
    /// Maximum time the ECU takes to respond to a request (P2_server), in ms
    pub p2_server_ms: u32,
    /// Maximum time the ECU takes to respond once it has reported
    /// request-received-response-pending (P2*_server), in ms
    pub p2_star_server_ms: u32,
}

impl UdsClient {
    /// Tells the ECU to enter the given diagnostic session mode.
    ///
    /// On success the client records the session mode and the timing parameters
    /// the ECU reported for it.
    ///
    /// ## Parameters
    /// * mode - The target diagnostic session mode
    pub fn set_session_mode(&mut self, mode: UDSSessionType) -> DiagServerResult<SessionTiming> {
        let res = self
            .execute_command_with_response(UDSCommand::DiagnosticSessionControl, &[mode.into()])?;
        if res.len() < 6 {
            return Err(DiagError::InvalidResponseLength);
        }
        if res[1] != mode.into() {
            return Err(DiagError::MismatchedResponse(format!(
                "requested session 0x{:02X}, ECU confirmed session 0x{:02X}",
                u8::from(mode),
                res[1]
            )));
        }
        // P2 is reported in 1 ms resolution, P2* in 10 ms resolution
        let timing = SessionTiming {
            p2_server_ms: u16::from_be_bytes([res[2], res[3]]) as u32,
            p2_star_server_ms: u16::from_be_bytes([res[4], res[5]]) as u32 * 10,
        };
        self.session_mode = mode;
        self.session_timing = Some(timing);
        Ok(timing)
    }

    /// Tells the ECU to enter default diagnostic session mode
    pub fn set_default_mode(&mut self) -> DiagServerResult<SessionTiming> {
        self.set_session_mode(UDSSessionType::Default)
    }

    /// Tells the ECU to enter a programming diagnostic session mode
    pub fn set_programming_mode(&mut self) -> DiagServerResult<SessionTiming> {
        self.set_session_mode(UDSSessionType::Programming)
    }

    /// Tells the ECU to enter an extended diagnostic session mode
    pub fn set_extended_mode(&mut self) -> DiagServerResult<SessionTiming> {
        self.set_session_mode(UDSSessionType::Extended)
    }

    /// Tells the ECU to enter a safety system diagnostic session mode
    pub fn set_safety_system_mode(&mut self) -> DiagServerResult<SessionTiming> {
        self.set_session_mode(UDSSessionType::SafetySystem)
    }
}
