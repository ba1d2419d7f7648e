//! Provides methods to turn DTC recording on the ECU on or off.
//!
//! Turning DTC recording off is useful while intrusive diagnostic work
//! (actuator tests, IO control) would otherwise litter the ECU with
//! consequential trouble codes

use super::{UDSCommand, UdsClient};
use crate::{DiagError, DiagServerResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
/// ControlDTCSetting sub-function definitions
pub enum DtcSettingType {
    /// ECU resumes updating DTC status bits
    On = 0x01,
    /// ECU stops updating DTC status bits
    Off = 0x02,
}

impl UdsClient {
    /// Turns DTC recording on the ECU on or off
    ///
    /// ## Parameters
    /// * setting - Whether the ECU shall update DTC status bits
    pub fn control_dtc_setting(&mut self, setting: DtcSettingType) -> DiagServerResult<()> {
        let res = self
            .execute_command_with_response(UDSCommand::ControlDTCSettings, &[setting as u8])?;
        if res.len() < 2 {
            return Err(DiagError::InvalidResponseLength);
        }
        if res[1] != setting as u8 {
            return Err(DiagError::MismatchedResponse(format!(
                "requested DTC setting 0x{:02X}, ECU echoed 0x{:02X}",
                setting as u8, res[1]
            )));
        }
        Ok(())
    }
}
