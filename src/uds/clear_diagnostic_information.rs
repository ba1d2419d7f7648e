//!  Provides methods to clear diagnostic trouble codes from the ECU

use super::{UDSCommand, UdsClient};
use crate::{DiagError, DiagServerResult};

/// DTC group mask selecting every group (clears all DTCs)
pub const ALL_DTC_GROUPS: u32 = 0x00FF_FFFF;

impl UdsClient {
    /// Clears diagnostic information (DTCs) from the ECU.
    ///
    /// ## Parameters
    /// * group - The group of DTCs to clear. Only the lower 3 bytes are used
    ///   (0x000000 - 0xFFFFFF). A value of [ALL_DTC_GROUPS] clears every group
    pub fn clear_diagnostic_information(&mut self, group: u32) -> DiagServerResult<()> {
        if group > ALL_DTC_GROUPS {
            return Err(DiagError::ParameterInvalid);
        }
        self.execute_command_with_response(
            UDSCommand::ClearDiagnosticInformation,
            &[(group >> 16) as u8, (group >> 8) as u8, group as u8],
        )
        .map(|_| ())
    }

    /// Clears every stored DTC from the ECU
    pub fn clear_all_dtcs(&mut self) -> DiagServerResult<()> {
        self.clear_diagnostic_information(ALL_DTC_GROUPS)
    }
}
