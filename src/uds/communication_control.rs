//! Provides methods to control normal ECU communication

use super::{UDSCommand, UdsClient};
use crate::{DiagError, DiagServerResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
/// CommunicationControl sub-function definitions
pub enum CommunicationControlType {
    /// ECU transmits and receives application messages normally
    EnableRxAndTx = 0x00,
    /// ECU keeps receiving, but stops transmitting application messages
    EnableRxDisableTx = 0x01,
    /// ECU stops receiving, but keeps transmitting application messages
    DisableRxEnableTx = 0x02,
    /// ECU neither receives nor transmits application messages
    DisableRxAndTx = 0x03,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
/// Communication layers the control request applies to
pub enum CommunicationType {
    /// Normal application communication
    NormalCommunication = 0x01,
    /// Network management communication
    NetworkManagement = 0x02,
    /// Both normal application and network management communication
    NormalAndNetworkManagement = 0x03,
}

impl UdsClient {
    /// Modifies ECU communication settings. These settings persist until the ECU
    /// leaves its current diagnostic session or is power cycled
    ///
    /// ## Parameters
    /// * control - Communication behaviour to apply
    /// * communication_type - Communication layer to modify
    pub fn communication_control(
        &mut self,
        control: CommunicationControlType,
        communication_type: CommunicationType,
    ) -> DiagServerResult<()> {
        let res = self.execute_command_with_response(
            UDSCommand::CommunicationControl,
            &[control as u8, communication_type as u8],
        )?;
        if res.len() < 2 {
            return Err(DiagError::InvalidResponseLength);
        }
        if res[1] != control as u8 {
            return Err(DiagError::MismatchedResponse(format!(
                "requested communication control 0x{:02X}, ECU echoed 0x{:02X}",
                control as u8, res[1]
            )));
        }
        Ok(())
    }
}
