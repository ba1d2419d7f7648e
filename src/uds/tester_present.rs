//! Provides methods for the TesterPresent service, which keeps a non-default
//! diagnostic session alive

use super::{UDSCommand, UdsClient, SUPPRESS_POS_RESP};
use crate::DiagServerResult;

impl UdsClient {
    /// Sends a TesterPresent message and awaits the ECU's positive response
    pub fn tester_present(&mut self) -> DiagServerResult<()> {
        self.execute_command_with_response(UDSCommand::TesterPresent, &[0x00])
            .map(|_| ())
    }

    /// Sends a TesterPresent message with the suppress-positive-response bit set.
    ///
    /// The ECU does not reply on success, so no response is awaited; a negative
    /// response would still be sent by the ECU but is intentionally not polled
    /// for, as the message only serves to reset the ECU's session timeout (S3).
    pub fn tester_present_suppressed(&mut self) -> DiagServerResult<()> {
        self.execute_command(UDSCommand::TesterPresent, &[SUPPRESS_POS_RESP])
    }
}
