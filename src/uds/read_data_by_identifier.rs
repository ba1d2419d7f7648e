//! Provides methods to read data from the ECU by a 2 byte data identifier (DID)

use super::{UDSCommand, UdsClient};
use crate::{DiagError, DiagServerResult};

impl UdsClient {
    /// Reads the data stored on the ECU under the given data identifier.
    ///
    /// The ECU echoes the identifier back in its response; a response carrying a
    /// different identifier is rejected.
    ///
    /// ## Parameters
    /// * did - The 2 byte data identifier to read
    ///
    /// ## Returns
    /// The record value stored under the identifier, without the echoed
    /// identifier bytes
    pub fn read_data_by_identifier(&mut self, did: u16) -> DiagServerResult<Vec<u8>> {
        let mut res = self
            .execute_command_with_response(UDSCommand::ReadDataByIdentifier, &did.to_be_bytes())?;
        if res.len() < 3 {
            return Err(DiagError::InvalidResponseLength);
        }
        let echo = u16::from_be_bytes([res[1], res[2]]);
        if echo != did {
            return Err(DiagError::MismatchedResponse(format!(
                "requested DID 0x{did:04X}, but ECU responded with DID 0x{echo:04X}"
            )));
        }
        res.drain(0..3);
        Ok(res)
    }
}
