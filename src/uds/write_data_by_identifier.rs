//! Provides methods to write data to the ECU by a 2 byte data identifier (DID)

use super::{UDSCommand, UdsClient};
use crate::{DiagError, DiagServerResult};

impl UdsClient {
    /// Writes a record to the ECU under the given data identifier.
    ///
    /// Most identifiers are write protected and require an active
    /// [security access](crate::uds::security_access) level before the ECU will
    /// accept the write.
    ///
    /// ## Parameters
    /// * did - The 2 byte data identifier to write
    /// * value - The record to store under the identifier
    pub fn write_data_by_identifier(&mut self, did: u16, value: &[u8]) -> DiagServerResult<()> {
        if value.is_empty() {
            return Err(DiagError::ParameterInvalid);
        }
        let mut args = Vec::with_capacity(value.len() + 2);
        args.extend_from_slice(&did.to_be_bytes());
        args.extend_from_slice(value);
        let res = self.execute_command_with_response(UDSCommand::WriteDataByIdentifier, &args)?;
        if res.len() < 3 {
            return Err(DiagError::InvalidResponseLength);
        }
        let echo = u16::from_be_bytes([res[1], res[2]]);
        if echo != did {
            return Err(DiagError::MismatchedResponse(format!(
                "wrote DID 0x{did:04X}, but ECU responded with DID 0x{echo:04X}"
            )));
        }
        Ok(())
    }
}
