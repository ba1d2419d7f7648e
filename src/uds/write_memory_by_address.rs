//! Provides methods to write data directly to ECU memory by address.
//!
//! This bypasses any validation the ECU applies to identifier writes, so it
//! can corrupt a running ECU if misused. Most ECUs gate it behind a
//! [security access](crate::uds::security_access) level

use super::{encode_address_and_length, UDSCommand, UdsClient};
use crate::{DiagError, DiagServerResult};

impl UdsClient {
    /// Writes a block of data to a region of ECU memory.
    ///
    /// The ECU echoes the address and size back in its response; a response for
    /// a different region is rejected.
    ///
    /// ## Parameters
    /// * address - Start address of the memory region
    /// * data - The bytes to write
    pub fn write_memory_by_address(&mut self, address: u32, data: &[u8]) -> DiagServerResult<()> {
        if data.is_empty() {
            return Err(DiagError::ParameterInvalid);
        }
        let location = encode_address_and_length(address, data.len() as u32);
        let mut args = location.clone();
        args.extend_from_slice(data);
        let res = self.execute_command_with_response(UDSCommand::WriteMemoryByAddress, &args)?;
        if res.len() < 1 + location.len() {
            return Err(DiagError::InvalidResponseLength);
        }
        if res[1..1 + location.len()] != location[..] {
            return Err(DiagError::MismatchedResponse(format!(
                "wrote {} bytes at 0x{address:08X}, but ECU confirmed a different region",
                data.len()
            )));
        }
        Ok(())
    }
}
