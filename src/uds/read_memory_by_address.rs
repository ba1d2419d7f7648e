//! Provides methods to read data directly from ECU memory by address.
//!
//! Memory access is typically restricted to an active
//! [security access](crate::uds::security_access) level, and reading the wrong
//! region returns requestOutOfRange rather than garbage

use super::{encode_address_and_length, UDSCommand, UdsClient};
use crate::{DiagError, DiagServerResult};

impl UdsClient {
    /// Reads a region of ECU memory.
    ///
    /// The request encodes a 4 byte address and 4 byte size; the ECU responds
    /// with exactly `size` bytes of memory content.
    ///
    /// ## Parameters
    /// * address - Start address of the memory region
    /// * size - Number of bytes to read. Must be non-zero
    pub fn read_memory_by_address(&mut self, address: u32, size: u32) -> DiagServerResult<Vec<u8>> {
        if size == 0 {
            return Err(DiagError::ParameterInvalid);
        }
        let args = encode_address_and_length(address, size);
        let mut res = self.execute_command_with_response(UDSCommand::ReadMemoryByAddress, &args)?;
        if res.len() != 1 + size as usize {
            return Err(DiagError::InvalidResponseLength);
        }
        res.drain(0..1);
        Ok(res)
    }
}
