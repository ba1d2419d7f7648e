//! Provides methods for security seed/key access to the ECU in order to unlock functions which
//! are considered secure such as writing or reading to specific memory regions on the ECU
//!
//! Access levels come in request/send pairs: seeds are requested with an odd
//! sub-function (0x01, 0x03, ...), and the computed key is returned with the
//! following even sub-function (0x02, 0x04, ...)

use super::{UDSCommand, UdsClient, SUPPRESS_POS_RESP};
use crate::{DiagError, DiagServerResult};

/// Default seed request sub-function
pub const DEFAULT_SEED_LEVEL: u8 = 0x01;

impl UdsClient {
    /// Requests a seed from the ECU for security access.
    ///
    /// Once the key is calculated from the response seed, run [UdsClient::send_key]
    /// to send the computed key to the ECU
    ///
    /// ## Parameters
    /// * access_level - The security access level to unlock. Must be odd
    ///
    /// ## Returns
    /// Returns the security key's seed. A seed of all zeroes means the requested
    /// level is already unlocked
    pub fn request_seed(&mut self, access_level: u8) -> DiagServerResult<Vec<u8>> {
        if access_level % 2 == 0 || access_level & SUPPRESS_POS_RESP != 0 {
            return Err(DiagError::ParameterInvalid);
        }
        let mut res =
            self.execute_command_with_response(UDSCommand::SecurityAccess, &[access_level])?;
        if res.len() < 2 {
            return Err(DiagError::InvalidResponseLength);
        }
        if res[1] != access_level {
            return Err(DiagError::MismatchedResponse(format!(
                "requested seed for level 0x{access_level:02X}, ECU answered for level 0x{:02X}",
                res[1]
            )));
        }
        res.drain(0..2); // Remove SID and sub-function, so just the seed value is left
        Ok(res)
    }

    /// Sends the computed key to the ECU.
    ///
    /// If this function is successful, the ECU now allows access to the
    /// security protected functions of the requested level
    ///
    /// ## Parameters
    /// * access_level - The security access level the key belongs to. Must be even,
    ///   one higher than the level the seed was requested with
    /// * key - The computed key to send to the ECU
    pub fn send_key(&mut self, access_level: u8, key: &[u8]) -> DiagServerResult<()> {
        if access_level % 2 != 0 || access_level & SUPPRESS_POS_RESP != 0 || key.is_empty() {
            return Err(DiagError::ParameterInvalid);
        }
        let mut payload = Vec::with_capacity(key.len() + 1);
        payload.push(access_level);
        payload.extend_from_slice(key);
        self.execute_command_with_response(UDSCommand::SecurityAccess, &payload)
            .map(|_| ())
    }
}
