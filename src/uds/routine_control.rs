//! Provides methods for starting and stopping routines on the ECU, and
//! querying their results

use super::{UDSCommand, UdsClient};
use crate::{DiagError, DiagServerResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
/// RoutineControl sub-function definitions
pub enum RoutineControlType {
    /// Starts a routine on the ECU
    StartRoutine = 0x01,
    /// Stops a running routine on the ECU
    StopRoutine = 0x02,
    /// Requests the results of a routine that previously ran
    RequestRoutineResults = 0x03,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of a routine control operation
pub struct RoutineResult {
    /// The 2 byte identifier of the routine
    pub routine_id: u16,
    /// Routine status record returned by the ECU. Its layout is routine specific
    pub status_record: Vec<u8>,
}

impl UdsClient {
    /// Starts a routine on the ECU
    ///
    /// ## Parameters
    /// * routine_id - The 2 byte identifier of the routine
    /// * params - Routine specific entry option record
    pub fn start_routine(&mut self, routine_id: u16, params: &[u8]) -> DiagServerResult<RoutineResult> {
        self.routine_control(RoutineControlType::StartRoutine, routine_id, params)
    }

    /// Stops a running routine on the ECU.
    /// Not every routine can be stopped once started
    pub fn stop_routine(&mut self, routine_id: u16, params: &[u8]) -> DiagServerResult<RoutineResult> {
        self.routine_control(RoutineControlType::StopRoutine, routine_id, params)
    }

    /// Requests the results of a routine that has run on the ECU
    pub fn request_routine_results(&mut self, routine_id: u16) -> DiagServerResult<RoutineResult> {
        self.routine_control(RoutineControlType::RequestRoutineResults, routine_id, &[])
    }

    fn routine_control(
        &mut self,
        operation: RoutineControlType,
        routine_id: u16,
        params: &[u8],
    ) -> DiagServerResult<RoutineResult> {
        let mut args = Vec::with_capacity(params.len() + 3);
        args.push(operation as u8);
        args.extend_from_slice(&routine_id.to_be_bytes());
        args.extend_from_slice(params);
        let res = self.execute_command_with_response(UDSCommand::RoutineControl, &args)?;
        if res.len() < 4 {
            return Err(DiagError::InvalidResponseLength);
        }
        if res[1] != operation as u8 {
            return Err(DiagError::MismatchedResponse(format!(
                "requested routine operation 0x{:02X}, ECU echoed 0x{:02X}",
                operation as u8, res[1]
            )));
        }
        let echo = u16::from_be_bytes([res[2], res[3]]);
        if echo != routine_id {
            return Err(DiagError::MismatchedResponse(format!(
                "requested routine 0x{routine_id:04X}, ECU echoed routine 0x{echo:04X}"
            )));
        }
        Ok(RoutineResult {
            routine_id,
            status_record: res[4..].to_vec(),
        })
    }
}
