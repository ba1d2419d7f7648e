//!  Provides methods to read and query DTCs on the ECU

use crate::{
    dtc::{dtc_format_from_uds, DTCFormatType, DtcStatus, DTC},
    DiagError, DiagServerResult,
};

use super::{UDSCommand, UdsClient};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
/// ReadDTCInformation sub-function definitions
pub enum DtcSubFunction {
    /// This function takes a 1 byte DTCStatusMask
    ReportNumberOfDTCByStatusMask = 0x01,
    /// This function takes a 1 byte DTCStatusMask
    ReportDTCByStatusMask = 0x02,
    /// This function takes a 3 byte DTCMaskRecord and a 1 byte DTCSnapshotRecordNumber
    ReportDTCSnapshotIdentifier = 0x03,
    /// This function takes a 3 byte DTCMaskRecord and a 1 byte DTCSnapshotRecordNumber
    ReportDTCSnapshotRecordByDTCNumber = 0x04,
    /// This function takes a 1 byte DTCSnapshotRecordNumber
    ReportDTCSnapshotRecordByRecordNumber = 0x05,
    /// This function takes a 3 byte DTCMaskRecord and a 1 byte DTCExtendedDataRecordNumber
    ReportDTCExtendedDataRecordByDTCNumber = 0x06,
    /// This function takes a 1 byte DTCSeverityMask and a 1 byte DTCStatusMask
    ReportNumberOfDTCBySeverityMaskRecord = 0x07,
    /// This function takes a 1 byte DTCSeverityMask and a 1 byte DTCStatusMask
    ReportDTCBySeverityMaskRecord = 0x08,
    /// This function takes a 3 byte DTCMaskRecord
    ReportSeverityInformationOfDTC = 0x09,
    /// This function takes no additional arguments
    ReportSupportedDTC = 0x0A,
    /// This function takes no additional arguments
    ReportFirstTestFailedDTC = 0x0B,
    /// This function takes no additional arguments
    ReportFirstConfirmedDTC = 0x0C,
    /// This function takes no additional arguments
    ReportMostRecentTestFailedDTC = 0x0D,
    /// This function takes no additional arguments
    ReportMostRecentConfirmedDTC = 0x0E,
    /// This function takes a 1 byte DTCStatusMask
    ReportMirrorMemoryDTCByStatusMask = 0x0F,
    /// This function takes a 3 byte DTCMaskRecord and a 1 byte DTCExtendedDataRecordNumber
    ReportMirrorMemoryDTCExtendedDataRecordByDTCNumber = 0x10,
    /// This function takes a 1 byte DTCStatusMask
    ReportNumberOfMirrorMemoryDTCByStatusMask = 0x11,
    /// This function takes a 1 byte DTCStatusMask
    ReportNumberOfEmissionsRelatedOBDDTCByStatusMask = 0x12,
    /// This function takes a 1 byte DTCStatusMask
    ReportEmissionsRelatedOBDDTCByStatusMask = 0x13,
    /// This function takes no additional arguments
    ReportDTCFaultDetectionCounter = 0x14,
    /// This function takes no additional arguments
    ReportDTCWithPermanentStatus = 0x15,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Summary of the number of DTCs matching a status mask
pub struct DtcCount {
    /// Mask of the status bits the ECU can actually report
    pub status_availability: DtcStatus,
    /// Format the ECU stores its DTCs in
    pub format: DTCFormatType,
    /// Number of DTCs matching the requested mask
    pub count: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Extended data record of a DTC
pub struct DtcExtendedDataRecord {
    /// The DTC the record belongs to
    pub dtc: u32,
    /// Status of the DTC at the time of the request
    pub status: DtcStatus,
    /// Number of the extended data record
    pub record_number: u8,
    /// Record content. Its layout is ECU specific
    pub data: Vec<u8>,
}

impl UdsClient {
    /// Returns the number of DTCs stored on the ECU matching the provided status mask
    pub fn get_number_of_dtcs_by_status_mask(
        &mut self,
        status_mask: u8,
    ) -> DiagServerResult<DtcCount> {
        let resp = self.execute_command_with_response(
            UDSCommand::ReadDTCInformation,
            &[
                DtcSubFunction::ReportNumberOfDTCByStatusMask as u8,
                status_mask,
            ],
        )?;
        if resp.len() != 6 {
            return Err(DiagError::InvalidResponseLength);
        }
        let format = dtc_format_from_uds(resp[3]);
        self.dtc_format = Some(format);
        Ok(DtcCount {
            status_availability: DtcStatus::from_bits_retain(resp[2]),
            format,
            count: u16::from_be_bytes([resp[4], resp[5]]),
        })
    }

    /// Returns a list of DTCs stored on the ECU matching the provided status mask
    pub fn get_dtcs_by_status_mask(&mut self, status_mask: u8) -> DiagServerResult<Vec<DTC>> {
        let mut resp = self.execute_command_with_response(
            UDSCommand::ReadDTCInformation,
            &[DtcSubFunction::ReportDTCByStatusMask as u8, status_mask],
        )?;
        if resp.len() < 7 {
            // Just SID, sub-function echo and availability mask. No DTCs stored
            return Ok(vec![]);
        }
        resp.drain(0..3);
        let fmt = self.known_dtc_format(status_mask);
        parse_dtc_list(fmt, &resp)
    }

    /// Returns a list of all DTCs that the ECU can report, regardless of status
    pub fn get_supported_dtcs(&mut self) -> DiagServerResult<Vec<DTC>> {
        let mut resp = self.execute_command_with_response(
            UDSCommand::ReadDTCInformation,
            &[DtcSubFunction::ReportSupportedDTC as u8],
        )?;
        if resp.len() < 7 {
            return Ok(vec![]);
        }
        resp.drain(0..3);
        let fmt = self.known_dtc_format(0xFF);
        parse_dtc_list(fmt, &resp)
    }

    /// Returns the DTCExtendedData record associated with the provided DTC and
    /// record number. For the record number, 0xFE implies all OBD records, and
    /// 0xFF implies all records.
    ///
    /// The ECU echoes the DTC and its current status back in the response; a
    /// response for a different DTC is rejected. The record content itself is
    /// surfaced as raw bytes, as its layout is ECU specific
    pub fn get_dtc_extended_data_record_by_dtc_number(
        &mut self,
        dtc: u32,
        extended_data_record_number: u8,
    ) -> DiagServerResult<DtcExtendedDataRecord> {
        let res = self.execute_command_with_response(
            UDSCommand::ReadDTCInformation,
            &[
                DtcSubFunction::ReportDTCExtendedDataRecordByDTCNumber as u8,
                (dtc >> 16) as u8, // High byte
                (dtc >> 8) as u8,  // Mid byte
                dtc as u8,         // Low byte
                extended_data_record_number,
            ],
        )?;
        // SID, sub-function echo, 3 byte DTC, status byte, record number
        if res.len() < 7 {
            return Err(DiagError::InvalidResponseLength);
        }
        if res[1] != DtcSubFunction::ReportDTCExtendedDataRecordByDTCNumber as u8 {
            return Err(DiagError::MismatchedResponse(format!(
                "requested DTC sub-function 0x06, ECU echoed 0x{:02X}",
                res[1]
            )));
        }
        let echo = (res[2] as u32) << 16 | (res[3] as u32) << 8 | res[4] as u32;
        if echo != dtc {
            return Err(DiagError::MismatchedResponse(format!(
                "requested extended data for DTC 0x{dtc:06X}, ECU answered for DTC 0x{echo:06X}"
            )));
        }
        Ok(DtcExtendedDataRecord {
            dtc: echo,
            status: DtcStatus::from_bits_retain(res[5]),
            record_number: res[6],
            data: res[7..].to_vec(),
        })
    }

    /// Executes any ReadDTCInformation sub-function and returns the ECU's raw
    /// response (including the echoed SID and sub-function).
    ///
    /// The response layouts of many sub-functions are ECU and standard revision
    /// specific, so no decoding is attempted here
    pub fn read_dtc_information_raw(
        &mut self,
        sub_function: DtcSubFunction,
        args: &[u8],
    ) -> DiagServerResult<Vec<u8>> {
        let mut payload = Vec::with_capacity(args.len() + 1);
        payload.push(sub_function as u8);
        payload.extend_from_slice(args);
        self.execute_command_with_response(UDSCommand::ReadDTCInformation, &payload)
    }

    /// Returns the cached DTC format of the ECU, querying it if it is not yet known
    fn known_dtc_format(&mut self, status_mask: u8) -> DTCFormatType {
        match self.dtc_format {
            Some(s) => s,
            None => self
                .get_number_of_dtcs_by_status_mask(status_mask)
                .map(|r| r.format)
                .unwrap_or(DTCFormatType::Unknown(0)),
        }
    }
}

/// Parses a list of 4 byte DTC records (3 byte code + status byte)
fn parse_dtc_list(fmt: DTCFormatType, bytes: &[u8]) -> DiagServerResult<Vec<DTC>> {
    if bytes.len() % 4 != 0 {
        // Each DTC should be 4 bytes!
        return Err(DiagError::InvalidResponseLength);
    }
    let mut result: Vec<DTC> = Vec::with_capacity(bytes.len() / 4);
    for record in bytes.chunks_exact(4) {
        result.push(DTC {
            format: fmt,
            raw: (record[0] as u32) << 16 | (record[1] as u32) << 8 | record[2] as u32,
            status: DtcStatus::from_bits_retain(record[3]),
        });
    }
    Ok(result)
}
