//! Provides methods for block-wise data transfer to the ECU (services
//! RequestDownload, TransferData and RequestTransferExit).
//!
//! A download is performed as request_download, then transfer_data for each
//! block with a sequence counter starting at 1 and wrapping 0xFF -> 0x00, then
//! request_transfer_exit. The ECU typically requires an active programming
//! session and security access before it will accept a download

use automotive_diag::uds::UdsError;

use super::{encode_address_and_length, UDSCommand, UdsClient};
use crate::{DiagError, DiagServerResult};

/// Decodes a lengthFormatIdentifier followed by maxNumberOfBlockLength at
/// `offset` in a positive response. Returns the block length and the index of
/// the first byte after it
pub(crate) fn decode_max_block_length(
    res: &[u8],
    offset: usize,
) -> DiagServerResult<(usize, usize)> {
    // High nibble of the lengthFormatIdentifier is the byte count of
    // maxNumberOfBlockLength
    let len_bytes = (*res.get(offset).ok_or(DiagError::InvalidResponseLength)? >> 4) as usize;
    if len_bytes == 0 || res.len() < offset + 1 + len_bytes {
        return Err(DiagError::InvalidResponseLength);
    }
    let mut max_block_len = 0usize;
    for b in &res[offset + 1..offset + 1 + len_bytes] {
        max_block_len = (max_block_len << 8) | *b as usize;
    }
    if max_block_len == 0 {
        return Err(DiagError::InvalidResponseLength);
    }
    Ok((max_block_len, offset + 1 + len_bytes))
}

impl UdsClient {
    /// Requests a download of data to the ECU (tester -> ECU).
    ///
    /// ## Parameters
    /// * memory_address - Start address of the target memory region (4 bytes)
    /// * memory_size - Size of the target memory region in bytes (4 bytes)
    /// * data_format - Compression/encryption format identifier. 0x00 means the
    ///   data will be transferred raw
    ///
    /// ## Returns
    /// The maximum number of bytes the ECU accepts per [UdsClient::transfer_data]
    /// block, including the service ID and sequence counter bytes
    pub fn request_download(
        &mut self,
        memory_address: u32,
        memory_size: u32,
        data_format: u8,
    ) -> DiagServerResult<usize> {
        if memory_size == 0 {
            return Err(DiagError::ParameterInvalid);
        }
        let mut args = vec![data_format];
        args.extend_from_slice(&encode_address_and_length(memory_address, memory_size));
        let res = self.execute_command_with_response(UDSCommand::RequestDownload, &args)?;
        let (max_block_len, _) = decode_max_block_length(&res, 1)?;
        Ok(max_block_len)
    }

    /// Transfers one block of a download to the ECU.
    ///
    /// ## Parameters
    /// * sequence - Block sequence counter. Starts at 1 for the first block after
    ///   [UdsClient::request_download] and wraps 0xFF -> 0x00
    /// * data - The block payload
    ///
    /// ## Returns
    /// The transferResponseParameterRecord, if the ECU sent one
    pub fn transfer_data(&mut self, sequence: u8, data: &[u8]) -> DiagServerResult<Vec<u8>> {
        let mut args = Vec::with_capacity(data.len() + 1);
        args.push(sequence);
        args.extend_from_slice(data);
        let res = self
            .execute_command_with_response(UDSCommand::TransferData, &args)
            .map_err(|e| {
                if e.is_nrc(UdsError::WrongBlockSequenceCounter) {
                    DiagError::TransferError { counter: sequence }
                } else {
                    e
                }
            })?;
        if res.len() < 2 {
            return Err(DiagError::InvalidResponseLength);
        }
        if res[1] != sequence {
            return Err(DiagError::TransferError { counter: res[1] });
        }
        Ok(res[2..].to_vec())
    }

    /// Terminates a download, letting the ECU finalize the received data
    ///
    /// ## Parameters
    /// * params - Transfer specific request record, usually empty
    pub fn request_transfer_exit(&mut self, params: &[u8]) -> DiagServerResult<Vec<u8>> {
        let res = self.execute_command_with_response(UDSCommand::RequestTransferExit, params)?;
        Ok(res[1..].to_vec())
    }
}
