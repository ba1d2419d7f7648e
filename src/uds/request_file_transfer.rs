//! Provides methods for transferring files to and from the ECU's file system
//! (service RequestFileTransfer).
//!
//! Adding, replacing or reading a file only negotiates the transfer here; the
//! file content itself then moves block-wise through
//! [transfer_data](UdsClient::transfer_data) and
//! [request_transfer_exit](UdsClient::request_transfer_exit), exactly like a
//! memory download

use super::data_transfer::decode_max_block_length;
use super::{UDSCommand, UdsClient};
use crate::{DiagError, DiagServerResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
/// RequestFileTransfer modes of operation
pub enum FileOperationMode {
    /// Creates a new file on the ECU's file system
    AddFile = 0x01,
    /// Deletes a file from the ECU's file system
    DeleteFile = 0x02,
    /// Replaces an existing file
    ReplaceFile = 0x03,
    /// Reads a file from the ECU's file system
    ReadFile = 0x04,
    /// Reads directory information. Its layout is ECU specific, so no typed
    /// method is provided for it
    ReadDir = 0x05,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Transfer parameters negotiated when adding or replacing a file
pub struct FileTransferInfo {
    /// Maximum number of bytes the ECU accepts per transfer block, including
    /// the service ID and sequence counter bytes
    pub max_block_len: usize,
    /// Compression/encryption format the ECU expects the blocks in
    pub data_format: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Transfer parameters and size information reported when reading a file
pub struct FileInfo {
    /// Maximum number of bytes the ECU sends per transfer block, including
    /// the service ID and sequence counter bytes
    pub max_block_len: usize,
    /// Compression/encryption format the blocks arrive in
    pub data_format: u8,
    /// Size of the file before compression, in bytes
    pub size_uncompressed: u64,
    /// Size of the file as transferred, in bytes
    pub size_compressed: u64,
}

/// Encodes the common mode + path prefix of a RequestFileTransfer request
fn file_request_args(mode: FileOperationMode, path: &str) -> DiagServerResult<Vec<u8>> {
    let path_bytes = path.as_bytes();
    if path_bytes.is_empty() || path_bytes.len() > u16::MAX as usize {
        return Err(DiagError::ParameterInvalid);
    }
    let mut args = Vec::with_capacity(path_bytes.len() + 3);
    args.push(mode as u8);
    args.extend_from_slice(&(path_bytes.len() as u16).to_be_bytes());
    args.extend_from_slice(path_bytes);
    Ok(args)
}

impl UdsClient {
    /// Asks the ECU to create a new file, negotiating the parameters for the
    /// following block transfer.
    ///
    /// ## Parameters
    /// * path - Path of the file on the ECU's file system
    /// * size_uncompressed - Size of the file content before compression
    /// * size_compressed - Size of the content as it will be transferred.
    ///   Equal to `size_uncompressed` when `data_format` is 0x00 (raw)
    /// * data_format - Compression/encryption format identifier
    pub fn request_add_file(
        &mut self,
        path: &str,
        size_uncompressed: u32,
        size_compressed: u32,
        data_format: u8,
    ) -> DiagServerResult<FileTransferInfo> {
        self.file_upload_request(
            FileOperationMode::AddFile,
            path,
            size_uncompressed,
            size_compressed,
            data_format,
        )
    }

    /// Asks the ECU to replace an existing file. Parameters as
    /// [UdsClient::request_add_file]
    pub fn request_replace_file(
        &mut self,
        path: &str,
        size_uncompressed: u32,
        size_compressed: u32,
        data_format: u8,
    ) -> DiagServerResult<FileTransferInfo> {
        self.file_upload_request(
            FileOperationMode::ReplaceFile,
            path,
            size_uncompressed,
            size_compressed,
            data_format,
        )
    }

    /// Asks the ECU to delete a file from its file system
    pub fn request_delete_file(&mut self, path: &str) -> DiagServerResult<()> {
        let args = file_request_args(FileOperationMode::DeleteFile, path)?;
        let res = self.execute_command_with_response(UDSCommand::RequestFileTransfer, &args)?;
        if res.len() < 2 {
            return Err(DiagError::InvalidResponseLength);
        }
        if res[1] != FileOperationMode::DeleteFile as u8 {
            return Err(DiagError::MismatchedResponse(format!(
                "requested file deletion, ECU echoed mode 0x{:02X}",
                res[1]
            )));
        }
        Ok(())
    }

    /// Asks the ECU to send a file, negotiating the parameters for the
    /// following block transfer and reporting the file's size
    pub fn request_read_file(&mut self, path: &str, data_format: u8) -> DiagServerResult<FileInfo> {
        let mut args = file_request_args(FileOperationMode::ReadFile, path)?;
        args.push(data_format);
        let res = self.execute_command_with_response(UDSCommand::RequestFileTransfer, &args)?;
        if res.len() < 2 {
            return Err(DiagError::InvalidResponseLength);
        }
        if res[1] != FileOperationMode::ReadFile as u8 {
            return Err(DiagError::MismatchedResponse(format!(
                "requested file read, ECU echoed mode 0x{:02X}",
                res[1]
            )));
        }
        let (max_block_len, mut idx) = decode_max_block_length(&res, 2)?;
        let data_format = *res.get(idx).ok_or(DiagError::InvalidResponseLength)?;
        idx += 1;
        if res.len() < idx + 2 {
            return Err(DiagError::InvalidResponseLength);
        }
        let size_len = u16::from_be_bytes([res[idx], res[idx + 1]]) as usize;
        idx += 2;
        if size_len == 0 || size_len > 8 || res.len() < idx + 2 * size_len {
            return Err(DiagError::InvalidResponseLength);
        }
        let mut sizes = [0u64; 2];
        for size in sizes.iter_mut() {
            for b in &res[idx..idx + size_len] {
                *size = (*size << 8) | *b as u64;
            }
            idx += size_len;
        }
        Ok(FileInfo {
            max_block_len,
            data_format,
            size_uncompressed: sizes[0],
            size_compressed: sizes[1],
        })
    }

    fn file_upload_request(
        &mut self,
        mode: FileOperationMode,
        path: &str,
        size_uncompressed: u32,
        size_compressed: u32,
        data_format: u8,
    ) -> DiagServerResult<FileTransferInfo> {
        let mut args = file_request_args(mode, path)?;
        args.push(data_format);
        args.push(4); // fileSizeParameterLength
        args.extend_from_slice(&size_uncompressed.to_be_bytes());
        args.extend_from_slice(&size_compressed.to_be_bytes());
        let res = self.execute_command_with_response(UDSCommand::RequestFileTransfer, &args)?;
        if res.len() < 2 {
            return Err(DiagError::InvalidResponseLength);
        }
        if res[1] != mode as u8 {
            return Err(DiagError::MismatchedResponse(format!(
                "requested file mode 0x{:02X}, ECU echoed 0x{:02X}",
                mode as u8, res[1]
            )));
        }
        let (max_block_len, idx) = decode_max_block_length(&res, 2)?;
        let data_format = *res.get(idx).ok_or(DiagError::InvalidResponseLength)?;
        Ok(FileTransferInfo {
            max_block_len,
            data_format,
        })
    }
}
