#![deny(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_imports,
    unused_import_braces,
    unused_qualifications
)]

//! A crate which implements the UDS (ISO14229) diagnostic protocol for communicating
//! with ECUs in modern vehicles, along with the ISO-TP (ISO15765-2) transport layer
//! it rides on, and an SLCAN adapter driver for USB-serial CAN interfaces
//!
//! ## Layers
//!
//! The stack is composed bottom up:
//!
//! * [channel] - Raw CAN frame channels ([channel::CanChannel]) and payload channels
//!   ([channel::PayloadChannel]) which move whole diagnostic payloads
//! * [isotp] - A software ISO-TP endpoint which segments and reassembles payloads of
//!   up to 4095 bytes over any CAN channel, handling flow control and frame timing
//! * [uds] - The UDS client itself. Encodes service requests, decodes positive
//!   responses, classifies negative response codes, and honours the
//!   response-pending (NRC 0x78) protocol
//! * [session] - Session management. Tracks the active diagnostic session and its
//!   timing parameters, sends TesterPresent keep-alives, and provides scoped guards
//!   for session, DTC-setting and communication changes
//!
//! ## Hardware support
//!
//! The [slcan] module (enabled by the `slcan` feature, on by default) implements the
//! serial-line CAN protocol spoken by common USB CAN adapters (CANable, ELM327
//! derivatives, Lawicel-style devices), exposed as a [channel::CanChannel].
//! Any other adapter can be used by implementing [channel::CanChannel] for it.

use channel::ChannelError;

use automotive_diag::uds::{UdsError, UdsErrorByte};
use automotive_diag::ByteWrapper::Standard;

pub mod channel;
pub mod dtc;
pub mod isotp;
pub mod session;
#[cfg(feature = "slcan")]
pub mod slcan;
pub mod uds;

pub use automotive_diag::ByteWrapper;

/// Diagnostic server result
pub type DiagServerResult<T> = Result<T, DiagError>;

#[derive(Debug, thiserror::Error)]
/// Diagnostic server error
pub enum DiagError {
    /// The diagnostic client does not support the request
    #[error("request not supported")]
    NotSupported,
    /// The ECU rejected the request with a negative response code
    #[error("ECU negative response (NRC 0x{code:02X})")]
    ECUError {
        /// Raw negative response code from the ECU
        code: u8,
        /// Negative response code definition according to ISO14229
        def: Option<String>,
    },
    /// ECU did not respond within the active P2/P2* deadline
    #[error("timeout waiting for ECU response")]
    Timeout,
    /// Response empty
    #[error("ECU provided an empty response")]
    EmptyResponse,
    /// ECU responded with a message that wasn't a reply for the sent request
    #[error("ECU response message did not match request")]
    WrongMessage,
    /// ECU responded with a message, but the length was incorrect
    #[error("ECU response message was of invalid length")]
    InvalidResponseLength,
    /// A parameter given to the function is invalid. Check the function's documentation
    /// for more information
    #[error("a parameter provided was invalid")]
    ParameterInvalid,
    /// Error with the underlying communication channel
    #[error("underlying channel error")]
    ChannelError(
        #[from]
        #[source]
        ChannelError,
    ),
    /// A block transfer was rejected or its block sequence counter diverged
    #[error("block transfer sequence counter diverged (counter 0x{counter:02X})")]
    TransferError {
        /// Block sequence counter reported by the ECU
        counter: u8,
    },
    /// ECU response identifier did not match the request, but the service ID was correct
    #[error("mismatched ECU response: {0}")]
    MismatchedResponse(String),
}

impl DiagError {
    /// Returns the raw NRC byte if this error is a negative ECU response
    pub fn nrc(&self) -> Option<u8> {
        match self {
            DiagError::ECUError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this error is a negative ECU response carrying the given
    /// negative response code.
    ///
    /// Useful for telling recoverable rejections (such as
    /// [UdsError::BusyRepeatRequest], which may be retried after a short delay)
    /// apart from permanent ones.
    pub fn is_nrc(&self, nrc: UdsError) -> bool {
        match self {
            DiagError::ECUError { code, .. } => UdsErrorByte::from(*code) == Standard(nrc),
            _ => false,
        }
    }
}
