//! Module for common diagnostic trouble code data

use bitflags::bitflags;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// DTC name interpretation format specifier
pub enum DTCFormatType {
    /// ISO15031-6 DTC Format
    Iso15031_6,
    /// ISO14229-1 DTC Format
    Iso14229_1,
    /// SAEJ1939-73 DTC Format
    SaeJ1939_73,
    /// ISO11992-4 DTC Format
    Iso11992_4,
    /// Unknown DTC Format
    Unknown(u8),
}

/// Converts a ISO14229 DTCFormatIdentifier byte into a [DTCFormatType]
pub(crate) fn dtc_format_from_uds(fmt: u8) -> DTCFormatType {
    match fmt {
        0x00 => DTCFormatType::Iso15031_6,
        0x01 => DTCFormatType::Iso14229_1,
        0x02 => DTCFormatType::SaeJ1939_73,
        0x03 => DTCFormatType::Iso11992_4,
        x => DTCFormatType::Unknown(x),
    }
}

bitflags! {
    /// ISO14229-1 DTC status byte.
    ///
    /// Each bit is an independent condition reported by the ECU for the DTC.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
    pub struct DtcStatus: u8 {
        /// Result of the most recently performed test was 'failed'
        const TEST_FAILED = 0x01;
        /// The test failed at some point during the current operation cycle
        const TEST_FAILED_THIS_OPERATION_CYCLE = 0x02;
        /// The DTC is pending confirmation over further operation cycles
        const PENDING = 0x04;
        /// The DTC is confirmed and stored in long-term memory
        const CONFIRMED = 0x08;
        /// The test has not run to completion since DTC memory was last cleared
        const TEST_NOT_COMPLETED_SINCE_LAST_CLEAR = 0x10;
        /// The test has failed at least once since DTC memory was last cleared
        const TEST_FAILED_SINCE_LAST_CLEAR = 0x20;
        /// The test has not run to completion during the current operation cycle
        const TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE = 0x40;
        /// The ECU is requesting warning indicator (MIL) illumination for this DTC
        const WARNING_INDICATOR_REQUESTED = 0x80;
    }
}

/// Diagnostic trouble code (DTC) storage struct
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DTC {
    /// The [DTCFormatType] of the DTC. This is used
    /// to interpret the raw value of the DTC
    pub format: DTCFormatType,
    /// The raw value of the DTC according to the ECU (24 bit)
    pub raw: u32,
    /// Status of the DTC
    pub status: DtcStatus,
}

impl DTC {
    /// Indication if the DTC turns on the MIL lamp (malfunction indicator lamp).
    /// This usually means that the check engine light is illuminated on the
    /// vehicle's instrument cluster
    pub fn mil_on(&self) -> bool {
        self.status.contains(DtcStatus::WARNING_INDICATOR_REQUESTED)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_bits() {
        let status = DtcStatus::from_bits_retain(0x8C);
        assert!(status.contains(DtcStatus::PENDING));
        assert!(status.contains(DtcStatus::CONFIRMED));
        assert!(status.contains(DtcStatus::WARNING_INDICATOR_REQUESTED));
        assert!(!status.contains(DtcStatus::TEST_FAILED));
        let dtc = DTC {
            format: DTCFormatType::Iso14229_1,
            raw: 0x28A1DC,
            status,
        };
        assert!(dtc.mil_on());
    }

    #[test]
    fn format_identifier_decoding() {
        assert_eq!(dtc_format_from_uds(0x01), DTCFormatType::Iso14229_1);
        assert_eq!(dtc_format_from_uds(0x7E), DTCFormatType::Unknown(0x7E));
    }
}
