//! Error types for picflash-core
//!
//! Every error produced while turning a HEX file into a [`ProgramImage`]
//! carries enough context (line number, address, payload) to point at the
//! offending record without re-running anything.
//!
//! [`ProgramImage`]: crate::image::ProgramImage

use alloc::string::String;

#[cfg(feature = "std")]
use thiserror::Error;

/// Errors produced by the HEX image parser and the chip checks
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Error))]
pub enum HexError {
    /// Record does not start with ':' or a field is not valid hex
    #[cfg_attr(feature = "std", error("line {line}: malformed record: {reason}"))]
    MalformedRecord {
        /// 1-based line number
        line: usize,
        /// What was wrong with the record
        reason: &'static str,
    },

    /// Record length does not match its byte count
    #[cfg_attr(
        feature = "std",
        error("line {line}: incorrect line length {found}, expected {expected}")
    )]
    LineLength {
        /// 1-based line number
        line: usize,
        /// Length implied by the byte count field
        expected: usize,
        /// Actual length (line terminator excluded)
        found: usize,
    },

    /// Extended address record with a non-zero upper address
    #[cfg_attr(
        feature = "std",
        error("line {line}: unsupported extended address {payload:?}")
    )]
    UnsupportedAddress {
        /// 1-based line number
        line: usize,
        /// Payload text of the record
        payload: String,
    },

    /// Data record that does not continue the program region
    #[cfg_attr(
        feature = "std",
        error("line {line}: discontiguous address 0x{address:04X}, expected 0x{expected:04X}")
    )]
    DiscontiguousAddress {
        /// 1-based line number
        line: usize,
        /// Address found in the record
        address: u32,
        /// Next address of the contiguous region
        expected: u32,
    },

    /// Record checksum mismatch (strict mode only)
    #[cfg_attr(
        feature = "std",
        error("line {line}: checksum 0x{found:02X} does not match computed 0x{expected:02X}")
    )]
    ChecksumMismatch {
        /// 1-based line number
        line: usize,
        /// Checksum computed over the record
        expected: u8,
        /// Checksum written in the record
        found: u8,
    },

    /// No record at the configuration word address
    #[cfg_attr(feature = "std", error("configuration word not set"))]
    MissingConfigurationWord,

    /// Program region does not split into whole words
    #[cfg_attr(
        feature = "std",
        error("program data length {len} is not a whole number of words")
    )]
    MalformedImage {
        /// Length of the program region in bytes
        len: usize,
    },

    /// Image does not fit in the chip's program memory
    #[cfg_attr(
        feature = "std",
        error("image has {words} words but the chip only holds {capacity}")
    )]
    ImageTooLarge {
        /// Words in the image
        words: usize,
        /// Program memory size in words
        capacity: usize,
    },

    /// Chip name not recognised
    #[cfg_attr(feature = "std", error("unsupported cpu: {0}"))]
    UnsupportedChip(String),
}

/// Result type alias using [`HexError`]
pub type Result<T> = core::result::Result<T, HexError>;
