//! Program image produced by the HEX parser

use alloc::vec::Vec;

use crate::error::{HexError, Result};

/// A parsed program image
///
/// Holds the contiguous program region starting at address 0 (as raw bytes,
/// two per memory word, low byte first) and the configuration word. The
/// image is immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    config_word: u16,
    data: Vec<u8>,
}

impl ProgramImage {
    /// Build an image from a configuration word and program bytes
    ///
    /// Fails with [`HexError::MalformedImage`] if `data` has an odd length.
    pub fn new(config_word: u16, data: Vec<u8>) -> Result<Self> {
        if data.len() % 2 != 0 {
            return Err(HexError::MalformedImage { len: data.len() });
        }
        Ok(Self { config_word, data })
    }

    /// The configuration word
    pub fn config_word(&self) -> u16 {
        self.config_word
    }

    /// Raw program bytes in file order
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of program words
    pub fn word_count(&self) -> usize {
        self.data.len() / 2
    }

    /// Program words, each combined as `lo | (hi << 8)`
    pub fn words(&self) -> impl Iterator<Item = u16> + '_ {
        self.data
            .chunks_exact(2)
            .map(|pair| pair[0] as u16 | ((pair[1] as u16) << 8))
    }

    /// Whether the image has no program words
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
