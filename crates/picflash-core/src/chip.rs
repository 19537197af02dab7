//! Supported microcontrollers

use alloc::string::ToString;

use crate::error::{HexError, Result};
use crate::image::ProgramImage;

/// Description of a programmable chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chip {
    /// Canonical name, without the "PIC" prefix
    pub name: &'static str,
    /// Program memory size in words
    pub program_words: usize,
    /// Width of a program word in bits
    pub word_bits: u8,
    /// HEX byte address of the configuration word
    pub config_addr: u16,
}

/// PIC16F54: 512 x 12-bit program words
pub const PIC16F54: Chip = Chip {
    name: "16f54",
    program_words: 512,
    word_bits: 12,
    config_addr: crate::hex::CONFIG_WORD_ADDR,
};

/// All chips this build knows how to program
pub const CHIPS: &[Chip] = &[PIC16F54];

impl Chip {
    /// Look up a chip by name
    ///
    /// Matching is case-insensitive and accepts an optional `pic` or `p`
    /// prefix, so `PIC16F54`, `p16f54` and `16f54` all name the same chip.
    pub fn find(name: &str) -> Result<&'static Chip> {
        let lower = name.to_ascii_lowercase();
        let bare = lower
            .strip_prefix("pic")
            .or_else(|| lower.strip_prefix('p'))
            .unwrap_or(&lower);
        CHIPS
            .iter()
            .find(|c| c.name == bare)
            .ok_or_else(|| HexError::UnsupportedChip(name.to_string()))
    }

    /// Mask of the valid bits in a program word
    pub fn word_mask(&self) -> u16 {
        (1u16 << self.word_bits) - 1
    }

    /// Check that an image fits in program memory
    pub fn check_image(&self, image: &ProgramImage) -> Result<()> {
        if image.word_count() > self.program_words {
            return Err(HexError::ImageTooLarge {
                words: image.word_count(),
                capacity: self.program_words,
            });
        }
        Ok(())
    }
}
