//! ArduPIC protocol constants and encoders
//!
//! The adapter speaks ASCII. Control commands are newline-terminated lines
//! (`V00`, `T<slot><hex>`, `A`, `D`). Low-level ICSP traffic is sent after a
//! `C` mode-entry byte as a run of unterminated tokens:
//!
//! | Token                 | Meaning                                       |
//! |-----------------------|-----------------------------------------------|
//! | `*<op><slot>`         | 6-bit ICSP command, then wait the slot delay  |
//! | `<b0><b1>.`           | shift out a framed data word                  |
//! | `=<b0><m0>=<b1><m1>.` | shift in a word and compare under masks       |
//!
//! A bare newline ends the run. Every line the host sends is answered by
//! zero or more `#` diagnostic lines followed by either an empty line
//! (success) or a failure message.

use crate::error::{ArduPicError, Result};

/// Version query sent at start-up
pub const VERSION_QUERY: &str = "V00\n";
/// Only accepted reply to [`VERSION_QUERY`]
pub const VERSION_REPLY: &str = "00\n";

/// Attach: reset the target and apply Vpp
pub const CMD_ATTACH: &str = "A";
/// Detach: release the target
pub const CMD_DETACH: &str = "D";
/// Timing configuration prefix
pub const CMD_TIMING: char = 'T';
/// Enter raw command mode
pub const CMD_ENTER_COMMAND: &str = "C";
/// Prefix of a command-byte token
pub const TOKEN_COMMAND: char = '*';
/// Prefix of a verify token
pub const TOKEN_VERIFY: char = '=';
/// Terminator of data and verify tokens
pub const TOKEN_END: char = '.';

/// First character of a diagnostic line
pub const DIAGNOSTIC_PREFIX: char = '#';
/// Successful acknowledgment
pub const ACK: &str = "\n";

/// Verify mask for the low framed byte (bit 0 is the start bit)
pub const VERIFY_MASK_LOW: u8 = 0xFE;
/// Verify mask for the high framed byte (bit 7 is the stop bit)
pub const VERIFY_MASK_HIGH: u8 = 0x7F;

/// Baseline PIC ICSP command opcodes
pub mod opcode {
    /// Load data for program memory
    pub const LOAD_DATA: u8 = 0x02;
    /// Read data from program memory
    pub const READ_DATA: u8 = 0x04;
    /// Increment address
    pub const INCREMENT_ADDRESS: u8 = 0x06;
    /// Begin programming
    pub const BEGIN_PROGRAMMING: u8 = 0x08;
    /// Bulk erase program memory
    pub const BULK_ERASE: u8 = 0x09;
    /// End programming
    pub const END_PROGRAMMING: u8 = 0x0E;
}

/// Delay slot applied by the adapter after a command byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelaySlot {
    /// Short inter-command delay
    Command,
    /// Programming pulse
    Program,
    /// Discharge after programming
    Discharge,
    /// Bulk erase
    Erase,
}

impl DelaySlot {
    /// All slots, in the order they are configured
    pub const ALL: [DelaySlot; 4] = [
        DelaySlot::Command,
        DelaySlot::Program,
        DelaySlot::Discharge,
        DelaySlot::Erase,
    ];

    /// Wire character selecting this slot
    pub fn as_char(self) -> char {
        match self {
            DelaySlot::Command => '.',
            DelaySlot::Program => 'g',
            DelaySlot::Discharge => 'h',
            DelaySlot::Erase => 'i',
        }
    }

    /// Slot selected by a wire character
    pub fn from_char(c: char) -> Option<Self> {
        DelaySlot::ALL.into_iter().find(|s| s.as_char() == c)
    }
}

/// Delays programmed into the adapter during initialization
///
/// Units are defined by the adapter firmware. All four must be non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingProfile {
    command_delay: u32,
    program_delay: u32,
    discharge_delay: u32,
    erase_delay: u32,
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self {
            command_delay: 1,
            program_delay: 2000,
            discharge_delay: 10,
            erase_delay: 10000,
        }
    }
}

impl TimingProfile {
    /// Create a timing profile
    pub fn new(
        command_delay: u32,
        program_delay: u32,
        discharge_delay: u32,
        erase_delay: u32,
    ) -> Result<Self> {
        let profile = Self {
            command_delay,
            program_delay,
            discharge_delay,
            erase_delay,
        };
        for slot in DelaySlot::ALL {
            if profile.delay(slot) == 0 {
                return Err(ArduPicError::InvalidParameter(format!(
                    "{:?} delay must be positive",
                    slot
                )));
            }
        }
        Ok(profile)
    }

    /// Delay configured for a slot
    pub fn delay(&self, slot: DelaySlot) -> u32 {
        match slot {
            DelaySlot::Command => self.command_delay,
            DelaySlot::Program => self.program_delay,
            DelaySlot::Discharge => self.discharge_delay,
            DelaySlot::Erase => self.erase_delay,
        }
    }
}

/// Frame a program word for the adapter
///
/// The low byte carries payload bits 0..=6 shifted left by one, leaving bit 0
/// for the start bit. The high byte carries bits 7..=13 right-aligned.
pub fn frame_word(word: u16) -> (u8, u8) {
    let byte0 = ((word << 1) & 0xFE) as u8;
    let byte1 = ((word >> 7) & 0x7F) as u8;
    (byte0, byte1)
}

/// Inverse of [`frame_word`] for the 14 payload bits
pub fn unframe_word(byte0: u8, byte1: u8) -> u16 {
    ((byte0 as u16) >> 1) | (((byte1 & 0x7F) as u16) << 7)
}

/// Encode a timing configuration line (without newline)
pub fn encode_timing(slot: DelaySlot, delay: u32) -> String {
    format!("{}{}{:x}", CMD_TIMING, slot.as_char(), delay)
}

/// Encode a command-byte token
pub fn encode_command(op: u8, slot: DelaySlot) -> String {
    format!("{}{:02x}{}", TOKEN_COMMAND, op, slot.as_char())
}

/// Encode a load-data token
pub fn encode_load(word: u16) -> String {
    let (b0, b1) = frame_word(word);
    format!("{:02x}{:02x}{}", b0, b1, TOKEN_END)
}

/// Encode a verify token carrying the expected framed bytes
pub fn encode_verify(word: u16) -> String {
    let (b0, b1) = frame_word(word);
    format!(
        "{v}{:02x}{:02x}{v}{:02x}{:02x}{}",
        b0,
        VERIFY_MASK_LOW,
        b1,
        VERIFY_MASK_HIGH,
        TOKEN_END,
        v = TOKEN_VERIFY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_word() {
        assert_eq!(frame_word(0x0000), (0x00, 0x00));
        assert_eq!(frame_word(0xFFFF), (0xFE, 0x7F));
        assert_eq!(frame_word(0x1234), (0x68, 0x24));
    }

    #[test]
    fn test_unframe_word() {
        for word in [0x0000, 0x0FFF, 0x0ABC, 0x1234, 0x3FFF] {
            let (b0, b1) = frame_word(word);
            assert_eq!(unframe_word(b0, b1), word);
        }
        // Start and stop bit positions are ignored
        assert_eq!(unframe_word(0xFF, 0xFF), 0x3FFF);
    }

    #[test]
    fn test_encoders() {
        assert_eq!(encode_timing(DelaySlot::Command, 1), "T.1");
        assert_eq!(encode_timing(DelaySlot::Program, 2000), "Tg7d0");
        assert_eq!(encode_timing(DelaySlot::Erase, 10000), "Ti2710");
        assert_eq!(encode_command(0x0E, DelaySlot::Discharge), "*0eh");
        assert_eq!(encode_command(opcode::BULK_ERASE, DelaySlot::Erase), "*09i");
        assert_eq!(encode_load(0x1234), "6824.");
        assert_eq!(encode_verify(0x1234), "=68fe=247f.");
    }

    #[test]
    fn test_delay_slot_chars() {
        for slot in DelaySlot::ALL {
            assert_eq!(DelaySlot::from_char(slot.as_char()), Some(slot));
        }
        assert_eq!(DelaySlot::from_char('x'), None);
    }

    #[test]
    fn test_timing_profile() {
        let t = TimingProfile::default();
        assert_eq!(t.delay(DelaySlot::Command), 1);
        assert_eq!(t.delay(DelaySlot::Program), 2000);
        assert_eq!(t.delay(DelaySlot::Discharge), 10);
        assert_eq!(t.delay(DelaySlot::Erase), 10000);
        assert!(TimingProfile::new(1, 0, 1, 1).is_err());
        assert_eq!(
            TimingProfile::new(1, 2000, 10, 10000).unwrap(),
            TimingProfile::default()
        );
    }
}
