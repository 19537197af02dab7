//! Intel-HEX subset parser
//!
//! Baseline PIC toolchains emit a small subset of Intel-HEX:
//!
//! ```text
//! :BBAAAATT<data...>CC
//!  |  |   | |       +-- checksum
//!  |  |   | +---------- payload, BB bytes
//!  |  |   +------------ record type
//!  |  +---------------- 16-bit byte address
//!  +------------------- byte count
//! ```
//!
//! Only record types 00 (data), 01 (end of file) and 04 (extended linear
//! address, which must be zero) are understood. Other record types are
//! skipped with a warning. Data must form one contiguous region starting at
//! address 0, except for the configuration word which lives at
//! [`CONFIG_WORD_ADDR`].
//!
//! Checksums are not verified unless [`HexOptions::strict_checksum`] is set.

use alloc::string::ToString;
use alloc::vec::Vec;

use crate::error::{HexError, Result};
use crate::image::ProgramImage;

/// Record start marker
pub const START_CODE: u8 = b':';

/// HEX byte address of the configuration word
pub const CONFIG_WORD_ADDR: u16 = 0x1FFE;

/// Characters in a record besides the payload: ':' BB AAAA TT CC
const RECORD_OVERHEAD: usize = 11;

/// Offset of the first payload character
const PAYLOAD_OFFSET: usize = 9;

/// Record types
pub mod record_type {
    /// Data record
    pub const DATA: u8 = 0x00;
    /// End of file
    pub const END_OF_FILE: u8 = 0x01;
    /// Extended linear address (upper 16 address bits)
    pub const EXTENDED_LINEAR_ADDRESS: u8 = 0x04;
}

/// Parser options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HexOptions {
    /// Reject records whose checksum does not match
    pub strict_checksum: bool,
}

impl HexOptions {
    /// Enable or disable checksum verification
    pub fn with_strict_checksum(mut self, strict: bool) -> Self {
        self.strict_checksum = strict;
        self
    }
}

/// Incremental HEX parser
///
/// Feed lines one at a time with [`HexParser::feed_line`], then call
/// [`HexParser::finish`]. Lines fed after the end-of-file record are ignored.
#[derive(Debug, Clone, Default)]
pub struct HexParser {
    options: HexOptions,
    line: usize,
    next_addr: u32,
    config_word: Option<u16>,
    data: Vec<u8>,
    done: bool,
}

impl HexParser {
    /// Create a parser with the given options
    pub fn new(options: HexOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Whether the end-of-file record has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Parse one record
    ///
    /// A trailing `\n` or `\r\n` is stripped before the length check.
    pub fn feed_line(&mut self, raw: &str) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.line += 1;
        let line = self.line;

        let text = raw
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(raw);
        let bytes = text.as_bytes();

        if bytes.first() != Some(&START_CODE) {
            return Err(HexError::MalformedRecord {
                line,
                reason: "expected ':'",
            });
        }
        if !text.is_ascii() {
            return Err(HexError::MalformedRecord {
                line,
                reason: "non-ASCII characters",
            });
        }
        if bytes.len() < PAYLOAD_OFFSET {
            return Err(HexError::MalformedRecord {
                line,
                reason: "truncated record header",
            });
        }

        let count = hex_u8(&bytes[1..3]).ok_or(HexError::MalformedRecord {
            line,
            reason: "invalid byte count",
        })?;
        let addr = hex_u16(&bytes[3..7]).ok_or(HexError::MalformedRecord {
            line,
            reason: "invalid address",
        })?;
        let rtype = hex_u8(&bytes[7..9]).ok_or(HexError::MalformedRecord {
            line,
            reason: "invalid record type",
        })?;

        let expected = count as usize * 2 + RECORD_OVERHEAD;
        if bytes.len() != expected {
            return Err(HexError::LineLength {
                line,
                expected,
                found: bytes.len(),
            });
        }

        let payload = &bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + count as usize * 2];
        if self.options.strict_checksum {
            check_checksum(line, &bytes[1..])?;
        }

        match rtype {
            record_type::END_OF_FILE => {
                log::debug!("hex: end of file at line {}", line);
                self.done = true;
            }
            record_type::EXTENDED_LINEAR_ADDRESS => {
                if payload != b"0000" {
                    return Err(HexError::UnsupportedAddress {
                        line,
                        payload: text[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].to_string(),
                    });
                }
            }
            record_type::DATA => self.data_record(line, addr, payload)?,
            other => {
                log::warn!("hex: line {}: ignoring record type 0x{:02X}", line, other);
            }
        }

        Ok(())
    }

    fn data_record(&mut self, line: usize, addr: u16, payload: &[u8]) -> Result<()> {
        let decoded = decode_payload(payload).ok_or(HexError::MalformedRecord {
            line,
            reason: "invalid data byte",
        })?;

        if addr == CONFIG_WORD_ADDR {
            if decoded.len() < 2 {
                return Err(HexError::MalformedRecord {
                    line,
                    reason: "configuration record shorter than one word",
                });
            }
            let word = decoded[0] as u16 | ((decoded[1] as u16) << 8);
            log::debug!("hex: configuration word 0x{:04X}", word);
            self.config_word = Some(word);
        } else if addr as u32 == self.next_addr {
            self.next_addr += decoded.len() as u32;
            self.data.extend_from_slice(&decoded);
        } else {
            return Err(HexError::DiscontiguousAddress {
                line,
                address: addr as u32,
                expected: self.next_addr,
            });
        }
        Ok(())
    }

    /// Finish parsing and build the image
    pub fn finish(self) -> Result<ProgramImage> {
        let config_word = self.config_word.ok_or(HexError::MissingConfigurationWord)?;
        ProgramImage::new(config_word, self.data)
    }
}

/// Parse a sequence of lines into a program image
pub fn parse_lines<I, S>(lines: I, options: HexOptions) -> Result<ProgramImage>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = HexParser::new(options);
    for line in lines {
        parser.feed_line(line.as_ref())?;
        if parser.is_done() {
            break;
        }
    }
    parser.finish()
}

/// Parse HEX text with default (lenient) options
pub fn parse_str(text: &str) -> Result<ProgramImage> {
    parse_lines(text.lines(), HexOptions::default())
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn hex_u8(digits: &[u8]) -> Option<u8> {
    Some((hex_nibble(digits[0])? << 4) | hex_nibble(digits[1])?)
}

fn hex_u16(digits: &[u8]) -> Option<u16> {
    Some(((hex_u8(&digits[..2])? as u16) << 8) | hex_u8(&digits[2..4])? as u16)
}

fn decode_payload(digits: &[u8]) -> Option<Vec<u8>> {
    digits.chunks_exact(2).map(hex_u8).collect()
}

/// Verify the checksum over everything after the start code
fn check_checksum(line: usize, record: &[u8]) -> Result<()> {
    let bytes = decode_payload(record).ok_or(HexError::MalformedRecord {
        line,
        reason: "invalid hex digit",
    })?;
    let (found, body) = bytes.split_last().ok_or(HexError::MalformedRecord {
        line,
        reason: "missing checksum",
    })?;
    let sum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    let expected = sum.wrapping_neg();
    if expected != *found {
        return Err(HexError::ChecksumMismatch {
            line,
            expected,
            found: *found,
        });
    }
    Ok(())
}
