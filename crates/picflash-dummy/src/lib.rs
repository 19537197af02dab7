//! picflash-dummy - In-memory ArduPIC emulator for testing
//!
//! This crate provides a [`DummyAdapter`] that speaks the ArduPIC protocol
//! and programs an emulated PIC16F54 held in memory. It implements
//! [`Transport`], so it can be handed to [`ArduPic`] in place of a serial
//! port. It's useful for testing and development without real hardware.
//!
//! [`ArduPic`]: picflash_ardupic::ArduPic

use std::collections::VecDeque;

use picflash_ardupic::protocol::{
    frame_word, opcode, unframe_word, DelaySlot, ACK, CMD_ATTACH, CMD_DETACH, CMD_TIMING,
    TOKEN_COMMAND, TOKEN_END, TOKEN_VERIFY, VERSION_QUERY,
};
use picflash_ardupic::{ArduPicError, Result, Transport};
use picflash_core::chip::{Chip, PIC16F54};

/// Configuration for the dummy adapter
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Emulated target
    pub chip: Chip,
    /// Reply to the version query (without newline)
    pub version: String,
    /// Emit a `#` diagnostic line before every acknowledgment
    pub verbose: bool,
    /// Answer acknowledgment number N (0-based) with this failure text
    pub fail_ack: Option<(usize, String)>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            chip: PIC16F54,
            version: String::from("00"),
            verbose: false,
            fail_ack: None,
        }
    }
}

impl DummyConfig {
    /// Report a different firmware version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Emit diagnostic lines
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Fail the given acknowledgment with `message`
    pub fn with_failure(mut self, ack: usize, message: impl Into<String>) -> Self {
        self.fail_ack = Some((ack, message.into()));
        self
    }
}

/// Emulated ArduPIC adapter with a PIC16F54 attached
pub struct DummyAdapter {
    config: DummyConfig,
    memory: Vec<u16>,
    config_word: u16,
    /// `None` while the address pointer is at the configuration word
    address: Option<usize>,
    attached: bool,
    timing: [Option<u32>; 4],
    line: String,
    command_mode: bool,
    token: String,
    pending_op: Option<u8>,
    latch: Option<u16>,
    error: Option<String>,
    replies: VecDeque<String>,
    written: Vec<u8>,
    acks: usize,
}

impl DummyAdapter {
    /// Create an adapter with blank (erased) memory
    pub fn new(config: DummyConfig) -> Self {
        let mask = config.chip.word_mask();
        Self {
            memory: vec![mask; config.chip.program_words],
            config_word: mask,
            config,
            address: None,
            attached: false,
            timing: [None; 4],
            line: String::new(),
            command_mode: false,
            token: String::new(),
            pending_op: None,
            latch: None,
            error: None,
            replies: VecDeque::new(),
            written: Vec::new(),
            acks: 0,
        }
    }

    /// Create an adapter with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create an adapter with pre-filled program memory
    pub fn with_data(config: DummyConfig, words: &[u16], config_word: u16) -> Self {
        let mut adapter = Self::new(config);
        let mask = adapter.config.chip.word_mask();
        let len = core::cmp::min(words.len(), adapter.memory.len());
        for (cell, word) in adapter.memory[..len].iter_mut().zip(words) {
            *cell = word & mask;
        }
        adapter.config_word = config_word & mask;
        adapter
    }

    /// Program memory contents
    pub fn memory(&self) -> &[u16] {
        &self.memory
    }

    /// Configuration word contents
    pub fn config_word(&self) -> u16 {
        self.config_word
    }

    /// Whether the target is attached
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Delay configured for a slot, if any
    pub fn timing(&self, slot: DelaySlot) -> Option<u32> {
        self.timing[slot_index(slot)]
    }

    /// Number of acknowledgments sent
    pub fn acks(&self) -> usize {
        self.acks
    }

    /// Everything the host has written, as text
    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    fn feed(&mut self, c: char) {
        if !c.is_ascii() {
            self.fail(format!("unexpected byte 0x{:02x}", c as u32));
            return;
        }
        if self.command_mode {
            self.feed_command(c);
            return;
        }
        if c == '\n' {
            let line = core::mem::take(&mut self.line);
            self.handle_line(&line);
        } else if self.line.is_empty() && c == 'C' {
            self.command_mode = true;
        } else {
            self.line.push(c);
        }
    }

    fn handle_line(&mut self, line: &str) {
        if line == VERSION_QUERY.trim_end() {
            let reply = format!("{}\n", self.config.version);
            self.replies.push_back(reply);
            return;
        }

        if let Some(rest) = line.strip_prefix(CMD_TIMING) {
            let mut chars = rest.chars();
            let slot = chars.next().and_then(DelaySlot::from_char);
            let delay = u32::from_str_radix(chars.as_str(), 16).ok();
            match (slot, delay) {
                (Some(slot), Some(delay)) if delay > 0 => {
                    self.timing[slot_index(slot)] = Some(delay);
                }
                _ => self.fail(format!("bad timing command '{}'", line)),
            }
        } else if line == CMD_ATTACH {
            log::debug!("dummy: attach");
            self.attached = true;
            self.address = None;
        } else if line == CMD_DETACH {
            log::debug!("dummy: detach");
            self.attached = false;
        } else if !line.is_empty() {
            self.fail(format!("unknown command '{}'", line));
        }
        self.acknowledge();
    }

    fn feed_command(&mut self, c: char) {
        if c == '\n' {
            if !self.token.is_empty() {
                let token = core::mem::take(&mut self.token);
                self.fail(format!("truncated token '{}'", token));
            }
            if let Some(op) = self.pending_op.take() {
                self.fail(format!("command 0x{:02x} missing its data", op));
            }
            self.command_mode = false;
            self.acknowledge();
            return;
        }

        self.token.push(c);
        let first = self.token.chars().next().unwrap_or(c);
        let complete = match first {
            TOKEN_COMMAND => self.token.len() == 4,
            TOKEN_VERIFY => self.token.len() == 11,
            c if c.is_ascii_hexdigit() => self.token.len() == 5,
            _ => true,
        };
        if complete {
            let token = core::mem::take(&mut self.token);
            self.handle_token(&token);
        }
    }

    fn handle_token(&mut self, token: &str) {
        let bytes = token.as_bytes();
        match token.chars().next() {
            Some(TOKEN_COMMAND) => {
                let op = u8::from_str_radix(&token[1..3], 16).ok();
                let slot = token[3..].chars().next().and_then(DelaySlot::from_char);
                match (op, slot) {
                    (Some(op), Some(_)) => self.command(op),
                    _ => self.fail(format!("bad command token '{}'", token)),
                }
            }
            Some(TOKEN_VERIFY) if bytes[5] == TOKEN_VERIFY as u8 && token.ends_with(TOKEN_END) => {
                let fields = [&token[1..3], &token[3..5], &token[6..8], &token[8..10]]
                    .map(|f| u8::from_str_radix(f, 16).ok());
                match fields {
                    [Some(b0), Some(m0), Some(b1), Some(m1)] => self.verify(b0, m0, b1, m1),
                    _ => self.fail(format!("bad verify token '{}'", token)),
                }
            }
            Some(c) if c.is_ascii_hexdigit() && token.ends_with(TOKEN_END) => {
                let b0 = u8::from_str_radix(&token[0..2], 16).ok();
                let b1 = u8::from_str_radix(&token[2..4], 16).ok();
                match (b0, b1) {
                    (Some(b0), Some(b1)) => self.load(b0, b1),
                    _ => self.fail(format!("bad data token '{}'", token)),
                }
            }
            _ => self.fail(format!("unexpected token '{}'", token)),
        }
    }

    fn command(&mut self, op: u8) {
        if !self.attached {
            self.fail(format!("command 0x{:02x} while detached", op));
            return;
        }
        if let Some(prev) = self.pending_op.take() {
            self.fail(format!("command 0x{:02x} missing its data", prev));
        }
        let mask = self.config.chip.word_mask();
        match op {
            opcode::LOAD_DATA | opcode::READ_DATA => self.pending_op = Some(op),
            opcode::BEGIN_PROGRAMMING => match self.latch.take() {
                Some(word) => {
                    // Programming can only clear bits
                    *self.current_cell() &= word & mask;
                }
                None => self.fail(String::from("begin programming without data")),
            },
            opcode::END_PROGRAMMING => {}
            opcode::INCREMENT_ADDRESS => {
                let next = self.address.map_or(0, |a| a + 1);
                if next >= self.memory.len() {
                    self.fail(format!("address 0x{:03X} past end of memory", next));
                } else {
                    self.address = Some(next);
                }
            }
            opcode::BULK_ERASE => {
                log::debug!("dummy: bulk erase");
                self.memory.fill(mask);
                self.config_word = mask;
            }
            other => self.fail(format!("unknown command 0x{:02x}", other)),
        }
    }

    fn load(&mut self, b0: u8, b1: u8) {
        if self.pending_op.take() != Some(opcode::LOAD_DATA) {
            self.fail(String::from("data without load command"));
            return;
        }
        self.latch = Some(unframe_word(b0, b1));
    }

    fn verify(&mut self, b0: u8, m0: u8, b1: u8, m1: u8) {
        if self.pending_op.take() != Some(opcode::READ_DATA) {
            self.fail(String::from("verify without read command"));
            return;
        }
        let value = *self.current_cell();
        let (r0, r1) = frame_word(value);
        if (r0 & m0) != (b0 & m0) || (r1 & m1) != (b1 & m1) {
            let location = match self.address {
                Some(a) => format!("0x{:03X}", a),
                None => String::from("config"),
            };
            self.fail(format!(
                "verify failed at {}: read 0x{:03X}, expected 0x{:03X}",
                location,
                value,
                unframe_word(b0, b1)
            ));
        }
    }

    fn current_cell(&mut self) -> &mut u16 {
        match self.address {
            Some(a) => &mut self.memory[a],
            None => &mut self.config_word,
        }
    }

    /// Remember the first failure of the current exchange
    fn fail(&mut self, message: String) {
        log::debug!("dummy: {}", message);
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    fn acknowledge(&mut self) {
        let index = self.acks;
        self.acks += 1;
        if self.config.verbose {
            self.replies.push_back(format!("# ack {}\n", index));
        }
        let error = self.error.take();
        let injected = match &self.config.fail_ack {
            Some((n, message)) if *n == index => Some(message.clone()),
            _ => None,
        };
        match injected.or(error) {
            Some(message) => self.replies.push_back(format!("{}\n", message)),
            None => self.replies.push_back(String::from(ACK)),
        }
    }
}

impl Default for DummyAdapter {
    fn default() -> Self {
        Self::new_default()
    }
}

impl Transport for DummyAdapter {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.written.extend_from_slice(data);
        for &b in data {
            self.feed(b as char);
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        self.replies.pop_front().ok_or(ArduPicError::Timeout)
    }
}

fn slot_index(slot: DelaySlot) -> usize {
    match slot {
        DelaySlot::Command => 0,
        DelaySlot::Program => 1,
        DelaySlot::Discharge => 2,
        DelaySlot::Erase => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picflash_ardupic::{ArduPic, SessionState};
    use picflash_core::hex::parse_str;

    const BLINK_HEX: &str = "\
:020000040000FA
:0A0000002500060C0200A60A030A00
:021FFE00F90FD9
:00000001FF
";

    fn run(
        adapter: DummyAdapter,
        words: &[u16],
        config_word: u16,
        readonly: bool,
    ) -> (Result<()>, DummyAdapter) {
        let data: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let mut pic = ArduPic::new(adapter);
        let result = pic
            .initialize()
            .and_then(|_| pic.program(config_word, &data, readonly));
        let adapter = pic.close().unwrap();
        (result, adapter)
    }

    #[test]
    fn test_program_hex_image() {
        let image = parse_str(BLINK_HEX).unwrap();
        let mut pic = ArduPic::new(DummyAdapter::new_default());
        pic.initialize().unwrap();
        pic.program_image(&image, false).unwrap();
        assert_eq!(pic.state(), SessionState::Detached);

        let adapter = pic.close().unwrap();
        assert_eq!(adapter.config_word(), 0x0FF9);
        assert_eq!(
            &adapter.memory()[..6],
            &[0x0025, 0x0C06, 0x0002, 0x0AA6, 0x0A03, 0x0FFF]
        );
        assert!(adapter.memory()[5..].iter().all(|&w| w == 0x0FFF));
        assert!(!adapter.is_attached());
    }

    #[test]
    fn test_timing_is_configured() {
        let (result, adapter) = run(DummyAdapter::new_default(), &[], 0x0FFF, true);
        result.unwrap();
        assert_eq!(adapter.timing(DelaySlot::Command), Some(1));
        assert_eq!(adapter.timing(DelaySlot::Program), Some(2000));
        assert_eq!(adapter.timing(DelaySlot::Discharge), Some(10));
        assert_eq!(adapter.timing(DelaySlot::Erase), Some(10000));
    }

    #[test]
    fn test_verify_only_matches() {
        let words = [0x0123, 0x0456, 0x0789];
        let adapter = DummyAdapter::with_data(DummyConfig::default(), &words, 0x0FF2);
        let (result, adapter) = run(adapter, &words, 0x0FF2, true);
        result.unwrap();
        // Verify-only must not modify memory
        assert_eq!(&adapter.memory()[..3], &words);
        assert!(!adapter.written_str().contains("*09i"));
    }

    #[test]
    fn test_verify_only_mismatch() {
        let adapter = DummyAdapter::with_data(DummyConfig::default(), &[0x0123, 0x0456], 0x0FF2);
        let (result, _) = run(adapter, &[0x0123, 0x0457], 0x0FF2, true);
        match result {
            Err(ArduPicError::DeviceFailure { message }) => {
                assert_eq!(message, "verify failed at 0x001: read 0x456, expected 0x457");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unimplemented_bits_fail_verify() {
        // The configuration word is only 12 bits wide
        let (result, adapter) = run(DummyAdapter::new_default(), &[], 0x1234, false);
        assert!(matches!(result, Err(ArduPicError::DeviceFailure { .. })));
        assert_eq!(adapter.config_word(), 0x0234);
    }

    #[test]
    fn test_diagnostic_lines_are_tolerated() {
        let config = DummyConfig::default().with_verbose(true);
        let (result, adapter) = run(DummyAdapter::new(config), &[0x0AAA], 0x0FFF, false);
        result.unwrap();
        assert_eq!(adapter.memory()[0], 0x0AAA);
    }

    #[test]
    fn test_bad_version() {
        let config = DummyConfig::default().with_version("01");
        let (result, adapter) = run(DummyAdapter::new(config), &[], 0, false);
        assert!(matches!(result, Err(ArduPicError::VersionMismatch { .. })));
        assert_eq!(adapter.written_str(), "V00\n");
    }

    #[test]
    fn test_injected_failure_stops_session() {
        // acks: 4 timing, attach (4), erase (5), config word (6), word 0 (7)
        let config = DummyConfig::default().with_failure(7, "!Vpp fault");
        let adapter = DummyAdapter::new(config);
        let (result, adapter) = run(adapter, &[0x0001, 0x0002], 0x0FFF, false);
        match result {
            Err(ArduPicError::DeviceFailure { message }) => assert_eq!(message, "!Vpp fault"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(adapter.acks(), 8);
        assert!(adapter.is_attached());
    }

    #[test]
    fn test_erase_before_program() {
        let adapter = DummyAdapter::with_data(DummyConfig::default(), &[0x0000; 4], 0x0000);
        let (result, adapter) = run(adapter, &[0x0F0F], 0x0FFB, false);
        result.unwrap();
        assert_eq!(adapter.memory()[0], 0x0F0F);
        assert_eq!(adapter.memory()[1], 0x0FFF);
        assert_eq!(adapter.config_word(), 0x0FFB);
    }

    #[test]
    fn test_image_past_end_of_memory() {
        let words = vec![0x0000; 513];
        let (result, _) = run(DummyAdapter::new_default(), &words, 0x0FFF, false);
        assert!(matches!(result, Err(ArduPicError::DeviceFailure { .. })));
    }

    #[test]
    fn test_unknown_line_command() {
        let mut adapter = DummyAdapter::new_default();
        adapter.write(b"X\n").unwrap();
        assert_eq!(adapter.read_line().unwrap(), "unknown command 'X'\n");
        assert!(matches!(adapter.read_line(), Err(ArduPicError::Timeout)));
    }
}
