//! ArduPIC device implementation
//!
//! This module provides the [`ArduPic`] driver, which runs a programming
//! session over a [`Transport`]:
//!
//! ```text
//! Disconnected --initialize--> Initialized --program--> Attached
//!     ^                                                   |
//!     |              +--> Programming --> Verifying --> Advancing --+
//!     |              |                                              |
//!     |              +----------------------------------------------+
//!     |                                                   |
//!     +------------------(any error)                   Detached --close--> Closed
//! ```
//!
//! The protocol is strictly lock-step: every line sent is fully acknowledged
//! before the next command goes out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use picflash_core::ProgramImage;

use crate::error::{ArduPicError, Result};
use crate::progress::{NoProgress, ProgramProgress};
use crate::protocol::*;
use crate::transport::Transport;

/// States of a programming session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, adapter not yet handshaken
    Disconnected,
    /// Version checked and timing configured
    Initialized,
    /// Target reset and held in programming mode
    Attached,
    /// Loading and programming a word
    Programming,
    /// Verifying a word
    Verifying,
    /// Moving to the next address
    Advancing,
    /// Target released
    Detached,
    /// Transport released
    Closed,
}

impl SessionState {
    fn is_attached(self) -> bool {
        matches!(
            self,
            SessionState::Attached
                | SessionState::Programming
                | SessionState::Verifying
                | SessionState::Advancing
        )
    }
}

/// Transport plus the adapter's command-mode flag
///
/// `in_command_mode` is set when a `C` byte has been sent and cleared when an
/// acknowledgment is consumed.
pub struct Connection<T: Transport> {
    transport: T,
    in_command_mode: bool,
}

impl<T: Transport> Connection<T> {
    /// Wrap an open transport
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            in_command_mode: false,
        }
    }

    /// Whether the adapter is expecting command tokens
    pub fn in_command_mode(&self) -> bool {
        self.in_command_mode
    }

    /// Release the underlying transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn out(&mut self, s: &str) -> Result<()> {
        log::trace!("ardupic: wrote '{}'", s.escape_debug());
        self.transport.write(s.as_bytes())
    }

    fn read_line(&mut self) -> Result<String> {
        let line = self.transport.read_line()?;
        log::trace!("ardupic: got '{}'", line.escape_debug());
        Ok(line)
    }

    /// Send a line and wait for its acknowledgment
    fn out_ack(&mut self, s: &str) -> Result<()> {
        self.out(s)?;
        self.out(ACK)?;
        self.transport.flush()?;
        self.ack()
    }

    /// Consume diagnostic lines until the acknowledgment
    fn ack(&mut self) -> Result<()> {
        self.in_command_mode = false;
        loop {
            let line = self.read_line()?;
            if let Some(diag) = line.strip_prefix(DIAGNOSTIC_PREFIX) {
                log::debug!("ardupic: #{}", diag.trim_end());
                continue;
            }
            if line == ACK {
                return Ok(());
            }
            let message = line.trim_end_matches(&['\r', '\n'][..]).to_string();
            log::debug!("ardupic: device reported failure: {}", message);
            return Err(ArduPicError::DeviceFailure { message });
        }
    }

    /// Emit a command byte, entering command mode first if needed
    fn cmd_byte(&mut self, op: u8, slot: DelaySlot) -> Result<()> {
        if !self.in_command_mode {
            self.out(CMD_ENTER_COMMAND)?;
            self.in_command_mode = true;
        }
        self.out(&encode_command(op, slot))
    }
}

/// ArduPIC programmer
///
/// Owns the [`Connection`] for one programming session. Create it with an
/// already-open transport, call [`ArduPic::initialize`], then
/// [`ArduPic::program`], then [`ArduPic::close`].
pub struct ArduPic<T: Transport> {
    conn: Option<Connection<T>>,
    timing: TimingProfile,
    state: SessionState,
    cancel: Option<Arc<AtomicBool>>,
}

impl<T: Transport> ArduPic<T> {
    /// Create a driver with the default timing profile
    pub fn new(transport: T) -> Self {
        Self::with_timing(transport, TimingProfile::default())
    }

    /// Create a driver with a specific timing profile
    pub fn with_timing(transport: T, timing: TimingProfile) -> Self {
        Self {
            conn: Some(Connection::new(transport)),
            timing,
            state: SessionState::Disconnected,
            cancel: None,
        }
    }

    /// Install a cancellation flag
    ///
    /// The flag is checked before each command/acknowledgment exchange. Once
    /// it is set the running operation fails with [`ArduPicError::Cancelled`].
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Timing profile sent during initialization
    pub fn timing(&self) -> &TimingProfile {
        &self.timing
    }

    /// The connection, unless the session has been closed
    pub fn connection(&self) -> Option<&Connection<T>> {
        self.conn.as_ref()
    }

    /// Handshake with the adapter and configure its delays
    ///
    /// Allowed from `Disconnected` and `Detached`.
    pub fn initialize(&mut self) -> Result<()> {
        self.expect_state("initialize", |s| {
            matches!(s, SessionState::Disconnected | SessionState::Detached)
        })?;
        let result = self.run_initialize();
        self.finish(result, SessionState::Initialized)
    }

    fn run_initialize(&mut self) -> Result<()> {
        self.check_cancel()?;
        let timing = self.timing;
        let conn = self.conn()?;

        conn.out(VERSION_QUERY)?;
        conn.transport.flush()?;
        let reply = conn.read_line()?;
        if reply != VERSION_REPLY {
            return Err(ArduPicError::VersionMismatch {
                reply: reply.trim_end().to_string(),
            });
        }
        log::debug!("ardupic: Version OK");

        for slot in DelaySlot::ALL {
            self.check_cancel()?;
            let delay = timing.delay(slot);
            self.conn()?.out_ack(&encode_timing(slot, delay))?;
            log::debug!("ardupic: {:?} delay set to {}", slot, delay);
        }
        Ok(())
    }

    /// Program (or with `readonly`, only verify) a configuration word and data
    ///
    /// `data` holds program words as byte pairs, low byte first.
    pub fn program(&mut self, config_word: u16, data: &[u8], readonly: bool) -> Result<()> {
        self.program_with_progress(config_word, data, readonly, &mut NoProgress)
    }

    /// Program a parsed image
    pub fn program_image(&mut self, image: &ProgramImage, readonly: bool) -> Result<()> {
        self.program(image.config_word(), image.data(), readonly)
    }

    /// Like [`ArduPic::program`], reporting progress along the way
    pub fn program_with_progress(
        &mut self,
        config_word: u16,
        data: &[u8],
        readonly: bool,
        progress: &mut dyn ProgramProgress,
    ) -> Result<()> {
        self.expect_state("program", |s| s == SessionState::Initialized)?;
        if data.len() % 2 != 0 {
            return Err(ArduPicError::InvalidParameter(format!(
                "program data length {} is not a whole number of words",
                data.len()
            )));
        }
        let result = self.run_program(config_word, data, readonly, progress);
        self.finish(result, SessionState::Detached)
    }

    fn run_program(
        &mut self,
        config_word: u16,
        data: &[u8],
        readonly: bool,
        progress: &mut dyn ProgramProgress,
    ) -> Result<()> {
        self.check_cancel()?;
        self.conn()?.out_ack(CMD_ATTACH)?;
        self.state = SessionState::Attached;
        log::debug!("ardupic: Attached");
        progress.attached();

        if !readonly {
            self.check_cancel()?;
            progress.erasing();
            let conn = self.conn()?;
            conn.cmd_byte(opcode::BULK_ERASE, DelaySlot::Erase)?;
            conn.out_ack("")?;
            log::debug!("ardupic: Bulk erase done");
        }

        let total = data.len() / 2 + 1;
        progress.writing(total, readonly);

        self.run_write_word(config_word, readonly)?;
        progress.word_done(1);

        for (i, pair) in data.chunks_exact(2).enumerate() {
            let word = pair[0] as u16 | ((pair[1] as u16) << 8);
            self.run_write_word(word, readonly)?;
            progress.word_done(i + 2);
        }

        self.check_cancel()?;
        self.conn()?.out_ack(CMD_DETACH)?;
        log::debug!("ardupic: Detached");
        progress.detached();
        Ok(())
    }

    /// Write (unless `readonly`) and verify one word, then advance the address
    ///
    /// Only valid while the target is attached.
    pub fn write_word(&mut self, word: u16, readonly: bool) -> Result<()> {
        self.expect_state("write a word", SessionState::is_attached)?;
        let result = self.run_write_word(word, readonly);
        let next = self.state;
        self.finish(result, next)
    }

    fn run_write_word(&mut self, word: u16, readonly: bool) -> Result<()> {
        self.check_cancel()?;
        log::trace!("ardupic: word 0x{:04X}", word);

        if !readonly {
            self.state = SessionState::Programming;
            let conn = self.conn()?;
            conn.cmd_byte(opcode::LOAD_DATA, DelaySlot::Command)?;
            conn.out(&encode_load(word))?;
            conn.cmd_byte(opcode::BEGIN_PROGRAMMING, DelaySlot::Program)?;
            conn.cmd_byte(opcode::END_PROGRAMMING, DelaySlot::Discharge)?;
        }

        self.state = SessionState::Verifying;
        let conn = self.conn()?;
        conn.cmd_byte(opcode::READ_DATA, DelaySlot::Command)?;
        conn.out(&encode_verify(word))?;

        self.state = SessionState::Advancing;
        let conn = self.conn()?;
        conn.cmd_byte(opcode::INCREMENT_ADDRESS, DelaySlot::Command)?;
        conn.out_ack("")
    }

    /// Read the device contents back
    ///
    /// The adapter protocol has no read-back path, so this always fails
    /// without touching the transport.
    pub fn read(&mut self) -> Result<ProgramImage> {
        Err(ArduPicError::ReadNotSupported)
    }

    /// Release the transport
    ///
    /// Returns the transport the first time; later calls return `None`.
    pub fn close(&mut self) -> Option<T> {
        let conn = self.conn.take()?;
        if self.state.is_attached() {
            log::warn!("ardupic: Closing while target is still attached");
        }
        self.state = SessionState::Closed;
        log::debug!("ardupic: Closed");
        Some(conn.into_inner())
    }

    fn conn(&mut self) -> Result<&mut Connection<T>> {
        let state = self.state;
        self.conn.as_mut().ok_or(ArduPicError::InvalidState {
            operation: "communicate",
            state,
        })
    }

    fn check_cancel(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(ArduPicError::Cancelled),
            _ => Ok(()),
        }
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: impl Fn(SessionState) -> bool,
    ) -> Result<()> {
        if self.conn.is_none() || !allowed(self.state) {
            return Err(ArduPicError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Move to `next` on success; any failure aborts the session
    fn finish(&mut self, result: Result<()>, next: SessionState) -> Result<()> {
        match result {
            Ok(()) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                log::debug!("ardupic: session aborted in {:?}: {}", self.state, e);
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Scripted transport
    ///
    /// Records everything written. Replies come from a queue; once the queue
    /// is empty every read returns the default reply (an acknowledgment),
    /// or `Timeout` if no default is set.
    #[derive(Clone, Default)]
    struct MockTransport {
        written: Rc<RefCell<Vec<u8>>>,
        replies: Rc<RefCell<VecDeque<String>>>,
        default_reply: Option<String>,
        reads: Rc<RefCell<usize>>,
    }

    impl MockTransport {
        fn acking() -> Self {
            Self {
                default_reply: Some(ACK.to_string()),
                ..Default::default()
            }
        }

        fn with_replies(replies: &[&str]) -> Self {
            let mock = Self::default();
            mock.replies
                .borrow_mut()
                .extend(replies.iter().map(|r| r.to_string()));
            mock
        }

        fn push_reply(&self, reply: &str) {
            self.replies.borrow_mut().push_back(reply.to_string());
        }

        fn output(&self) -> String {
            String::from_utf8(self.written.borrow().clone()).unwrap()
        }

        fn clear_output(&self) {
            self.written.borrow_mut().clear();
        }

        fn read_count(&self) -> usize {
            *self.reads.borrow()
        }
    }

    impl Transport for MockTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.written.borrow_mut().extend_from_slice(data);
            Ok(())
        }

        fn read_line(&mut self) -> Result<String> {
            *self.reads.borrow_mut() += 1;
            if let Some(reply) = self.replies.borrow_mut().pop_front() {
                return Ok(reply);
            }
            self.default_reply.clone().ok_or(ArduPicError::Timeout)
        }
    }

    /// Expected wire text for one word
    fn word_sequence(word: u16, readonly: bool) -> String {
        let (b0, b1) = frame_word(word);
        let mut s = String::from("C");
        if !readonly {
            s.push_str(&format!("*02.{:02x}{:02x}.*08g*0eh", b0, b1));
        }
        s.push_str(&format!("*04.={:02x}fe={:02x}7f.*06.\n", b0, b1));
        s
    }

    fn initialized(mock: &MockTransport) -> ArduPic<MockTransport> {
        mock.push_reply(VERSION_REPLY);
        let mut pic = ArduPic::new(mock.clone());
        pic.initialize().unwrap();
        mock.clear_output();
        pic
    }

    #[test]
    fn test_initialize_sequence() {
        let mock = MockTransport::with_replies(&["00\n", "\n", "#verbose\n", "\n", "\n", "\n"]);
        let mut pic = ArduPic::new(mock.clone());
        pic.initialize().unwrap();
        assert_eq!(pic.state(), SessionState::Initialized);
        assert_eq!(mock.output(), "V00\nT.1\nTg7d0\nTha\nTi2710\n");
    }

    #[test]
    fn test_initialize_custom_timing() {
        let mock = MockTransport::acking();
        mock.push_reply(VERSION_REPLY);
        let timing = TimingProfile::new(2, 0x100, 0x20, 0x4000).unwrap();
        let mut pic = ArduPic::with_timing(mock.clone(), timing);
        pic.initialize().unwrap();
        assert_eq!(mock.output(), "V00\nT.2\nTg100\nTh20\nTi4000\n");
    }

    #[test]
    fn test_version_mismatch() {
        let mock = MockTransport::with_replies(&["01\n"]);
        let mut pic = ArduPic::new(mock.clone());
        let err = pic.initialize().unwrap_err();
        assert!(matches!(err, ArduPicError::VersionMismatch { ref reply } if reply == "01"));
        // No timing commands after a bad version
        assert_eq!(mock.output(), "V00\n");
        assert_eq!(pic.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_ack_failure_stops_lock_step() {
        let mock = MockTransport::with_replies(&["00\n", "\n", "#trace\n", "Timing rejected\n"]);
        let mut pic = ArduPic::new(mock.clone());
        let err = pic.initialize().unwrap_err();
        match err {
            ArduPicError::DeviceFailure { message } => assert_eq!(message, "Timing rejected"),
            other => panic!("unexpected error: {other}"),
        }
        // The third and fourth timing commands were never sent
        assert_eq!(mock.output(), "V00\nT.1\nTg7d0\n");
        assert_eq!(mock.read_count(), 4);
    }

    #[test]
    fn test_timeout_is_distinct() {
        let mock = MockTransport::default();
        let mut pic = ArduPic::new(mock);
        assert!(matches!(pic.initialize(), Err(ArduPicError::Timeout)));
    }

    #[test]
    fn test_program_sequence() {
        let mock = MockTransport::acking();
        let mut pic = initialized(&mock);
        pic.program(0x1234, &[0xAA, 0xBB, 0xCC, 0xDD], false).unwrap();

        let expected = [
            String::from("A\n"),
            String::from("C*09i\n"),
            word_sequence(0x1234, false),
            word_sequence(0xBBAA, false),
            word_sequence(0xDDCC, false),
            String::from("D\n"),
        ]
        .concat();
        assert_eq!(mock.output(), expected);
        assert_eq!(pic.state(), SessionState::Detached);
    }

    #[test]
    fn test_program_readonly_skips_erase_and_write() {
        let mock = MockTransport::acking();
        let mut pic = initialized(&mock);
        pic.program(0x0FFF, &[0x01, 0x02], true).unwrap();

        let expected = [
            String::from("A\n"),
            word_sequence(0x0FFF, true),
            word_sequence(0x0201, true),
            String::from("D\n"),
        ]
        .concat();
        assert_eq!(mock.output(), expected);
        assert!(!mock.output().contains("*09i"));
        assert!(!mock.output().contains("*08g"));
    }

    #[test]
    fn test_verify_failure_aborts_program() {
        let mock = MockTransport::with_replies(&["00\n", "\n", "\n", "\n", "\n"]);
        let mut pic = ArduPic::new(mock.clone());
        pic.initialize().unwrap();
        mock.clear_output();

        // attach, erase, config word ok; first data word fails
        for reply in ["\n", "\n", "\n", "!mismatch at 000\n"] {
            mock.push_reply(reply);
        }
        let err = pic.program(0x0FFF, &[0x01, 0x02, 0x03, 0x04], false).unwrap_err();
        assert!(matches!(
            err,
            ArduPicError::DeviceFailure { ref message } if message == "!mismatch at 000"
        ));

        // Nothing after the failing word: no second data word, no detach
        let out = mock.output();
        assert!(out.ends_with(&word_sequence(0x0201, false)));
        assert!(!out.contains("D\n"));
        assert_eq!(pic.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_command_mode_flag() {
        let mock = MockTransport::acking();
        let mut pic = initialized(&mock);
        pic.conn().unwrap().cmd_byte(opcode::READ_DATA, DelaySlot::Command).unwrap();
        assert!(pic.connection().unwrap().in_command_mode());
        pic.conn().unwrap().cmd_byte(opcode::INCREMENT_ADDRESS, DelaySlot::Command).unwrap();
        // Only one mode-entry byte for consecutive command bytes
        assert_eq!(mock.output(), "C*04.*06.");
        pic.conn().unwrap().out_ack("").unwrap();
        assert!(!pic.connection().unwrap().in_command_mode());
    }

    #[test]
    fn test_diagnostic_lines_are_skipped() {
        let mock = MockTransport::with_replies(&["#one\n", "#two\n", "\n"]);
        let mut conn = Connection::new(mock.clone());
        conn.out_ack("A").unwrap();
        assert_eq!(mock.read_count(), 3);
    }

    #[test]
    fn test_program_requires_initialize() {
        let mock = MockTransport::acking();
        let mut pic = ArduPic::new(mock.clone());
        let err = pic.program(0, &[], false).unwrap_err();
        assert!(matches!(
            err,
            ArduPicError::InvalidState {
                state: SessionState::Disconnected,
                ..
            }
        ));
        assert_eq!(mock.output(), "");
    }

    #[test]
    fn test_write_word_requires_attach() {
        let mock = MockTransport::acking();
        let mut pic = initialized(&mock);
        assert!(matches!(
            pic.write_word(0x123, false),
            Err(ArduPicError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_odd_data_rejected() {
        let mock = MockTransport::acking();
        let mut pic = initialized(&mock);
        assert!(matches!(
            pic.program(0, &[1, 2, 3], false),
            Err(ArduPicError::InvalidParameter(_))
        ));
        assert_eq!(mock.output(), "");
        assert_eq!(pic.state(), SessionState::Initialized);
    }

    #[test]
    fn test_cancel_between_words() {
        let mock = MockTransport::acking();
        let mut pic = initialized(&mock);
        let flag = Arc::new(AtomicBool::new(false));
        pic.set_cancel_flag(flag.clone());

        struct CancelAfter(Arc<AtomicBool>, usize);
        impl ProgramProgress for CancelAfter {
            fn word_done(&mut self, done_words: usize) {
                if done_words == self.1 {
                    self.0.store(true, Ordering::SeqCst);
                }
            }
        }

        let err = pic
            .program_with_progress(0, &[0; 8], false, &mut CancelAfter(flag, 2))
            .unwrap_err();
        assert!(matches!(err, ArduPicError::Cancelled));
        // Cancellation only happens at an exchange boundary
        assert!(mock.output().ends_with("*06.\n"));
        assert_eq!(mock.output().matches("*06.").count(), 2);
    }

    #[test]
    fn test_progress_events() {
        #[derive(Default)]
        struct Recorder(Vec<String>);
        impl ProgramProgress for Recorder {
            fn attached(&mut self) {
                self.0.push("attached".into());
            }
            fn erasing(&mut self) {
                self.0.push("erasing".into());
            }
            fn writing(&mut self, total_words: usize, readonly: bool) {
                self.0.push(format!("writing {total_words} {readonly}"));
            }
            fn word_done(&mut self, done_words: usize) {
                self.0.push(format!("word {done_words}"));
            }
            fn detached(&mut self) {
                self.0.push("detached".into());
            }
        }

        let mock = MockTransport::acking();
        let mut pic = initialized(&mock);
        let mut rec = Recorder::default();
        pic.program_with_progress(0, &[1, 2], false, &mut rec).unwrap();
        assert_eq!(
            rec.0,
            vec![
                "attached",
                "erasing",
                "writing 2 false",
                "word 1",
                "word 2",
                "detached"
            ]
        );
    }

    #[test]
    fn test_read_not_supported() {
        let mock = MockTransport::acking();
        let mut pic = ArduPic::new(mock.clone());
        assert!(matches!(pic.read(), Err(ArduPicError::ReadNotSupported)));
        assert_eq!(mock.output(), "");
        assert_eq!(mock.read_count(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mock = MockTransport::acking();
        let mut pic = initialized(&mock);
        pic.program(0, &[], true).unwrap();
        assert!(pic.close().is_some());
        assert!(pic.close().is_none());
        assert_eq!(pic.state(), SessionState::Closed);
        assert!(matches!(
            pic.initialize(),
            Err(ArduPicError::InvalidState {
                state: SessionState::Closed,
                ..
            })
        ));
    }

    #[test]
    fn test_reinitialize_after_failure() {
        let mock = MockTransport::with_replies(&["bogus\n"]);
        let mut pic = ArduPic::new(mock.clone());
        assert!(pic.initialize().is_err());
        for reply in ["00\n", "\n", "\n", "\n", "\n"] {
            mock.push_reply(reply);
        }
        pic.initialize().unwrap();
        assert_eq!(pic.state(), SessionState::Initialized);
    }

    #[test]
    fn test_word_failure_resets_session() {
        let mock = MockTransport::with_replies(&["00\n", "\n", "\n", "\n", "\n"]);
        let mut pic = ArduPic::new(mock.clone());
        pic.initialize().unwrap();

        // attach, erase, then the configuration word fails
        for reply in ["\n", "\n", "!verify failed\n"] {
            mock.push_reply(reply);
        }
        let err = pic.program(0x0FFF, &[0x01, 0x02], false).unwrap_err();
        assert!(matches!(err, ArduPicError::DeviceFailure { .. }));
        assert_eq!(pic.state(), SessionState::Disconnected);
        assert!(!mock.output().contains("D\n"));

        // The driver is not left mid-word: a lone word write is refused
        assert!(matches!(
            pic.write_word(0x0001, false),
            Err(ArduPicError::InvalidState { .. })
        ));
    }
}
