//! Progress reporting for programming sessions

/// Callbacks invoked while a program run advances
///
/// All methods have empty default implementations, so implementors only
/// override what they display.
pub trait ProgramProgress {
    /// The target has been attached
    fn attached(&mut self) {}

    /// Bulk erase is about to start
    fn erasing(&mut self) {}

    /// Word transfer is about to start
    ///
    /// `total_words` includes the configuration word. When `readonly` is set
    /// the words are only verified.
    fn writing(&mut self, total_words: usize, readonly: bool) {
        let _ = (total_words, readonly);
    }

    /// `done_words` words have been written and verified so far
    fn word_done(&mut self, done_words: usize) {
        let _ = done_words;
    }

    /// The target has been detached
    fn detached(&mut self) {}
}

/// Progress sink that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgramProgress for NoProgress {}
