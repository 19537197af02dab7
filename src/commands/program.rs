//! Program and verify command implementation

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use picflash_ardupic::{ArduPic, ArduPicError, ProgramProgress, TimingProfile, Transport};
use picflash_core::{hex, Chip, HexOptions, ProgramImage};
use std::path::Path;
use std::time::Duration;

use crate::cli::TimingArgs;

/// Progress display for program runs using indicatif
pub struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
    phase: &'static str,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current_bar: None,
            phase: "",
        }
    }

    fn create_bar(&mut self, total: u64, phase: &'static str) {
        self.phase = phase;
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} words ({{eta}}) {}",
                    phase
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.current_bar = Some(pb);
    }

    fn create_spinner(&mut self, message: String) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(message.to_string());
        }
    }

    /// Drop whatever bar is still running, e.g. after a failed run
    pub fn abandon(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.abandon();
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramProgress for IndicatifProgress {
    fn erasing(&mut self) {
        self.create_spinner("Bulk erasing...".to_string());
    }

    fn writing(&mut self, total_words: usize, readonly: bool) {
        self.finish("Erase complete");
        let phase = if readonly { "Verifying" } else { "Programming" };
        self.create_bar(total_words as u64, phase);
    }

    fn word_done(&mut self, done_words: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(done_words as u64);
        }
    }

    fn detached(&mut self) {
        let message = if self.phase == "Verifying" {
            "Verify complete"
        } else {
            "Program complete"
        };
        self.finish(message);
    }
}

/// Parse HEX text and check it against the target chip
pub fn parse_image(
    text: &str,
    chip: &Chip,
    options: HexOptions,
) -> Result<ProgramImage, Box<dyn std::error::Error>> {
    let image = hex::parse_lines(text.lines(), options)?;
    chip.check_image(&image)?;
    log::info!(
        "Image: {} program words, configuration word 0x{:03X}",
        image.word_count(),
        image.config_word()
    );
    Ok(image)
}

/// Load a HEX file for the target chip
pub fn load_image(
    path: &Path,
    chip: &Chip,
    options: HexOptions,
) -> Result<ProgramImage, Box<dyn std::error::Error>> {
    log::info!("Reading {}", path.display());
    let text = std::fs::read_to_string(path)?;
    parse_image(&text, chip, options)
}

/// Build a timing profile from command-line delays
pub fn timing_from_args(args: &TimingArgs) -> Result<TimingProfile, ArduPicError> {
    TimingProfile::new(
        args.cmd_delay,
        args.prog_delay,
        args.discharge_delay,
        args.erase_delay,
    )
}

/// Run a complete session: initialize, program (or verify), close
///
/// The adapter is closed whether or not programming succeeded.
pub fn run_program<T: Transport>(
    pic: &mut ArduPic<T>,
    image: &ProgramImage,
    verify_only: bool,
    progress: &mut dyn ProgramProgress,
) -> Result<(), ArduPicError> {
    log::debug!("Adapter timing: {:?}", pic.timing());
    let result = pic.initialize().and_then(|()| {
        pic.program_with_progress(image.config_word(), image.data(), verify_only, progress)
    });
    pic.close();
    result
}
