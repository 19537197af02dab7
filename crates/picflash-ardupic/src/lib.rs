//! picflash-ardupic - ArduPIC programmer support
//!
//! This crate drives an ArduPIC adapter: a microcontroller board attached
//! over a serial port that bit-bangs the in-circuit serial programming
//! interface of a baseline PIC (currently the PIC16F54).
//!
//! # Protocol Overview
//!
//! The host and adapter exchange ASCII text in strict lock-step. A session
//! looks like this:
//!
//! 1. `V00` version query, answered with `00`
//! 2. four `T<slot><hex>` lines configuring the adapter's delays
//! 3. `A` to attach (reset the target and apply Vpp)
//! 4. bulk erase, then for every word: load, program, verify, increment
//! 5. `D` to detach
//!
//! See [`protocol`] for the token format.
//!
//! # Example
//!
//! ```no_run
//! use picflash_ardupic::{open_serial, SerialConfig};
//! use picflash_core::hex::parse_str;
//!
//! let image = parse_str(&std::fs::read_to_string("blink.hex")?)?;
//!
//! let mut pic = open_serial(&SerialConfig::new("/dev/ttyACM0").with_baud(9600))?;
//! pic.initialize()?;
//! pic.program_image(&image, false)?;
//! pic.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod device;
pub mod error;
pub mod progress;
pub mod protocol;
pub mod transport;

// Re-exports
pub use device::{ArduPic, Connection, SessionState};
pub use error::{ArduPicError, Result};
pub use progress::{NoProgress, ProgramProgress};
pub use protocol::{frame_word, DelaySlot, TimingProfile};
pub use transport::Transport;

#[cfg(feature = "serial")]
pub use transport::serial::{SerialConfig, SerialTransport};

/// Open an ArduPIC adapter on a serial port
#[cfg(feature = "serial")]
pub fn open_serial(config: &SerialConfig) -> Result<ArduPic<SerialTransport>> {
    let transport = SerialTransport::open(config)?;
    Ok(ArduPic::new(transport))
}
