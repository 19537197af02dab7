//! picflash-core - Core library for PIC programming
//!
//! This crate holds the target-independent pieces of picflash:
//!
//! - [`hex`]: parser for the Intel-HEX subset produced for baseline PICs
//! - [`image`]: the parsed [`ProgramImage`] (program words + configuration word)
//! - [`chip`]: descriptors of the supported microcontrollers
//! - [`error`]: error types shared by the above
//!
//! The crate is `no_std` compatible (it needs `alloc`). The `std` feature,
//! enabled by default, adds `std::error::Error` implementations.
//!
//! # Example
//!
//! ```
//! use picflash_core::hex::parse_str;
//!
//! let image = parse_str(
//!     ":04000000AABBCCDD7E\n:021FFE0034129B\n:00000001FF\n",
//! )?;
//! assert_eq!(image.config_word(), 0x1234);
//! assert_eq!(image.words().collect::<Vec<_>>(), vec![0xBBAA, 0xDDCC]);
//! # Ok::<(), picflash_core::error::HexError>(())
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod chip;
pub mod error;
pub mod hex;
pub mod image;

pub use chip::{Chip, PIC16F54};
pub use error::{HexError, Result};
pub use hex::{HexOptions, HexParser};
pub use image::ProgramImage;
