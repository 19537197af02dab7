//! Programmer registration and dispatch
//!
//! This module provides a centralized registry for all programmers, with support
//! for feature-gated inclusion and dynamic help text generation.

use picflash_ardupic::{ArduPicError, Transport};
use std::collections::HashMap;
use thiserror::Error;

/// A type-erased adapter transport
pub type BoxedTransport = Box<dyn Transport>;

/// Errors opening a programmer
#[derive(Debug, Error)]
pub enum ProgrammerError {
    /// Name does not match any compiled-in programmer
    #[error("Unknown programmer: {0} (use --list-programmers)")]
    Unknown(String),

    /// Option not written as key=value
    #[error("Invalid parameter format: '{0}' (expected key=value)")]
    BadFormat(String),

    /// Option not understood by the programmer
    #[error("Unknown parameter '{key}' for programmer {programmer}")]
    UnknownParameter {
        /// Programmer name
        programmer: String,
        /// Offending key
        key: String,
    },

    /// Option value could not be parsed
    #[error("Invalid value '{value}' for parameter '{key}'")]
    BadValue {
        /// Parameter key
        key: String,
        /// Offending value
        value: String,
    },

    /// The adapter could not be opened
    #[error(transparent)]
    Open(#[from] ArduPicError),
}

/// Information about a programmer
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "ardupic")]
    programmers.push(ProgrammerInfo {
        name: "ardupic",
        aliases: &["ardupick"],
        description: "ArduPIC serial adapter (dev=<port>,baud=<rate>,timeout=<ms>)",
    });

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory ArduPIC + PIC16F54 emulator for testing",
    });

    programmers
}

/// Generate help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");

    for p in &programmers {
        help.push_str(&format!("  {:12} - {}", p.name, p.description));
        if !p.aliases.is_empty() {
            help.push_str(&format!(" (aliases: {})", p.aliases.join(", ")));
        }
        help.push('\n');
    }

    help
}

/// Generate a short list of programmer names for CLI help
pub fn programmer_names_short() -> String {
    let programmers = available_programmers();
    let names: Vec<&str> = programmers.iter().map(|p| p.name).collect();
    names.join(", ")
}

/// Parsed programmer parameters
#[derive(Debug)]
pub struct ProgrammerParams {
    /// Programmer name (as given)
    pub name: String,
    /// Key-value parameters
    pub params: HashMap<String, String>,
}

/// Serial settings given as separate command-line flags
#[derive(Debug, Default, Clone)]
pub struct SerialOverrides {
    /// Serial device path
    pub port: Option<String>,
    /// Baud rate
    pub baud: Option<u32>,
    /// Read timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

/// Parse a programmer string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
pub fn parse_programmer_params(s: &str) -> Result<ProgrammerParams, ProgrammerError> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            if let Some((key, value)) = opt.split_once('=') {
                params.insert(key.to_string(), value.to_string());
            } else {
                return Err(ProgrammerError::BadFormat(opt.to_string()));
            }
        }
    }

    Ok(ProgrammerParams {
        name: name.to_string(),
        params,
    })
}

/// Open a programmer and return its transport
///
/// # Arguments
/// * `programmer` - Programmer specification (e.g., "ardupic:dev=/dev/ttyACM0" or "dummy")
/// * `overrides` - Serial settings from dedicated flags, taking precedence
#[allow(unused_variables)]
pub fn open_programmer(
    programmer: &str,
    overrides: &SerialOverrides,
) -> Result<BoxedTransport, ProgrammerError> {
    let params = parse_programmer_params(programmer)?;

    match params.name.as_str() {
        #[cfg(feature = "ardupic")]
        "ardupic" | "ardupick" => open_ardupic(&params, overrides),

        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(&params),

        _ => Err(ProgrammerError::Unknown(params.name)),
    }
}

#[cfg(feature = "ardupic")]
fn open_ardupic(
    params: &ProgrammerParams,
    overrides: &SerialOverrides,
) -> Result<BoxedTransport, ProgrammerError> {
    let config = serial_config(params, overrides)?;
    log::info!("Opening ArduPIC on {}", config.device);
    let transport = picflash_ardupic::SerialTransport::open(&config)?;
    Ok(Box::new(transport))
}

/// Build serial settings from programmer parameters and flag overrides
#[cfg(feature = "ardupic")]
fn serial_config(
    params: &ProgrammerParams,
    overrides: &SerialOverrides,
) -> Result<picflash_ardupic::SerialConfig, ProgrammerError> {
    use std::time::Duration;

    let mut config = picflash_ardupic::SerialConfig::default();
    for (key, value) in &params.params {
        match key.as_str() {
            "dev" => config.device = value.clone(),
            "baud" => config.baud = parse_value(key, value)?,
            "timeout" => config.timeout = Duration::from_millis(parse_value(key, value)?),
            _ => {
                return Err(ProgrammerError::UnknownParameter {
                    programmer: params.name.clone(),
                    key: key.clone(),
                })
            }
        }
    }

    if let Some(port) = &overrides.port {
        config.device = port.clone();
    }
    if let Some(baud) = overrides.baud {
        config.baud = baud;
    }
    if let Some(ms) = overrides.timeout_ms {
        config.timeout = Duration::from_millis(ms);
    }
    Ok(config)
}

#[cfg(feature = "ardupic")]
fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ProgrammerError> {
    value.parse().map_err(|_| ProgrammerError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(feature = "dummy")]
fn open_dummy(params: &ProgrammerParams) -> Result<BoxedTransport, ProgrammerError> {
    use picflash_dummy::{DummyAdapter, DummyConfig};

    let mut config = DummyConfig::default();
    for (key, value) in &params.params {
        match key.as_str() {
            "verbose" => config.verbose = value == "1" || value == "true",
            _ => {
                return Err(ProgrammerError::UnknownParameter {
                    programmer: params.name.clone(),
                    key: key.clone(),
                })
            }
        }
    }
    log::info!("Using dummy ArduPIC emulator");
    Ok(Box::new(DummyAdapter::new(config)))
}
