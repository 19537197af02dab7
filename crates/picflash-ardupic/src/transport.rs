//! Transport layer abstraction for ArduPIC communication
//!
//! The adapter protocol is line oriented in the device-to-host direction, so
//! the transport exposes whole-line reads rather than raw byte reads.

use crate::error::{ArduPicError, Result};
use std::io::BufRead;

/// Line-oriented duplex transport
pub trait Transport {
    /// Write bytes to the transport
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read one line, including its trailing `\n`
    ///
    /// Blocks until a full line is available or the transport's timeout
    /// expires ([`ArduPicError::Timeout`]). End of stream is reported as
    /// [`ArduPicError::ConnectionClosed`].
    ///
    /// [`ArduPicError::Timeout`]: crate::error::ArduPicError::Timeout
    /// [`ArduPicError::ConnectionClosed`]: crate::error::ArduPicError::ConnectionClosed
    fn read_line(&mut self) -> Result<String>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn read_line(&mut self) -> Result<String> {
        (**self).read_line()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Read one `\n`-terminated line from a buffered reader
///
/// Read timeouts surface as [`ArduPicError::Timeout`] and a zero-byte read as
/// [`ArduPicError::ConnectionClosed`].
pub fn read_line_from<R: BufRead + ?Sized>(reader: &mut R) -> Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(ArduPicError::ConnectionClosed);
    }
    Ok(line)
}

#[cfg(feature = "serial")]
pub mod serial {
    //! Serial port transport implementation

    use super::*;
    use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::{BufReader, Write};
    use std::time::Duration;

    /// Default serial device
    pub const DEFAULT_DEVICE: &str = "/dev/ttyACM0";
    /// Default baud rate of the ArduPIC firmware
    pub const DEFAULT_BAUD: u32 = 9600;
    /// Default read timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Serial connection settings
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SerialConfig {
        /// Device path (e.g., "/dev/ttyACM0" or "COM3")
        pub device: String,
        /// Baud rate
        pub baud: u32,
        /// Read timeout
        pub timeout: Duration,
    }

    impl Default for SerialConfig {
        fn default() -> Self {
            Self::new(DEFAULT_DEVICE)
        }
    }

    impl SerialConfig {
        /// Settings for a device with default baud rate and timeout
        pub fn new(device: impl Into<String>) -> Self {
            Self {
                device: device.into(),
                baud: DEFAULT_BAUD,
                timeout: DEFAULT_TIMEOUT,
            }
        }

        /// Set the baud rate
        pub fn with_baud(mut self, baud: u32) -> Self {
            self.baud = baud;
            self
        }

        /// Set the read timeout
        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = timeout;
            self
        }
    }

    /// Serial port transport
    pub struct SerialTransport {
        port: BufReader<Box<dyn SerialPort>>,
    }

    impl SerialTransport {
        /// Open a serial port
        pub fn open(config: &SerialConfig) -> Result<Self> {
            if config.baud == 0 {
                return Err(ArduPicError::InvalidParameter(
                    "baud rate must be positive".into(),
                ));
            }

            let port = serialport::new(config.device.as_str(), config.baud)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(config.timeout)
                .open()?;

            log::info!(
                "Opened serial port {} at {} baud",
                config.device,
                config.baud
            );

            Ok(Self {
                port: BufReader::new(port),
            })
        }
    }

    impl Transport for SerialTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.port.get_mut().write_all(data)?;
            Ok(())
        }

        fn read_line(&mut self) -> Result<String> {
            read_line_from(&mut self.port)
        }

        fn flush(&mut self) -> Result<()> {
            self.port.get_mut().flush()?;
            Ok(())
        }
    }
}
