use std::time::Duration;

use crate::config::{LineConfig, Parity, ParityErrorAction};
use crate::port::SerialPort;
use crate::{Error, Result};

/// Configures and opens a [`SerialPort`], starting from the conventional
/// defaults (9600 baud, 8 data bits, 1 stop bit, no parity, no hardware
/// flow control).
///
/// ```no_run
/// use serline::PortBuilder;
///
/// let port = PortBuilder::new("/dev/ttyUSB0")
///     .baud(19200)
///     .data_bits(7)
///     .open()?;
/// # Ok::<(), serline::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct PortBuilder {
    path: String,
    config: LineConfig,
    read_timeout: Option<Duration>,
    write_read_delay: Option<Duration>,
}

impl PortBuilder {
    pub fn new(path: impl Into<String>) -> PortBuilder {
        PortBuilder {
            path: path.into(),
            config: LineConfig::default(),
            read_timeout: None,
            write_read_delay: None,
        }
    }

    pub fn baud(mut self, baud: u32) -> PortBuilder {
        self.config.baud = baud;
        self
    }

    pub fn data_bits(mut self, data_bits: u8) -> PortBuilder {
        self.config.data_bits = data_bits;
        self
    }

    pub fn stop_bits(mut self, stop_bits: u8) -> PortBuilder {
        self.config.stop_bits = stop_bits;
        self
    }

    pub fn parity(mut self, parity: Parity) -> PortBuilder {
        self.config.parity = parity;
        self
    }

    pub fn parity_errors(mut self, action: ParityErrorAction) -> PortBuilder {
        self.config.parity_errors = action;
        self
    }

    pub fn hardware_flow_control(mut self, enabled: bool) -> PortBuilder {
        self.config.hardware_flow_control = enabled;
        self
    }

    /// Overrides the port's default one-second read timeout. When not
    /// set, the default stands.
    pub fn read_timeout(mut self, timeout: Duration) -> PortBuilder {
        self.read_timeout = Some(timeout);
        self
    }

    /// Inserts a pause between the write and the readiness check of
    /// [`write_read`](SerialPort::write_read) transactions.
    pub fn write_read_delay(mut self, delay: Duration) -> PortBuilder {
        self.write_read_delay = Some(delay);
        self
    }

    /// Opens the device; the caller owns the port's lifecycle.
    pub fn open(self) -> Result<SerialPort> {
        if self.path.is_empty() {
            return Err(Error::InvalidConfig("device path is required".to_owned()));
        }
        let mut port = SerialPort::open(&self.path, &self.config)?;
        if let Some(timeout) = self.read_timeout {
            port.set_read_timeout(timeout);
        }
        port.set_write_read_delay(self.write_read_delay);
        Ok(port)
    }

    /// Opens the device, hands the port to `f`, and closes it again on
    /// every exit path, releasing the descriptor and the advisory lock
    /// whether `f` succeeds or fails.
    pub fn open_scoped<T, F>(self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SerialPort) -> Result<T>,
    {
        let mut port = self.open()?;
        let result = f(&mut port);
        let closed = port.close();
        let value = result?;
        closed?;
        Ok(value)
    }
}
