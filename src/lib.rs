//! Serial line configuration and I/O over POSIX terminal control
//!
//! Opens a serial device, takes an exclusive advisory lock, translates
//! line parameters (baud rate, data bits, stop bits, parity, hardware
//! flow control) into raw termios attributes, and performs
//! timeout-bounded read/write transactions against the device.
//!
//! # Usage
//! ```no_run
//! use std::time::Duration;
//! use serline::{PortBuilder, ReadMode};
//!
//! fn main() -> Result<(), serline::Error> {
//!     PortBuilder::new("/dev/ttyUSB0").baud(19200).open_scoped(|port| {
//!         let reply = port.write_read(b"AT\r\n", Some(Duration::from_secs(2)), ReadMode::All)?;
//!         println!("reply: {:?}", reply);
//!         Ok(())
//!     })
//! }
//! ```
//!
//! All I/O is synchronous and blocking; readiness checks bound the wait
//! with a timeout, and timeouts surface as `false`/`None` values rather
//! than errors. The crate targets POSIX terminal attribute control and
//! does not abstract over other line-discipline APIs.

mod builder;
pub use builder::PortBuilder;

mod config;
pub use config::{LineConfig, Parity, ParityErrorAction};

pub mod encode;

mod error;
pub use error::Error;
use error::Result;

mod port;
pub use port::{ReadMode, SerialPort, DEFAULT_READ_SIZE};

pub mod termios;
