pub type Result<T> = std::result::Result<T, Error>;

/// An error with serial line configuration or device I/O
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A line parameter was outside the supported domain (bad data bit
    /// count, unsupported baud rate, missing device path). Always raised
    /// before the configuration touches the device.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An OS-level call (open, get/set attributes, read, write, poll)
    /// failed; carries the underlying OS error.
    #[error("device error: {0}")]
    Device(#[from] std::io::Error),
}
