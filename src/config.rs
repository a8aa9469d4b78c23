use std::fmt;

/// Parity bit modes.
///
/// `None` omits the parity bit; `Even` and `Odd` count the total number of
/// 1-bits in each character.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Parity::None => write!(f, "None"),
            Parity::Even => write!(f, "Even"),
            Parity::Odd => write!(f, "Odd"),
        }
    }
}

/// What the line discipline does with a byte that failed its parity check.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ParityErrorAction {
    /// Drop the offending byte.
    Ignore,
    /// Prefix the offending byte with `0xFF 0x00` in the input stream.
    Mark,
}

/// Line parameters for a serial device.
///
/// Values are validated when the configuration is applied to a device:
/// data bit counts below 5 and baud rates outside the supported speed
/// table are rejected with [`Error::InvalidConfig`](crate::Error) before
/// any attribute reaches the kernel.
#[derive(Debug, Clone, Copy)]
pub struct LineConfig {
    /// Baud rate in bits per second. Must be an exact member of the
    /// supported speed table; unsupported rates are rejected, never
    /// rounded to a neighboring rate.
    pub baud: u32,
    /// Data bits per character, 5 through 8. Values above 8 encode the
    /// same as 8.
    pub data_bits: u8,
    /// Stop bits; any value above 1 selects two stop bits.
    pub stop_bits: u8,
    pub parity: Parity,
    pub parity_errors: ParityErrorAction,
    /// RTS/CTS hardware flow control.
    pub hardware_flow_control: bool,
}

impl Default for LineConfig {
    fn default() -> Self {
        LineConfig {
            baud: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            parity_errors: ParityErrorAction::Ignore,
            hardware_flow_control: false,
        }
    }
}
