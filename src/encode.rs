//! Pure translation from line parameters to termios flag bits.
//!
//! Nothing here performs I/O; the resulting bits are layered onto a
//! [`TermAttrs`](crate::termios::TermAttrs) by the port.

use libc::tcflag_t;

use crate::config::{Parity, ParityErrorAction};
use crate::{Error, Result};

/// Encodes the parity mode and parity-error action into input and control
/// flag bits, returned as `(iflag, cflag)`.
pub fn parity_flags(parity: Parity, action: ParityErrorAction) -> (tcflag_t, tcflag_t) {
    let iflag = match action {
        ParityErrorAction::Ignore => libc::IGNPAR,
        ParityErrorAction::Mark => libc::PARMRK,
    };
    let cflag = match parity {
        Parity::None => 0,
        Parity::Even => libc::PARENB,
        Parity::Odd => libc::PARENB | libc::PARODD,
    };
    (iflag, cflag)
}

/// Encodes the stop bit count into control flag bits. Any count above one
/// selects two stop bits; there is no three-stop-bit line mode.
pub fn stop_bit_flags(stop_bits: u8) -> tcflag_t {
    if stop_bits > 1 {
        libc::CSTOPB
    } else {
        0
    }
}

/// Encodes the data bit count into character-size control flag bits.
///
/// Counts above 8 clamp to the 8-bit word size; counts below 5 have no
/// termios representation and fail with
/// [`InvalidConfig`](crate::Error::InvalidConfig).
pub fn data_bit_flags(data_bits: u8) -> Result<tcflag_t> {
    match data_bits {
        8.. => Ok(libc::CS8),
        7 => Ok(libc::CS7),
        6 => Ok(libc::CS6),
        5 => Ok(libc::CS5),
        _ => Err(Error::InvalidConfig(format!(
            "unsupported data bit count: {}",
            data_bits
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_none_leaves_control_flags_clear() {
        let (iflag, cflag) = parity_flags(Parity::None, ParityErrorAction::Ignore);
        assert_eq!(iflag, libc::IGNPAR);
        assert_eq!(cflag, 0);
    }

    #[test]
    fn parity_even_sets_enable_bit_only() {
        let (_, cflag) = parity_flags(Parity::Even, ParityErrorAction::Ignore);
        assert_eq!(cflag, libc::PARENB);
        assert_eq!(cflag & libc::PARODD, 0);
    }

    #[test]
    fn parity_odd_sets_enable_and_odd_bits() {
        let (_, cflag) = parity_flags(Parity::Odd, ParityErrorAction::Ignore);
        assert_eq!(cflag, libc::PARENB | libc::PARODD);
    }

    #[test]
    fn mark_action_selects_mark_input_flag() {
        let (iflag, _) = parity_flags(Parity::None, ParityErrorAction::Mark);
        assert_eq!(iflag, libc::PARMRK);
    }

    #[test]
    fn one_stop_bit_adds_no_flag() {
        assert_eq!(stop_bit_flags(1), 0);
        assert_eq!(stop_bit_flags(0), 0);
    }

    #[test]
    fn more_than_one_stop_bit_selects_two() {
        assert_eq!(stop_bit_flags(2), libc::CSTOPB);
        assert_eq!(stop_bit_flags(100), libc::CSTOPB);
    }

    #[test]
    fn data_bits_map_to_word_sizes() {
        assert_eq!(data_bit_flags(5).unwrap(), libc::CS5);
        assert_eq!(data_bit_flags(6).unwrap(), libc::CS6);
        assert_eq!(data_bit_flags(7).unwrap(), libc::CS7);
        assert_eq!(data_bit_flags(8).unwrap(), libc::CS8);
    }

    #[test]
    fn data_bits_above_eight_clamp_to_eight() {
        assert_eq!(data_bit_flags(9).unwrap(), data_bit_flags(8).unwrap());
    }

    #[test]
    fn data_bits_below_five_are_rejected() {
        assert!(data_bit_flags(4).is_err());
        assert!(data_bit_flags(0).is_err());
    }
}
