//! Structured view of the POSIX terminal attribute block.
//!
//! [`TermAttrs`] owns an in-memory `struct termios` and synchronizes it
//! with the kernel only on explicit [`reload`](TermAttrs::reload) and
//! [`apply`](TermAttrs::apply) calls; between those the two copies can
//! diverge freely.

use std::fmt;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;

use libc::{cc_t, speed_t, tcflag_t};

use crate::{Error, Result};

/// Supported baud rates and their termios speed codes.
///
/// Terminal baud generators are fixed-ratio, so a requested rate either
/// matches an entry exactly or is rejected; nothing is rounded.
const SPEED_TABLE: &[(u32, speed_t)] = &[
    (0, libc::B0),
    (50, libc::B50),
    (75, libc::B75),
    (110, libc::B110),
    (134, libc::B134),
    (150, libc::B150),
    (200, libc::B200),
    (300, libc::B300),
    (600, libc::B600),
    (1_200, libc::B1200),
    (1_800, libc::B1800),
    (2_400, libc::B2400),
    (4_800, libc::B4800),
    (9_600, libc::B9600),
    (19_200, libc::B19200),
    (38_400, libc::B38400),
    (57_600, libc::B57600),
    (115_200, libc::B115200),
    (230_400, libc::B230400),
    (460_800, libc::B460800),
    (500_000, libc::B500000),
    (576_000, libc::B576000),
    (921_600, libc::B921600),
    (1_000_000, libc::B1000000),
    (1_152_000, libc::B1152000),
    (1_500_000, libc::B1500000),
    (2_000_000, libc::B2000000),
    (2_500_000, libc::B2500000),
    (3_000_000, libc::B3000000),
    (3_500_000, libc::B3500000),
    (4_000_000, libc::B4000000),
];

fn baud_to_code(baud: u32) -> Option<speed_t> {
    SPEED_TABLE
        .iter()
        .find(|&&(rate, _)| rate == baud)
        .map(|&(_, code)| code)
}

fn code_to_baud(code: speed_t) -> Option<u32> {
    SPEED_TABLE
        .iter()
        .find(|&&(_, c)| c == code)
        .map(|&(rate, _)| rate)
}

pub(crate) fn cvt(res: libc::c_int) -> io::Result<libc::c_int> {
    if res == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(res)
    }
}

/// Which kernel queue to discard when flushing.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum FlushQueue {
    /// Received but unread data.
    Input,
    /// Written but untransmitted data.
    Output,
    /// Both queues.
    Both,
}

impl FlushQueue {
    fn as_raw(self) -> libc::c_int {
        match self {
            FlushQueue::Input => libc::TCIFLUSH,
            FlushQueue::Output => libc::TCOFLUSH,
            FlushQueue::Both => libc::TCIOFLUSH,
        }
    }
}

/// Suspending or restarting transmission in one direction.
///
/// The input actions work by transmitting the configured STOP/START flow
/// control characters to the device.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum FlowAction {
    /// Suspend output.
    SuspendOutput,
    /// Restart suspended output.
    ResumeOutput,
    /// Ask the device to pause sending.
    SuspendInput,
    /// Ask the device to resume sending.
    ResumeInput,
}

impl FlowAction {
    fn as_raw(self) -> libc::c_int {
        match self {
            FlowAction::SuspendOutput => libc::TCOOFF,
            FlowAction::ResumeOutput => libc::TCOON,
            FlowAction::SuspendInput => libc::TCIOFF,
            FlowAction::ResumeInput => libc::TCION,
        }
    }
}

/// An in-memory terminal attribute block, read from and written back to a
/// device file descriptor.
///
/// The handle does not own the descriptor and never closes it; the caller
/// keeps the file open for as long as the attributes are in use.
pub struct TermAttrs {
    inner: libc::termios,
}

impl TermAttrs {
    /// Reads the current attributes of `fd` into a new handle.
    ///
    /// Fails with [`Error::Device`] if `fd` does not refer to a terminal
    /// device.
    pub fn from_fd(fd: RawFd) -> Result<TermAttrs> {
        let mut attrs = TermAttrs {
            inner: unsafe { mem::zeroed() },
        };
        attrs.reload(fd)?;
        Ok(attrs)
    }

    /// Re-reads the kernel's attributes for `fd`, discarding local edits.
    pub fn reload(&mut self, fd: RawFd) -> Result<()> {
        cvt(unsafe { libc::tcgetattr(fd, &mut self.inner) })?;
        Ok(())
    }

    /// Writes the in-memory attributes back to `fd`, taking effect
    /// immediately rather than after pending output drains.
    pub fn apply(&self, fd: RawFd) -> Result<()> {
        cvt(unsafe { libc::tcsetattr(fd, libc::TCSANOW, &self.inner) })?;
        Ok(())
    }

    /// Resets the attribute block to raw mode: non-canonical input, no
    /// echo, no signal generation, no input/output translation. Callers
    /// layer their explicit flag bits on top of this baseline.
    pub fn make_raw(&mut self) {
        unsafe { libc::cfmakeraw(&mut self.inner) };
    }

    pub fn input_flags(&self) -> tcflag_t {
        self.inner.c_iflag
    }

    pub fn set_input_flags(&mut self, flags: tcflag_t) {
        self.inner.c_iflag = flags;
    }

    pub fn output_flags(&self) -> tcflag_t {
        self.inner.c_oflag
    }

    pub fn set_output_flags(&mut self, flags: tcflag_t) {
        self.inner.c_oflag = flags;
    }

    pub fn control_flags(&self) -> tcflag_t {
        self.inner.c_cflag
    }

    pub fn set_control_flags(&mut self, flags: tcflag_t) {
        self.inner.c_cflag = flags;
    }

    pub fn local_flags(&self) -> tcflag_t {
        self.inner.c_lflag
    }

    pub fn set_local_flags(&mut self, flags: tcflag_t) {
        self.inner.c_lflag = flags;
    }

    pub fn line_discipline(&self) -> cc_t {
        self.inner.c_line
    }

    pub fn set_line_discipline(&mut self, line: cc_t) {
        self.inner.c_line = line;
    }

    /// Returns the control character for the given `libc::V*` role index,
    /// or `None` when the index is outside the character array.
    pub fn control_char(&self, index: usize) -> Option<cc_t> {
        self.inner.c_cc.get(index).copied()
    }

    pub fn set_control_char(&mut self, index: usize, value: cc_t) -> Result<()> {
        let slot = self.inner.c_cc.get_mut(index).ok_or_else(|| {
            Error::InvalidConfig(format!("control character index out of range: {}", index))
        })?;
        *slot = value;
        Ok(())
    }

    /// The input speed as a numeric baud rate, or `None` if the stored
    /// speed code is not in the supported table.
    pub fn input_speed(&self) -> Option<u32> {
        code_to_baud(unsafe { libc::cfgetispeed(&self.inner) })
    }

    pub fn output_speed(&self) -> Option<u32> {
        code_to_baud(unsafe { libc::cfgetospeed(&self.inner) })
    }

    /// Sets the input speed. A baud rate outside the supported table is
    /// rejected and the previously stored speed is left untouched.
    pub fn set_input_speed(&mut self, baud: u32) -> Result<()> {
        let code = baud_to_code(baud)
            .ok_or_else(|| Error::InvalidConfig(format!("unsupported baud rate: {}", baud)))?;
        cvt(unsafe { libc::cfsetispeed(&mut self.inner, code) })?;
        Ok(())
    }

    pub fn set_output_speed(&mut self, baud: u32) -> Result<()> {
        let code = baud_to_code(baud)
            .ok_or_else(|| Error::InvalidConfig(format!("unsupported baud rate: {}", baud)))?;
        cvt(unsafe { libc::cfsetospeed(&mut self.inner, code) })?;
        Ok(())
    }
}

impl fmt::Debug for TermAttrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermAttrs")
            .field("input_flags", &self.inner.c_iflag)
            .field("output_flags", &self.inner.c_oflag)
            .field("control_flags", &self.inner.c_cflag)
            .field("local_flags", &self.inner.c_lflag)
            .field("input_speed", &self.input_speed())
            .field("output_speed", &self.output_speed())
            .finish()
    }
}

/// Blocks until all written output has been transmitted.
pub fn drain(fd: RawFd) -> Result<()> {
    cvt(unsafe { libc::tcdrain(fd) })?;
    Ok(())
}

/// Discards untransferred data in the selected kernel queue.
pub fn flush(fd: RawFd, queue: FlushQueue) -> Result<()> {
    cvt(unsafe { libc::tcflush(fd, queue.as_raw()) })?;
    Ok(())
}

/// Transmits a break condition. A `duration` of zero selects the
/// device-specific default length; the meaning of other values is
/// implementation-defined.
pub fn send_break(fd: RawFd, duration: libc::c_int) -> Result<()> {
    cvt(unsafe { libc::tcsendbreak(fd, duration) })?;
    Ok(())
}

/// Suspends or restarts transmission in one direction.
pub fn flow(fd: RawFd, action: FlowAction) -> Result<()> {
    cvt(unsafe { libc::tcflow(fd, action.as_raw()) })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_attrs() -> TermAttrs {
        TermAttrs {
            inner: unsafe { mem::zeroed() },
        }
    }

    #[test]
    fn speed_table_round_trips() {
        for &(baud, _) in SPEED_TABLE {
            let mut attrs = blank_attrs();
            attrs.set_input_speed(baud).unwrap();
            attrs.set_output_speed(baud).unwrap();
            assert_eq!(attrs.input_speed(), Some(baud));
            assert_eq!(attrs.output_speed(), Some(baud));
        }
    }

    #[test]
    fn unsupported_speed_is_rejected_and_leaves_prior_speed() {
        let mut attrs = blank_attrs();
        attrs.set_input_speed(9600).unwrap();
        assert!(attrs.set_input_speed(12345).is_err());
        assert_eq!(attrs.input_speed(), Some(9600));
    }

    #[test]
    fn flag_accessors_mirror_the_block() {
        let mut attrs = blank_attrs();
        attrs.set_input_flags(libc::IGNPAR);
        attrs.set_control_flags(libc::CS7 | libc::CREAD);
        attrs.set_control_char(libc::VSTART, 0x11).unwrap();
        assert_eq!(attrs.input_flags(), libc::IGNPAR);
        assert_eq!(attrs.control_flags(), libc::CS7 | libc::CREAD);
        assert_eq!(attrs.control_char(libc::VSTART), Some(0x11));
    }

    #[test]
    fn control_char_index_past_the_array_is_rejected() {
        let mut attrs = blank_attrs();
        assert_eq!(attrs.control_char(libc::NCCS), None);
        assert!(matches!(
            attrs.set_control_char(libc::NCCS, 0),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn make_raw_disables_canonical_input_and_echo() {
        let mut attrs = blank_attrs();
        attrs.set_local_flags(libc::ICANON | libc::ECHO | libc::ISIG);
        attrs.make_raw();
        assert_eq!(attrs.local_flags() & (libc::ICANON | libc::ECHO | libc::ISIG), 0);
    }

    #[test]
    fn loading_from_a_non_terminal_fails() {
        use std::os::unix::io::AsRawFd;

        let file = std::fs::File::open("/dev/null").unwrap();
        assert!(TermAttrs::from_fd(file.as_raw_fd()).is_err());
    }
}
