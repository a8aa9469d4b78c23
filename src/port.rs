use log::{debug, trace, warn};
use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};
use std::{fs, thread};

use crate::config::LineConfig;
use crate::encode;
use crate::termios::{self, cvt, TermAttrs};
use crate::Result;

/// Default per-read buffer size in bytes.
pub const DEFAULT_READ_SIZE: usize = 1024;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// How [`SerialPort::write_read`] reads the response after the readiness
/// check succeeds.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub enum ReadMode {
    /// Drain everything that arrives within the timeout window.
    #[default]
    All,
    /// Read bytes up to and including the next line feed.
    Line,
    /// Read at most this many bytes in a single read.
    Exact(usize),
}

/// An exclusively owned serial device.
///
/// Opening configures the line and switches it to raw mode; the port then
/// performs blocking, timeout-gated I/O directly on the descriptor. The
/// port holds the only handle used for I/O, and an advisory lock guards
/// against other processes opening the same device.
///
/// The raw [`read`](SerialPort::read) and [`write`](SerialPort::write)
/// calls can block indefinitely; gate them behind
/// [`is_readable`](SerialPort::is_readable) /
/// [`is_writable`](SerialPort::is_writable) when bounded waiting is
/// needed.
#[derive(Debug)]
pub struct SerialPort {
    file: fs::File,
    attrs: TermAttrs,
    path: String,
    read_timeout: Duration,
    read_size: usize,
    write_read_delay: Option<Duration>,
}

impl SerialPort {
    /// Opens and configures the device at `path`.
    ///
    /// The device is opened read-write without becoming the controlling
    /// terminal. Failure to take the exclusive advisory lock is logged as
    /// a warning and does not fail the open, since shared access is
    /// tolerated by some devices. Line flags are computed from `config`
    /// before any syscall, so an invalid configuration never partially
    /// applies.
    pub fn open(path: &str, config: &LineConfig) -> Result<SerialPort> {
        let (iflag, mut cflag) = encode::parity_flags(config.parity, config.parity_errors);
        cflag |= encode::data_bit_flags(config.data_bits)?;
        cflag |= encode::stop_bit_flags(config.stop_bits);
        // Always enable the receiver, and ignore modem control lines so a
        // missing carrier cannot stall the line.
        cflag |= libc::CREAD | libc::CLOCAL;
        if config.hardware_flow_control {
            cflag |= libc::CRTSCTS;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)?;
        let fd = file.as_raw_fd();

        if unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) } != 0 {
            warn!(
                "could not lock {}: serial device is in use by another process ({})",
                path,
                io::Error::last_os_error()
            );
        }

        let mut attrs = TermAttrs::from_fd(fd)?;
        attrs.make_raw();
        attrs.set_input_flags(attrs.input_flags() | iflag);
        let kept = attrs.control_flags()
            & !(libc::CSIZE | libc::PARENB | libc::PARODD | libc::CSTOPB | libc::CRTSCTS);
        attrs.set_control_flags(kept | cflag);
        // Conventional XON/XOFF bytes; these stay configured even though
        // raw mode leaves software flow control off.
        attrs.set_control_char(libc::VSTART, 0x11)?;
        attrs.set_control_char(libc::VSTOP, 0x13)?;
        attrs.set_input_speed(config.baud)?;
        attrs.set_output_speed(config.baud)?;
        attrs.apply(fd)?;

        debug!("opened {} at {} baud", path, config.baud);

        Ok(SerialPort {
            file,
            attrs,
            path: path.to_owned(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            read_size: DEFAULT_READ_SIZE,
            write_read_delay: None,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The terminal attributes as last loaded or applied by this port.
    pub fn attrs(&self) -> &TermAttrs {
        &self.attrs
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Sets the default timeout used by readiness checks and
    /// [`read_all`](SerialPort::read_all).
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    pub fn read_size(&self) -> usize {
        self.read_size
    }

    pub fn set_read_size(&mut self, size: usize) {
        self.read_size = size;
    }

    /// Sets the pause inserted between the write and the readiness check
    /// of [`write_read`](SerialPort::write_read). Slow devices need a
    /// moment before their response starts arriving.
    pub fn set_write_read_delay(&mut self, delay: Option<Duration>) {
        self.write_read_delay = delay;
    }

    /// Writes `data` with a single syscall and returns the number of
    /// bytes accepted, which may be less than `data.len()`. Partial
    /// writes are not retried here.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let written = (&self.file).write(data)?;
        trace!("wrote {} of {} bytes", written, data.len());
        Ok(written)
    }

    /// Reads once with the default buffer size, blocking until at least
    /// one byte is available.
    pub fn read(&mut self) -> Result<Vec<u8>> {
        let size = self.read_size;
        self.read_bytes(size)
    }

    /// Reads once into a buffer of at most `max_bytes`, blocking until at
    /// least one byte is available.
    pub fn read_bytes(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max_bytes];
        let count = (&self.file).read(&mut buf)?;
        buf.truncate(count);
        trace!("read {} bytes", count);
        Ok(buf)
    }

    /// Reads bytes one at a time up to and including the next line feed.
    pub fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            if (&self.file).read(&mut byte)? == 0 {
                break;
            }
            buf.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        Ok(buf)
    }

    /// Reads until `pattern` appears at the end of the received bytes,
    /// returning everything read including the pattern, or `None` when
    /// the device stays silent for `timeout` before the pattern arrives.
    ///
    /// Bytes consumed before an expired window are discarded with it.
    /// Like [`read_all`](SerialPort::read_all), every received byte
    /// restarts the timeout window.
    pub fn read_until(
        &mut self,
        pattern: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Option<Vec<u8>>> {
        if pattern.is_empty() {
            return Ok(Some(Vec::new()));
        }
        let mut buf = Vec::new();
        loop {
            if !self.is_readable(timeout)? {
                return Ok(None);
            }
            let mut byte = [0u8; 1];
            if (&self.file).read(&mut byte)? == 0 {
                return Ok(None);
            }
            buf.push(byte[0]);
            if buf.ends_with(pattern) {
                return Ok(Some(buf));
            }
        }
    }

    /// Returns `true` as soon as the device has data to read, or `false`
    /// once `timeout` (default: the port's read timeout) expires.
    pub fn is_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        self.wait_ready(libc::POLLIN, timeout)
    }

    /// Returns `true` as soon as the device can accept output, or `false`
    /// once `timeout` expires.
    pub fn is_writable(&self, timeout: Option<Duration>) -> Result<bool> {
        self.wait_ready(libc::POLLOUT, timeout)
    }

    // Single-descriptor poll(2) against a deadline. An interrupted wait
    // resumes with the remaining time, so signals neither abort the wait
    // nor extend it.
    fn wait_ready(&self, events: libc::c_short, timeout: Option<Duration>) -> Result<bool> {
        let timeout = timeout.unwrap_or(self.read_timeout);
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let millis = remaining.as_millis().min(i32::MAX as u128) as libc::c_int;
            let mut pollfd = libc::pollfd {
                fd: self.file.as_raw_fd(),
                events,
                revents: 0,
            };
            match cvt(unsafe { libc::poll(&mut pollfd, 1, millis) }) {
                Ok(0) => return Ok(false),
                Ok(_) => return Ok(true),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Drains whatever arrives within the timeout window, returning
    /// `None` if nothing arrived at all.
    ///
    /// Each received chunk restarts the window: a steady trickle of data
    /// keeps the call alive well past a single `timeout` period. Callers
    /// that need a hard deadline must enforce it themselves.
    pub fn read_all(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        let timeout = timeout.unwrap_or(self.read_timeout);
        let mut buf: Option<Vec<u8>> = None;
        while self.is_readable(Some(timeout))? {
            let chunk = self.read()?;
            if chunk.is_empty() {
                // Hangup: poll stays ready but reads return nothing.
                break;
            }
            buf.get_or_insert_with(Vec::new).extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    /// Writes `data`, waits once for the device to become readable, and
    /// reads the response according to `mode`.
    ///
    /// Returns `None` without reading when no response arrives within
    /// `timeout`. This is the request/response primitive for
    /// command-style serial protocols.
    pub fn write_read(
        &mut self,
        data: &[u8],
        timeout: Option<Duration>,
        mode: ReadMode,
    ) -> Result<Option<Vec<u8>>> {
        self.write(data)?;
        if let Some(delay) = self.write_read_delay {
            thread::sleep(delay);
        }
        if !self.is_readable(timeout)? {
            return Ok(None);
        }
        match mode {
            ReadMode::All => self.read_all(timeout),
            ReadMode::Line => self.read_line().map(Some),
            ReadMode::Exact(count) => self.read_bytes(count).map(Some),
        }
    }

    /// Waits for pending output to transmit, releases the advisory lock,
    /// and closes the device. Consuming the port makes use after close
    /// impossible.
    pub fn close(self) -> Result<()> {
        let fd = self.file.as_raw_fd();
        termios::drain(fd)?;
        cvt(unsafe { libc::flock(fd, libc::LOCK_UN) })?;
        debug!("closed {}", self.path);
        Ok(())
    }

    /// Discards untransferred data in the selected kernel queue.
    pub fn flush(&mut self, queue: termios::FlushQueue) -> Result<()> {
        termios::flush(self.file.as_raw_fd(), queue)
    }

    /// Transmits a break condition; zero selects the device-specific
    /// default duration.
    pub fn send_break(&mut self, duration: i32) -> Result<()> {
        termios::send_break(self.file.as_raw_fd(), duration)
    }

    /// Suspends or restarts transmission in one direction.
    pub fn flow(&mut self, action: termios::FlowAction) -> Result<()> {
        termios::flow(self.file.as_raw_fd(), action)
    }
}

impl AsRawFd for SerialPort {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

// Allocates a pseudo-terminal and returns the master side plus the slave
// device path, so tests exercise the real open path.
#[cfg(test)]
pub(crate) fn open_test_pty() -> (fs::File, String) {
    use std::ffi::CStr;
    use std::os::unix::io::FromRawFd;
    use std::ptr;

    let mut master: libc::c_int = -1;
    let mut slave: libc::c_int = -1;
    let mut name = [0 as libc::c_char; 128];
    let ret = unsafe {
        libc::openpty(
            &mut master,
            &mut slave,
            name.as_mut_ptr(),
            ptr::null_mut(),
            ptr::null_mut(),
        )
    };
    assert_eq!(ret, 0, "openpty failed");
    let path = unsafe { CStr::from_ptr(name.as_ptr()) }
        .to_str()
        .unwrap()
        .to_owned();
    // The port reopens the slave by path.
    unsafe { libc::close(slave) };
    (unsafe { fs::File::from_raw_fd(master) }, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parity;

    const POLL_TIMEOUT: Option<Duration> = Some(Duration::from_millis(200));

    fn open_pty() -> (fs::File, String) {
        open_test_pty()
    }

    #[test]
    fn open_applies_line_configuration() {
        let (_master, path) = open_pty();
        let config = LineConfig {
            baud: 19200,
            data_bits: 7,
            ..Default::default()
        };
        let port = SerialPort::open(&path, &config).unwrap();

        let attrs = port.attrs();
        assert_eq!(attrs.control_flags() & libc::CSIZE, libc::CS7);
        assert_eq!(attrs.control_flags() & libc::PARENB, 0);
        assert_ne!(attrs.control_flags() & libc::CREAD, 0);
        assert_ne!(attrs.control_flags() & libc::CLOCAL, 0);
        assert_eq!(attrs.control_char(libc::VSTART), Some(0x11));
        assert_eq!(attrs.control_char(libc::VSTOP), Some(0x13));
        assert_eq!(attrs.input_speed(), Some(19200));
        assert_eq!(attrs.output_speed(), Some(19200));
    }

    #[test]
    fn open_rejects_unsupported_baud_rate() {
        let (_master, path) = open_pty();
        let config = LineConfig {
            baud: 12345,
            ..Default::default()
        };
        assert!(matches!(
            SerialPort::open(&path, &config),
            Err(crate::Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn open_missing_device_fails() {
        let result = SerialPort::open("/dev/serline-does-not-exist", &LineConfig::default());
        assert!(matches!(result, Err(crate::Error::Device(_))));
    }

    #[test]
    fn second_open_survives_held_lock() {
        let (_master, path) = open_pty();
        let first = SerialPort::open(&path, &LineConfig::default()).unwrap();
        // Lock contention is a warning, not a failure.
        let second = SerialPort::open(&path, &LineConfig::default()).unwrap();
        drop(second);
        first.close().unwrap();
    }

    #[test]
    fn close_releases_the_lock_for_the_next_open() {
        let (_master, path) = open_pty();
        let port = SerialPort::open(&path, &LineConfig::default()).unwrap();
        port.close().unwrap();
        let reopened = SerialPort::open(&path, &LineConfig::default()).unwrap();
        reopened.close().unwrap();
    }

    #[test]
    fn read_all_returns_none_on_silence() {
        let (_master, path) = open_pty();
        let mut port = SerialPort::open(&path, &LineConfig::default()).unwrap();
        assert_eq!(port.read_all(POLL_TIMEOUT).unwrap(), None);
    }

    #[test]
    fn read_all_drains_available_data() {
        let (mut master, path) = open_pty();
        let mut port = SerialPort::open(&path, &LineConfig::default()).unwrap();
        master.write_all(b"sensor: 42\r\n").unwrap();
        let data = port.read_all(POLL_TIMEOUT).unwrap();
        assert_eq!(data.as_deref(), Some(&b"sensor: 42\r\n"[..]));
    }

    #[test]
    fn write_read_returns_none_without_response() {
        let (_master, path) = open_pty();
        let mut port = SerialPort::open(&path, &LineConfig::default()).unwrap();
        let reply = port.write_read(b"PING\r\n", POLL_TIMEOUT, ReadMode::All).unwrap();
        assert_eq!(reply, None);
    }

    #[test]
    fn write_read_line_mode_stops_at_the_terminator() {
        let (mut master, path) = open_pty();
        let mut port = SerialPort::open(&path, &LineConfig::default()).unwrap();
        master.write_all(b"pong\nextra").unwrap();
        let reply = port
            .write_read(b"ping\n", POLL_TIMEOUT, ReadMode::Line)
            .unwrap();
        assert_eq!(reply.as_deref(), Some(&b"pong\n"[..]));

        let mut echoed = [0u8; 5];
        master.read_exact(&mut echoed).unwrap();
        assert_eq!(&echoed, b"ping\n");
    }

    #[test]
    fn write_read_exact_mode_reads_the_requested_count() {
        let (mut master, path) = open_pty();
        let mut port = SerialPort::open(&path, &LineConfig::default()).unwrap();
        master.write_all(b"abcdef").unwrap();
        let reply = port
            .write_read(b"?", POLL_TIMEOUT, ReadMode::Exact(4))
            .unwrap();
        assert_eq!(reply.as_deref(), Some(&b"abcd"[..]));
    }

    #[test]
    fn port_with_connected_peer_is_writable() {
        let (_master, path) = open_pty();
        let port = SerialPort::open(&path, &LineConfig::default()).unwrap();
        assert!(port.is_writable(POLL_TIMEOUT).unwrap());
        assert!(!port.is_readable(POLL_TIMEOUT).unwrap());
    }

    #[test]
    fn read_until_stops_at_the_pattern() {
        let (mut master, path) = open_pty();
        let mut port = SerialPort::open(&path, &LineConfig::default()).unwrap();
        master.write_all(b"ELM327 v1.5\r\r>AT").unwrap();
        let data = port.read_until(b"\r>", POLL_TIMEOUT).unwrap();
        assert_eq!(data.as_deref(), Some(&b"ELM327 v1.5\r\r>"[..]));
    }

    #[test]
    fn read_until_returns_none_when_the_pattern_never_arrives() {
        let (mut master, path) = open_pty();
        let mut port = SerialPort::open(&path, &LineConfig::default()).unwrap();
        master.write_all(b"partial data").unwrap();
        assert_eq!(port.read_until(b">", POLL_TIMEOUT).unwrap(), None);
    }

    #[test]
    fn flow_suspend_and_resume_keep_the_line_usable() {
        use crate::termios::FlowAction;

        let (mut master, path) = open_pty();
        let mut port = SerialPort::open(&path, &LineConfig::default()).unwrap();
        port.flow(FlowAction::SuspendOutput).unwrap();
        port.flow(FlowAction::ResumeOutput).unwrap();

        port.write(b"after resume").unwrap();
        let mut buf = [0u8; 12];
        master.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"after resume");
    }

    #[test]
    fn send_break_accepts_a_duration() {
        let (_master, path) = open_pty();
        let mut port = SerialPort::open(&path, &LineConfig::default()).unwrap();
        port.send_break(0).unwrap();
    }

    #[test]
    fn odd_parity_sets_both_parity_bits() {
        let (_master, path) = open_pty();
        let config = LineConfig {
            parity: Parity::Odd,
            ..Default::default()
        };
        let port = SerialPort::open(&path, &config).unwrap();
        let cflag = port.attrs().control_flags();
        assert_ne!(cflag & libc::PARENB, 0);
        assert_ne!(cflag & libc::PARODD, 0);
    }
}
