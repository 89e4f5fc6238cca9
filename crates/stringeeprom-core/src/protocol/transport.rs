//! Line-oriented link transport
//!
//! Wraps the raw serial handle behind a narrow I/O trait and assembles
//! incoming bytes into newline-terminated lines. Dropping the transport
//! closes the port.

use std::io::{self, Read, Write};

use serialport::SerialPort;

use super::{clear_buffers, configure_port, open_port, LinkError, MAX_LINE_LEN};

/// Narrow I/O seam over the physical link.
///
/// Exists so the session engine can be driven by anything line-shaped;
/// tests substitute a scripted channel here.
pub trait LinkChannel: Send {
    /// Read available bytes, blocking at most the link's read timeout.
    /// A timeout surfaces as `ErrorKind::TimedOut`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all bytes to the link
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Flush buffered output to the wire
    fn flush(&mut self) -> io::Result<()>;
}

/// Serial port implementation of [`LinkChannel`]
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an already-configured serial port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl LinkChannel for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.port.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

/// Line-assembling transport over an open link
pub struct LineTransport {
    chan: Box<dyn LinkChannel>,
    pending: Vec<u8>,
}

impl LineTransport {
    /// Open and configure the named serial port
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, LinkError> {
        let mut port = open_port(port_name, baud_rate)?;
        configure_port(port.as_mut())?;
        clear_buffers(port.as_mut())?;
        Ok(Self::from_channel(Box::new(SerialChannel::new(port))))
    }

    /// Build a transport over an arbitrary channel
    pub fn from_channel(chan: Box<dyn LinkChannel>) -> Self {
        Self {
            chan,
            pending: Vec::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Write one newline-terminated line.
    ///
    /// The terminator goes out in the same write as the text so a
    /// concurrent probe cannot split a command on the wire.
    pub fn write_line(&mut self, text: &str) -> Result<(), LinkError> {
        let mut framed = Vec::with_capacity(text.len() + 1);
        framed.extend_from_slice(text.as_bytes());
        framed.push(b'\n');
        self.chan
            .write_all(&framed)
            .and_then(|_| self.chan.flush())
            .map_err(LinkError::from_io)
    }

    /// Zero-byte liveness write.
    ///
    /// Carries no protocol meaning; a severed link fails the flush even
    /// when no data is pending in either direction.
    pub fn probe(&mut self) -> Result<(), LinkError> {
        self.chan
            .write_all(&[])
            .and_then(|_| self.chan.flush())
            .map_err(LinkError::from_io)
    }

    /// Try to read the next complete line within the link's read timeout.
    ///
    /// Returns `Ok(None)` when no full line arrived in time — that is the
    /// poll loop's cancellation point, not an error. Partial input stays
    /// buffered for the next call. Lines are newline-stripped (`\r\n`
    /// included) and lossily UTF-8 decoded.
    pub fn try_read_line(&mut self) -> Result<Option<String>, LinkError> {
        if let Some(line) = self.take_buffered_line() {
            return Ok(Some(line));
        }

        let mut buf = [0u8; 256];
        match self.chan.read(&mut buf) {
            Ok(0) => Err(LinkError::PortClosed),
            Ok(n) => {
                self.pending.extend_from_slice(&buf[..n]);
                // Bound the accumulator if the device floods without a
                // newline; the oversized chunk is surfaced as-is.
                if self.pending.len() > MAX_LINE_LEN * 16 && !self.pending.contains(&b'\n') {
                    let chunk = std::mem::take(&mut self.pending);
                    return Ok(Some(String::from_utf8_lossy(&chunk).into_owned()));
                }
                Ok(self.take_buffered_line())
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(None)
            }
            Err(e) => Err(LinkError::from_io(e)),
        }
    }

    fn take_buffered_line(&mut self) -> Option<String> {
        let idx = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=idx).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}
