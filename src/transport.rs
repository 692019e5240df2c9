//! Transport abstraction over the serial link.
//!
//! The protocol engine never touches `serialport` directly; it drives a
//! [`Transport`], which adds the device-specific lifecycle operations the
//! resync/stop sequences need (close-and-reopen with a settle delay, buffer
//! flushes) on top of blocking reads and writes.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use log::debug;
use serialport::{ClearBuffer, SerialPort};

use crate::errors::{Result, RfeError};

/// Fixed baud rate of the RF Explorer serial link.
pub const BAUD_RATE: u32 = 2400;

/// Fixed blocking-read timeout for the port.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking byte transport with the lifecycle hooks the device requires.
pub trait Transport: Read + Write + Send {
    /// Close the underlying device, wait `settle`, and open it again.
    fn reopen(&mut self, settle: Duration) -> Result<()>;

    /// Discard any buffered input.
    fn clear_input(&mut self) -> Result<()>;

    /// Discard any not-yet-transmitted output.
    fn clear_output(&mut self) -> Result<()>;
}

/// The real serial port, opened at the fixed protocol baud rate and timeout.
///
/// Keeps its path so the resync and stop sequences can cycle the device
/// object without involving the caller.
pub struct SerialTransport {
    path: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Open the port at `path` with the protocol's fixed parameters.
    pub fn open(path: &str) -> Result<Self> {
        let port = open_port(path)?;
        Ok(Self {
            path: path.to_string(),
            port: Some(port),
        })
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is closed"))
    }
}

fn open_port(path: &str) -> Result<Box<dyn SerialPort>> {
    serialport::new(path, BAUD_RATE)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|e| RfeError::PortUnavailable(format!("{path}: {e}")))
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port_mut()?.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port_mut()?.flush()
    }
}

impl Transport for SerialTransport {
    fn reopen(&mut self, settle: Duration) -> Result<()> {
        debug!("cycling serial port {}", self.path);
        self.port = None;
        thread::sleep(settle);
        self.port = Some(open_port(&self.path)?);
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port_mut()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn clear_output(&mut self) -> Result<()> {
        self.port_mut()?.clear(ClearBuffer::Output)?;
        Ok(())
    }
}

// ============================================================================
// Test double
// ============================================================================
