//! Connection lifecycle and handshake state machine.
//!
//! The RF Explorer starts streaming after a GO command, but replies on its
//! control channel first. When the host and device fall out of step (a busy
//! device keeps emitting data lines after STOP, or a partial line is left in
//! the OS buffer), the only reliable recovery the firmware supports is to
//! cycle the port: STOP, close, wait, reopen, flush, GO again. The settle
//! delays below are a timing dependency of the firmware itself, not tunable
//! by protocol content.

use std::io;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::errors::{Result, RfeError};
use crate::frame::{self, Command};
use crate::transport::Transport;

/// Settle delay between closing and reopening the port during resync.
const RESYNC_SETTLE: Duration = Duration::from_millis(250);

/// Settle delay between each step of the stop teardown sequence.
const STOP_SETTLE: Duration = Duration::from_millis(500);

/// Resync attempts allowed before the handshake is declared dead.
/// The legacy behavior retried forever; that is a liveness bug, not a feature.
const MAX_RESYNC_ATTEMPTS: u32 = 8;

/// Upper bound on one protocol line. Control and config lines are short;
/// data lines carry one byte per bin plus escaping overhead.
const MAX_LINE_LEN: usize = 4096;

/// Where the connection currently stands in the handshake state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
    AwaitingReady,
    Ready,
    Resyncing,
    Stopped,
}

/// Owns the transport and drives the open/handshake/resync state machine.
///
/// Exactly one `ConnectionManager` owns one device for the lifetime of a
/// connection; nothing here is shared across threads.
pub struct ConnectionManager {
    transport: Box<dyn Transport>,
    state: ConnectionState,
}

impl ConnectionManager {
    /// Open the serial device at `path` with the protocol's fixed parameters.
    pub fn open_serial(path: &str) -> Result<Self> {
        let transport = crate::transport::SerialTransport::open(path)?;
        Ok(Self::from_transport(Box::new(transport)))
    }

    /// Wrap an already-open transport. This is how tests inject a scripted
    /// device, and how alternative links would plug in.
    pub fn from_transport(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            state: ConnectionState::Open,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Send GO and negotiate readiness, returning the device info string
    /// from the `#C2-M` frame.
    ///
    /// If the first response is anything else, the device is out of step and
    /// the resync sequence runs: STOP, cycle the port, flush stale input,
    /// resend GO. During resync any `#C`-keyed control line counts as ready.
    /// The loop is bounded; exceeding it fails with `HandshakeTimeout`.
    pub fn handshake(&mut self) -> Result<String> {
        self.send_command(&Command::Go)?;
        self.state = ConnectionState::AwaitingReady;

        let mut last_line = self.read_line_lossy()?;
        if let Some(info) = frame::parse_ready_frame(&last_line) {
            self.state = ConnectionState::Ready;
            debug!("device ready: {info}");
            return Ok(info.to_string());
        }

        for attempt in 1..=MAX_RESYNC_ATTEMPTS {
            self.state = ConnectionState::Resyncing;
            debug!("handshake out of sync (got {last_line:?}), resync attempt {attempt}");
            self.send_command(&Command::Stop)?;
            self.transport.reopen(RESYNC_SETTLE)?;
            self.transport.clear_input()?;
            self.send_command(&Command::Go)?;
            self.state = ConnectionState::AwaitingReady;

            last_line = self.read_line_lossy()?;
            if let Some(info) = frame::parse_control_frame(&last_line) {
                self.state = ConnectionState::Ready;
                debug!("device ready after {attempt} resync attempts: {info}");
                return Ok(info.to_string());
            }
        }

        warn!("device never reached ready state, giving up");
        Err(RfeError::HandshakeTimeout {
            attempts: MAX_RESYNC_ATTEMPTS,
        })
    }

    /// Halt streaming and tear the connection down to a quiescent state.
    ///
    /// The device needs time to finish its own teardown between every step,
    /// so each one is followed by a fixed settle pause: STOP, cycle the
    /// port, flush input, flush output.
    pub fn stop(&mut self) -> Result<()> {
        self.send_command(&Command::Stop)?;
        thread::sleep(STOP_SETTLE);
        self.transport.reopen(STOP_SETTLE)?;
        thread::sleep(STOP_SETTLE);
        self.transport.clear_input()?;
        thread::sleep(STOP_SETTLE);
        self.transport.clear_output()?;
        thread::sleep(STOP_SETTLE);
        self.state = ConnectionState::Stopped;
        Ok(())
    }

    /// Encode and write one command frame.
    pub fn send_command(&mut self, cmd: &Command) -> Result<()> {
        let bytes = frame::encode_command(cmd);
        debug!("sending command {cmd:?}");
        self.transport
            .write_all(&bytes)
            .and_then(|_| self.transport.flush())
            .map_err(|e| RfeError::Write(format!("{cmd:?}: {e}")))
    }

    /// Read one `\n`-terminated line, byte at a time.
    ///
    /// A read timeout yields whatever arrived so far (possibly nothing),
    /// mirroring a line read against a port with a fixed timeout. The
    /// trailing CR, if any, is stripped; the payload may be binary.
    pub fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::with_capacity(128);
        loop {
            let mut byte = [0u8; 1];
            match self.transport.read(&mut byte) {
                Ok(n) if n >= 1 => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    line.push(byte[0]);
                    if line.len() >= MAX_LINE_LEN {
                        break;
                    }
                }
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(line)
    }

    fn read_line_lossy(&mut self) -> Result<String> {
        let line = self.read_line()?;
        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}
