//! Wire codec for the RF Explorer hybrid text/binary protocol.
//!
//! The device speaks `\n`-terminated frames on a 2400 baud serial link:
//!
//! - Control/info frames: `#C2-M:<free text>` (generic `#C` key during resync)
//! - Config confirmation: `#C2-F:<11 comma-separated fields>`
//! - Data frames: `$S` marker followed by one raw amplitude byte per bin
//!
//! Commands sent to the device are `#` + one length byte + an ASCII mnemonic.
//! Everything in this module is pure parsing/encoding; no I/O happens here.

use serde::Serialize;

use crate::errors::{Result, RfeError};

// ============================================================================
// Protocol constants
// ============================================================================

/// Marker opening every command and control/config frame.
pub const CMD_MARKER: u8 = b'#';

/// Two-byte marker opening a sweep data frame.
pub const DATA_MARKER: &[u8] = b"$S";

/// Key of the ready/info frame sent after a GO command.
pub const READY_KEY: &str = "#C2-M";

/// Key of the config confirmation frame.
pub const CONFIG_KEY: &str = "#C2-F";

/// Generic control key prefix accepted while resynchronizing.
pub const CONTROL_KEY_PREFIX: &str = "#C";

// ============================================================================
// Commands
// ============================================================================

/// A command frame for the device.
///
/// The set-parameters payload fields must already be validated; frequencies
/// are zero-padded to 7 digits at encode time, amplitude strings are sent
/// verbatim (the device requires exactly 4 characters including sign).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Begin the handshake/ready sequence and start streaming.
    Go,
    /// Halt streaming.
    Stop,
    /// Turn the device LCD off (reduces sweep latency on battery).
    LcdOff,
    /// Turn the device LCD back on.
    LcdOn,
    /// Configure the sweep window and amplitude range.
    SetParams {
        start_khz: u32,
        end_khz: u32,
        amp_top: String,
        amp_bottom: String,
    },
}

/// Encode a command as the raw bytes to write to the port.
///
/// The length byte counts the whole frame, marker and length byte included,
/// so `GO` encodes as `# \x04 C 0` and a set-parameters frame as
/// `# \x20 C2-F:<start7>,<end7>,<top4>,<bottom4>`.
pub fn encode_command(cmd: &Command) -> Vec<u8> {
    let body = match cmd {
        Command::Go => "C0".to_string(),
        Command::Stop => "CH".to_string(),
        Command::LcdOff => "L0".to_string(),
        Command::LcdOn => "L1".to_string(),
        Command::SetParams {
            start_khz,
            end_khz,
            amp_top,
            amp_bottom,
        } => format!("C2-F:{start_khz:07},{end_khz:07},{amp_top},{amp_bottom}"),
    };
    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(CMD_MARKER);
    out.push((body.len() + 2) as u8);
    out.extend_from_slice(body.as_bytes());
    out
}

// ============================================================================
// Config frames
// ============================================================================

/// Device-confirmed sweep configuration.
///
/// The derived fields (`span_hz`, `end_freq_hz`, `center_freq_hz`,
/// `start_freq_hz`) are computed only from a confirmed `#C2-F` frame, never
/// from requested values: the device is free to clamp or adjust a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepConfig {
    pub start_freq_khz: u64,
    pub freq_step_hz: u64,
    pub amp_top_dbm: i16,
    pub amp_bottom_dbm: i16,
    pub sweep_steps: usize,
    pub module_status: String,
    pub mode: String,
    pub min_freq_khz: u64,
    pub max_freq_khz: u64,
    pub max_span_khz: u64,
    pub rbw_khz: u32,
    pub start_freq_hz: u64,
    pub span_hz: u64,
    pub end_freq_hz: u64,
    pub center_freq_hz: u64,
}

fn field<'a>(fields: &[&'a str], idx: usize) -> &'a str {
    // Caller has already checked the field count.
    fields[idx]
}

fn parse_num<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| RfeError::MalformedFrame(format!("config field {name} unparseable: {raw:?}")))
}

/// Parse a `#C2-F` config confirmation line.
///
/// The payload must carry exactly 11 comma-separated fields: start (kHz),
/// step (Hz), amp-top, amp-bottom, steps, module status, mode, min freq,
/// max freq, max span, resolution bandwidth.
pub fn parse_config_frame(line: &str) -> Result<SweepConfig> {
    let payload = line
        .strip_prefix(CONFIG_KEY)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| {
            RfeError::MalformedFrame(format!("expected {CONFIG_KEY} frame, got {line:?}"))
        })?;

    let fields: Vec<&str> = payload.split(',').collect();
    if fields.len() != 11 {
        return Err(RfeError::MalformedFrame(format!(
            "config frame has {} fields, expected 11",
            fields.len()
        )));
    }

    let start_freq_khz: u64 = parse_num(field(&fields, 0), "start_freq")?;
    let freq_step_hz: u64 = parse_num(field(&fields, 1), "freq_step")?;
    let amp_top_dbm: i16 = parse_num(field(&fields, 2), "amp_top")?;
    let amp_bottom_dbm: i16 = parse_num(field(&fields, 3), "amp_bottom")?;
    let sweep_steps: usize = parse_num(field(&fields, 4), "sweep_steps")?;
    let module_status = field(&fields, 5).to_string();
    let mode = field(&fields, 6).to_string();
    let min_freq_khz: u64 = parse_num(field(&fields, 7), "min_freq")?;
    let max_freq_khz: u64 = parse_num(field(&fields, 8), "max_freq")?;
    let max_span_khz: u64 = parse_num(field(&fields, 9), "max_span")?;
    let rbw_khz: u32 = parse_num(field(&fields, 10), "rbw")?;

    let start_freq_hz = start_freq_khz * 1000;
    let span_hz = freq_step_hz * sweep_steps as u64;
    let end_freq_hz = start_freq_hz + span_hz;
    let center_freq_hz = start_freq_hz + span_hz / 2;

    Ok(SweepConfig {
        start_freq_khz,
        freq_step_hz,
        amp_top_dbm,
        amp_bottom_dbm,
        sweep_steps,
        module_status,
        mode,
        min_freq_khz,
        max_freq_khz,
        max_span_khz,
        rbw_khz,
        start_freq_hz,
        span_hz,
        end_freq_hz,
        center_freq_hz,
    })
}

/// Encode the 11 logical config fields back into a `#C2-F` line.
pub fn encode_config_frame(config: &SweepConfig) -> String {
    format!(
        "{}:{:07},{},{:+04},{:+04},{},{},{},{:07},{:07},{:07},{}",
        CONFIG_KEY,
        config.start_freq_khz,
        config.freq_step_hz,
        config.amp_top_dbm,
        config.amp_bottom_dbm,
        config.sweep_steps,
        config.module_status,
        config.mode,
        config.min_freq_khz,
        config.max_freq_khz,
        config.max_span_khz,
        config.rbw_khz,
    )
}

// ============================================================================
// Frequency table
// ============================================================================

/// The ordered frequency axis of a sweep, one entry per bin, in Hz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable(Vec<u64>);

impl FrequencyTable {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, u64> {
        self.0.iter()
    }
}

/// Build the frequency axis from a confirmed config.
///
/// Pure function of `start_freq_hz`, `freq_step_hz` and `sweep_steps`;
/// recomputed on every call rather than cached.
pub fn build_frequency_table(config: &SweepConfig) -> FrequencyTable {
    FrequencyTable(
        (0..config.sweep_steps as u64)
            .map(|i| config.start_freq_hz + i * config.freq_step_hz)
            .collect(),
    )
}

// ============================================================================
// Sweep data frames
// ============================================================================

/// Amplitudes of one sweep data frame, in dBm, one per bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFrame(Vec<i16>);

impl SweepFrame {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.0
    }
}

/// Escape a raw line quoted-printable-style so control bytes become
/// line-safe `=XX` hex pairs. Printable ASCII other than `=` passes through.
fn escape_payload(raw: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(raw.len() * 3);
    for &b in raw {
        if b == b'=' || b < 0x21 || b > 0x7E {
            out.push('=');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        } else {
            out.push(b as char);
        }
    }
    out
}

/// Parse a raw line as a sweep data frame.
///
/// A line opening with the control marker while data was expected means the
/// device dropped back into command mode; that is a `ControlFault` and must
/// abort the read, not be decoded as amplitudes. A line without the `$S`
/// marker, or any payload token that is not exactly two hex digits after
/// unescaping, is a `MalformedFrame`.
///
/// Each payload byte decodes as `dbm = -(value / 2)` (integer division).
pub fn parse_sweep_frame(raw: &[u8]) -> Result<SweepFrame> {
    if raw.first() == Some(&CMD_MARKER) {
        return Err(RfeError::ControlFault(
            String::from_utf8_lossy(raw).into_owned(),
        ));
    }
    if !raw.starts_with(DATA_MARKER) {
        return Err(RfeError::MalformedFrame(format!(
            "data frame missing $S marker: {:?}",
            String::from_utf8_lossy(&raw[..raw.len().min(16)])
        )));
    }

    let escaped = escape_payload(raw);
    let mut amplitudes = Vec::new();
    for token in escaped.split('=') {
        if token.is_empty() || token.starts_with('$') {
            continue;
        }
        if token.len() != 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(RfeError::MalformedFrame(format!(
                "corrupted escape sequence in data frame: {token:?}"
            )));
        }
        let value = u8::from_str_radix(token, 16)
            .map_err(|_| RfeError::MalformedFrame(format!("bad hex pair {token:?}")))?;
        amplitudes.push(-(i16::from(value) / 2));
    }
    Ok(SweepFrame(amplitudes))
}

// ============================================================================
// Line classification
// ============================================================================

/// Extract the info payload if `line` is the `#C2-M` ready frame.
pub fn parse_ready_frame(line: &str) -> Option<&str> {
    let (key, payload) = line.split_once(':')?;
    (key == READY_KEY).then_some(payload)
}

/// Extract the info payload if `line` carries any `#C`-keyed control frame.
/// The device answers with varying control keys while resynchronizing.
pub fn parse_control_frame(line: &str) -> Option<&str> {
    let (key, payload) = line.split_once(':')?;
    key.starts_with(CONTROL_KEY_PREFIX).then_some(payload)
}

// ============================================================================
// Tests
// ============================================================================
