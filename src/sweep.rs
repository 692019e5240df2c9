//! Sweep parameter validation and the timed max-hold acquisition loop.
//!
//! A sweep run is: send the parameter command, take the device-confirmed
//! config frame (the device may clamp a request), derive the frequency axis,
//! then keep folding data frames into a per-bin maximum until the wall-clock
//! window closes. Frames whose length does not match the axis are counted
//! and dropped, never merged.

use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;

use crate::connection::ConnectionManager;
use crate::errors::{Result, RfeError};
use crate::frame::{self, Command, FrequencyTable, SweepConfig};

/// Bin count this firmware family reports for every sweep. A confirmed
/// config with any other count is a hard contract violation.
pub const EXPECTED_SWEEP_STEPS: usize = 112;

/// Acquisition window of the standard preset sweep.
pub const STANDARD_WINDOW: Duration = Duration::from_secs(180);

const START_KHZ_MIN: u32 = 240_000;
const START_KHZ_MAX: u32 = 959_888;
const END_KHZ_MIN: u32 = 241_112;
const END_KHZ_MAX: u32 = 960_000;
const AMP_TOP_MIN: i32 = -110;
const AMP_TOP_MAX: i32 = 5;
const AMP_BOTTOM_MIN: i32 = -120;
const AMP_BOTTOM_MAX: i32 = -5;

// ============================================================================
// Requests
// ============================================================================

/// Requested sweep bounds and amplitude range, pre-validation.
///
/// Frequencies are in kHz and get zero-padded to 7 digits on the wire.
/// Amplitude fields must already be exactly 4 characters with a sign
/// (`"-010"`, `"+005"`); the device rejects any other width, so no padding
/// is ever applied to them here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepRequest {
    pub start_khz: u32,
    pub end_khz: u32,
    pub amp_top: String,
    pub amp_bottom: String,
}

impl SweepRequest {
    pub fn new(start_khz: u32, end_khz: u32, amp_top: &str, amp_bottom: &str) -> Self {
        Self {
            start_khz,
            end_khz,
            amp_top: amp_top.to_string(),
            amp_bottom: amp_bottom.to_string(),
        }
    }

    /// The standard 450-512 MHz two-way-radio survey preset. Presets are
    /// plain configuration values; they run through the same sweep path.
    pub fn standard() -> Self {
        Self::new(450_000, 512_000, "-010", "-100")
    }

    /// Check every field against its documented device bound.
    pub fn validate(&self) -> Result<()> {
        if !(START_KHZ_MIN..=START_KHZ_MAX).contains(&self.start_khz) {
            return Err(RfeError::Validation(format!(
                "start_khz {} outside {START_KHZ_MIN}..={START_KHZ_MAX}",
                self.start_khz
            )));
        }
        if !(END_KHZ_MIN..=END_KHZ_MAX).contains(&self.end_khz) {
            return Err(RfeError::Validation(format!(
                "end_khz {} outside {END_KHZ_MIN}..={END_KHZ_MAX}",
                self.end_khz
            )));
        }
        validate_amp("amp_top", &self.amp_top, AMP_TOP_MIN, AMP_TOP_MAX)?;
        validate_amp("amp_bottom", &self.amp_bottom, AMP_BOTTOM_MIN, AMP_BOTTOM_MAX)?;
        Ok(())
    }

    fn to_command(&self) -> Command {
        Command::SetParams {
            start_khz: self.start_khz,
            end_khz: self.end_khz,
            amp_top: self.amp_top.clone(),
            amp_bottom: self.amp_bottom.clone(),
        }
    }
}

fn validate_amp(name: &str, raw: &str, min: i32, max: i32) -> Result<()> {
    if raw.len() != 4 {
        return Err(RfeError::Validation(format!(
            "{name} {raw:?} must be exactly 4 characters including sign"
        )));
    }
    if !raw.starts_with('+') && !raw.starts_with('-') {
        return Err(RfeError::Validation(format!(
            "{name} {raw:?} must carry an explicit sign"
        )));
    }
    let value: i32 = raw
        .parse()
        .map_err(|_| RfeError::Validation(format!("{name} {raw:?} is not a signed number")))?;
    if !(min..=max).contains(&value) {
        return Err(RfeError::Validation(format!(
            "{name} {value} outside {min}..={max} dBm"
        )));
    }
    Ok(())
}

// ============================================================================
// Results
// ============================================================================

/// Per-bin maximum amplitude observed across one sweep window.
///
/// Immutable once the window closes. Bins are in frequency-axis order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaxHoldResult {
    bins: Vec<(u64, i16)>,
    frames_merged: u64,
    frames_dropped: u64,
}

impl MaxHoldResult {
    /// `(frequency_hz, max_dbm)` pairs in ascending frequency order.
    pub fn bins(&self) -> &[(u64, i16)] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Frames folded into the maximum.
    pub fn frames_merged(&self) -> u64 {
        self.frames_merged
    }

    /// Frames discarded for length mismatch or malformed payload.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Runs sweeps over a ready connection. Owns the connection, the confirmed
/// config, and the accumulating result for the duration of one run.
pub struct SweepController {
    conn: ConnectionManager,
}

impl SweepController {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Give the connection back, e.g. to call `stop()` after the last sweep.
    pub fn into_connection(self) -> ConnectionManager {
        self.conn
    }

    /// Validate and transmit sweep parameters. A transmission failure
    /// surfaces as a write error, never silently.
    pub fn set_sweep_params(&mut self, request: &SweepRequest) -> Result<()> {
        request.validate()?;
        self.conn.send_command(&request.to_command())
    }

    /// Run the standard preset sweep over its fixed window.
    pub fn run_standard_sweep(&mut self) -> Result<MaxHoldResult> {
        self.run_sweep(&SweepRequest::standard(), STANDARD_WINDOW)
    }

    /// Configure the device and accumulate a max-hold spectrum for `window`.
    ///
    /// The confirmed config frame is read back before any data collection;
    /// a bin count other than [`EXPECTED_SWEEP_STEPS`] fails immediately
    /// with `ConfigMismatch` so no under-populated result can escape. The
    /// loop always processes at least one frame before checking the
    /// deadline, so the observed duration can exceed `window` by up to one
    /// frame read.
    pub fn run_sweep(&mut self, request: &SweepRequest, window: Duration) -> Result<MaxHoldResult> {
        self.set_sweep_params(request)?;

        let config = self.read_confirmed_config()?;
        let table = frame::build_frequency_table(&config);
        if table.len() != EXPECTED_SWEEP_STEPS {
            return Err(RfeError::ConfigMismatch {
                expected: EXPECTED_SWEEP_STEPS,
                actual: table.len(),
            });
        }
        debug!(
            "sweep confirmed: {} bins, {} Hz..{} Hz, step {} Hz",
            table.len(),
            config.start_freq_hz,
            config.end_freq_hz,
            config.freq_step_hz
        );

        self.collect_max_hold(&table, window)
    }

    /// Read the next line and parse it as the `#C2-F` confirmation.
    fn read_confirmed_config(&mut self) -> Result<SweepConfig> {
        let line = self.conn.read_line()?;
        let text = std::str::from_utf8(&line).map_err(|_| {
            RfeError::MalformedFrame("config confirmation is not valid text".to_string())
        })?;
        frame::parse_config_frame(text)
    }

    fn collect_max_hold(
        &mut self,
        table: &FrequencyTable,
        window: Duration,
    ) -> Result<MaxHoldResult> {
        let deadline = Instant::now() + window;
        let mut max_dbm: Vec<i16> = vec![i16::MIN; table.len()];
        let mut frames_merged = 0u64;
        let mut frames_dropped = 0u64;

        loop {
            let line = self.conn.read_line()?;
            if line.is_empty() {
                // Port timeout with nothing buffered; the device pauses
                // between sweeps when the span is wide.
                debug!("empty read while sweeping, still inside the window");
            } else {
                match frame::parse_sweep_frame(&line) {
                    Ok(sweep) if sweep.len() == table.len() => {
                        for (slot, &dbm) in max_dbm.iter_mut().zip(sweep.as_slice()) {
                            if dbm > *slot {
                                *slot = dbm;
                            }
                        }
                        frames_merged += 1;
                    }
                    Ok(sweep) => {
                        frames_dropped += 1;
                        debug!(
                            "dropping frame of {} bins, expected {}",
                            sweep.len(),
                            table.len()
                        );
                    }
                    Err(RfeError::MalformedFrame(reason)) => {
                        frames_dropped += 1;
                        debug!("dropping malformed frame: {reason}");
                    }
                    Err(e) => return Err(e),
                }
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        if frames_dropped > 0 {
            warn!("dropped {frames_dropped} frames during sweep window");
        }
        if frames_merged == 0 {
            return Err(RfeError::MalformedFrame(
                "sweep window closed without a single valid data frame".to_string(),
            ));
        }

        Ok(MaxHoldResult {
            bins: table
                .iter()
                .copied()
                .zip(max_dbm)
                .collect(),
            frames_merged,
            frames_dropped,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::MaxHoldResult;

    pub(crate) fn max_hold_from_bins(bins: &[(u64, i16)]) -> MaxHoldResult {
        MaxHoldResult {
            bins: bins.to_vec(),
            frames_merged: 1,
            frames_dropped: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionManager;
    use crate::transport::testing::ScriptedTransport;

    const CONFIG_LINE: &[u8] =
        b"#C2-F:0450000,553571,-010,-100,112,0,000,0240000,0960000,0720000,600\n";

    fn data_line(amps_dbm: &[i16]) -> Vec<u8> {
        let mut line = b"$S".to_vec();
        for &dbm in amps_dbm {
            line.push((-dbm * 2) as u8);
        }
        line.push(b'\n');
        line
    }

    fn controller(script: &[&[u8]]) -> SweepController {
        let (transport, _log) = ScriptedTransport::new(script);
        SweepController::new(ConnectionManager::from_transport(Box::new(transport)))
    }

    // ------------------------------------------------------------------
    // Validation boundaries
    // ------------------------------------------------------------------

    #[test]
    fn start_frequency_bounds_are_inclusive() {
        assert!(SweepRequest::new(240_000, 512_000, "-010", "-100").validate().is_ok());
        assert!(SweepRequest::new(959_888, 960_000, "-010", "-100").validate().is_ok());
        assert!(matches!(
            SweepRequest::new(239_999, 512_000, "-010", "-100").validate(),
            Err(RfeError::Validation(_))
        ));
        assert!(matches!(
            SweepRequest::new(959_889, 960_000, "-010", "-100").validate(),
            Err(RfeError::Validation(_))
        ));
    }

    #[test]
    fn end_frequency_bounds_are_inclusive() {
        assert!(SweepRequest::new(240_000, 241_112, "-010", "-100").validate().is_ok());
        assert!(matches!(
            SweepRequest::new(240_000, 241_111, "-010", "-100").validate(),
            Err(RfeError::Validation(_))
        ));
        assert!(matches!(
            SweepRequest::new(240_000, 960_001, "-010", "-100").validate(),
            Err(RfeError::Validation(_))
        ));
    }

    #[test]
    fn amp_top_bounds() {
        assert!(SweepRequest::new(450_000, 512_000, "+005", "-100").validate().is_ok());
        assert!(SweepRequest::new(450_000, 512_000, "-110", "-100").validate().is_ok());
        assert!(matches!(
            SweepRequest::new(450_000, 512_000, "+006", "-100").validate(),
            Err(RfeError::Validation(_))
        ));
    }

    #[test]
    fn amp_fields_must_be_exactly_four_signed_characters() {
        for bad in ["-10", "-0100", "0010", ""] {
            assert!(
                matches!(
                    SweepRequest::new(450_000, 512_000, bad, "-100").validate(),
                    Err(RfeError::Validation(_))
                ),
                "amp_top {bad:?} should fail"
            );
        }
        assert!(matches!(
            SweepRequest::new(450_000, 512_000, "-010", "-004").validate(),
            Err(RfeError::Validation(_))
        ));
        assert!(matches!(
            SweepRequest::new(450_000, 512_000, "-010", "-121").validate(),
            Err(RfeError::Validation(_))
        ));
    }

    #[test]
    fn set_sweep_params_writes_the_padded_frame() {
        let (transport, log) = ScriptedTransport::new(&[]);
        let mut ctrl =
            SweepController::new(ConnectionManager::from_transport(Box::new(transport)));
        ctrl.set_sweep_params(&SweepRequest::standard()).unwrap();
        assert!(log
            .lock()
            .unwrap()
            .wrote(b"#\x20C2-F:0450000,0512000,-010,-100"));
    }

    // ------------------------------------------------------------------
    // Max-hold acquisition
    // ------------------------------------------------------------------

    #[test]
    fn run_sweep_returns_the_pointwise_maximum_of_two_frames() {
        // Two full 112-bin frames, differing pointwise: even bins are
        // louder in the first, odd bins in the second.
        let first: Vec<i16> = (0..112).map(|i| if i % 2 == 0 { -80 } else { -110 }).collect();
        let second: Vec<i16> = (0..112).map(|i| if i % 2 == 0 { -110 } else { -80 }).collect();

        let line_a = data_line(&first);
        let line_b = data_line(&second);
        let mut ctrl = controller(&[CONFIG_LINE, &line_a, &line_b]);

        let result = ctrl
            .run_sweep(&SweepRequest::standard(), Duration::from_millis(100))
            .unwrap();

        assert_eq!(result.len(), 112);
        assert_eq!(result.frames_merged(), 2);
        assert!(result.bins().iter().all(|&(_, dbm)| dbm == -80));
        // Keyed by the frequency table from the confirmed config.
        assert_eq!(result.bins()[0].0, 450_000_000);
        assert_eq!(result.bins()[1].0, 450_000_000 + 553_571);
    }

    #[test]
    fn max_hold_is_monotonic_and_ignores_mismatched_frames() {
        let quiet: Vec<i16> = vec![-110; 112];
        let loud: Vec<i16> = vec![-70; 112];
        let short: Vec<i16> = vec![-64; 40];

        let line_quiet = data_line(&quiet);
        let line_loud = data_line(&loud);
        let line_short = data_line(&short);
        let line_quiet_again = data_line(&quiet);
        let mut ctrl = controller(&[
            CONFIG_LINE,
            &line_quiet,
            &line_loud,
            &line_short,
            &line_quiet_again,
        ]);

        let result = ctrl
            .run_sweep(&SweepRequest::standard(), Duration::from_millis(100))
            .unwrap();

        // The short frame never merges; later quiet frames cannot lower bins.
        assert_eq!(result.frames_merged(), 3);
        assert_eq!(result.frames_dropped(), 1);
        assert!(result.bins().iter().all(|&(_, dbm)| dbm == -70));
    }

    #[test]
    fn config_mismatch_aborts_before_any_data_collection() {
        let bad_config = b"#C2-F:0450000,553571,-010,-100,64,0,000,0240000,0960000,0720000,600\n";
        let line = data_line(&vec![-100; 64]);
        let mut ctrl = controller(&[bad_config, &line]);

        let err = ctrl
            .run_sweep(&SweepRequest::standard(), Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(
            err,
            RfeError::ConfigMismatch {
                expected: 112,
                actual: 64
            }
        ));
    }

    #[test]
    fn control_frame_mid_stream_aborts_the_sweep() {
        let line = data_line(&vec![-100; 112]);
        let mut ctrl = controller(&[CONFIG_LINE, &line, b"#C2-M:device dropped to command mode\n"]);

        let err = ctrl
            .run_sweep(&SweepRequest::standard(), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, RfeError::ControlFault(_)));
    }

    #[test]
    fn sweep_with_no_valid_frames_is_an_error_not_an_empty_result() {
        let mut ctrl = controller(&[CONFIG_LINE, b"garbage that never parses\n"]);

        let err = ctrl
            .run_sweep(&SweepRequest::standard(), Duration::from_millis(30))
            .unwrap_err();
        assert!(matches!(err, RfeError::MalformedFrame(_)));
    }

    #[test]
    fn invalid_request_never_reaches_the_wire() {
        let (transport, log) = ScriptedTransport::new(&[]);
        let mut ctrl =
            SweepController::new(ConnectionManager::from_transport(Box::new(transport)));

        let err = ctrl
            .run_sweep(
                &SweepRequest::new(100, 512_000, "-010", "-100"),
                Duration::from_millis(10),
            )
            .unwrap_err();
        assert!(matches!(err, RfeError::Validation(_)));
        assert!(log.lock().unwrap().writes.is_empty());
    }
}
