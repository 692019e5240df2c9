//! RF Explorer handheld spectrum analyzer driver.
//!
//! Drives the instrument over its 2400 baud serial link, speaking the
//! device's hybrid text/binary protocol: handshake and readiness
//! negotiation, sweep-parameter configuration, streamed amplitude frames,
//! and max-hold aggregation over a wall-clock window.
//!
//! # Timing
//!
//! The device is timing-sensitive in ways no protocol content can fix: after
//! a STOP it needs a fixed settle pause before it accepts new commands, and
//! a busy device can keep emitting data lines after the host thinks it
//! stopped. The connection layer's resync sequence exists for exactly that
//! case. Everything here is synchronous and blocking; one connection owns
//! one device exclusively.
//!
//! # Example
//! ```ignore
//! use rfexplorer_rs::{ConnectionManager, SweepController, SweepRequest};
//! use std::time::Duration;
//!
//! let mut conn = ConnectionManager::open_serial("/dev/ttyUSB0")?;
//! let info = conn.handshake()?;
//! println!("Device: {info}");
//!
//! let mut sweeps = SweepController::new(conn);
//! let result = sweeps.run_sweep(&SweepRequest::standard(), Duration::from_secs(30))?;
//! rfexplorer_rs::export::write_rows("survey.csv".as_ref(), &result, Default::default())?;
//!
//! sweeps.into_connection().stop()?;
//! ```

pub mod connection;
pub mod errors;
pub mod export;
pub mod frame;
pub mod logging;
pub mod sweep;
pub mod transport;

pub use connection::{ConnectionManager, ConnectionState};
pub use errors::{Result, RfeError};
pub use export::{format_frequency_label, write_rows, RowOrder};
pub use frame::{Command, FrequencyTable, SweepConfig, SweepFrame};
pub use sweep::{MaxHoldResult, SweepController, SweepRequest, EXPECTED_SWEEP_STEPS};
pub use transport::{SerialTransport, Transport};
