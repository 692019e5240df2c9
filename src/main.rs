use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use rfexplorer_rs::{Command, ConnectionManager, RowOrder, SweepController, SweepRequest};

#[derive(Parser, Debug)]
#[command(
    name = "rfe-sweep",
    about = "Run a timed max-hold sweep on an RF Explorer and write a CSV"
)]
struct Args {
    /// Serial port path (e.g., /dev/ttyUSB0 or COM4)
    port: String,
    /// Sweep start frequency in kHz
    #[arg(long, default_value_t = 450_000)]
    start_khz: u32,
    /// Sweep end frequency in kHz
    #[arg(long, default_value_t = 512_000)]
    end_khz: u32,
    /// Amplitude scale top in dBm, 4 chars with sign
    #[arg(long, default_value = "-010")]
    amp_top: String,
    /// Amplitude scale bottom in dBm, 4 chars with sign
    #[arg(long, default_value = "-100")]
    amp_bottom: String,
    /// Acquisition window in seconds
    #[arg(long, default_value_t = 30)]
    seconds: u64,
    /// Output CSV path
    #[arg(long, default_value = "sweep.csv")]
    output: PathBuf,
    /// Turn the device LCD off while sweeping
    #[arg(long)]
    lcd_off: bool,
    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn main() {
    rfexplorer_rs::logging::init_logging();
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    if args.list_ports {
        for port in serialport::available_ports()? {
            println!("{}", port.port_name);
        }
        return Ok(());
    }

    println!("--- Connecting to RF Explorer on {} ---", args.port);
    let mut conn = ConnectionManager::open_serial(&args.port)?;
    let info = conn.handshake()?;
    println!("Device: {}", info.trim());

    if args.lcd_off {
        conn.send_command(&Command::LcdOff)?;
    }

    let request = SweepRequest::new(args.start_khz, args.end_khz, &args.amp_top, &args.amp_bottom);
    println!(
        "Sweeping {}..{} kHz for {} s...",
        args.start_khz, args.end_khz, args.seconds
    );

    let mut sweeps = SweepController::new(conn);
    let result = sweeps.run_sweep(&request, Duration::from_secs(args.seconds))?;
    println!(
        "Merged {} frames ({} dropped) across {} bins",
        result.frames_merged(),
        result.frames_dropped(),
        result.len()
    );

    rfexplorer_rs::write_rows(&args.output, &result, RowOrder::default())?;
    println!("Wrote {}", args.output.display());

    let mut conn = sweeps.into_connection();
    if args.lcd_off {
        conn.send_command(&Command::LcdOn)?;
    }
    println!("Stopping...");
    conn.stop()?;
    println!("Done.");
    Ok(())
}
