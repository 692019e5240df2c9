//! CSV export of a max-hold result.
//!
//! Thin output layer: one `label,dbm` row per frequency bin, no header.
//! The frequency label is a fixed-width textual slice of the decimal Hz
//! value, kept bit-for-bit compatible with the files downstream consumers
//! already ingest.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;

use crate::errors::Result;
use crate::sweep::MaxHoldResult;

/// Row ordering for the exported file.
///
/// The historical exporter sorted map keys as strings; every key it ever
/// produced was a fixed-width 9-digit Hz value, so both orders emit the
/// same file in practice. Both are kept selectable until a downstream
/// consumer pins one down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    #[default]
    Numeric,
    Lexicographic,
}

/// Render a frequency label from its Hz value.
///
/// The decimal string (zero-padded to at least 7 digits) is sliced as
/// fixed-width text: first three characters, a decimal point, then
/// characters 5 through 7 — the 4th character is discarded. This is a
/// textual slice, not a numeric scale conversion, and downstream files
/// depend on exactly this shape: `450000000` becomes `"450.000"`.
pub fn format_frequency_label(freq_hz: u64) -> String {
    let digits = format!("{freq_hz:07}");
    format!("{}.{}", &digits[..3], &digits[4..7])
}

/// Write one `label,dbm` row per bin to `path`, newline-terminated,
/// without a header row.
pub fn write_rows(path: &Path, result: &MaxHoldResult, order: RowOrder) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_rows_to(&mut writer, result, order)?;
    writer.flush()?;
    debug!("wrote {} rows to {}", result.len(), path.display());
    Ok(())
}

fn write_rows_to<W: Write>(writer: &mut W, result: &MaxHoldResult, order: RowOrder) -> Result<()> {
    let mut bins: Vec<(u64, i16)> = result.bins().to_vec();
    match order {
        RowOrder::Numeric => bins.sort_by_key(|&(freq, _)| freq),
        RowOrder::Lexicographic => bins.sort_by_key(|&(freq, _)| freq.to_string()),
    }
    for (freq, dbm) in bins {
        writeln!(writer, "{},{}", format_frequency_label(freq), dbm)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_slices_the_fixed_width_hz_string() {
        assert_eq!(format_frequency_label(450_000_000), "450.000");
        assert_eq!(format_frequency_label(512_000_000), "512.000");
        // The 4th character is discarded, whatever it holds.
        assert_eq!(format_frequency_label(450_553_571), "450.535");
    }

    #[test]
    fn label_pads_short_values_to_seven_digits() {
        assert_eq!(format_frequency_label(450_000), "045.000");
    }

    #[test]
    fn rows_are_label_comma_value_without_header() {
        let result = crate::sweep::testing::max_hold_from_bins(&[
            (450_000_000, -95),
            (450_553_571, -80),
        ]);
        let mut out = Vec::new();
        write_rows_to(&mut out, &result, RowOrder::Numeric).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "450.000,-95\n450.535,-80\n"
        );
    }

    #[test]
    fn both_row_orders_coincide_for_fixed_width_keys() {
        let result = crate::sweep::testing::max_hold_from_bins(&[
            (512_000_000, -60),
            (450_000_000, -95),
            (470_000_000, -80),
        ]);
        let mut numeric = Vec::new();
        let mut lexicographic = Vec::new();
        write_rows_to(&mut numeric, &result, RowOrder::Numeric).unwrap();
        write_rows_to(&mut lexicographic, &result, RowOrder::Lexicographic).unwrap();
        assert_eq!(numeric, lexicographic);
        assert!(String::from_utf8(numeric).unwrap().starts_with("450.000,-95\n"));
    }

    #[test]
    fn write_rows_creates_the_file() {
        let dir = std::env::temp_dir().join("rfexplorer_rs_export_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sweep.csv");

        let result = crate::sweep::testing::max_hold_from_bins(&[(450_000_000, -100)]);
        write_rows(&path, &result, RowOrder::default()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "450.000,-100\n");
        std::fs::remove_file(&path).ok();
    }
}
