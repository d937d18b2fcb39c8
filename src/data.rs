//! CSV candle loading for the backtest driver.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::types::Candle;

/// Load OHLCV data from a CSV file with columns
/// `datetime,open,high,low,close,volume`.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = dt_str
            .parse::<DateTime<Utc>>()
            .or_else(|_| {
                chrono::NaiveDateTime::parse_from_str(dt_str, "%Y-%m-%d %H:%M:%S")
                    .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            })
            .context(format!("Failed to parse datetime: {}", dt_str))?;

        let open: f64 = record.get(1).context("Missing open column")?.parse().context("Failed to parse open")?;
        let high: f64 = record.get(2).context("Missing high column")?.parse().context("Failed to parse high")?;
        let low: f64 = record.get(3).context("Missing low column")?.parse().context("Failed to parse low")?;
        let close: f64 = record.get(4).context("Missing close column")?.parse().context("Failed to parse close")?;
        let volume: f64 = record.get(5).context("Missing volume column")?.parse().context("Failed to parse volume")?;

        candles.push(Candle {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    Ok(candles)
}

/// Sanity-check loaded candles before handing them to the engine.
pub fn validate_candles(candles: &[Candle]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if candles.is_empty() {
        errors.push("No candles provided".to_string());
        return ValidationResult { errors, warnings };
    }

    for (i, candle) in candles.iter().enumerate() {
        if candle.high < candle.low {
            errors.push(format!("Candle {}: high ({}) < low ({})", i, candle.high, candle.low));
        }
        if candle.close <= 0.0 {
            errors.push(format!("Candle {}: invalid close price ({})", i, candle.close));
        }
        if candle.volume < 0.0 {
            errors.push(format!("Candle {}: negative volume ({})", i, candle.volume));
        }
        if i > 0 && candle.datetime <= candles[i - 1].datetime {
            warnings.push(format!("Candle {}: not chronological", i));
        }
    }

    ValidationResult { errors, warnings }
}

#[derive(Debug)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_candles_flags_inverted_high_low() {
        let candles = vec![Candle {
            datetime: DateTime::from_timestamp(0, 0).unwrap(),
            open: 100.0,
            high: 90.0,
            low: 95.0,
            close: 92.0,
            volume: 1000.0,
        }];
        let result = validate_candles(&candles);
        assert!(!result.is_valid());
    }

    #[test]
    fn validate_candles_accepts_well_formed_data() {
        let candles = vec![Candle {
            datetime: DateTime::from_timestamp(0, 0).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 95.0,
            close: 102.0,
            volume: 1000.0,
        }];
        let result = validate_candles(&candles);
        assert!(result.is_valid());
    }
}
