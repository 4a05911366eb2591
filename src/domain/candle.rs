//! OHLCV candle representation.
//!
//! Timestamps are UTC-naive: every adapter converts to UTC before building a
//! `Candle`, so comparisons and session filters never deal with offsets.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parses an ISO-8601 timestamp into UTC-naive time.
///
/// Accepts RFC 3339 with an offset (converted to UTC), naive date-times
/// (taken as UTC) and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Epoch milliseconds to UTC-naive time.
pub fn from_epoch_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn body(&self) -> f64 {
        self.close - self.open
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Finite, non-negative values with `low <= open, close <= high`.
    pub fn is_consistent(&self) -> bool {
        let values = [self.open, self.high, self.low, self.close, self.volume];
        values.iter().all(|v| v.is_finite() && *v >= 0.0)
            && self.low <= self.high
            && (self.low..=self.high).contains(&self.open)
            && (self.low..=self.high).contains(&self.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle() -> Candle {
        Candle {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn typical_price() {
        let candle = sample_candle();
        let expected = (110.0 + 90.0 + 105.0) / 3.0;
        assert!((candle.typical_price() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_hl_dominates() {
        let candle = sample_candle();
        // high-low=20, |high-100|=10, |low-100|=10 → 20
        assert!((candle.true_range(100.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let candle = sample_candle();
        // high-low=20, |110-70|=40, |90-70|=20 → 40
        assert!((candle.true_range(70.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_down() {
        let candle = sample_candle();
        // high-low=20, |110-130|=20, |90-130|=40 → 40
        assert!((candle.true_range(130.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn consistency_checks() {
        let candle = sample_candle();
        assert!(candle.is_consistent());

        let inverted = Candle {
            high: 80.0,
            ..sample_candle()
        };
        assert!(!inverted.is_consistent());

        let nan = Candle {
            close: f64::NAN,
            ..sample_candle()
        };
        assert!(!nan.is_consistent());
    }

    #[test]
    fn parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-05 14:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05T14:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05T14:00:00Z"), Some(expected));
        // offsets are converted to UTC
        assert_eq!(parse_timestamp("2024-03-05T16:00:00+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-05"),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("05/03/2024"), None);
    }

    #[test]
    fn epoch_millis() {
        let ts = from_epoch_millis(1_704_067_200_000).unwrap();
        assert_eq!(
            ts,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn body_direction() {
        let candle = sample_candle();
        assert!(candle.is_bullish());
        assert!(!candle.is_bearish());
        assert!((candle.body() - 5.0).abs() < f64::EPSILON);
    }
}
