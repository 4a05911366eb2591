//! Candle source port trait.

use chrono::NaiveDateTime;

use crate::domain::candle::Candle;
use crate::domain::error::BarsimError;

pub trait CandleSource {
    /// Candles for `symbol`, ascending by timestamp with no duplicates,
    /// restricted to `[start, end]` when given.
    fn fetch_candles(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Candle>, BarsimError>;

    /// First timestamp, last timestamp and bar count, or `None` when empty.
    fn data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, BarsimError> {
        let candles = self.fetch_candles(symbol, None, None)?;
        Ok(match (candles.first(), candles.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp, candles.len())),
            _ => None,
        })
    }
}
