//! Time-of-day gate around another rule.

use std::sync::Arc;

use chrono::Timelike;

use crate::domain::signal::{BarContext, Signal, SignalRule};

/// Passes the inner rule's signal only when the bar's UTC hour lies in
/// `[start_hour, end_hour)`. A window with `start_hour > end_hour` wraps
/// past midnight.
#[derive(Debug, Clone)]
pub struct SessionFilter {
    inner: Arc<dyn SignalRule>,
    name: String,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl SessionFilter {
    pub fn new(inner: Arc<dyn SignalRule>, start_hour: u32, end_hour: u32) -> Self {
        let name = format!("{}@{start_hour:02}-{end_hour:02}", inner.name());
        SessionFilter {
            inner,
            name,
            start_hour,
            end_hour,
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl SignalRule for SessionFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &BarContext<'_>) -> Option<Signal> {
        if !self.contains(ctx.candle().timestamp.hour()) {
            return None;
        }
        self.inner.evaluate(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::test_support::{blank_frame, candles_from_closes};
    use crate::domain::signal::Direction;
    use chrono::Duration;

    #[derive(Debug)]
    struct Always;

    impl SignalRule for Always {
        fn name(&self) -> &str {
            "always"
        }

        fn evaluate(&self, _ctx: &BarContext<'_>) -> Option<Signal> {
            Some(Signal {
                direction: Direction::Long,
                suggested_stop_distance: 1.0,
                suggested_target_distance: 1.0,
                confidence: 1.0,
                rule: "always".into(),
            })
        }
    }

    #[test]
    fn day_window() {
        let filter = SessionFilter::new(Arc::new(Always), 8, 16);
        assert!(filter.contains(8));
        assert!(filter.contains(15));
        assert!(!filter.contains(16));
        assert!(!filter.contains(3));
        assert_eq!(filter.name(), "always@08-16");
    }

    #[test]
    fn overnight_window_wraps() {
        let filter = SessionFilter::new(Arc::new(Always), 22, 2);
        assert!(filter.contains(23));
        assert!(filter.contains(1));
        assert!(!filter.contains(2));
        assert!(!filter.contains(12));
    }

    #[test]
    fn gates_inner_rule_by_bar_hour() {
        let mut candles = candles_from_closes(&[100.0, 100.0]);
        let frame = blank_frame(2);
        let filter = SessionFilter::new(Arc::new(Always), 8, 16);

        // fixtures start at midnight
        assert!(filter
            .evaluate(&BarContext::new(&candles, &frame, 1))
            .is_none());

        candles[1].timestamp += Duration::hours(9);
        assert!(filter
            .evaluate(&BarContext::new(&candles, &frame, 1))
            .is_some());
    }
}
