use tracing::warn;

use crate::model::{Bar, Decision, Direction, Signal};

/// Emit one marker per bar carrying a BUY or SELL decision, in bar order.
///
/// Unrecognized decision tags are logged and skipped.
pub fn extract_signals(bars: &[Bar]) -> Vec<Signal> {
    bars.iter()
        .filter_map(|bar| {
            let direction = match bar.decision.as_ref()? {
                Decision::Buy => Direction::Buy,
                Decision::Sell => Direction::Sell,
                Decision::Unrecognized(tag) => {
                    warn!(time = bar.time, tag = %tag, "dropping unrecognized decision tag");
                    return None;
                }
            };
            Some(Signal {
                time: bar.time,
                price: bar.close,
                direction,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64, close: f64, decision: Option<Decision>) -> Bar {
        Bar {
            time,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
            trend: None,
            decision,
        }
    }

    #[test]
    fn buy_tag_yields_one_signal() {
        let bars = vec![bar(1, 100.0, Some(Decision::Buy)), bar(2, 101.0, None)];
        let signals = extract_signals(&bars);
        assert_eq!(
            signals,
            vec![Signal {
                time: 1,
                price: 100.0,
                direction: Direction::Buy,
            }]
        );
    }

    #[test]
    fn untagged_bars_yield_nothing() {
        let bars = vec![bar(1, 1.0, None), bar(2, 2.0, None)];
        assert!(extract_signals(&bars).is_empty());
    }

    #[test]
    fn preserves_order_and_drops_unknown_tags() {
        let bars = vec![
            bar(1, 10.0, Some(Decision::Sell)),
            bar(2, 11.0, Some(Decision::Unrecognized("HOLD".into()))),
            bar(3, 12.0, Some(Decision::Buy)),
        ];
        let signals = extract_signals(&bars);
        let summary: Vec<(i64, Direction)> =
            signals.iter().map(|s| (s.time, s.direction)).collect();
        assert_eq!(summary, vec![(1, Direction::Sell), (3, Direction::Buy)]);
    }
}
