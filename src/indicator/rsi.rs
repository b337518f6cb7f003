use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, close_prices};
use crate::model::Bar;

/// RSI (Relative Strength Index) using Wilder's smoothing method.
pub struct Rsi {
    pub(crate) period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn required_bars(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<f64> {
        let prices = close_prices(bars);
        if prices.len() < self.required_bars() {
            return Vec::new();
        }

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
        let period = self.period as f64;

        let mut avg_gain = deltas[..self.period]
            .iter()
            .map(|&d| d.max(0.0))
            .sum::<f64>()
            / period;
        let mut avg_loss = deltas[..self.period]
            .iter()
            .map(|&d| (-d).max(0.0))
            .sum::<f64>()
            / period;

        let mut results = Vec::with_capacity(deltas.len() - self.period + 1);
        results.push(rsi_value(avg_gain, avg_loss));

        for &delta in &deltas[self.period..] {
            avg_gain = (avg_gain * (period - 1.0) + delta.max(0.0)) / period;
            avg_loss = (avg_loss * (period - 1.0) + (-delta).max(0.0)) / period;
            results.push(rsi_value(avg_gain, avg_loss));
        }

        results
    }
}

/// Zero average loss pins RSI to 100, or to 50 when the window is flat.
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::bars_from_closes;

    #[test]
    fn rsi_short_input_is_empty() {
        let rsi = Rsi::new(14).unwrap();
        assert!(rsi.calculate(&bars_from_closes(&[1.0; 14])).is_empty());
    }

    #[test]
    fn rsi_period_zero_invalid() {
        assert!(Rsi::new(0).is_err());
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let rsi = Rsi::new(3).unwrap();
        let values = rsi.calculate(&bars_from_closes(&[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(values, vec![100.0]);
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let rsi = Rsi::new(3).unwrap();
        let values = rsi.calculate(&bars_from_closes(&[4.0, 3.0, 2.0, 1.0]));
        assert!(values[0].abs() < 1e-9);
    }

    #[test]
    fn rsi_flat_window_is_neutral() {
        let rsi = Rsi::new(3).unwrap();
        let values = rsi.calculate(&bars_from_closes(&[5.0; 6]));
        assert!(values.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn rsi_known_value() {
        let rsi = Rsi::new(2).unwrap();
        // deltas +2, -1 -> avg_gain 1.0, avg_loss 0.5 -> rs 2 -> 66.67
        let values = rsi.calculate(&bars_from_closes(&[10.0, 12.0, 11.0]));
        assert!((values[0] - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_wilder_smoothing() {
        let rsi = Rsi::new(2).unwrap();
        // seed gain 1.0 loss 0.5; next delta +1 -> gain 1.0, loss 0.25 -> rs 4 -> 80
        let values = rsi.calculate(&bars_from_closes(&[10.0, 12.0, 11.0, 12.0]));
        assert_eq!(values.len(), 2);
        assert!((values[1] - 80.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_output_length() {
        let rsi = Rsi::new(14).unwrap();
        let values = rsi.calculate(&bars_from_closes(&[100.0_f64; 20]));
        assert_eq!(values.len(), 20 - 14);
    }

    #[test]
    fn rsi_bounds_hold_on_noisy_series() {
        let rsi = Rsi::new(5).unwrap();
        let closes: Vec<f64> = (0..200)
            .map(|i| 100.0 + ((i * 37) % 17) as f64 - 8.0 + (i as f64 * 0.1).sin() * 3.0)
            .collect();
        let values = rsi.calculate(&bars_from_closes(&closes));
        assert!(!values.is_empty());
        assert!(values.iter().all(|&v| (0.0..=100.0).contains(&v)));
    }
}
