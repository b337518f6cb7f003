use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Ema;
use crate::indicator::{Indicator, SeriesOutput, close_prices, with_times};
use crate::model::{Bar, IndicatorPoint};

pub struct Macd {
    pub(crate) fast_period: usize,
    pub(crate) slow_period: usize,
    pub(crate) signal_period: usize,
}

/// The three MACD series, each stamped with bar times.
///
/// `line` starts at the bar where the slow EMA warms up; `signal` and
/// `histogram` share the later time base where the signal EMA warms up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<IndicatorPoint>,
    pub signal: Vec<IndicatorPoint>,
    pub histogram: Vec<IndicatorPoint>,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_period must be < slow_period".into(),
            });
        }
        Ok(Self {
            fast_period,
            slow_period,
            signal_period,
        })
    }

    /// MACD line values aligned to the slow EMA.
    fn line_values(&self, prices: &[f64]) -> Vec<f64> {
        let fast_ema = Ema {
            period: self.fast_period,
        }
        .calculate_prices(prices);
        let slow_ema = Ema {
            period: self.slow_period,
        }
        .calculate_prices(prices);

        if slow_ema.is_empty() {
            return Vec::new();
        }

        // fast_ema is longer by (slow_period - fast_period) leading values
        let offset = self.slow_period - self.fast_period;
        fast_ema[offset..]
            .iter()
            .zip(slow_ema.iter())
            .map(|(f, s)| f - s)
            .collect()
    }

    pub fn calculate_full(&self, bars: &[Bar]) -> MacdSeries {
        let line_values = self.line_values(&close_prices(bars));
        let line = with_times(bars, line_values);

        let signal_values = Ema {
            period: self.signal_period,
        }
        .calculate_prices(&line.iter().map(|p| p.value).collect::<Vec<_>>());

        // signal is shorter than the line by (signal_period - 1)
        let signal_offset = line.len().saturating_sub(signal_values.len());
        let signal: Vec<IndicatorPoint> = line[signal_offset..]
            .iter()
            .zip(signal_values)
            .map(|(m, s)| IndicatorPoint {
                time: m.time,
                value: s,
            })
            .collect();

        let histogram = line[signal_offset..]
            .iter()
            .zip(signal.iter())
            .map(|(m, s)| IndicatorPoint {
                time: m.time,
                value: m.value - s.value,
            })
            .collect();

        MacdSeries {
            line,
            signal,
            histogram,
        }
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        "macd"
    }

    fn required_bars(&self) -> usize {
        self.slow_period + self.signal_period - 1
    }

    /// Returns MACD line values only.
    fn calculate(&self, bars: &[Bar]) -> Vec<f64> {
        self.line_values(&close_prices(bars))
    }

    fn series(&self, bars: &[Bar]) -> Vec<SeriesOutput> {
        let full = self.calculate_full(bars);
        vec![
            (Some("line"), full.line),
            (Some("signal"), full.signal),
            (Some("histogram"), full.histogram),
        ]
    }
}
