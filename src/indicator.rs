pub mod ma;
pub mod macd;
pub mod rsi;

use error_stack::Report;

use crate::config::IndicatorConfig;
use crate::error::IndicatorError;
use crate::model::{Bar, IndicatorPoint};

use ma::{Ema, Sma};
use macd::Macd;
use rsi::Rsi;

/// One named output of an indicator. Single-output indicators use `None`.
pub type SeriesOutput = (Option<&'static str>, Vec<IndicatorPoint>);

/// A technical analysis indicator that operates on a slice of bars.
///
/// Bars must be in ascending chronological order (oldest first). Fewer bars
/// than the warm-up period yields an empty series, not an error.
pub trait Indicator: Send + Sync {
    /// Unique name of this indicator kind (e.g., "rsi", "sma").
    fn name(&self) -> &str;

    /// Minimum number of bars required to produce at least one output value.
    fn required_bars(&self) -> usize;

    /// Calculate indicator values over closes.
    ///
    /// Values align to the most recent bars; the output may be shorter than
    /// the input by the indicator's warm-up.
    fn calculate(&self, bars: &[Bar]) -> Vec<f64>;

    /// Time-stamped output series.
    fn series(&self, bars: &[Bar]) -> Vec<SeriesOutput> {
        vec![(None, with_times(bars, self.calculate(bars)))]
    }
}

/// Extract close prices from a slice of bars.
pub fn close_prices(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Stamp values with the times of the trailing bars they align to.
pub fn with_times(bars: &[Bar], values: Vec<f64>) -> Vec<IndicatorPoint> {
    let offset = bars.len().saturating_sub(values.len());
    bars[offset..]
        .iter()
        .zip(values)
        .map(|(bar, value)| IndicatorPoint {
            time: bar.time,
            value,
        })
        .collect()
}

/// An indicator bound to the name its series are published under.
pub struct NamedIndicator {
    name: String,
    indicator: Box<dyn Indicator>,
}

impl NamedIndicator {
    pub fn new(name: impl Into<String>, indicator: Box<dyn Indicator>) -> Self {
        Self {
            name: name.into(),
            indicator,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        self.indicator.name()
    }

    pub fn required_bars(&self) -> usize {
        self.indicator.required_bars()
    }

    /// Series keyed by `name`, or `name.part` for multi-output indicators.
    pub fn keyed_series(&self, bars: &[Bar]) -> Vec<(String, Vec<IndicatorPoint>)> {
        self.indicator
            .series(bars)
            .into_iter()
            .map(|(part, points)| {
                let key = match part {
                    Some(part) => format!("{}.{part}", self.name),
                    None => self.name.clone(),
                };
                (key, points)
            })
            .collect()
    }
}

pub fn build_indicators(
    configs: &[IndicatorConfig],
) -> Result<Vec<NamedIndicator>, Report<IndicatorError>> {
    configs.iter().map(build_indicator).collect()
}

pub fn build_default_indicators() -> Vec<NamedIndicator> {
    vec![
        NamedIndicator::new("sma_20", Box::new(Sma { period: 20 })),
        NamedIndicator::new("ema_20", Box::new(Ema { period: 20 })),
        NamedIndicator::new("rsi_14", Box::new(Rsi { period: 14 })),
        NamedIndicator::new(
            "macd_12_26_9",
            Box::new(Macd {
                fast_period: 12,
                slow_period: 26,
                signal_period: 9,
            }),
        ),
    ]
}

fn build_indicator(config: &IndicatorConfig) -> Result<NamedIndicator, Report<IndicatorError>> {
    let indicator: Box<dyn Indicator> = match config.kind.as_str() {
        "sma" => Box::new(Sma::new(get_usize(config, "period", 20))?),
        "ema" => Box::new(Ema::new(get_usize(config, "period", 20))?),
        "rsi" => Box::new(Rsi::new(get_usize(config, "period", 14))?),
        "macd" => Box::new(Macd::new(
            get_usize(config, "fast_period", 12),
            get_usize(config, "slow_period", 26),
            get_usize(config, "signal_period", 9),
        )?),
        other => {
            return Err(Report::new(IndicatorError::InvalidParameter {
                name: format!("unknown indicator kind \"{other}\""),
            }));
        }
    };
    Ok(NamedIndicator::new(config.name.clone(), indicator))
}

fn get_usize(config: &IndicatorConfig, key: &str, default: usize) -> usize {
    config
        .params
        .get(key)
        .and_then(|v| v.as_integer())
        .map(|v| v.max(0) as usize)
        .unwrap_or(default)
}
