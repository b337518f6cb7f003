pub mod terminal;

use chrono::DateTime;

use crate::model::{Bar, Signal, Trend};
use crate::pipeline::{ChartData, ChartSnapshot};

/// Rendering sink for computed chart snapshots.
pub trait ChartSurface: Send + Sync {
    fn render(&self, snapshot: &ChartSnapshot);
}

/// Read-only summary of the latest values and decision history.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelView {
    pub last: Bar,
    /// Latest value per series; `None` while the series is still warming up.
    pub latest: Vec<(String, Option<f64>)>,
    /// Most recent signals, oldest first.
    pub recent_signals: Vec<Signal>,
    pub segment_count: usize,
    pub current_trend: Option<Trend>,
    /// Bars in the current trend segment.
    pub current_run: usize,
}

impl PanelView {
    /// Returns `None` for an empty bar sequence.
    pub fn from_data(data: &ChartData, recent: usize) -> Option<Self> {
        let last = data.bars.last()?;
        let latest = data
            .series
            .iter()
            .map(|(key, points)| (key.clone(), points.last().map(|p| p.value)))
            .collect();
        let skip = data.signals.len().saturating_sub(recent);
        let current = data.segments.last();

        Some(Self {
            last: last.clone(),
            latest,
            recent_signals: data.signals[skip..].to_vec(),
            segment_count: data.segments.len(),
            current_trend: current.map(|s| s.trend),
            current_run: current.map_or(0, |s| s.points.len()),
        })
    }
}

/// Render an epoch-seconds timestamp as RFC 3339, falling back to the raw number.
pub fn format_time(time: i64) -> String {
    DateTime::from_timestamp(time, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| time.to_string())
}
