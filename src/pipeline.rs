use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use error_stack::Report;
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::indicator::NamedIndicator;
use crate::model::{Bar, IndicatorPoint, Segment, Signal};
use crate::normalizer::{apply_tick, normalize, normalize_tick};
use crate::signal::extract_signals;
use crate::trend::segment_trends;

/// Everything derived from one bar sequence. Recomputed wholesale, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub bars: Vec<Bar>,
    /// Keyed by indicator name (`name.part` for multi-output indicators).
    pub series: BTreeMap<String, Vec<IndicatorPoint>>,
    pub segments: Vec<Segment>,
    pub signals: Vec<Signal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartState {
    Ready(ChartData),
    NoData { reason: String },
}

#[derive(Debug, Clone)]
pub struct ChartSnapshot {
    pub load_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub state: ChartState,
}

impl ChartSnapshot {
    fn new(state: ChartState) -> Self {
        Self {
            load_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            state,
        }
    }

    pub fn ready(data: ChartData) -> Self {
        Self::new(ChartState::Ready(data))
    }

    pub fn no_data(reason: impl Into<String>) -> Self {
        Self::new(ChartState::NoData {
            reason: reason.into(),
        })
    }

    pub fn data(&self) -> Option<&ChartData> {
        match &self.state {
            ChartState::Ready(data) => Some(data),
            ChartState::NoData { .. } => None,
        }
    }
}

/// Run every indicator, the trend segmenter and the signal extractor over `bars`.
///
/// Indicators without enough bars contribute empty series. A series whose
/// times disagree with the bar time base is dropped, as is one that overflowed
/// to a non-finite value.
pub fn compute(bars: Vec<Bar>, indicators: &[NamedIndicator]) -> ChartData {
    let mut series = BTreeMap::new();

    for indicator in indicators {
        if bars.len() < indicator.required_bars() {
            debug!(
                indicator = indicator.name(),
                kind = indicator.kind(),
                available = bars.len(),
                required = indicator.required_bars(),
                "insufficient bars for indicator"
            );
        }

        for (key, points) in indicator.keyed_series(&bars) {
            let aligned = check_alignment(&key, &bars, &points);
            debug_assert!(aligned.is_ok(), "{aligned:?}");
            if let Err(report) = aligned {
                error!(error = ?report, "dropping misaligned series");
                continue;
            }
            if let Some(point) = points.iter().find(|p| !p.value.is_finite()) {
                warn!(
                    series = %key,
                    time = point.time,
                    value = point.value,
                    "dropping series with non-finite values"
                );
                continue;
            }
            series.insert(key, points);
        }
    }

    let segments = segment_trends(&bars);
    let signals = extract_signals(&bars);

    ChartData {
        bars,
        series,
        segments,
        signals,
    }
}

/// Normalize a full load and compute everything from it.
pub fn build_snapshot(records: &[Value], indicators: &[NamedIndicator]) -> ChartSnapshot {
    match normalize(records) {
        Ok(normalized) => {
            debug!(
                bars = normalized.bars.len(),
                dropped = normalized.dropped,
                "bars normalized"
            );
            ChartSnapshot::ready(compute(normalized.bars, indicators))
        }
        Err(report) => {
            warn!(error = ?report, "no chartable data in load");
            ChartSnapshot::no_data(report.current_context().to_string())
        }
    }
}

/// A series must sit on a suffix of the bar times, point for point.
pub fn check_alignment(
    key: &str,
    bars: &[Bar],
    points: &[IndicatorPoint],
) -> Result<(), Report<PipelineError>> {
    let misaligned = || {
        Report::new(PipelineError::Alignment {
            series: key.to_owned(),
        })
    };

    let offset = bars.len().checked_sub(points.len()).ok_or_else(|| {
        misaligned().attach(format!("{} points for {} bars", points.len(), bars.len()))
    })?;

    let aligned = bars[offset..]
        .iter()
        .zip(points)
        .all(|(bar, point)| bar.time == point.time);
    if !aligned {
        return Err(misaligned().attach(format!("expected suffix starting at bar {offset}")));
    }
    Ok(())
}

/// Current bar sequence plus the indicators computed over it.
///
/// Full loads replace the sequence; live ticks append to or update its last
/// bar. Every change produces a fresh snapshot.
pub struct ChartFeed {
    indicators: Vec<NamedIndicator>,
    bars: Vec<Bar>,
}

impl ChartFeed {
    pub fn new(indicators: Vec<NamedIndicator>) -> Self {
        Self {
            indicators,
            bars: Vec::new(),
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn load(&mut self, records: &[Value]) -> ChartSnapshot {
        let snapshot = build_snapshot(records, &self.indicators);
        self.bars = snapshot
            .data()
            .map(|data| data.bars.clone())
            .unwrap_or_default();
        snapshot
    }

    /// Fold a live tick into the loaded sequence.
    ///
    /// Returns `None` when nothing is loaded yet or the tick is unusable.
    pub fn tick(&mut self, record: &Value) -> Option<ChartSnapshot> {
        if self.bars.is_empty() {
            debug!("tick received before first load, ignoring");
            return None;
        }
        let tick = normalize_tick(record)?;
        match apply_tick(&self.bars, tick) {
            Ok(bars) => {
                self.bars = bars.clone();
                Some(ChartSnapshot::ready(compute(bars, &self.indicators)))
            }
            Err(report) => {
                warn!(error = ?report, "ignoring tick");
                None
            }
        }
    }

    /// Drop the loaded sequence after a failed refresh.
    pub fn fail(&mut self, reason: impl Into<String>) -> ChartSnapshot {
        self.bars.clear();
        ChartSnapshot::no_data(reason)
    }
}
