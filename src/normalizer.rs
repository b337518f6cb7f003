use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use derive_more::Display;
use error_stack::{Report, bail};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::NormalizeError;
use crate::model::{Bar, Decision, Trend};

/// Fewer valid bars than this and no indicator can be computed.
pub const MIN_BARS: usize = 2;

/// Epoch values at or above this are treated as milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Output of a full normalization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub bars: Vec<Bar>,
    /// Records dropped as malformed.
    pub dropped: usize,
}

/// A number or string as delivered by loosely-typed upstream payloads.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct KeyedRecord {
    #[serde(alias = "timestamp", alias = "date")]
    time: Option<Loose>,
    open: Option<Loose>,
    high: Option<Loose>,
    low: Option<Loose>,
    close: Option<Loose>,
    volume: Option<Loose>,
    trend: Option<Loose>,
    decision: Option<Loose>,
}

#[derive(Debug, Display)]
enum DropReason {
    #[display("record is neither an object nor a [time, open, high, low, close, volume] row")]
    Shape,
    #[display("missing or unparseable time")]
    Time,
    #[display("missing or non-finite {_0}")]
    Price(&'static str),
    #[display("negative or non-finite volume")]
    Volume,
    #[display("high/low do not bound open/close")]
    Bounds,
}

/// Convert raw upstream records into an ordered, de-duplicated bar sequence.
///
/// Malformed records are dropped and counted. Records sharing a timestamp
/// collapse to the last occurrence.
pub fn normalize(records: &[Value]) -> Result<Normalized, Report<NormalizeError>> {
    let mut by_time: BTreeMap<i64, Bar> = BTreeMap::new();
    let mut dropped = 0;
    let mut replaced = 0;

    for (index, record) in records.iter().enumerate() {
        match parse_record(record) {
            Ok(bar) => {
                if by_time.insert(bar.time, bar).is_some() {
                    replaced += 1;
                }
            }
            Err(reason) => {
                dropped += 1;
                debug!(index, %reason, "dropping malformed bar record");
            }
        }
    }

    if dropped > 0 {
        warn!(dropped, total = records.len(), "malformed bar records dropped");
    }
    if replaced > 0 {
        debug!(replaced, "duplicate timestamps collapsed to last occurrence");
    }

    let bars: Vec<Bar> = by_time.into_values().collect();
    if bars.len() < MIN_BARS {
        bail!(NormalizeError::InsufficientData {
            required: MIN_BARS,
            available: bars.len(),
        });
    }

    Ok(Normalized { bars, dropped })
}

/// Normalize a single live-tick record. Malformed ticks are logged and skipped.
pub fn normalize_tick(record: &Value) -> Option<Bar> {
    match parse_record(record) {
        Ok(bar) => Some(bar),
        Err(reason) => {
            warn!(%reason, "dropping malformed tick record");
            None
        }
    }
}

/// Fold a live tick into the sequence.
///
/// A tick at the last bar's time replaces that bar; a newer tick is appended.
/// Earlier bars are carried over untouched.
pub fn apply_tick(bars: &[Bar], tick: Bar) -> Result<Vec<Bar>, Report<NormalizeError>> {
    let mut next = bars.to_vec();
    match next.last() {
        Some(last) if tick.time < last.time => {
            bail!(NormalizeError::StaleTick {
                last: last.time,
                tick: tick.time,
            });
        }
        Some(last) if tick.time == last.time => {
            let slot = next.len() - 1;
            next[slot] = tick;
        }
        _ => next.push(tick),
    }
    Ok(next)
}

fn parse_record(record: &Value) -> Result<Bar, DropReason> {
    let keyed = match record {
        Value::Object(_) => {
            KeyedRecord::deserialize(record).map_err(|_| DropReason::Shape)?
        }
        Value::Array(row) => keyed_from_row(row)?,
        _ => return Err(DropReason::Shape),
    };

    let time = keyed.time.as_ref().and_then(parse_time).ok_or(DropReason::Time)?;
    let open = price(keyed.open.as_ref(), "open")?;
    let high = price(keyed.high.as_ref(), "high")?;
    let low = price(keyed.low.as_ref(), "low")?;
    let close = price(keyed.close.as_ref(), "close")?;

    let volume = match keyed.volume.as_ref() {
        None => 0.0,
        Some(v) => parse_number(v)
            .filter(|v| *v >= 0.0)
            .ok_or(DropReason::Volume)?,
    };

    if high < open.max(close) || low > open.min(close) {
        return Err(DropReason::Bounds);
    }

    let trend = keyed.trend.as_ref().and_then(|tag| {
        let text = tag_text(tag);
        let trend = Trend::from_tag(&text);
        if trend.is_none() {
            debug!(time, tag = %text, "ignoring unrecognized trend tag");
        }
        trend
    });
    let decision = keyed
        .decision
        .as_ref()
        .map(|tag| Decision::from_tag(&tag_text(tag)));

    Ok(Bar {
        time,
        open,
        high,
        low,
        close,
        volume,
        trend,
        decision,
    })
}

fn keyed_from_row(row: &[Value]) -> Result<KeyedRecord, DropReason> {
    if row.len() < 5 {
        return Err(DropReason::Shape);
    }
    let cell = |i: usize| -> Option<Loose> {
        row.get(i)
            .filter(|v| !v.is_null())
            .and_then(|v| Loose::deserialize(v).ok())
    };
    Ok(KeyedRecord {
        time: cell(0),
        open: cell(1),
        high: cell(2),
        low: cell(3),
        close: cell(4),
        volume: cell(5),
        trend: None,
        decision: None,
    })
}

fn price(value: Option<&Loose>, field: &'static str) -> Result<f64, DropReason> {
    value
        .and_then(parse_number)
        .ok_or(DropReason::Price(field))
}

fn parse_number(value: &Loose) -> Option<f64> {
    let n = match value {
        Loose::Int(n) => *n as f64,
        Loose::Float(f) => *f,
        Loose::Text(s) => s.trim().parse::<f64>().ok()?,
    };
    n.is_finite().then_some(n)
}

/// Epoch seconds, rejecting values outside the representable calendar range.
fn parse_time(value: &Loose) -> Option<i64> {
    parse_epoch(value).filter(|&t| DateTime::from_timestamp(t, 0).is_some())
}

fn parse_epoch(value: &Loose) -> Option<i64> {
    match value {
        Loose::Int(n) => Some(scale_epoch(*n)),
        Loose::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(scale_epoch(*f as i64)),
        Loose::Float(_) => None,
        Loose::Text(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                return Some(scale_epoch(n));
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().timestamp())
        }
    }
}

fn scale_epoch(n: i64) -> i64 {
    if n.unsigned_abs() >= MILLIS_THRESHOLD.unsigned_abs() {
        n / 1000
    } else {
        n
    }
}

fn tag_text(tag: &Loose) -> String {
    match tag {
        Loose::Int(n) => n.to_string(),
        Loose::Float(f) => f.to_string(),
        Loose::Text(s) => s.clone(),
    }
}
