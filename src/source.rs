pub mod file;
pub mod http;

use std::sync::Arc;

use error_stack::Report;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::error::SourceError;
use file::FileSource;
use http::HttpSource;

/// Upstream market-data collaborator delivering loosely-typed bar records.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn BarSource`).
pub trait BarSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the full bar history for a data load.
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Value>, Report<SourceError>>>;

    /// Fetch the most recent bar for a live tick, if the source supports it.
    fn fetch_latest(&self) -> BoxFuture<'_, Result<Option<Value>, Report<SourceError>>> {
        Box::pin(async { Ok(None) })
    }
}

pub fn build_source(config: &SourceConfig) -> Result<Arc<dyn BarSource>, Report<SourceError>> {
    match config.kind.as_str() {
        "file" => Ok(Arc::new(FileSource::new(config)?)),
        _ => Ok(Arc::new(HttpSource::new(config)?)),
    }
}

/// Field names upstream services wrap bar arrays under.
const WRAPPER_KEYS: &[&str] = &["data", "bars", "candles"];

/// Unwrap a payload into its bar records: either a bare array or an object
/// holding one under a known key.
pub fn records_from_payload(payload: Value) -> Option<Vec<Value>> {
    match payload {
        Value::Array(records) => Some(records),
        Value::Object(mut map) => WRAPPER_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(records)) => Some(records),
                _ => None,
            }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array_payload() {
        let records = records_from_payload(json!([{ "time": 1 }, { "time": 2 }])).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn wrapped_payloads() {
        for key in WRAPPER_KEYS {
            let mut payload = serde_json::Map::new();
            payload.insert((*key).to_owned(), json!([{ "time": 1 }]));
            let records = records_from_payload(Value::Object(payload)).unwrap();
            assert_eq!(records.len(), 1, "{key}");
        }
    }

    #[test]
    fn unknown_payload_shape() {
        assert!(records_from_payload(json!({ "rows": [] })).is_none());
        assert!(records_from_payload(json!("bars")).is_none());
    }
}
