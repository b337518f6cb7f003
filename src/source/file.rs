use std::path::PathBuf;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::info;

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::source::{BarSource, records_from_payload};

/// JSON file on disk, re-read on every load.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(config: &SourceConfig) -> Result<Self, Report<SourceError>> {
        let path = config.path.clone().ok_or_else(|| {
            Report::new(SourceError::ReadFile {
                path: String::new(),
            })
            .attach("source.path is not configured")
        })?;
        Ok(Self { path: path.into() })
    }

    fn read_error(&self) -> SourceError {
        SourceError::ReadFile {
            path: self.path.display().to_string(),
        }
    }
}

impl BarSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Value>, Report<SourceError>>> {
        Box::pin(async move {
            let content = tokio::fs::read_to_string(&self.path)
                .await
                .change_context(self.read_error())?;

            let payload: Value = serde_json::from_str(&content).change_context(
                SourceError::ResponseParse {
                    source_name: "file".into(),
                },
            )?;

            let records = records_from_payload(payload).ok_or_else(|| {
                Report::new(SourceError::ResponseParse {
                    source_name: "file".into(),
                })
                .attach(format!("{} does not hold an array of bar records", self.path.display()))
            })?;

            info!(path = %self.path.display(), fetched = records.len(), "bar file loaded");
            Ok(records)
        })
    }
}
