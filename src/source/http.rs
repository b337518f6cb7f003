use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::source::{BarSource, records_from_payload};

const SOURCE_NAME: &str = "http";

/// REST market-data endpoint returning a JSON array of bar records.
pub struct HttpSource {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    url: String,
    tick_url: Option<String>,
    symbol: String,
    interval: String,
    limit: usize,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> Result<Self, Report<SourceError>> {
        let url = config.url.clone().ok_or_else(|| {
            Report::new(SourceError::Request {
                source_name: SOURCE_NAME.into(),
            })
            .attach("source.url is not configured")
        })?;
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(1u32));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .change_context(SourceError::Request {
                source_name: SOURCE_NAME.into(),
            })?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            url,
            tick_url: config.tick_url.clone(),
            symbol: config.symbol.clone(),
            interval: config.interval.clone(),
            limit: config.limit,
        })
    }

    async fn get_json(&self, url: &str, limit: usize) -> Result<Value, Report<SourceError>> {
        // Wait for rate limiter before making the request
        self.rate_limiter.until_ready().await;

        let limit_str = limit.to_string();
        let params = [
            ("symbol", self.symbol.as_str()),
            ("interval", self.interval.as_str()),
            ("limit", limit_str.as_str()),
        ];

        let response = self
            .client
            .get(url)
            .query(&params)
            .send()
            .await
            .change_context(SourceError::Request {
                source_name: SOURCE_NAME.into(),
            })
            .attach_with(|| format!("url: {url}"))?;

        if !response.status().is_success() {
            return Err(Report::new(SourceError::Request {
                source_name: SOURCE_NAME.into(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        response
            .json::<Value>()
            .await
            .change_context(SourceError::ResponseParse {
                source_name: SOURCE_NAME.into(),
            })
    }
}

impl BarSource for HttpSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Value>, Report<SourceError>>> {
        Box::pin(async move {
            let payload = self.get_json(&self.url, self.limit).await?;
            let records = records_from_payload(payload).ok_or_else(|| {
                Report::new(SourceError::ResponseParse {
                    source_name: SOURCE_NAME.into(),
                })
                .attach("payload is not an array of bar records")
            })?;

            info!(
                symbol = %self.symbol,
                interval = %self.interval,
                fetched = records.len(),
                "bar fetch complete"
            );
            Ok(records)
        })
    }

    fn fetch_latest(&self) -> BoxFuture<'_, Result<Option<Value>, Report<SourceError>>> {
        Box::pin(async move {
            let Some(tick_url) = self.tick_url.as_deref() else {
                return Ok(None);
            };
            let payload = self.get_json(tick_url, 1).await?;
            let latest = match records_from_payload(payload.clone()) {
                Some(mut records) => records.pop(),
                None if payload.is_object() => Some(payload),
                None => None,
            };
            debug!(symbol = %self.symbol, found = latest.is_some(), "latest bar fetch complete");
            Ok(latest)
        })
    }
}
