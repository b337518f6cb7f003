use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::indicator::build_indicators;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_limit() -> usize {
    500
}

fn default_requests_per_second() -> u32 {
    2
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    60
}

fn default_recent_signals() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub indicators: Vec<IndicatorConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Accepted values: `"http"` | `"file"`
    pub kind: String,
    pub url: Option<String>,
    /// Optional endpoint returning the latest bar for live ticks.
    pub tick_url: Option<String>,
    pub path: Option<String>,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub interval: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    /// Upper bound on a single HTTP request, connect through body.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Live-tick poll cadence; ticks are off when unset.
    pub tick_secs: Option<u64>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            tick_secs: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PanelConfig {
    #[serde(default = "default_recent_signals")]
    pub recent_signals: usize,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            recent_signals: default_recent_signals(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: toml::Table,
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

const VALID_SOURCE_KINDS: &[&str] = &["http", "file"];
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_source(config)?;
    validate_refresh(config)?;
    validate_indicator_names_unique(config)?;
    validate_indicator_params(config)?;
    Ok(())
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(invalid(format!(
            "general.log_format \"{}\" is not valid",
            config.general.log_format
        )));
    }
    Ok(())
}

fn validate_source(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let source = &config.source;
    if !VALID_SOURCE_KINDS.contains(&source.kind.as_str()) {
        return Err(invalid(format!(
            "source.kind \"{}\" is not valid",
            source.kind
        )));
    }
    if source.kind == "http" && source.url.is_none() {
        return Err(invalid("source.url is required for kind \"http\"".into()));
    }
    if source.kind == "file" && source.path.is_none() {
        return Err(invalid("source.path is required for kind \"file\"".into()));
    }
    if source.requests_per_second == 0 {
        return Err(invalid("source.requests_per_second must be > 0".into()));
    }
    if source.request_timeout_secs == 0 {
        return Err(invalid("source.request_timeout_secs must be > 0".into()));
    }
    Ok(())
}

fn validate_refresh(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.refresh.interval_secs == 0 {
        return Err(invalid("refresh.interval_secs must be > 0".into()));
    }
    if config.refresh.tick_secs == Some(0) {
        return Err(invalid("refresh.tick_secs must be > 0".into()));
    }
    Ok(())
}

fn validate_indicator_names_unique(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = std::collections::HashSet::new();
    for indicator in &config.indicators {
        if !seen.insert(indicator.name.as_str()) {
            return Err(invalid(format!(
                "indicators: duplicate name \"{}\"",
                indicator.name
            )));
        }
    }
    Ok(())
}

fn validate_indicator_params(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    build_indicators(&config.indicators).change_context(ConfigError::Validation {
        field: "indicators".into(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"

[source]
kind = "http"
url = "https://example.invalid/bars"
tick_url = "https://example.invalid/bars/latest"
symbol = "NIFTY"
interval = "5m"
limit = 300

[refresh]
interval_secs = 30
tick_secs = 5

[panel]
recent_signals = 3

[[indicators]]
name = "rsi_14"
kind = "rsi"
params = { period = 14 }

[[indicators]]
name = "macd"
kind = "macd"
params = { fast_period = 12, slow_period = 26, signal_period = 9 }
"#;
        let config = parse(toml);
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.source.limit, 300);
        assert_eq!(config.refresh.tick_secs, Some(5));
        assert_eq!(config.panel.recent_signals, 3);
        assert_eq!(config.indicators.len(), 2);
    }

    #[test]
    fn defaults_applied_when_fields_omitted() {
        let toml = r#"
[source]
kind = "file"
path = "./bars.json"
"#;
        let config = parse(toml);
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.source.limit, 500);
        assert_eq!(config.source.requests_per_second, 2);
        assert_eq!(config.source.request_timeout_secs, 10);
        assert_eq!(config.refresh.interval_secs, 60);
        assert_eq!(config.refresh.tick_secs, None);
        assert_eq!(config.panel.recent_signals, 5);
        assert!(config.indicators.is_empty());
    }

    #[test]
    fn http_source_requires_url() {
        let config = parse(
            r#"
[source]
kind = "http"
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_source_kind_rejected() {
        let config = parse(
            r#"
[source]
kind = "websocket"
url = "wss://example.invalid"
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_request_timeout_rejected() {
        let config = parse(
            r#"
[source]
kind = "http"
url = "https://example.invalid/bars"
request_timeout_secs = 0
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_refresh_interval_rejected() {
        let config = parse(
            r#"
[source]
kind = "file"
path = "bars.json"

[refresh]
interval_secs = 0
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn duplicate_indicator_names_rejected() {
        let config = parse(
            r#"
[source]
kind = "file"
path = "bars.json"

[[indicators]]
name = "dup"
kind = "sma"

[[indicators]]
name = "dup"
kind = "ema"
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn invalid_indicator_params_rejected() {
        let config = parse(
            r#"
[source]
kind = "file"
path = "bars.json"

[[indicators]]
name = "bad"
kind = "macd"
params = { fast_period = 30, slow_period = 26 }
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn missing_config_file_is_read_error() {
        let err = load(Path::new("/nonexistent/chart-feed.toml")).unwrap_err();
        assert!(matches!(err.current_context(), ConfigError::ReadFile));
    }
}
