use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum SourceError {
    #[display("request to {source_name} failed")]
    Request { source_name: String },
    #[display("failed to parse response from {source_name}")]
    ResponseParse { source_name: String },
    #[display("failed to read bar file {path}")]
    ReadFile { path: String },
}

#[derive(Debug, Display, Error)]
pub enum NormalizeError {
    #[display("insufficient data: need {required} valid bars, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("tick at {tick} is older than last bar at {last}")]
    StaleTick { last: i64, tick: i64 },
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum PipelineError {
    #[display("series {series} is not aligned to the bar time base")]
    Alignment { series: String },
}
