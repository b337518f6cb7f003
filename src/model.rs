use std::fmt;

/// Trend label carried on a bar by the upstream model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trend {
    Buy,
    Sell,
    Neutral,
}

impl Trend {
    /// Parse an upstream tag, ignoring case and surrounding whitespace.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            "NEUTRAL" => Some(Self::Neutral),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decision tag as delivered upstream.
///
/// Unknown tags are kept verbatim so the signal extractor can report and drop
/// them instead of the normalizer silently discarding them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Buy,
    Sell,
    Unrecognized(String),
}

impl Decision {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "BUY" => Self::Buy,
            "SELL" => Self::Sell,
            _ => Self::Unrecognized(tag.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// One OHLCV sample. `time` is seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub trend: Option<Trend>,
    pub decision: Option<Decision>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorPoint {
    pub time: i64,
    pub value: f64,
}

/// A maximal run of consecutive trend-tagged bars sharing one label.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub trend: Trend,
    pub points: Vec<IndicatorPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    pub time: i64,
    pub price: f64,
    pub direction: Direction,
}
