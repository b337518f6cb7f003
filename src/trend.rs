use crate::model::{Bar, IndicatorPoint, Segment};

/// Partition trend-tagged bars into maximal same-trend runs.
///
/// Untagged bars are skipped and do not break a run. Each point carries the
/// bar's close so the segment can be drawn as a colored price line.
pub fn segment_trends(bars: &[Bar]) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();

    for bar in bars {
        let Some(trend) = bar.trend else {
            continue;
        };
        let point = IndicatorPoint {
            time: bar.time,
            value: bar.close,
        };
        match segments.last_mut() {
            Some(current) if current.trend == trend => current.points.push(point),
            _ => segments.push(Segment {
                trend,
                points: vec![point],
            }),
        }
    }

    segments
}
