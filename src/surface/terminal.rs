use crate::pipeline::{ChartSnapshot, ChartState};
use crate::surface::{ChartSurface, PanelView, format_time};

/// Data panel that writes each snapshot to the log.
pub struct TerminalPanel {
    recent_signals: usize,
}

impl TerminalPanel {
    pub fn new(recent_signals: usize) -> Self {
        Self { recent_signals }
    }
}

impl ChartSurface for TerminalPanel {
    fn render(&self, snapshot: &ChartSnapshot) {
        let data = match &snapshot.state {
            ChartState::Ready(data) => data,
            ChartState::NoData { reason } => {
                tracing::warn!(load_id = %snapshot.load_id, reason = %reason, "no data");
                return;
            }
        };

        let Some(view) = PanelView::from_data(data, self.recent_signals) else {
            tracing::warn!(load_id = %snapshot.load_id, "no data");
            return;
        };

        tracing::info!(
            load_id = %snapshot.load_id,
            generated_at = %snapshot.generated_at,
            bars = data.bars.len(),
            last_time = %format_time(view.last.time),
            open = view.last.open,
            high = view.last.high,
            low = view.last.low,
            close = view.last.close,
            volume = view.last.volume,
            segments = view.segment_count,
            trend = ?view.current_trend,
            trend_bars = view.current_run,
            "chart updated"
        );

        for (key, value) in &view.latest {
            match value {
                Some(value) => tracing::info!(series = %key, value, "latest"),
                None => tracing::debug!(series = %key, "warming up"),
            }
        }

        for signal in &view.recent_signals {
            tracing::info!(
                time = %format_time(signal.time),
                price = signal.price,
                direction = %signal.direction,
                "decision"
            );
        }
    }
}
