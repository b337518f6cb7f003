use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::{ChartFeed, ChartSnapshot};
use crate::source::BarSource;
use crate::surface::ChartSurface;

pub type SnapshotReceiver = watch::Receiver<Option<Arc<ChartSnapshot>>>;

/// Drives fetch → normalize → compute → render on a fixed cadence.
///
/// Cycles run one at a time inside a single task, so a refresh always finishes
/// (or is abandoned on stop) before the next begins.
pub struct RefreshScheduler {
    source: Arc<dyn BarSource>,
    surface: Arc<dyn ChartSurface>,
    interval: Duration,
    tick_interval: Option<Duration>,
}

/// Running scheduler. Dropping it without `stop` leaves the task running.
pub struct RefreshHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    snapshots: SnapshotReceiver,
}

enum Cycle {
    Reload,
    Tick,
}

impl RefreshScheduler {
    pub fn new(
        source: Arc<dyn BarSource>,
        surface: Arc<dyn ChartSurface>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            surface,
            interval,
            tick_interval: None,
        }
    }

    /// Poll the source for live ticks between full reloads.
    pub fn with_ticks(mut self, every: Duration) -> Self {
        self.tick_interval = Some(every);
        self
    }

    pub fn start(self, feed: ChartFeed) -> RefreshHandle {
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(self.run(feed, tx, cancel.clone()));
        RefreshHandle {
            cancel,
            task,
            snapshots: rx,
        }
    }

    async fn run(
        self,
        mut feed: ChartFeed,
        tx: watch::Sender<Option<Arc<ChartSnapshot>>>,
        cancel: CancellationToken,
    ) {
        let mut reload = tokio::time::interval(self.interval);
        reload.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = self.tick_interval.map(|every| {
            let mut ticks = tokio::time::interval_at(Instant::now() + every, every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticks
        });

        info!(
            source = self.source.name(),
            interval_ms = self.interval.as_millis() as u64,
            ticks = ticks.is_some(),
            "refresh scheduler started"
        );

        loop {
            let cycle = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = reload.tick() => Cycle::Reload,
                _ = next_tick(&mut ticks) => Cycle::Tick,
            };

            let work = async {
                match cycle {
                    Cycle::Reload => Some(refresh_once(self.source.as_ref(), &mut feed).await),
                    Cycle::Tick => tick_once(self.source.as_ref(), &mut feed).await,
                }
            };

            let snapshot = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("in-flight refresh superseded by stop");
                    break;
                }
                snapshot = work => snapshot,
            };

            if let Some(snapshot) = snapshot {
                self.surface.render(&snapshot);
                tx.send_replace(Some(Arc::new(snapshot)));
            }
        }

        info!("refresh scheduler stopped");
    }
}

impl RefreshHandle {
    /// Latest published snapshot; readers always see the last writer.
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.snapshots.clone()
    }

    /// Clear the pending timer and wait for the task to wind down.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "refresh task ended abnormally");
        }
    }
}

async fn next_tick(ticks: &mut Option<Interval>) {
    match ticks {
        Some(ticks) => {
            ticks.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// One full data load. A failed fetch yields an explicit no-data snapshot.
pub async fn refresh_once(source: &dyn BarSource, feed: &mut ChartFeed) -> ChartSnapshot {
    match source.fetch().await {
        Ok(records) => {
            let snapshot = feed.load(&records);
            debug!(
                source = source.name(),
                records = records.len(),
                bars = feed.bars().len(),
                "load complete"
            );
            snapshot
        }
        Err(report) => {
            warn!(source = source.name(), error = ?report, "bar fetch failed");
            feed.fail(report.current_context().to_string())
        }
    }
}

async fn tick_once(source: &dyn BarSource, feed: &mut ChartFeed) -> Option<ChartSnapshot> {
    match source.fetch_latest().await {
        Ok(Some(record)) => feed.tick(&record),
        Ok(None) => None,
        Err(report) => {
            warn!(source = source.name(), error = ?report, "tick fetch failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    use error_stack::Report;
    use futures::future::BoxFuture;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::error::SourceError;
    use crate::indicator::ma::Sma;
    use crate::indicator::NamedIndicator;
    use crate::pipeline::ChartState;

    const WAIT: Duration = Duration::from_secs(2);

    fn record(time: i64, close: f64) -> Value {
        json!({ "time": time, "open": close, "high": close, "low": close, "close": close })
    }

    struct MemorySource {
        bars: usize,
        fetches: AtomicUsize,
        next_tick: AtomicI64,
        fail: bool,
        delay: Option<Duration>,
    }

    impl MemorySource {
        fn new(bars: usize) -> Self {
            Self {
                bars,
                fetches: AtomicUsize::new(0),
                next_tick: AtomicI64::new(bars as i64),
                fail: false,
                delay: None,
            }
        }
    }

    impl BarSource for MemorySource {
        fn name(&self) -> &str {
            "memory"
        }

        fn fetch(&self) -> BoxFuture<'_, Result<Vec<Value>, Report<SourceError>>> {
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.fetches.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(Report::new(SourceError::Request {
                        source_name: "memory".into(),
                    }));
                }
                Ok((0..self.bars as i64).map(|t| record(t, t as f64)).collect())
            })
        }

        fn fetch_latest(&self) -> BoxFuture<'_, Result<Option<Value>, Report<SourceError>>> {
            Box::pin(async move {
                let time = self.next_tick.fetch_add(1, Ordering::SeqCst);
                Ok(Some(record(time, 1.0)))
            })
        }
    }

    struct RecordingSurface {
        tx: mpsc::UnboundedSender<ChartSnapshot>,
    }

    impl ChartSurface for RecordingSurface {
        fn render(&self, snapshot: &ChartSnapshot) {
            let _ = self.tx.send(snapshot.clone());
        }
    }

    fn recording() -> (Arc<dyn ChartSurface>, mpsc::UnboundedReceiver<ChartSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(RecordingSurface { tx }), rx)
    }

    fn feed() -> ChartFeed {
        ChartFeed::new(vec![NamedIndicator::new(
            "sma_3",
            Box::new(Sma::new(3).unwrap()),
        )])
    }

    #[tokio::test]
    async fn refreshes_repeatedly_until_stopped() {
        let source = Arc::new(MemorySource::new(10));
        let (surface, mut rx) = recording();
        let handle = RefreshScheduler::new(source.clone(), surface, Duration::from_millis(20))
            .start(feed());

        for _ in 0..2 {
            let snapshot = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
            let data = snapshot.data().expect("ready");
            assert_eq!(data.bars.len(), 10);
            assert_eq!(data.series["sma_3"].len(), 8);
        }

        handle.stop().await;
        let fetches = source.fetches.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), fetches);
        while let Ok(Some(_)) = timeout(Duration::from_millis(10), rx.recv()).await {}
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn failed_fetch_renders_no_data() {
        let mut source = MemorySource::new(10);
        source.fail = true;
        let (surface, mut rx) = recording();
        let handle = RefreshScheduler::new(Arc::new(source), surface, Duration::from_secs(3600))
            .start(feed());

        let snapshot = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert!(matches!(snapshot.state, ChartState::NoData { .. }));
        handle.stop().await;
    }

    #[tokio::test]
    async fn ticks_extend_loaded_bars() {
        let source = Arc::new(MemorySource::new(10));
        let (surface, mut rx) = recording();
        let handle = RefreshScheduler::new(source, surface, Duration::from_secs(3600))
            .with_ticks(Duration::from_millis(10))
            .start(feed());

        let loaded = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(loaded.data().unwrap().bars.len(), 10);

        let ticked = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        let data = ticked.data().unwrap();
        assert_eq!(data.bars.len(), 11);
        assert_eq!(data.series["sma_3"].last().unwrap().time, 10);

        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_supersedes_in_flight_fetch() {
        let mut source = MemorySource::new(10);
        source.delay = Some(Duration::from_secs(30));
        let (surface, mut rx) = recording();
        let handle = RefreshScheduler::new(Arc::new(source), surface, Duration::from_secs(3600))
            .start(feed());

        tokio::time::sleep(Duration::from_millis(20)).await;
        timeout(WAIT, handle.stop()).await.expect("stop completes");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribers_see_latest_snapshot() {
        let source = Arc::new(MemorySource::new(5));
        let (surface, mut rx) = recording();
        let handle = RefreshScheduler::new(source, surface, Duration::from_secs(3600))
            .start(feed());
        let mut snapshots = handle.subscribe();

        let rendered = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        timeout(WAIT, snapshots.wait_for(|s| s.is_some()))
            .await
            .unwrap()
            .unwrap();
        let published = snapshots.borrow().clone().unwrap();
        assert_eq!(published.load_id, rendered.load_id);

        handle.stop().await;
    }

    #[tokio::test]
    async fn refresh_once_loads_feed() {
        let source = MemorySource::new(4);
        let mut feed = feed();
        let snapshot = refresh_once(&source, &mut feed).await;
        assert_eq!(snapshot.data().unwrap().bars.len(), 4);
        assert_eq!(feed.bars().len(), 4);
    }
}
