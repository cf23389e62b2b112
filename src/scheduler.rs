use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::pipeline::Pipeline;
use crate::store::StationStore;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

/// Single-flight guard: at most one refresh holds a permit at a time.
#[derive(Debug, Clone, Default)]
pub struct RefreshGate {
    in_flight: Arc<AtomicBool>,
}

/// Releases the gate when dropped.
#[derive(Debug)]
pub struct RefreshPermit {
    in_flight: Arc<AtomicBool>,
}

impl RefreshGate {
    pub fn try_begin(&self) -> Option<RefreshPermit> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshPermit {
                in_flight: Arc::clone(&self.in_flight),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for RefreshPermit {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// One fetch, process and publish cycle.
pub struct Refresher {
    fetcher: Fetcher,
    pipeline: Pipeline,
    store: Arc<StationStore>,
}

impl Refresher {
    pub fn new(fetcher: Fetcher, pipeline: Pipeline, store: Arc<StationStore>) -> Self {
        Self {
            fetcher,
            pipeline,
            store,
        }
    }

    /// Run a cycle and return how many stations were published.
    ///
    /// On any error, or when the cycle produced no stations, the previously
    /// published set stays in place.
    pub async fn refresh(&self) -> Result<usize> {
        let body = self.fetcher.fetch_feed().await?;
        let report = self.pipeline.process(&body, Utc::now())?;
        let stats = &report.stats;

        info!(
            "Reconciled {} metadata rows against {} measurement rows: {} stations, {} rejected \
             (deactivated {}, withdrawn {}, stale {}, no measurement {}, no temperature {}, unknown id {}, malformed {})",
            report.metadata_rows,
            report.measurement_rows,
            stats.emitted,
            stats.rejected(),
            stats.deactivated,
            stats.withdrawn,
            stats.stale,
            stats.missing_measurement,
            stats.missing_temperature,
            stats.unknown_id,
            stats.malformed
        );

        if report.stations.is_empty() {
            warn!("Refresh produced no stations, keeping the previous set");
            return Ok(0);
        }

        let count = report.stations.len();
        self.store.publish(report.stations);
        Ok(count)
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    refresher: Arc<Refresher>,
    gate: RefreshGate,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        refresher: Arc<Refresher>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            refresher,
            gate: RefreshGate::default(),
            shutdown_rx,
        }
    }

    pub fn gate(&self) -> &RefreshGate {
        &self.gate
    }

    /// Tick until shutdown. The first refresh runs right after the initial
    /// delay; a tick that finds a refresh still running is skipped.
    pub async fn run(&mut self) -> Result<()> {
        let initial_delay = Duration::from_secs(self.config.initial_delay_seconds);
        let poll_interval = Duration::from_secs(self.config.interval_seconds);

        info!(
            "Scheduler starting with {}s initial delay, {}s interval",
            self.config.initial_delay_seconds, self.config.interval_seconds
        );

        if *self.shutdown_rx.borrow() {
            info!("Shutdown already requested, not starting");
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(initial_delay) => {},
            _ = self.shutdown_rx.changed() => {
                info!("Shutdown received during initial delay");
                return Ok(());
            }
        }

        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.trigger(),
                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }

        Ok(())
    }

    fn trigger(&self) {
        let Some(permit) = self.gate.try_begin() else {
            warn!("Previous refresh still in flight, skipping this tick");
            return;
        };

        let refresher = Arc::clone(&self.refresher);
        tokio::spawn(async move {
            let _permit = permit;
            match refresher.refresh().await {
                Ok(count) => info!("Refresh completed: {} stations published", count),
                Err(e) => error!("Refresh failed, keeping previous stations: {}", e),
            }
        });
    }
}
