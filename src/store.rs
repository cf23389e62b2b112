use crate::models::StationRecord;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// An immutable published station set.
pub type StationSet = Arc<[StationRecord]>;

/// Holds the station set currently on display.
///
/// Each publish swaps in a whole new set; readers holding the previous
/// `Arc` keep a consistent view until they look again.
pub struct StationStore {
    tx: watch::Sender<StationSet>,
}

impl StationStore {
    pub fn new(initial: Vec<StationRecord>) -> Self {
        let (tx, _rx) = watch::channel(StationSet::from(initial));
        Self { tx }
    }

    pub fn publish(&self, stations: Vec<StationRecord>) {
        let count = stations.len();
        self.tx.send_replace(StationSet::from(stations));
        debug!("Published {} stations", count);
    }

    pub fn current(&self) -> StationSet {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StationSet> {
        self.tx.subscribe()
    }
}

impl Default for StationStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
