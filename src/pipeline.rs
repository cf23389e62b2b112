use crate::colorizer::ColorStrategy;
use crate::config::{Config, StationFilter};
use crate::error::Result;
use crate::extractor::extract_fragments;
use crate::literal::parse_rows;
use crate::models::StationRecord;
use crate::reconciler::{ReconcileStats, Reconciler};
use chrono::{DateTime, Utc};
use tracing::info;

/// Outcome of one pass over a feed payload.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub stations: Vec<StationRecord>,
    pub stats: ReconcileStats,
    pub metadata_rows: usize,
    pub measurement_rows: usize,
    pub filtered_out: usize,
}

/// Payload text in, colored station records out.
pub struct Pipeline {
    reconciler: Reconciler,
    colorizer: ColorStrategy,
    filter: StationFilter,
}

impl Pipeline {
    pub fn new(reconciler: Reconciler, colorizer: ColorStrategy, filter: StationFilter) -> Self {
        Self {
            reconciler,
            colorizer,
            filter,
        }
    }

    /// Build from configuration. `catalog` is the fallback dataset, used as
    /// the identity source when joining by id.
    pub fn from_config(config: &Config, catalog: &[StationRecord]) -> Self {
        let reconciler = Reconciler::new(config.pipeline.reconcile_options(), config.projection)
            .with_catalog(catalog);

        Self::new(
            reconciler,
            config.pipeline.colorizer,
            config.stations.clone(),
        )
    }

    /// Run extract, parse, reconcile, filter and colorize on one payload.
    ///
    /// Only a missing fragment is an error. A fragment that fails to parse
    /// counts as zero rows.
    pub fn process(&self, body: &str, now: DateTime<Utc>) -> Result<CycleReport> {
        let fragments = extract_fragments(body)?;

        let metadata = parse_rows(&fragments.metadata);
        let measurements = parse_rows(&fragments.measurements);

        let (stations, stats) = self.reconciler.reconcile(&metadata, &measurements, now);
        let (stations, filtered_out) = self.filter_and_color(stations);

        Ok(CycleReport {
            stations,
            stats,
            metadata_rows: metadata.len(),
            measurement_rows: measurements.len(),
            filtered_out,
        })
    }

    /// Station set shown before the first live refresh: the catalog with the
    /// same filter and coloring a live cycle gets.
    pub fn initial_stations(&self, catalog: &[StationRecord]) -> Vec<StationRecord> {
        self.filter_and_color(catalog.to_vec()).0
    }

    fn filter_and_color(&self, mut stations: Vec<StationRecord>) -> (Vec<StationRecord>, usize) {
        let before_filter = stations.len();
        stations.retain(|station| self.filter.matches(station));
        let filtered_out = before_filter - stations.len();

        if filtered_out > 0 {
            info!(
                "Station filter: kept {}/{} stations matching configured criteria",
                stations.len(),
                before_filter
            );
        }

        (self.colorizer.apply(stations), filtered_out)
    }
}
