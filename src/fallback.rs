use crate::error::{AppError, Result};
use crate::models::StationRecord;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Load the bundled station dataset shown before the first live refresh.
///
/// Entries with a duplicate id or a non-finite position are skipped.
pub fn load_stations<P: AsRef<Path>>(path: P) -> Result<Vec<StationRecord>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read fallback dataset {}: {}",
            path.display(),
            e
        ))
    })?;

    let entries: Vec<StationRecord> = serde_json::from_str(&content)?;
    let total = entries.len();

    let mut seen = HashSet::new();
    let stations: Vec<StationRecord> = entries
        .into_iter()
        .filter(|station| {
            if !station.latitude.is_finite() || !station.longitude.is_finite() {
                warn!("Fallback station {} has no usable position", station.id);
                return false;
            }
            if !seen.insert(station.id.clone()) {
                warn!("Fallback station {} appears more than once", station.id);
                return false;
            }
            true
        })
        .collect();

    info!(
        "Loaded {}/{} fallback stations from {}",
        stations.len(),
        total,
        path.display()
    );
    Ok(stations)
}
