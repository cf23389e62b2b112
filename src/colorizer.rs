//! Temperature to color mapping for the station markers.
//!
//! Both strategies look only at the current cycle's stations.

use crate::models::{StationRecord, NEUTRAL_COLOR};
use serde::Deserialize;

/// Ordered cold-to-hot palette.
pub const PALETTE: [&str; 25] = [
    "#2c0b6b", "#3a1c8c", "#3f33ad", "#3b4fc7", "#3569d6", "#2f82dd", "#2b99dc", "#2eaed3",
    "#3cc0c3", "#54cfae", "#71da96", "#90e27d", "#aee866", "#c9e952", "#e1e444", "#f2d63c",
    "#fbc239", "#fea938", "#fd8e36", "#f87233", "#ee572f", "#de3f2c", "#c92b29", "#b01a26",
    "#920e22",
];

/// Index of the palette midpoint.
pub const PALETTE_MIDPOINT: usize = PALETTE.len() / 2;

/// Readings further than this from the plain mean are ignored by the
/// trimmed mean.
const OUTLIER_DISTANCE: f64 = 10.0;

/// Steps between the baseline and the trimmed mean.
const BASELINE_STEPS_BELOW_MEAN: f64 = 12.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorStrategy {
    /// Stretch this cycle's min..max over the palette.
    FixedRange,
    /// One palette step per degree around a baseline below the trimmed mean.
    #[default]
    MeanCentered,
}

impl ColorStrategy {
    /// Return the stations with `color` assigned.
    pub fn apply(self, mut stations: Vec<StationRecord>) -> Vec<StationRecord> {
        let indices = self.palette_indices(&stations);
        for (station, index) in stations.iter_mut().zip(indices) {
            station.color = index
                .map(|i| PALETTE[i])
                .unwrap_or(NEUTRAL_COLOR)
                .to_string();
        }
        stations
    }

    /// Palette index per station, `None` for stations without a temperature.
    pub fn palette_indices(self, stations: &[StationRecord]) -> Vec<Option<usize>> {
        match self {
            ColorStrategy::FixedRange => fixed_range_indices(stations),
            ColorStrategy::MeanCentered => mean_centered_indices(stations),
        }
    }
}

fn fixed_range_indices(stations: &[StationRecord]) -> Vec<Option<usize>> {
    let temps = valid_temperatures(stations);
    if temps.is_empty() {
        return vec![None; stations.len()];
    }
    let min = temps.iter().copied().fold(f64::INFINITY, f64::min);
    let max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let last = (PALETTE.len() - 1) as f64;

    stations
        .iter()
        .map(|station| {
            let t = station.current_temp()?;
            if max == min {
                return Some(PALETTE_MIDPOINT);
            }
            let scaled = ((t - min) / (max - min) * last).floor();
            Some(scaled.clamp(0.0, last) as usize)
        })
        .collect()
}

fn mean_centered_indices(stations: &[StationRecord]) -> Vec<Option<usize>> {
    let Some(baseline) = baseline(stations) else {
        return vec![None; stations.len()];
    };
    let last = PALETTE.len() - 1;

    stations
        .iter()
        .map(|station| {
            let t = station.current_temp()?;
            Some(mean_centered_step(t, baseline, last))
        })
        .collect()
}

/// Highest step `i` in `1..=last` with `t >= baseline + i`, else 0.
fn mean_centered_step(t: f64, baseline: f64, last: usize) -> usize {
    let above = (t - baseline).floor();
    if above < 1.0 {
        0
    } else {
        (above as usize).min(last)
    }
}

/// Zero-step temperature for the mean-centered scale.
///
/// Only valid readings (status `0`, finite temperature) count. Halves round
/// toward positive infinity, so a trimmed mean of -2.5 centers on -2.
pub fn baseline(stations: &[StationRecord]) -> Option<f64> {
    let temps = valid_temperatures(stations);

    let overall = mean(&temps)?;
    let trimmed: Vec<f64> = temps
        .iter()
        .copied()
        .filter(|t| (t - overall).abs() <= OUTLIER_DISTANCE)
        .collect();
    let center = mean(&trimmed).unwrap_or(overall);

    Some(round_half_up(center) - BASELINE_STEPS_BELOW_MEAN)
}

/// Temperatures of stations whose reading has status `0`.
fn valid_temperatures(stations: &[StationRecord]) -> Vec<f64> {
    stations
        .iter()
        .filter(|s| s.weather.as_ref().is_some_and(|w| w.is_valid()))
        .filter_map(StationRecord::current_temp)
        .collect()
}

fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
