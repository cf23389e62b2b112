use crate::literal::{field_number, field_text, Row};
use crate::models::{StationRecord, WeatherReading, NEUTRAL_COLOR, STATUS_WITHDRAWN};
use crate::projection::{is_deactivated, Projector};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Default freshness threshold for a reading.
pub const DEFAULT_MAX_AGE_HOURS: i64 = 12;

const FEED_DATETIME_FORMAT: &str = "%d/%m/%Y %H:%M";

// Metadata row offsets
const META_ID: usize = 0;
const META_NAME: usize = 1;
const META_PROVINCE: usize = 2;
const META_PIXEL_X: usize = 3;
const META_PIXEL_Y: usize = 4;
const META_ALTITUDE: usize = 6;

// Measurement row offsets
const M_STATUS: usize = 0;
const M_DATE: usize = 2;
const M_TIME: usize = 3;
const M_CURRENT_TEMP: usize = 4;
const M_MAX_TEMP: usize = 5;
const M_MAX_TEMP_TIME: usize = 6;
const M_MIN_TEMP: usize = 7;
const M_MIN_TEMP_TIME: usize = 8;
const M_HUMIDITY: usize = 9;
const M_DEW_POINT: usize = 14;
const M_WIND_SPEED: usize = 25;
const M_MAX_WIND_SPEED: usize = 26;
const M_MAX_WIND_SPEED_TIME: usize = 27;
const M_WIND_DIRECTION: usize = 30;
const M_PRESSURE: usize = 31;
const M_PRECIPITATION_DAY: usize = 37;
const M_PRECIPITATION_YEAR: usize = 40;
const M_RAIN_RATE: usize = 41;
const M_MAX_RAIN_RATE: usize = 42;

/// What to do with a station whose weather is missing or has no temperature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherPolicy {
    /// Drop the station.
    #[default]
    Strict,
    /// Keep the station; the map shows a `?` placeholder.
    Lenient,
}

/// How a metadata row finds its identity and position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Row `i` of both arrays describes the same station; the position is
    /// projected from the canvas pixels.
    #[default]
    Positional,
    /// The metadata id is looked up in the station catalog, which provides
    /// name and geographic position. Ids missing from the catalog are dropped.
    ById,
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub weather_policy: WeatherPolicy,
    pub join: JoinStrategy,
    /// `None` disables the recency filter.
    pub max_age: Option<Duration>,
    /// Zone the feed's date and time fields are written in.
    pub timezone: Tz,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            weather_policy: WeatherPolicy::Strict,
            join: JoinStrategy::Positional,
            max_age: Some(Duration::hours(DEFAULT_MAX_AGE_HOURS)),
            timezone: chrono_tz::Europe::Rome,
        }
    }
}

/// Per-cycle counters of what happened to each metadata row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub total_rows: usize,
    pub emitted: usize,
    pub malformed: usize,
    pub deactivated: usize,
    pub missing_measurement: usize,
    pub withdrawn: usize,
    pub stale: usize,
    pub missing_temperature: usize,
    pub unknown_id: usize,
}

impl ReconcileStats {
    pub fn rejected(&self) -> usize {
        self.total_rows - self.emitted
    }
}

#[derive(Debug, Clone, PartialEq)]
struct MetadataRow {
    id: String,
    name: String,
    province: String,
    pixel_x: f64,
    pixel_y: f64,
    altitude: Option<f64>,
}

impl MetadataRow {
    fn from_row(row: &[serde_json::Value]) -> Option<Self> {
        let id = field_text(row, META_ID).filter(|id| !id.is_empty())?;
        Some(Self {
            id,
            name: field_text(row, META_NAME).unwrap_or_default(),
            province: field_text(row, META_PROVINCE).unwrap_or_default(),
            pixel_x: field_number(row, META_PIXEL_X),
            pixel_y: field_number(row, META_PIXEL_Y),
            altitude: Some(field_number(row, META_ALTITUDE)).filter(|a| a.is_finite()),
        })
    }
}

enum Rejection {
    Malformed,
    Deactivated,
    MissingMeasurement,
    Withdrawn,
    Stale,
    MissingTemperature,
    UnknownId,
}

/// Joins the metadata and measurement arrays into station records.
pub struct Reconciler {
    options: ReconcileOptions,
    projector: Projector,
    catalog: HashMap<String, StationRecord>,
}

impl Reconciler {
    pub fn new(options: ReconcileOptions, projector: Projector) -> Self {
        Self {
            options,
            projector,
            catalog: HashMap::new(),
        }
    }

    /// Attach the station catalog used by [`JoinStrategy::ById`].
    pub fn with_catalog(mut self, stations: &[StationRecord]) -> Self {
        self.catalog = stations
            .iter()
            .map(|s| (s.id.clone(), s.clone()))
            .collect();
        self
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconcile one cycle. Never fails: a bad row is only left out.
    ///
    /// Records come out with the neutral color; coloring is a separate pass.
    pub fn reconcile(
        &self,
        metadata: &[Row],
        measurements: &[Row],
        now: DateTime<Utc>,
    ) -> (Vec<StationRecord>, ReconcileStats) {
        let mut stations = Vec::with_capacity(metadata.len());
        let mut stats = ReconcileStats {
            total_rows: metadata.len(),
            ..ReconcileStats::default()
        };

        for (index, row) in metadata.iter().enumerate() {
            let measurement = measurements.get(index).map(Vec::as_slice);

            match self.reconcile_row(row, measurement, now) {
                Ok(station) => {
                    stations.push(station);
                    stats.emitted += 1;
                }
                Err(rejection) => {
                    let counter = match rejection {
                        Rejection::Malformed => &mut stats.malformed,
                        Rejection::Deactivated => &mut stats.deactivated,
                        Rejection::MissingMeasurement => &mut stats.missing_measurement,
                        Rejection::Withdrawn => &mut stats.withdrawn,
                        Rejection::Stale => &mut stats.stale,
                        Rejection::MissingTemperature => &mut stats.missing_temperature,
                        Rejection::UnknownId => &mut stats.unknown_id,
                    };
                    *counter += 1;
                }
            }
        }

        if measurements.len() != metadata.len() {
            debug!(
                "Array length mismatch: {} metadata rows, {} measurement rows",
                metadata.len(),
                measurements.len()
            );
        }

        (stations, stats)
    }

    fn reconcile_row(
        &self,
        row: &[serde_json::Value],
        measurement: Option<&[serde_json::Value]>,
        now: DateTime<Utc>,
    ) -> std::result::Result<StationRecord, Rejection> {
        let Some(meta) = MetadataRow::from_row(row) else {
            debug!("Skipping metadata row without id: {:?}", row);
            return Err(Rejection::Malformed);
        };

        if is_deactivated(meta.pixel_x, meta.pixel_y) {
            debug!("Station {} is deactivated", meta.id);
            return Err(Rejection::Deactivated);
        }

        let weather = match measurement {
            Some(fields) => Some(self.read_weather(fields)),
            None if self.options.weather_policy == WeatherPolicy::Strict => {
                debug!("Station {} has no measurement row", meta.id);
                return Err(Rejection::MissingMeasurement);
            }
            None => None,
        };

        if let Some(weather) = &weather {
            if weather.status == STATUS_WITHDRAWN {
                debug!("Station {} sensor is withdrawn", meta.id);
                return Err(Rejection::Withdrawn);
            }

            if let Some(max_age) = self.options.max_age {
                let fresh = weather
                    .observed_at
                    .is_some_and(|observed| now - observed <= max_age);
                if !fresh {
                    debug!(
                        "Station {} reading is stale or undated ({} {})",
                        meta.id, weather.date, weather.time
                    );
                    return Err(Rejection::Stale);
                }
            }
        }

        let has_temperature = weather
            .as_ref()
            .is_some_and(|w| w.current_temp.is_finite());
        if self.options.weather_policy == WeatherPolicy::Strict && !has_temperature {
            debug!("Station {} has no usable temperature", meta.id);
            return Err(Rejection::MissingTemperature);
        }

        let station = match self.options.join {
            JoinStrategy::Positional => {
                if !meta.pixel_x.is_finite() || !meta.pixel_y.is_finite() {
                    debug!("Station {} has an unreadable canvas position", meta.id);
                    return Err(Rejection::Malformed);
                }
                let (latitude, longitude) = self.projector.project(meta.pixel_x, meta.pixel_y);
                StationRecord {
                    id: meta.id,
                    name: meta.name,
                    province: meta.province,
                    altitude: meta.altitude,
                    latitude,
                    longitude,
                    weather,
                    color: NEUTRAL_COLOR.to_string(),
                }
            }
            JoinStrategy::ById => {
                let Some(known) = self.catalog.get(&meta.id) else {
                    debug!("Station {} is not in the catalog", meta.id);
                    return Err(Rejection::UnknownId);
                };
                StationRecord {
                    id: meta.id,
                    name: known.name.clone(),
                    province: known.province.clone(),
                    altitude: known.altitude.or(meta.altitude),
                    latitude: known.latitude,
                    longitude: known.longitude,
                    weather,
                    color: NEUTRAL_COLOR.to_string(),
                }
            }
        };

        Ok(station)
    }

    fn read_weather(&self, row: &[serde_json::Value]) -> WeatherReading {
        let text = |index| field_text(row, index).unwrap_or_default();
        let date = text(M_DATE);
        let time = text(M_TIME);
        let observed_at = parse_observed_at(&date, &time, self.options.timezone);

        WeatherReading {
            status: text(M_STATUS),
            observed_at,
            date,
            time,
            current_temp: field_number(row, M_CURRENT_TEMP),
            max_temp: field_number(row, M_MAX_TEMP),
            max_temp_time: text(M_MAX_TEMP_TIME),
            min_temp: field_number(row, M_MIN_TEMP),
            min_temp_time: text(M_MIN_TEMP_TIME),
            humidity: field_number(row, M_HUMIDITY),
            dew_point: field_number(row, M_DEW_POINT),
            wind_speed: field_number(row, M_WIND_SPEED),
            max_wind_speed: field_number(row, M_MAX_WIND_SPEED),
            max_wind_speed_time: text(M_MAX_WIND_SPEED_TIME),
            wind_direction: text(M_WIND_DIRECTION),
            pressure: field_number(row, M_PRESSURE),
            precipitation_day: field_number(row, M_PRECIPITATION_DAY),
            precipitation_year: field_number(row, M_PRECIPITATION_YEAR),
            rain_rate: field_number(row, M_RAIN_RATE),
            max_rain_rate: field_number(row, M_MAX_RAIN_RATE),
        }
    }
}

/// Parse the feed's `dd/mm/yyyy` + `hh:mm` local fields into an instant.
///
/// Ambiguous local times (the autumn DST fold) resolve to the earlier one.
pub fn parse_observed_at(date: &str, time: &str, timezone: Tz) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(
        &format!("{} {}", date.trim(), time.trim()),
        FEED_DATETIME_FORMAT,
    )
    .ok()?;

    timezone
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}
