use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Status flag of a valid reading.
pub const STATUS_VALID: &str = "0";
/// Status flag of a withdrawn or faulty sensor.
pub const STATUS_WITHDRAWN: &str = "X";

/// Color of a station without a usable temperature.
pub const NEUTRAL_COLOR: &str = "#9e9e9e";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationRecord {
    pub id: String,
    pub name: String,
    pub province: String,
    #[serde(default)]
    pub altitude: Option<f64>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub weather: Option<WeatherReading>,
    #[serde(default = "neutral_color")]
    pub color: String,
}

fn neutral_color() -> String {
    NEUTRAL_COLOR.to_string()
}

impl StationRecord {
    /// Current temperature when the station carries a finite one.
    pub fn current_temp(&self) -> Option<f64> {
        self.weather
            .as_ref()
            .map(|w| w.current_temp)
            .filter(|t| t.is_finite())
    }
}

/// Live measurements for one station.
///
/// Numeric fields hold NaN when upstream sent something unparsable; they
/// serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReading {
    pub status: String,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,

    #[serde(deserialize_with = "nan_if_null", default = "nan")]
    pub current_temp: f64,
    #[serde(deserialize_with = "nan_if_null", default = "nan")]
    pub max_temp: f64,
    #[serde(default)]
    pub max_temp_time: String,
    #[serde(deserialize_with = "nan_if_null", default = "nan")]
    pub min_temp: f64,
    #[serde(default)]
    pub min_temp_time: String,

    #[serde(deserialize_with = "nan_if_null", default = "nan")]
    pub humidity: f64,
    #[serde(deserialize_with = "nan_if_null", default = "nan")]
    pub dew_point: f64,

    #[serde(deserialize_with = "nan_if_null", default = "nan")]
    pub wind_speed: f64,
    #[serde(deserialize_with = "nan_if_null", default = "nan")]
    pub max_wind_speed: f64,
    #[serde(default)]
    pub max_wind_speed_time: String,
    #[serde(default)]
    pub wind_direction: String,

    #[serde(deserialize_with = "nan_if_null", default = "nan")]
    pub pressure: f64,

    #[serde(deserialize_with = "nan_if_null", default = "nan")]
    pub precipitation_day: f64,
    #[serde(deserialize_with = "nan_if_null", default = "nan")]
    pub precipitation_year: f64,
    #[serde(deserialize_with = "nan_if_null", default = "nan")]
    pub rain_rate: f64,
    #[serde(deserialize_with = "nan_if_null", default = "nan")]
    pub max_rain_rate: f64,
}

impl WeatherReading {
    pub fn is_valid(&self) -> bool {
        self.status == STATUS_VALID
    }
}

fn nan() -> f64 {
    f64::NAN
}

/// Accepts a number or `null`; `null` becomes NaN.
fn nan_if_null<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_fallback_entry_with_nulls() {
        let json = r#"{
            "id": "101",
            "name": "Bergamo",
            "province": "BG",
            "latitude": 45.69,
            "longitude": 9.67,
            "weather": {
                "status": "0",
                "date": "01/01/2024",
                "time": "12:00",
                "currentTemp": 5.5,
                "humidity": null,
                "windDirection": "NE"
            }
        }"#;

        let station: StationRecord = serde_json::from_str(json).unwrap();
        let weather = station.weather.as_ref().unwrap();
        assert_eq!(station.color, NEUTRAL_COLOR);
        assert_eq!(station.altitude, None);
        assert_eq!(weather.current_temp, 5.5);
        assert!(weather.humidity.is_nan());
        assert!(weather.pressure.is_nan());
        assert_eq!(station.current_temp(), Some(5.5));
    }

    #[test]
    fn test_nan_serializes_as_null() {
        let json = r#"{"status":"0","date":"","time":""}"#;
        let weather: WeatherReading = serde_json::from_str(json).unwrap();
        let out = serde_json::to_value(&weather).unwrap();
        assert!(out["currentTemp"].is_null());
        assert!(weather.is_valid());
    }

    #[test]
    fn test_station_without_weather_has_no_temperature() {
        let json = r#"{"id":"1","name":"A","province":"MI","latitude":45.0,"longitude":9.0}"#;
        let station: StationRecord = serde_json::from_str(json).unwrap();
        assert!(station.weather.is_none());
        assert_eq!(station.current_temp(), None);
    }
}
