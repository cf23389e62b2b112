use crate::error::Result;
use crate::models::StationRecord;
use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Text shown for a measurement upstream did not provide.
const UNAVAILABLE: &str = "n/d";

/// Marker appearance handed to the map widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerStyle {
    #[serde(default = "default_class_name")]
    pub class_name: String,
}

fn default_class_name() -> String {
    "temperature-marker".to_string()
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            class_name: default_class_name(),
        }
    }
}

/// Initial map view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    #[serde(default = "default_center")]
    pub center: [f64; 2],
    #[serde(default = "default_zoom")]
    pub zoom: u8,
}

// Bergamo
fn default_center() -> [f64; 2] {
    [45.6960, 9.6672]
}

fn default_zoom() -> u8 {
    10
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            center: default_center(),
            zoom: default_zoom(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub class_name: String,
    pub icon_markup: String,
    pub popup_html: String,
}

/// Everything the map widget needs for one refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSnapshot {
    pub generated_at: DateTime<Utc>,
    pub center: [f64; 2],
    pub zoom: u8,
    pub markers: Vec<Marker>,
}

/// Builds markers and popups from station records.
#[derive(Debug, Clone, Default)]
pub struct MarkerRenderer {
    style: MarkerStyle,
    view: MapView,
}

impl MarkerRenderer {
    pub fn new(style: MarkerStyle, view: MapView) -> Self {
        Self { style, view }
    }

    pub fn marker(&self, station: &StationRecord) -> Marker {
        Marker {
            id: station.id.clone(),
            latitude: station.latitude,
            longitude: station.longitude,
            class_name: self.style.class_name.clone(),
            icon_markup: icon_markup(station),
            popup_html: popup_html(station),
        }
    }

    pub fn snapshot(&self, stations: &[StationRecord], generated_at: DateTime<Utc>) -> MapSnapshot {
        MapSnapshot {
            generated_at,
            center: self.view.center,
            zoom: self.view.zoom,
            markers: stations.iter().map(|s| self.marker(s)).collect(),
        }
    }
}

/// Marker label: rounded temperature, or `?` without one.
pub fn temperature_label(station: &StationRecord) -> String {
    match station.current_temp() {
        Some(t) => format!("{}", t.round() as i64),
        None => "?".to_string(),
    }
}

pub fn icon_markup(station: &StationRecord) -> String {
    format!(
        r#"<span style="background-color:{}">{}</span>"#,
        encode_double_quoted_attribute(&station.color),
        temperature_label(station)
    )
}

pub fn popup_html(station: &StationRecord) -> String {
    let mut html = format!(
        "<h3>{} ({})</h3>",
        encode_text(&station.name),
        encode_text(&station.province)
    );

    match &station.weather {
        Some(w) => {
            html.push_str("<div>");
            html.push_str(&format!(
                "<p>Last Update: {} {}</p>",
                encode_text(&w.date),
                encode_text(&w.time)
            ));
            html.push_str(&format!(
                "<p>Temperature: {}°C</p>",
                format_value(w.current_temp)
            ));
            html.push_str(&format!("<p>Humidity: {}%</p>", format_value(w.humidity)));
            html.push_str(&format!(
                "<p>Wind: {} km/h {}</p>",
                format_value(w.wind_speed),
                encode_text(&w.wind_direction)
            ));
            html.push_str(&format!("<p>Pressure: {} hPa</p>", format_value(w.pressure)));
            html.push_str(&format!(
                "<p>Precipitation Today: {} mm</p>",
                format_value(w.precipitation_day)
            ));
            html.push_str("</div>");
        }
        None => html.push_str("<p>No weather data available.</p>"),
    }

    html
}

fn format_value(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        UNAVAILABLE.to_string()
    }
}

/// Write the snapshot as JSON, replacing the file in one rename.
pub fn write_snapshot(snapshot: &MapSnapshot, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut file, snapshot)?;
    file.flush()?;
    file.persist(path).map_err(|e| e.error)?;

    debug!(
        "Wrote map snapshot with {} markers to {}",
        snapshot.markers.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{WeatherReading, NEUTRAL_COLOR};
    use chrono::TimeZone;

    fn station() -> StationRecord {
        StationRecord {
            id: "101".to_string(),
            name: "Sant'Omobono <Terme>".to_string(),
            province: "BG".to_string(),
            altitude: Some(427.0),
            latitude: 45.8,
            longitude: 9.5,
            weather: Some(WeatherReading {
                status: "0".to_string(),
                date: "01/01/2024".to_string(),
                time: "12:00".to_string(),
                observed_at: None,
                current_temp: 5.5,
                max_temp: 10.0,
                max_temp_time: "13:00".to_string(),
                min_temp: 1.0,
                min_temp_time: "06:00".to_string(),
                humidity: 60.0,
                dew_point: f64::NAN,
                wind_speed: 4.2,
                max_wind_speed: f64::NAN,
                max_wind_speed_time: String::new(),
                wind_direction: "NE".to_string(),
                pressure: f64::NAN,
                precipitation_day: 0.0,
                precipitation_year: f64::NAN,
                rain_rate: f64::NAN,
                max_rain_rate: f64::NAN,
            }),
            color: "#aee866".to_string(),
        }
    }

    #[test]
    fn test_temperature_label_rounds() {
        assert_eq!(temperature_label(&station()), "6");
    }

    #[test]
    fn test_temperature_label_placeholder() {
        let mut s = station();
        s.weather = None;
        s.color = NEUTRAL_COLOR.to_string();
        assert_eq!(temperature_label(&s), "?");
        assert!(popup_html(&s).contains("No weather data available."));
    }

    #[test]
    fn test_popup_escapes_and_marks_unavailable() {
        let html = popup_html(&station());
        assert!(html.starts_with("<h3>Sant'Omobono &lt;Terme&gt; (BG)</h3>"));
        assert!(html.contains("<p>Temperature: 5.5°C</p>"));
        assert!(html.contains("<p>Wind: 4.2 km/h NE</p>"));
        assert!(html.contains("<p>Pressure: n/d hPa</p>"));
    }

    #[test]
    fn test_marker_uses_configured_style() {
        let renderer = MarkerRenderer::new(
            MarkerStyle {
                class_name: "cml-marker".to_string(),
            },
            MapView::default(),
        );
        let marker = renderer.marker(&station());
        assert_eq!(marker.class_name, "cml-marker");
        assert_eq!(
            marker.icon_markup,
            r##"<span style="background-color:#aee866">6</span>"##
        );
    }

    #[test]
    fn test_icon_color_cannot_leave_style_attribute() {
        let mut s = station();
        s.color = r#"red" onmouseover="alert(1)"#.to_string();
        let markup = icon_markup(&s);
        assert!(!markup.contains(r#"red" onmouseover"#));
        assert!(markup.contains("&quot;"));
    }

    #[test]
    fn test_write_snapshot_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("stations.json");
        let renderer = MarkerRenderer::default();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();

        write_snapshot(&renderer.snapshot(&[station()], at), &path).unwrap();
        write_snapshot(&renderer.snapshot(&[], at), &path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["markers"].as_array().unwrap().len(), 0);
        assert_eq!(written["zoom"], 10);
        assert_eq!(written["center"][0], 45.6960);
    }
}
