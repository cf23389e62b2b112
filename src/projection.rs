//! Pixel-to-geographic projection for the legacy station canvas.
//!
//! Station positions in the feed are pixel offsets on the old regional map
//! image. A per-axis affine fit turns them into WGS84 degrees:
//!
//! ```text
//! latitude  = lat_scale * pixel_y + lat_offset
//! longitude = lon_scale * pixel_x + lon_offset
//! ```
//!
//! The fit is calibrated against the canvas and drifts whenever upstream
//! redraws the map, so the constants are configurable.

use serde::Deserialize;

/// Latitude degrees per canvas pixel (y grows downward).
pub const LAT_SCALE: f64 = -0.002_855;
/// Latitude at canvas row zero.
pub const LAT_OFFSET: f64 = 46.640_5;
/// Longitude degrees per canvas pixel.
pub const LON_SCALE: f64 = 0.004_095;
/// Longitude at canvas column zero.
pub const LON_OFFSET: f64 = 8.484_2;

/// Marker value for a deactivated station position.
pub const DEACTIVATED_PIXEL: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Projector {
    #[serde(default = "default_lat_scale")]
    pub lat_scale: f64,
    #[serde(default = "default_lat_offset")]
    pub lat_offset: f64,
    #[serde(default = "default_lon_scale")]
    pub lon_scale: f64,
    #[serde(default = "default_lon_offset")]
    pub lon_offset: f64,
}

fn default_lat_scale() -> f64 {
    LAT_SCALE
}

fn default_lat_offset() -> f64 {
    LAT_OFFSET
}

fn default_lon_scale() -> f64 {
    LON_SCALE
}

fn default_lon_offset() -> f64 {
    LON_OFFSET
}

impl Default for Projector {
    fn default() -> Self {
        Self {
            lat_scale: LAT_SCALE,
            lat_offset: LAT_OFFSET,
            lon_scale: LON_SCALE,
            lon_offset: LON_OFFSET,
        }
    }
}

impl Projector {
    /// Map a canvas position to `(latitude, longitude)`.
    ///
    /// No validation happens here; callers drop the `-1` sentinel first.
    pub fn project(&self, pixel_x: f64, pixel_y: f64) -> (f64, f64) {
        let latitude = self.lat_scale * pixel_y + self.lat_offset;
        let longitude = self.lon_scale * pixel_x + self.lon_offset;
        (latitude, longitude)
    }

    pub fn is_finite(&self) -> bool {
        [
            self.lat_scale,
            self.lat_offset,
            self.lon_scale,
            self.lon_offset,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// True when either coordinate carries the deactivated-station marker.
pub fn is_deactivated(pixel_x: f64, pixel_y: f64) -> bool {
    pixel_x == DEACTIVATED_PIXEL || pixel_y == DEACTIVATED_PIXEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_matches_affine_formula() {
        let projector = Projector::default();
        let (lat, lon) = projector.project(100.0, 200.0);
        assert_eq!(lat, LAT_SCALE * 200.0 + LAT_OFFSET);
        assert_eq!(lon, LON_SCALE * 100.0 + LON_OFFSET);
    }

    #[test]
    fn test_project_is_deterministic() {
        let projector = Projector::default();
        let first = projector.project(412.5, 318.25);
        let second = projector.project(412.5, 318.25);
        assert_eq!(first.0.to_bits(), second.0.to_bits());
        assert_eq!(first.1.to_bits(), second.1.to_bits());
    }

    #[test]
    fn test_default_calibration_lands_in_lombardy() {
        let projector = Projector::default();
        // Bergamo sits roughly at canvas (290, 330)
        let (lat, lon) = projector.project(290.0, 330.0);
        assert!((45.0..46.5).contains(&lat), "lat {}", lat);
        assert!((9.0..10.5).contains(&lon), "lon {}", lon);
    }

    #[test]
    fn test_is_deactivated() {
        assert!(is_deactivated(-1.0, 10.0));
        assert!(is_deactivated(10.0, -1.0));
        assert!(!is_deactivated(0.0, 0.0));
        assert!(!is_deactivated(f64::NAN, 3.0));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let projector: Projector = serde_yaml::from_str("lat_offset: 46.0").unwrap();
        assert_eq!(projector.lat_offset, 46.0);
        assert_eq!(projector.lon_scale, LON_SCALE);
    }
}
