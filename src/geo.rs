// src/geo.rs
//! Geometry and formatting helpers shared by the validator, statistics and replay

use chrono::{DateTime, Utc};

/// Mean Earth radius in meters. All distance math uses this single base unit;
/// kilometer values are derived by division, never by a second radius.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle (haversine) distance in meters between two lat/lon pairs
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Great-circle distance in kilometers
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    distance_meters(lat1, lon1, lat2, lon2) / 1000.0
}

/// Initial bearing from point 1 to point 2, in degrees normalized to [0, 360)
pub fn heading_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let y = d_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * d_lon.cos();
    let bearing = y.atan2(x).to_degrees();
    (bearing + 360.0) % 360.0
}

/// Format a millisecond duration as "XmYs"
pub fn format_duration(ms: i64) -> String {
    let total_seconds = ms / 1000;
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{}m{}s", minutes, seconds)
}

/// Human-readable age of a timestamp relative to `now`
pub fn relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(timestamp);
    let seconds = elapsed.num_seconds();

    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    #[test]
    fn test_distance_same_point_is_zero() {
        assert_eq!(distance_meters(47.3769, 8.5417, 47.3769, 8.5417), 0.0);
    }

    #[test]
    fn test_distance_symmetry() {
        let d1 = distance_meters(47.3769, 8.5417, 46.9480, 7.4474);
        let d2 = distance_meters(46.9480, 7.4474, 47.3769, 8.5417);
        assert_relative_eq!(d1, d2, epsilon = 1e-9);
    }

    #[test]
    fn test_distance_known_value() {
        // One ten-thousandth of a degree of longitude at the equator is ~11.1 m
        let d = distance_meters(0.0, 0.0, 0.0, 0.0001);
        assert_relative_eq!(d, 11.12, epsilon = 0.05);
    }

    #[test]
    fn test_distance_km_matches_meters() {
        let m = distance_meters(47.0, 8.0, 47.1, 8.1);
        let km = distance_km(47.0, 8.0, 47.1, 8.1);
        assert_relative_eq!(km * 1000.0, m, epsilon = 1e-9);
    }

    #[test]
    fn test_heading_due_north() {
        let h = heading_degrees(47.0, 8.0, 48.0, 8.0);
        assert_relative_eq!(h, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_heading_due_east_at_equator() {
        let h = heading_degrees(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(h, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0m0s");
        assert_eq!(format_duration(59_000), "0m59s");
        assert_eq!(format_duration(125_000), "2m5s");
    }

    #[test]
    fn test_relative_time() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let recent = now - chrono::Duration::seconds(30);
        let minutes = now - chrono::Duration::minutes(5);
        let hours = now - chrono::Duration::hours(3);
        let days = now - chrono::Duration::days(2);

        assert_eq!(relative_time(recent, now), "just now");
        assert_eq!(relative_time(minutes, now), "5m ago");
        assert_eq!(relative_time(hours, now), "3h ago");
        assert_eq!(relative_time(days, now), "2d ago");
    }
}
