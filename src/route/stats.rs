// src/route/stats.rs
//! Per-assignment and per-segment aggregates over recorded fixes

use super::segment::Segment;
use crate::geo;
use crate::track::sample::PositionSample;
use chrono::Duration;

/// Aggregates recomputed on demand from a fix list; never cached across
/// mutations of the underlying fixes.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteStats {
    pub total_distance_meters: f64,
    pub total_duration: Duration,
    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
}

impl RouteStats {
    fn empty() -> Self {
        Self {
            total_distance_meters: 0.0,
            total_duration: Duration::zero(),
            average_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
        }
    }

    /// Duration formatted as "XmYs"
    pub fn duration_display(&self) -> String {
        geo::format_duration(self.total_duration.num_milliseconds())
    }
}

/// Aggregate an ordered fix list: summed haversine distance, wall-clock
/// duration from first to last fix, and speed figures. A duration of zero
/// (single fix, or identical timestamps) yields an average of 0 rather than
/// dividing by zero.
pub fn route_stats(fixes: &[PositionSample]) -> RouteStats {
    let (first, last) = match (fixes.first(), fixes.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return RouteStats::empty(),
    };

    let total_distance_meters: f64 = fixes
        .windows(2)
        .map(|pair| {
            geo::distance_meters(
                pair[0].latitude,
                pair[0].longitude,
                pair[1].latitude,
                pair[1].longitude,
            )
        })
        .sum();

    let total_duration = last.timestamp_utc.signed_duration_since(first.timestamp_utc);
    let hours = total_duration.num_milliseconds() as f64 / 3.6e6;
    let average_speed_kmh = if hours > 0.0 {
        (total_distance_meters / 1000.0) / hours
    } else {
        0.0
    };

    let max_speed_kmh = fixes.iter().map(|f| f.speed_kmh).fold(0.0, f64::max);

    RouteStats {
        total_distance_meters,
        total_duration,
        average_speed_kmh,
        max_speed_kmh,
    }
}

/// Same formulas restricted to one segment's fixes
pub fn segment_stats(segment: &Segment) -> RouteStats {
    route_stats(&segment.fixes)
}
