// src/track/validator.rs
//! Physical plausibility gate for incoming position samples

use super::sample::PositionSample;
use crate::geo;
use chrono::{DateTime, Utc};
use std::fmt;

/// Tunable validation thresholds.
#[derive(Debug, Clone, Copy)]
pub struct ValidationPolicy {
    /// Movement below this is treated as GPS jitter while stationary
    pub min_movement_meters: f64,
    /// Rejection ceiling for the distance/time plausibility check, in km/h.
    /// The production default of 90,000 is deliberately generous and barely
    /// ever rejects; treated as a policy knob pending product clarification
    /// rather than a hard-coded constant.
    pub max_plausible_speed_kmh: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_movement_meters: 20.0,
            max_plausible_speed_kmh: 90_000.0,
        }
    }
}

/// Outcome of validating one candidate sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    FirstFix,
    Valid,
    NoMovement,
    TooFast,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ValidationReason::FirstFix => "first fix",
            ValidationReason::Valid => "valid location",
            ValidationReason::NoMovement => "no movement detected",
            ValidationReason::TooFast => "movement too fast to be plausible",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub accepted: bool,
    pub reason: ValidationReason,
}

impl Validation {
    fn accept(reason: ValidationReason) -> Self {
        Self {
            accepted: true,
            reason,
        }
    }

    fn reject(reason: ValidationReason) -> Self {
        Self {
            accepted: false,
            reason,
        }
    }
}

/// Per-assignment tracking state. Cumulative counters live here, on the
/// session, so concurrent sessions (tests, multi-device simulators) never
/// interfere with each other.
#[derive(Debug, Clone)]
pub struct TrackingSession {
    pub assignment_id: String,
    pub last_accepted: Option<PositionSample>,
    pub cumulative_distance_meters: f64,
    pub last_update: Option<DateTime<Utc>>,
    policy: ValidationPolicy,
}

impl TrackingSession {
    pub fn new(assignment_id: impl Into<String>, policy: ValidationPolicy) -> Self {
        Self {
            assignment_id: assignment_id.into(),
            last_accepted: None,
            cumulative_distance_meters: 0.0,
            last_update: None,
            policy,
        }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Validate a candidate sample against the last accepted one.
    ///
    /// On ACCEPT the session advances: the cumulative distance counter grows
    /// by the traveled distance and the candidate becomes the new reference.
    /// That is the only mutating step; a rejected candidate leaves the
    /// session untouched.
    pub fn validate(&mut self, candidate: &PositionSample, now: DateTime<Utc>) -> Validation {
        let last = match &self.last_accepted {
            Some(last) => last,
            None => {
                self.record_accepted(candidate, 0.0, now);
                return Validation::accept(ValidationReason::FirstFix);
            }
        };

        let distance = geo::distance_meters(
            last.latitude,
            last.longitude,
            candidate.latitude,
            candidate.longitude,
        );
        let elapsed_ms = now
            .signed_duration_since(last.timestamp_utc)
            .num_milliseconds();
        let elapsed_hours = elapsed_ms as f64 / 3.6e6;

        // Return-to-station reports come from a stationary vehicle, so the
        // jitter gate does not apply to them
        if distance <= self.policy.min_movement_meters && !candidate.is_return_event {
            return Validation::reject(ValidationReason::NoMovement);
        }

        let max_plausible_distance =
            self.policy.max_plausible_speed_kmh * elapsed_hours.max(0.0) * 1000.0;
        if distance > max_plausible_distance {
            return Validation::reject(ValidationReason::TooFast);
        }

        self.record_accepted(candidate, distance, now);
        Validation::accept(ValidationReason::Valid)
    }

    fn record_accepted(&mut self, candidate: &PositionSample, distance: f64, now: DateTime<Utc>) {
        self.cumulative_distance_meters += distance;
        self.last_accepted = Some(candidate.clone());
        self.last_update = Some(now);
    }
}
