// src/lib.rs
//! Fleet Tracker Library
//!
//! Offline-first tracking engine for municipal waste-collection vehicles:
//! validates incoming GPS samples against a plausibility model, buffers them
//! durably while offline, reconciles them with a backend on reconnect, and
//! reconstructs recorded routes into trip segments with statistics and
//! deterministic replay.

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod geo;
pub mod queue;
pub mod route;
pub mod store;
pub mod sync;
pub mod track;
pub mod tracker;

// Re-export main types for convenience
pub use backend::{AssignmentFilter, Backend, FleetDevice, HttpBackend};
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use events::TrackerEvent;
pub use queue::{spawn_queue, QueueHandle, QueueRecord, RecordPayload, RecordStatus};
pub use route::{ReplayEvent, ReplayPlayer, ReplayStepper, RouteStats, Segment};
pub use sync::{SyncCoordinator, SyncOutcome};
pub use track::{
    Assignment, CapacityReport, OperatorRef, PositionSample, PositionSource, PositionUpdate,
    TrackingSession,
};
pub use tracker::Tracker;
