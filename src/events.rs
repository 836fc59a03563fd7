// src/events.rs
//! Read-only event stream exposed to the presentation layer

use crate::track::sample::{CapacityReport, PositionSample};
use tokio::sync::broadcast;

/// Events the engine surfaces to a UI. Validation rejections and sync
/// failures map to transient warnings; a lost position source is the only
/// condition that warrants a blocking alert.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    SampleAccepted(PositionSample),
    SampleRejected { reason: String },
    CapacityReported(CapacityReport),
    WentOffline,
    BackOnline,
    SyncFailed { detail: String },
    PositionSourceUnavailable { detail: String },
}

/// Capacity for the broadcast channel behind the event stream. Slow
/// subscribers that fall further behind than this lose the oldest events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

pub fn event_channel() -> (broadcast::Sender<TrackerEvent>, broadcast::Receiver<TrackerEvent>) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
