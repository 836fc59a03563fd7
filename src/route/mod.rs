// src/route/mod.rs
//! Route reconstruction: segmenting, statistics and replay

pub mod replay;
pub mod segment;
pub mod stats;

pub use replay::{ReplayEvent, ReplayPlayer, ReplayStepper};
pub use segment::{split_segments, Segment};
pub use stats::{route_stats, segment_stats, RouteStats};
