// src/track/mod.rs
//! Position sampling, validation and session state

pub mod sample;
pub mod source;
pub mod validator;

pub use sample::{Assignment, CapacityReport, OperatorRef, PositionSample};
pub use source::{FleetGpsSource, PositionSource, PositionUpdate};
pub use validator::{TrackingSession, Validation, ValidationPolicy, ValidationReason};
