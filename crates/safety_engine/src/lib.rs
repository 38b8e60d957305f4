//! # Safety Engine
//!
//! Rule evaluation over tracker output.
//!
//! - [`LaneRule`]: sustained wrong-way heading for the lane region
//! - [`EmergencyRule`]: privileged-class streak on a confirmed track
//! - [`HazardRule`]: area-based severity for stationary hazards, clustered
//! - [`CooldownLedger`]: shared (subject, event type) de-duplication
//!
//! [`FrameProcessor`] wires the tracker, the rules and the event bus for a
//! single camera.

pub mod cooldown;
pub mod emergency;
pub mod engine;
pub mod error;
pub mod hazard;
pub mod lane;
pub mod rule;

pub use cooldown::{CooldownLedger, UNTIL_EVICTED};
pub use emergency::EmergencyRule;
pub use engine::FrameProcessor;
pub use error::EngineError;
pub use hazard::{severity_for_area, HazardRule};
pub use lane::{LaneReading, LaneRule};
pub use rule::Candidate;
