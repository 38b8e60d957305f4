//! # Tracker
//!
//! Assigns stable identities to per-frame detections.
//!
//! Responsibilities:
//! - Drop and count malformed detections, route hazard classes around tracking
//! - Greedy matching on weighted IoU + centroid proximity, best pair first
//! - EMA motion vector, bounded observation history, class majority vote
//! - Forward-only lifecycle: Tentative → Confirmed → Lost → deleted
//!
//! ## Example
//!
//! ```ignore
//! use tracker::Tracker;
//!
//! let mut tracker = Tracker::new(config.tracker.clone(), config.classes.clone());
//! let update = tracker.update(&frame)?;
//! for snapshot in update.matched() {
//!     // evaluate rules against the read-only snapshot
//! }
//! ```

mod error;
mod track;
mod tracker;

pub use error::TrackerError;
pub use tracker::{Tracker, TrackerStats, TrackerUpdate};
