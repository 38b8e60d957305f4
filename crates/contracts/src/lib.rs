//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the pipeline.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Coordinate Model
//! - Bounding boxes are frame-normalized: `x`, `y`, `w`, `h` all lie in `[0, 1]`,
//!   `(x, y)` is the top-left corner and the frame area is `1.0`
//! - Headings are degrees in the image frame: 0° points along +x, 90° along +y
//!   (down the frame)
//!
//! ## Time Model
//! - `frame_index` is the primary clock for all cooldowns and streaks
//! - `timestamp` is the capture time in seconds, carried for consumers

mod config;
mod detection;
mod error;
mod event;
mod sink;
mod track;

pub use config::*;
pub use detection::*;
pub use error::*;
pub use event::*;
pub use sink::*;
pub use track::*;
