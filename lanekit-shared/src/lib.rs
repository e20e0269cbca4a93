//! Types shared between the lanekit library and its launcher.

pub mod errors;

pub use errors::{BoxError, LaneError, LaneResult};
