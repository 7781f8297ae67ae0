//! Small helpers used throughout the crate

mod geometry;
mod timestamp;

pub use self::geometry::{Point, Rectangle};
pub use self::timestamp::{Timestamp, TimestampCounter, TIMESTAMP_COUNTER};
