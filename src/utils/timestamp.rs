use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU32, Ordering};

/// A global [`TimestampCounter`] for embedders that do not have a hardware
/// clock to stamp events with.
pub static TIMESTAMP_COUNTER: TimestampCounter = TimestampCounter {
    millis: AtomicU32::new(1),
};

/// A server timestamp with millisecond granularity, whose comparison takes
/// into account the wrapping-around behavior of the underlying counter.
///
/// Grab requests and `allow_events` carry client-supplied timestamps that
/// must fall inside the window between the last grab time and the current
/// server time; those checks have to survive the 32-bit clock wrapping
/// roughly every 49 days.
#[derive(Debug, Copy, Clone)]
pub struct Timestamp(pub(crate) u32);

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        if self.0 == other.0 {
            return Some(CmpOrdering::Equal);
        }
        // less than half the clock range apart reads as plain ordering,
        // anything further means the counter wrapped in between
        if self.0.wrapping_sub(other.0) < u32::MAX / 2 {
            Some(CmpOrdering::Greater)
        } else {
            Some(CmpOrdering::Less)
        }
    }
}

impl From<u32> for Timestamp {
    fn from(millis: u32) -> Self {
        Timestamp(millis)
    }
}

impl From<Timestamp> for u32 {
    fn from(time: Timestamp) -> u32 {
        time.0
    }
}

impl Timestamp {
    /// Checks if this timestamp is after or equal to another given timestamp
    pub fn is_no_older_than(&self, other: &Timestamp) -> bool {
        other <= self
    }
}

/// A counter for generating timestamps.
///
/// A global instance of this counter is available as the
/// `TIMESTAMP_COUNTER` static. The counter wraps around on overflow,
/// skipping zero so a fresh device's "never grabbed" time stays older
/// than every stamped event.
#[derive(Debug)]
pub struct TimestampCounter {
    millis: AtomicU32,
}

impl TimestampCounter {
    /// Retrieve the next timestamp from the counter
    pub fn next_timestamp(&self) -> Timestamp {
        let millis = self.millis.fetch_add(1, Ordering::AcqRel);
        if millis == 0 {
            return Timestamp(self.millis.fetch_add(1, Ordering::AcqRel));
        }
        Timestamp(millis)
    }
}
