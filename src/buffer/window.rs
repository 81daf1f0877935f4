//! Time-windowed history of changing values
//!
//! Used for the dynamic label and slideshow image history of a service. A record
//! is only appended when the value actually changes; repeated updates with the
//! same value just refresh the "last seen" time. Records are appended in
//! non-decreasing time order, so eviction always removes a prefix.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

/// A value together with the time it was recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedRecord<T> {
    /// Recorded value
    pub value: T,
    /// When the value was recorded
    pub time: SystemTime,
}

/// Latest value of a windowed buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Latest<T> {
    /// Current value
    pub value: T,
    /// Last time any update arrived, changed or not
    pub last_seen: SystemTime,
    /// Last time the value changed
    pub last_changed: SystemTime,
}

/// Bounded history of (value, timestamp) records
#[derive(Debug, Clone)]
pub struct TimeWindowedBuffer<T> {
    /// How long records are kept
    retention: Duration,
    /// Records, oldest first
    records: VecDeque<TimedRecord<T>>,
    /// Current value, kept even after its record is evicted
    latest: Option<Latest<T>>,
}

impl<T: Clone + PartialEq> TimeWindowedBuffer<T> {
    /// Create an empty buffer keeping records for `retention`
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            records: VecDeque::new(),
            latest: None,
        }
    }

    /// Record `value` at `now` if it differs from the current value
    ///
    /// The last-seen time is refreshed either way. Returns true if a record was
    /// appended.
    pub fn record_if_changed(&mut self, value: T, now: SystemTime) -> bool {
        match &mut self.latest {
            Some(latest) if latest.value == value => {
                latest.last_seen = now;
                false
            }
            _ => {
                self.records.push_back(TimedRecord {
                    value: value.clone(),
                    time: now,
                });
                self.latest = Some(Latest {
                    value,
                    last_seen: now,
                    last_changed: now,
                });
                true
            }
        }
    }

    /// Remove all records strictly older than `cutoff`
    ///
    /// Returns the number of records removed.
    pub fn evict_older_than(&mut self, cutoff: SystemTime) -> usize {
        let mut removed = 0;
        while self.records.front().is_some_and(|r| r.time < cutoff) {
            self.records.pop_front();
            removed += 1;
        }
        removed
    }

    /// Record `value` if changed, then evict records outside the retention window
    pub fn update(&mut self, value: T, now: SystemTime) -> bool {
        let appended = self.record_if_changed(value, now);
        if let Some(cutoff) = now.checked_sub(self.retention) {
            self.evict_older_than(cutoff);
        }
        appended
    }

    /// Find the record active at `target`
    ///
    /// Returns the record with the greatest time not after `target`, the first
    /// record if `target` precedes all of them, or `None` if the buffer is empty.
    pub fn find_at_or_before(&self, target: SystemTime) -> Option<&TimedRecord<T>> {
        let first = self.records.front()?;
        if target <= first.time {
            return Some(first);
        }

        let mut found = first;
        for record in &self.records {
            if record.time <= target {
                found = record;
            } else {
                break;
            }
        }
        Some(found)
    }

    /// Get the current value with its timestamps
    pub fn latest(&self) -> Option<&Latest<T>> {
        self.latest.as_ref()
    }

    /// Iterate over retained records, oldest first
    pub fn records(&self) -> impl Iterator<Item = &TimedRecord<T>> {
        self.records.iter()
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no records are retained
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Retention window
    pub fn retention(&self) -> Duration {
        self.retention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn buffer_at_10_20_30() -> TimeWindowedBuffer<&'static str> {
        let mut buffer = TimeWindowedBuffer::new(Duration::from_secs(3600));
        buffer.record_if_changed("a", at(10));
        buffer.record_if_changed("b", at(20));
        buffer.record_if_changed("c", at(30));
        buffer
    }

    #[test]
    fn test_repeated_value_not_recorded() {
        let mut buffer = TimeWindowedBuffer::new(Duration::from_secs(60));

        assert!(buffer.record_if_changed("A", at(1)));
        assert!(!buffer.record_if_changed("A", at(2)));
        assert_eq!(buffer.len(), 1);

        let latest = buffer.latest().unwrap();
        assert_eq!(latest.value, "A");
        assert_eq!(latest.last_seen, at(2));
        assert_eq!(latest.last_changed, at(1));

        assert!(buffer.record_if_changed("B", at(3)));
        assert_eq!(buffer.len(), 2);
        let latest = buffer.latest().unwrap();
        assert_eq!(latest.last_changed, at(3));
    }

    #[test]
    fn test_evict_older_than() {
        let mut buffer = buffer_at_10_20_30();

        assert_eq!(buffer.evict_older_than(at(5)), 0);
        assert_eq!(buffer.len(), 3);

        // Record exactly at the cutoff survives
        assert_eq!(buffer.evict_older_than(at(20)), 1);
        let values: Vec<_> = buffer.records().map(|r| r.value).collect();
        assert_eq!(values, vec!["b", "c"]);

        assert_eq!(buffer.evict_older_than(at(100)), 2);
        assert!(buffer.is_empty());
        // Latest value outlives its record
        assert_eq!(buffer.latest().unwrap().value, "c");
    }

    #[test]
    fn test_update_applies_retention() {
        let mut buffer = TimeWindowedBuffer::new(Duration::from_secs(15));

        buffer.update("a", at(10));
        buffer.update("b", at(20));
        assert_eq!(buffer.len(), 2);

        // cutoff = 16, "a" goes
        buffer.update("c", at(31));
        let values: Vec<_> = buffer.records().map(|r| r.value).collect();
        assert_eq!(values, vec!["b", "c"]);

        // Unchanged value still triggers eviction
        buffer.update("c", at(100));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_update_near_epoch() {
        let mut buffer = TimeWindowedBuffer::new(Duration::from_secs(u64::MAX / 4));
        buffer.update(1u8, SystemTime::UNIX_EPOCH);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_find_at_or_before() {
        let buffer = buffer_at_10_20_30();

        assert_eq!(buffer.find_at_or_before(at(5)).unwrap().value, "a");
        assert_eq!(buffer.find_at_or_before(at(10)).unwrap().value, "a");
        assert_eq!(buffer.find_at_or_before(at(25)).unwrap().value, "b");
        assert_eq!(buffer.find_at_or_before(at(30)).unwrap().value, "c");
        assert_eq!(buffer.find_at_or_before(at(35)).unwrap().value, "c");
    }

    #[test]
    fn test_find_on_empty() {
        let buffer: TimeWindowedBuffer<String> = TimeWindowedBuffer::new(Duration::from_secs(1));
        assert!(buffer.find_at_or_before(at(1)).is_none());
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn test_value_returning_after_change_is_recorded_again() {
        let mut buffer = TimeWindowedBuffer::new(Duration::from_secs(60));
        buffer.record_if_changed("A", at(1));
        buffer.record_if_changed("B", at(2));
        buffer.record_if_changed("A", at(3));
        assert_eq!(buffer.len(), 3);
    }
}
