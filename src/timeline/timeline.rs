// Copyright (c) 2024 Mike Tsao

use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};

/// One time-stamped record in a [Timeline].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry<T> {
    /// When this entry happens. Usually seconds, but a [Timeline] doesn't care
    /// about the unit, and the transport keys its events by ticks.
    pub time: f64,
    /// What happens.
    pub value: T,
}

/// A list of time-stamped entries, always sorted by time.
///
/// Entries that share a time stay in the order they were inserted, and every
/// point query returns the *last* of them. That makes "the value at time t"
/// last-write-wins.
///
/// Lookups use an upper-bound binary search ([slice::partition_point] with
/// `time <= t`), which lands directly past the final entry of a same-time run.
/// There's no linear scan over duplicates, so queries stay O(log n) however
/// many entries share a timestamp.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Timeline<T> {
    entries: Vec<TimelineEntry<T>>,

    /// When set, the oldest entries are dropped to keep the length at or below
    /// this value.
    memory: Option<usize>,
}
impl<T> Default for Timeline<T> {
    fn default() -> Self {
        Self {
            entries: Default::default(),
            memory: None,
        }
    }
}
impl<T> Timeline<T> {
    /// Creates an empty, unbounded [Timeline].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a [Timeline] that forgets its oldest entries once it holds more
    /// than `memory` of them.
    pub fn with_memory(memory: usize) -> Self {
        Self {
            entries: Default::default(),
            memory: Some(memory),
        }
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in time order.
    pub fn entries(&self) -> &[TimelineEntry<T>] {
        &self.entries
    }

    #[allow(missing_docs)]
    pub fn iter(&self) -> impl Iterator<Item = &TimelineEntry<T>> {
        self.entries.iter()
    }

    /// Inserts `value` at `time`, after any existing entries with the same
    /// time.
    pub fn insert(&mut self, time: f64, value: T) -> Result<()> {
        if !time.is_finite() {
            return Err(SchedulerError::range(format!(
                "timeline entries need a finite time, but got {time}"
            )));
        }
        let index = self.upper_bound(time);
        self.entries.insert(index, TimelineEntry { time, value });
        if let Some(memory) = self.memory {
            if self.entries.len() > memory {
                let excess = self.entries.len() - memory;
                self.entries.drain(..excess);
            }
        }
        Ok(())
    }

    /// Returns the index of the last entry whose time is at or before `time`,
    /// or None if every entry is later.
    pub fn search(&self, time: f64) -> Option<usize> {
        self.upper_bound(time).checked_sub(1)
    }

    /// The number of entries with `entry.time <= time`.
    fn upper_bound(&self, time: f64) -> usize {
        self.entries.partition_point(|e| e.time <= time)
    }

    /// The number of entries with `entry.time < time`.
    fn lower_bound(&self, time: f64) -> usize {
        self.entries.partition_point(|e| e.time < time)
    }

    /// The entry in effect at `time`: the most recently inserted of the latest
    /// entries at or before `time`.
    pub fn get(&self, time: f64) -> Option<&TimelineEntry<T>> {
        self.search(time).map(|i| &self.entries[i])
    }

    #[allow(missing_docs)]
    pub fn get_mut(&mut self, time: f64) -> Option<&mut TimelineEntry<T>> {
        self.search(time).map(|i| &mut self.entries[i])
    }

    /// The first entry strictly after `time`.
    pub fn get_after(&self, time: f64) -> Option<&TimelineEntry<T>> {
        self.entries.get(self.upper_bound(time))
    }

    /// The last entry strictly before `time`.
    pub fn get_before(&self, time: f64) -> Option<&TimelineEntry<T>> {
        self.lower_bound(time)
            .checked_sub(1)
            .map(|i| &self.entries[i])
    }

    #[allow(missing_docs)]
    pub fn get_index(&self, index: usize) -> Option<&TimelineEntry<T>> {
        self.entries.get(index)
    }

    #[allow(missing_docs)]
    pub fn get_index_mut(&mut self, index: usize) -> Option<&mut TimelineEntry<T>> {
        self.entries.get_mut(index)
    }

    /// The earliest entry.
    pub fn peek(&self) -> Option<&TimelineEntry<T>> {
        self.entries.first()
    }

    /// Removes and returns the earliest entry.
    pub fn shift(&mut self) -> Option<TimelineEntry<T>> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    /// Removes every entry at or after `after`. An entry exactly at `after` is
    /// removed too.
    pub fn cancel(&mut self, after: f64) {
        let keep = self.lower_bound(after);
        self.entries.truncate(keep);
    }

    /// Removes every entry at or before `time`.
    pub fn cancel_before(&mut self, time: f64) {
        let remove = self.upper_bound(time);
        self.entries.drain(..remove);
    }

    /// Removes every entry strictly before `time`.
    pub fn forget_before(&mut self, time: f64) {
        let remove = self.lower_bound(time);
        self.entries.drain(..remove);
    }

    /// Removes and returns the earliest-inserted entry whose time is exactly
    /// `time`.
    pub fn take_first_at(&mut self, time: f64) -> Option<TimelineEntry<T>> {
        let index = self.lower_bound(time);
        match self.entries.get(index) {
            Some(entry) if entry.time == time => Some(self.entries.remove(index)),
            _ => None,
        }
    }

    /// Removes and returns the first entry whose value matches `predicate`.
    pub fn remove_where(
        &mut self,
        predicate: impl Fn(&T) -> bool,
    ) -> Option<TimelineEntry<T>> {
        let index = self.entries.iter().position(|e| predicate(&e.value))?;
        Some(self.entries.remove(index))
    }

    /// Keeps only the entries whose value matches `predicate`.
    pub fn retain(&mut self, mut predicate: impl FnMut(&T) -> bool) {
        self.entries.retain(|e| predicate(&e.value));
    }

    /// Keeps only the entries that match `predicate`, which sees their times.
    pub fn retain_entries(&mut self, predicate: impl FnMut(&TimelineEntry<T>) -> bool) {
        self.entries.retain(predicate);
    }

    /// The entries with `start <= time < end`.
    pub fn between(&self, start: f64, end: f64) -> &[TimelineEntry<T>] {
        let from = self.lower_bound(start);
        let to = self.lower_bound(end).max(from);
        &self.entries[from..to]
    }

    /// The entries whose time is exactly `time`, in insertion order.
    pub fn at_time(&self, time: f64) -> &[TimelineEntry<T>] {
        &self.entries[self.lower_bound(time)..self.upper_bound(time)]
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
