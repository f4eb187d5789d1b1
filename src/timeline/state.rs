// Copyright (c) 2024 Mike Tsao

use super::{Timeline, TimelineEntry};
use crate::error::Result;
use delegate::delegate;

/// The history of a discrete value. Answers "what was it at time t?" and
/// "when was it last (or next) S?".
#[derive(Clone, Debug)]
pub struct TimelineState<S> {
    timeline: Timeline<S>,
    initial: Option<S>,
}
impl<S: Clone + PartialEq> TimelineState<S> {
    /// Creates a history that reports `initial` for times before its first
    /// entry. Pass None if such times have no meaningful value.
    pub fn new(initial: Option<S>) -> Self {
        Self {
            timeline: Timeline::default(),
            initial,
        }
    }

    /// Like [TimelineState::new()], but keeps only the newest `memory`
    /// entries.
    pub fn with_memory(initial: Option<S>, memory: usize) -> Self {
        Self {
            timeline: Timeline::with_memory(memory),
            initial,
        }
    }

    delegate! {
        to self.timeline {
            #[allow(missing_docs)]
            pub fn len(&self) -> usize;
            #[allow(missing_docs)]
            pub fn is_empty(&self) -> bool;
            #[allow(missing_docs)]
            pub fn entries(&self) -> &[TimelineEntry<S>];
            #[allow(missing_docs)]
            pub fn search(&self, time: f64) -> Option<usize>;
            #[allow(missing_docs)]
            pub fn get(&self, time: f64) -> Option<&TimelineEntry<S>>;
            #[allow(missing_docs)]
            pub fn get_after(&self, time: f64) -> Option<&TimelineEntry<S>>;
            /// Forgets every state change at or after `after`.
            pub fn cancel(&mut self, after: f64);
            /// Forgets every state change strictly before `time`.
            pub fn forget_before(&mut self, time: f64);
            #[allow(missing_docs)]
            pub fn clear(&mut self);
        }
    }

    /// Records that the value becomes `state` at `time`.
    pub fn set_state_at_time(&mut self, state: S, time: f64) -> Result<()> {
        self.timeline.insert(time, state)
    }

    /// The value in effect at `time`, falling back to the initial value.
    pub fn get_value_at_time(&self, time: f64) -> Option<S> {
        self.timeline
            .get(time)
            .map(|e| e.value.clone())
            .or_else(|| self.initial.clone())
    }

    /// The most recent entry at or before `time` whose value is `state`.
    pub fn get_last_state(&self, state: &S, time: f64) -> Option<&TimelineEntry<S>> {
        let last = self.timeline.search(time)?;
        self.timeline.entries()[..=last]
            .iter()
            .rev()
            .find(|e| e.value == *state)
    }

    /// The earliest entry at or after `time` whose value is `state`.
    pub fn get_next_state(&self, state: &S, time: f64) -> Option<&TimelineEntry<S>> {
        self.timeline
            .entries()
            .iter()
            .skip_while(|e| e.time < time)
            .find(|e| e.value == *state)
    }
}
