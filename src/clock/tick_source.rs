// Copyright (c) 2024 Mike Tsao

use super::TickParam;
use crate::{
    error::{Result, SchedulerError},
    timeline::{Timeline, TimelineEntry, TimelineState},
};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, IntoStaticStr};

/// Whether a clock is producing ticks.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    EnumIter,
    Eq,
    Hash,
    IntoStaticStr,
    PartialEq,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackState {
    /// Not running. The tick count is zero.
    #[default]
    Stopped,
    /// Running.
    Started,
    /// Not running, but remembers its tick count.
    Paused,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct TickOffset {
    ticks: f64,
    seconds: f64,
}

/// Counts ticks over time. Combines a [TickParam] rate with a history of
/// start/stop/pause changes and a history of explicit tick-count changes
/// (seeks).
#[derive(Clone, Debug)]
pub struct TickSource {
    frequency: TickParam,
    state: TimelineState<PlaybackState>,
    offsets: Timeline<TickOffset>,
}
impl TickSource {
    /// Creates a stopped source that ticks `frequency` times per second when
    /// it runs.
    pub fn new_with(frequency: f64) -> Result<Self> {
        let mut r = Self {
            frequency: TickParam::new_with(frequency)?,
            state: TimelineState::new(Some(PlaybackState::Stopped)),
            offsets: Timeline::default(),
        };
        r.state.set_state_at_time(PlaybackState::Stopped, 0.0)?;
        r.offsets.insert(
            0.0,
            TickOffset {
                ticks: 0.0,
                seconds: 0.0,
            },
        )?;
        Ok(r)
    }

    #[allow(missing_docs)]
    pub fn frequency(&self) -> &TickParam {
        &self.frequency
    }

    #[allow(missing_docs)]
    pub fn frequency_mut(&mut self) -> &mut TickParam {
        &mut self.frequency
    }

    fn check_time(time: f64) -> Result<()> {
        if time.is_finite() {
            Ok(())
        } else {
            Err(SchedulerError::range(format!(
                "state changes need a finite time, but got {time}"
            )))
        }
    }

    #[allow(missing_docs)]
    pub fn state_at(&self, time: f64) -> PlaybackState {
        self.state.get_value_at_time(time).unwrap_or_default()
    }

    /// Starts counting at `time`, optionally jumping to `offset` ticks. Does
    /// nothing if already started then.
    pub fn start(&mut self, time: f64, offset: Option<f64>) -> Result<()> {
        Self::check_time(time)?;
        if self.state_at(time) != PlaybackState::Started {
            self.state.set_state_at_time(PlaybackState::Started, time)?;
            if let Some(ticks) = offset {
                self.set_ticks_at_time(ticks, time)?;
            }
        }
        Ok(())
    }

    /// Stops at `time`, resetting the count to zero and forgetting anything
    /// scheduled after it.
    pub fn stop(&mut self, time: f64) -> Result<()> {
        Self::check_time(time)?;
        if self.state_at(time) == PlaybackState::Stopped {
            // A second stop replaces the first.
            if let Some(previous) = self.state.get(time).map(|e| e.time).filter(|t| *t > 0.0) {
                self.offsets.cancel(previous);
                self.state.cancel(previous);
            }
        }
        self.state.cancel(time);
        self.state.set_state_at_time(PlaybackState::Stopped, time)?;
        self.set_ticks_at_time(0.0, time)
    }

    /// Pauses at `time` if started then.
    pub fn pause(&mut self, time: f64) -> Result<()> {
        Self::check_time(time)?;
        if self.state_at(time) == PlaybackState::Started {
            self.state.set_state_at_time(PlaybackState::Paused, time)?;
        }
        Ok(())
    }

    /// Forgets every state change and seek at or after `time`.
    pub fn cancel(&mut self, time: f64) {
        if time.is_finite() {
            self.state.cancel(time);
            self.offsets.cancel(time);
        }
    }

    /// Drops history that no question about `time` or later can reach: state
    /// changes before the latest stop, and seeks that nothing still refers
    /// back to.
    pub fn forget_before(&mut self, time: f64) {
        let Some(stop) = self
            .state
            .get_last_state(&PlaybackState::Stopped, time)
            .map(|e| e.time)
        else {
            return;
        };
        self.state.forget_before(stop);
        let mut referenced: Vec<f64> = self
            .state
            .entries()
            .iter()
            .filter_map(|e| self.offsets.get(e.time).map(|o| o.time))
            .collect();
        referenced.extend(self.offsets.get(time).map(|o| o.time));
        self.offsets
            .retain_entries(|e| e.time > time || referenced.contains(&e.time));
    }

    /// How many state changes and seeks are remembered.
    pub fn history_len(&self) -> usize {
        self.state.len() + self.offsets.len()
    }

    /// Makes the count read `ticks` at `time`.
    pub fn set_ticks_at_time(&mut self, ticks: f64, time: f64) -> Result<()> {
        Self::check_time(time)?;
        self.offsets.cancel(time);
        let seconds = self.frequency.duration_of_ticks(ticks, time);
        self.offsets.insert(time, TickOffset { ticks, seconds })
    }

    /// The tick count at `time`.
    pub fn ticks_at_time(&self, time: f64) -> f64 {
        self.accumulate(time, |o| o.ticks, |t| self.frequency.ticks_at_time(t))
    }

    /// Seconds spent started since the last stop, as of `time`.
    pub fn seconds_at_time(&self, time: f64) -> f64 {
        self.accumulate(time, |o| o.seconds, |t| t)
    }

    /// Walks the state history from the most recent stop up to `time`,
    /// summing `progress` over every started period. A seek inside a period
    /// restarts the sum from its recorded value.
    fn accumulate(
        &self,
        time: f64,
        offset_value: impl Fn(&TickOffset) -> f64,
        progress: impl Fn(f64) -> f64,
    ) -> f64 {
        let entries = self.state.entries();
        let end = self.state.search(time).map_or(0, |i| i + 1);
        let (begin, mut last_time) = match self.state.get_last_state(&PlaybackState::Stopped, time)
        {
            Some(stop) => (self.state.search(stop.time).unwrap_or(0), stop.time),
            None => (0, f64::NEG_INFINITY),
        };
        let mut last_state = PlaybackState::Stopped;

        // Pausing at `time` closes out the period in progress.
        let until = TimelineEntry {
            time,
            value: PlaybackState::Paused,
        };

        let mut elapsed = 0.0;
        for entry in entries[begin.min(end)..end]
            .iter()
            .chain(core::iter::once(&until))
        {
            let mut period_start = last_time;
            if let Some(offset) = self.offsets.get(entry.time) {
                if offset.time >= last_time {
                    elapsed = offset_value(&offset.value);
                    period_start = offset.time;
                }
            }
            if last_state == PlaybackState::Started && entry.value != PlaybackState::Started {
                elapsed += progress(entry.time) - progress(period_start);
            }
            last_time = entry.time;
            last_state = entry.value;
        }
        elapsed
    }

    /// The time at which the count reaches `tick`, assuming the rate and state
    /// in effect at `before` continue.
    pub fn time_of_tick(&self, tick: f64, before: f64) -> f64 {
        let (offset_time, offset_ticks) = self
            .offsets
            .get(before)
            .map_or((0.0, 0.0), |o| (o.time, o.value.ticks));
        let state_time = self.state.get(before).map_or(0.0, |e| e.time);
        let start_time = offset_time.max(state_time);
        let absolute = self.frequency.ticks_at_time(start_time) + tick - offset_ticks;
        self.frequency.time_of_tick(absolute)
    }

    /// The latest state change or seek at or before `time`. From there until
    /// [TickSource::next_change_after()], the count moves with the rate alone.
    pub fn anchor_at(&self, time: f64) -> f64 {
        let state_time = self.state.get(time).map(|e| e.time);
        let offset_time = self.offsets.get(time).map(|e| e.time);
        match (state_time, offset_time) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => time,
        }
    }

    /// The earliest state change or seek strictly after `time`.
    pub fn next_change_after(&self, time: f64) -> Option<f64> {
        let state_time = self.state.get_after(time).map(|e| e.time);
        let offset_time = self.offsets.get_after(time).map(|e| e.time);
        match (state_time, offset_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
