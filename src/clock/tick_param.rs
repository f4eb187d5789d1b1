// Copyright (c) 2024 Mike Tsao

use crate::{
    error::{Result, SchedulerError},
    timeline::Timeline,
};
use strum_macros::IntoStaticStr;

/// How the rate moves toward an automation event's value.
#[derive(Clone, Copy, Debug, PartialEq, IntoStaticStr)]
pub enum RateCurve {
    /// Jumps to the value at the event's time.
    Set,
    /// Ramps linearly from the previous event, arriving at the event's time.
    Linear,
    /// Ramps exponentially from the previous event, arriving at the event's
    /// time.
    Exponential,
    /// Starting at the event's time, approaches the value exponentially with
    /// the given time constant, never quite arriving.
    Target {
        #[allow(missing_docs)]
        time_constant: f64,
    },
}

#[derive(Clone, Debug)]
struct RateEvent {
    curve: RateCurve,
    value: f64,

    // Derived by recompute(). The rate at the moment this event takes over,
    // and the ticks accumulated from time zero up to then.
    start_value: f64,
    ticks: f64,
}

/// A rate in ticks per second that can be automated like an audio parameter,
/// with exact integration.
///
/// [TickParam::ticks_at_time()] integrates the rate in closed form for every
/// curve, and [TickParam::time_of_tick()] inverts it. That pair is what lets a
/// clock place ticks precisely while the tempo ramps.
///
/// Automation at time zero is never cancelled, so the param always has a
/// value.
#[derive(Clone, Debug)]
pub struct TickParam {
    events: Timeline<RateEvent>,
}
impl TickParam {
    const EPSILON: f64 = 1e-12;

    /// Creates a param with a constant `rate`.
    pub fn new_with(rate: f64) -> Result<Self> {
        let mut r = Self {
            events: Timeline::default(),
        };
        r.add(RateCurve::Set, rate, 0.0)?;
        Ok(r)
    }

    fn check_rate(value: f64) -> Result<()> {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(SchedulerError::range(format!(
                "rate must be positive, but got {value}"
            )))
        }
    }

    fn check_time(time: f64) -> Result<()> {
        if time.is_finite() && time >= 0.0 {
            Ok(())
        } else {
            Err(SchedulerError::range(format!(
                "automation time must be non-negative, but got {time}"
            )))
        }
    }

    fn add(&mut self, curve: RateCurve, value: f64, time: f64) -> Result<()> {
        Self::check_rate(value)?;
        Self::check_time(time)?;
        self.events.insert(
            time,
            RateEvent {
                curve,
                value,
                start_value: value,
                ticks: 0.0,
            },
        )?;
        self.recompute();
        Ok(())
    }

    /// Jumps to `value` at `time`.
    pub fn set_value_at_time(&mut self, value: f64, time: f64) -> Result<()> {
        self.add(RateCurve::Set, value, time)
    }

    /// Ramps linearly from the previous event to arrive at `value` at
    /// `end_time`.
    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, end_time: f64) -> Result<()> {
        self.add(RateCurve::Linear, value, end_time)
    }

    /// Ramps exponentially from the previous event to arrive at `value` at
    /// `end_time`.
    pub fn exponential_ramp_to_value_at_time(&mut self, value: f64, end_time: f64) -> Result<()> {
        self.add(RateCurve::Exponential, value, end_time)
    }

    /// Starting at `start_time`, approaches `target` with the given time
    /// constant.
    pub fn set_target_at_time(
        &mut self,
        target: f64,
        start_time: f64,
        time_constant: f64,
    ) -> Result<()> {
        if !time_constant.is_finite() || time_constant <= 0.0 {
            return Err(SchedulerError::range(format!(
                "time constant must be positive, but got {time_constant}"
            )));
        }
        self.add(RateCurve::Target { time_constant }, target, start_time)
    }

    /// Drops automation after `time` and jumps to `value` there.
    pub fn set_value(&mut self, value: f64, time: f64) -> Result<()> {
        Self::check_rate(value)?;
        self.cancel_and_hold_at_time(time)?;
        self.set_value_at_time(value, time)
    }

    /// Holds whatever value is in effect at `time`, then ramps linearly to
    /// `value` over `duration`.
    pub fn ramp_to(&mut self, value: f64, duration: f64, start_time: f64) -> Result<()> {
        Self::check_rate(value)?;
        self.cancel_and_hold_at_time(start_time)?;
        self.linear_ramp_to_value_at_time(value, start_time + duration.max(0.0))
    }

    /// Like [TickParam::ramp_to()], but exponential.
    pub fn exponential_ramp_to(&mut self, value: f64, duration: f64, start_time: f64) -> Result<()> {
        Self::check_rate(value)?;
        self.cancel_and_hold_at_time(start_time)?;
        self.exponential_ramp_to_value_at_time(value, start_time + duration.max(0.0))
    }

    /// Approaches `value` exponentially, finishing with a short linear ramp so
    /// that it actually arrives after `duration`.
    pub fn target_ramp_to(&mut self, value: f64, duration: f64, start_time: f64) -> Result<()> {
        Self::check_rate(value)?;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(SchedulerError::range(format!(
                "ramp duration must be positive, but got {duration}"
            )));
        }
        let time_constant = (duration + 1.0).ln() / 200.0f64.ln();
        self.cancel_and_hold_at_time(start_time)?;
        self.set_target_at_time(value, start_time, time_constant)?;
        self.cancel_and_hold_at_time(start_time + duration * 0.9)?;
        self.linear_ramp_to_value_at_time(value, start_time + duration)
    }

    /// Removes every automation event at or after `after`.
    pub fn cancel_scheduled_values(&mut self, after: f64) {
        self.events.cancel(after.max(f64::MIN_POSITIVE));
        self.recompute();
    }

    /// Removes automation after `time` while keeping the curve up to `time`
    /// intact, then holds the value it had reached.
    pub fn cancel_and_hold_at_time(&mut self, time: f64) -> Result<()> {
        Self::check_time(time)?;
        let value = self.value_at_time(time);
        let is_at_time = self.events.get(time).is_some_and(|e| e.time == time);
        let after = self.events.get_after(time).map(|e| (e.time, e.value.curve));
        if let Some((after_time, curve)) = after {
            self.events.cancel(after_time);
            self.recompute();
            if !is_at_time {
                // A ramp that was cut short still has to end where it was
                // headed at `time`, or the integral before `time` would change.
                match curve {
                    RateCurve::Linear => self.linear_ramp_to_value_at_time(value, time)?,
                    RateCurve::Exponential => {
                        self.exponential_ramp_to_value_at_time(value, time)?
                    }
                    RateCurve::Set | RateCurve::Target { .. } => {}
                }
            }
        }
        self.set_value_at_time(value, time)
    }

    fn recompute(&mut self) {
        for i in 0..self.events.len() {
            let derived = match i.checked_sub(1) {
                None => self
                    .events
                    .get_index(0)
                    .map(|e| (e.value.value, e.value.value * e.time)),
                Some(prev) => self.events.get_index(i).map(|here| {
                    let ticks = self.events.entries()[prev].value.ticks
                        + self.segment_ticks(prev, here.time);
                    let start_value = match here.value.curve {
                        RateCurve::Target { .. } => self.segment_value(prev, here.time),
                        _ => here.value.value,
                    };
                    (start_value, ticks)
                }),
            };
            if let (Some((start_value, ticks)), Some(entry)) = (derived, self.events.get_index_mut(i))
            {
                entry.value.start_value = start_value;
                entry.value.ticks = ticks;
            }
        }
    }

    /// The rate at `time` along the segment that begins at event `index`.
    fn segment_value(&self, index: usize, time: f64) -> f64 {
        let entries = self.events.entries();
        let here = &entries[index];
        let (t0, v0) = (here.time, here.value.start_value);
        match entries.get(index + 1) {
            Some(next) if next.value.curve == RateCurve::Linear => {
                let (t1, v1) = (next.time, next.value.value);
                if t1 - t0 <= Self::EPSILON {
                    v1
                } else {
                    v0 + (v1 - v0) * (time - t0) / (t1 - t0)
                }
            }
            Some(next) if next.value.curve == RateCurve::Exponential => {
                let (t1, v1) = (next.time, next.value.value);
                if t1 - t0 <= Self::EPSILON {
                    v1
                } else {
                    v0 * (v1 / v0).powf((time - t0) / (t1 - t0))
                }
            }
            _ => match here.value.curve {
                RateCurve::Target { time_constant } => {
                    let target = here.value.value;
                    target + (v0 - target) * (-(time - t0) / time_constant).exp()
                }
                _ => v0,
            },
        }
    }

    /// Ticks accumulated from the start of the segment at `index` until
    /// `time`.
    fn segment_ticks(&self, index: usize, time: f64) -> f64 {
        let entries = self.events.entries();
        let here = &entries[index];
        let (t0, v0) = (here.time, here.value.start_value);
        let d = time - t0;
        if d <= 0.0 {
            return 0.0;
        }
        match entries.get(index + 1) {
            Some(next) if next.value.curve == RateCurve::Linear && next.time - t0 > Self::EPSILON => {
                let slope = (next.value.value - v0) / (next.time - t0);
                v0 * d + 0.5 * slope * d * d
            }
            Some(next)
                if next.value.curve == RateCurve::Exponential && next.time - t0 > Self::EPSILON =>
            {
                let r = (next.value.value / v0).ln() / (next.time - t0);
                if r.abs() < Self::EPSILON {
                    v0 * d
                } else {
                    v0 * ((r * d).exp() - 1.0) / r
                }
            }
            _ => match here.value.curve {
                RateCurve::Target { time_constant } => {
                    let target = here.value.value;
                    target * d + (v0 - target) * time_constant * (1.0 - (-d / time_constant).exp())
                }
                _ => v0 * d,
            },
        }
    }

    /// The rate, in ticks per second, at `time`.
    pub fn value_at_time(&self, time: f64) -> f64 {
        match self.events.search(time) {
            Some(index) => self.segment_value(index, time),
            None => self.initial_value(),
        }
    }

    fn initial_value(&self) -> f64 {
        self.events.peek().map_or(1.0, |e| e.value.value)
    }

    /// Ticks elapsed between time zero and `time`.
    pub fn ticks_at_time(&self, time: f64) -> f64 {
        match self.events.search(time) {
            Some(index) => self.events.entries()[index].value.ticks + self.segment_ticks(index, time),
            None => time * self.initial_value(),
        }
    }

    /// The time at which [TickParam::ticks_at_time()] reaches `ticks`.
    pub fn time_of_tick(&self, ticks: f64) -> f64 {
        let entries = self.events.entries();
        let Some(index) = entries
            .partition_point(|e| e.value.ticks <= ticks)
            .checked_sub(1)
        else {
            return ticks / self.initial_value();
        };
        let here = &entries[index];
        let (t0, v0) = (here.time, here.value.start_value);
        let remaining = ticks - here.value.ticks;
        let next = entries.get(index + 1);
        match next {
            Some(next) if next.value.curve == RateCurve::Linear && next.time - t0 > Self::EPSILON => {
                let slope = (next.value.value - v0) / (next.time - t0);
                // The stable root of slope/2·d² + v0·d - remaining = 0.
                let discriminant = (v0 * v0 + 2.0 * slope * remaining).max(0.0);
                t0 + 2.0 * remaining / (v0 + discriminant.sqrt())
            }
            Some(next)
                if next.value.curve == RateCurve::Exponential && next.time - t0 > Self::EPSILON =>
            {
                let r = (next.value.value / v0).ln() / (next.time - t0);
                if r.abs() < Self::EPSILON {
                    t0 + remaining / v0
                } else {
                    t0 + (1.0 + r * remaining / v0).ln() / r
                }
            }
            _ => match here.value.curve {
                RateCurve::Target { .. } => {
                    let upper = match next {
                        Some(next) => next.time - t0,
                        None => remaining / v0.min(here.value.value),
                    };
                    t0 + self.bisect_segment(index, remaining, upper)
                }
                _ => t0 + remaining / v0,
            },
        }
    }

    /// Solves segment_ticks(index, t0 + d) == remaining for d in [0, upper].
    /// The integral is strictly increasing because the rate is positive.
    fn bisect_segment(&self, index: usize, remaining: f64, upper: f64) -> f64 {
        let t0 = self.events.entries()[index].time;
        let (mut lo, mut hi) = (0.0, upper.max(0.0));
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            if self.segment_ticks(index, t0 + mid) < remaining {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo < Self::EPSILON {
                break;
            }
        }
        0.5 * (lo + hi)
    }

    /// How long `ticks` ticks take, starting at `time`.
    pub fn duration_of_ticks(&self, ticks: f64, time: f64) -> f64 {
        self.time_of_tick(self.ticks_at_time(time) + ticks) - time
    }
}
