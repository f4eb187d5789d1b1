// Copyright (c) 2024 Mike Tsao

use super::{PlaybackState, TickSource};
use crate::{error::Result, traits::HostClock, util::ClockSettings};

/// One tick boundary, delivered ahead of time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick {
    /// When the tick should be heard, in host seconds. Usually later than the
    /// host's current time by up to the lookahead.
    pub time: f64,
    /// The tick count at `time`.
    pub ticks: i64,
}

/// The callback that a [Clock] invokes for each [Tick].
pub type TickCallback = Box<dyn FnMut(Tick) -> anyhow::Result<()> + Send>;

/// Generates ticks ahead of the host clock.
///
/// Each call to [Clock::tick()] hands out every tick between the last one
/// delivered and `host.now() + lookahead`. The end of that window is the
/// *horizon*. Ticks before it have already been delivered, so changes to
/// state or rate take effect no earlier than the horizon.
pub struct Clock {
    host: Box<dyn HostClock>,
    settings: ClockSettings,
    source: TickSource,

    /// Everything before this time has been delivered.
    cursor: f64,
    /// Set when a tick was delivered exactly at `cursor`.
    last_tick: Option<f64>,

    callback: Option<TickCallback>,
}
impl core::fmt::Debug for Clock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Clock")
            .field("host", &self.host)
            .field("settings", &self.settings)
            .field("cursor", &self.cursor)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
impl Clock {
    const TICK_EPSILON: f64 = 1e-9;

    /// Creates a stopped [Clock] that ticks `frequency` times per second.
    pub fn new_with(
        settings: ClockSettings,
        host: Box<dyn HostClock>,
        frequency: f64,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            host,
            settings,
            source: TickSource::new_with(frequency)?,
            cursor: 0.0,
            last_tick: None,
            callback: None,
        })
    }

    /// Sets the function that receives each [Tick] from [Clock::tick()].
    pub fn set_callback(
        &mut self,
        callback: impl FnMut(Tick) -> anyhow::Result<()> + Send + 'static,
    ) {
        self.callback = Some(Box::new(callback));
    }

    #[allow(missing_docs)]
    pub fn settings(&self) -> &ClockSettings {
        &self.settings
    }

    /// Changes how far ahead ticks are delivered.
    pub fn set_lookahead(&mut self, lookahead: f64) -> Result<()> {
        let mut settings = self.settings.clone();
        settings.lookahead = lookahead;
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// The host's time, without lookahead.
    pub fn host_now(&self) -> f64 {
        self.host.now()
    }

    /// The host's time plus the lookahead. This is the earliest time at which
    /// something newly scheduled can still be heard.
    pub fn now(&self) -> f64 {
        self.host.now() + self.settings.lookahead
    }

    /// The end of the span already delivered to callbacks.
    pub fn horizon(&self) -> f64 {
        self.cursor
    }

    /// The earliest time a change can take effect without rewriting delivered
    /// ticks.
    pub fn earliest_change(&self) -> f64 {
        self.now().max(self.cursor)
    }

    fn clamp(&self, time: f64, what: &str) -> f64 {
        if time < self.cursor {
            log::warn!(
                "Clock: {what} at {time:.6} is before the delivered horizon {:.6}; moving it to the horizon",
                self.cursor
            );
            self.cursor
        } else {
            time
        }
    }

    #[allow(missing_docs)]
    pub fn source(&self) -> &TickSource {
        &self.source
    }

    #[allow(missing_docs)]
    pub fn state(&self) -> PlaybackState {
        self.source.state_at(self.now())
    }

    #[allow(missing_docs)]
    pub fn state_at(&self, time: f64) -> PlaybackState {
        self.source.state_at(time)
    }

    /// Starts now.
    pub fn start(&mut self) -> Result<()> {
        self.start_at(self.earliest_change(), None)
    }

    /// Starts at `time`, optionally jumping to `offset` ticks.
    pub fn start_at(&mut self, time: f64, offset: Option<f64>) -> Result<()> {
        let time = self.clamp(time, "start");
        log::debug!("Clock: start at {time:.6}");
        self.source.start(time, offset)?;
        self.forget_delivery_at(time);
        Ok(())
    }

    /// Stops now.
    pub fn stop(&mut self) -> Result<()> {
        self.stop_at(self.earliest_change())
    }

    /// Stops at `time` and resets the count.
    pub fn stop_at(&mut self, time: f64) -> Result<()> {
        let time = self.clamp(time, "stop");
        log::debug!("Clock: stop at {time:.6}");
        self.source.stop(time)?;
        self.forget_delivery_at(time);
        Ok(())
    }

    /// Pauses now.
    pub fn pause(&mut self) -> Result<()> {
        self.pause_at(self.earliest_change())
    }

    /// Pauses at `time`, keeping the count.
    pub fn pause_at(&mut self, time: f64) -> Result<()> {
        let time = self.clamp(time, "pause");
        log::debug!("Clock: pause at {time:.6}");
        self.source.pause(time)?;
        self.forget_delivery_at(time);
        Ok(())
    }

    /// The count as of [Clock::now()].
    pub fn ticks(&self) -> f64 {
        self.source.ticks_at_time(self.now())
    }

    #[allow(missing_docs)]
    pub fn ticks_at_time(&self, time: f64) -> f64 {
        self.source.ticks_at_time(time)
    }

    /// Seeks to `ticks` as of the earliest changeable time.
    pub fn set_ticks(&mut self, ticks: f64) -> Result<()> {
        self.set_ticks_at_time(ticks, self.earliest_change())
    }

    /// Makes the count read `ticks` at `time`. If that's exactly where the
    /// last tick was delivered, the new count at `time` is delivered too.
    pub fn set_ticks_at_time(&mut self, ticks: f64, time: f64) -> Result<()> {
        let time = self.clamp(time, "seek");
        self.source.set_ticks_at_time(ticks, time)?;
        self.forget_delivery_at(time);
        Ok(())
    }

    /// Like [Clock::set_ticks_at_time()], but the count at `time` counts as
    /// delivered already. This is how a loop wraps while its end tick is being
    /// handled.
    pub(crate) fn wrap_ticks_at_time(&mut self, ticks: f64, time: f64) -> Result<()> {
        let time = self.clamp(time, "loop");
        self.source.set_ticks_at_time(ticks, time)
    }

    fn forget_delivery_at(&mut self, time: f64) {
        if self.last_tick == Some(time) {
            self.last_tick = None;
        }
    }

    /// The first tick count that will be delivered at or after `time`, if the
    /// clock runs then.
    pub fn first_tick_from(&self, time: f64) -> i64 {
        let current = self.source.ticks_at_time(time);
        if self.last_tick == Some(time) {
            current.round() as i64 + 1
        } else {
            (current - Self::TICK_EPSILON).ceil() as i64
        }
    }

    /// Seconds spent running since the last stop, as of [Clock::now()].
    pub fn seconds(&self) -> f64 {
        self.source.seconds_at_time(self.now())
    }

    /// The time at which the rate integral reaches `ticks`.
    pub fn time_of_tick(&self, ticks: f64) -> f64 {
        self.source.frequency().time_of_tick(ticks)
    }

    /// How long `ticks` ticks last, starting at `time`.
    pub fn duration_of_ticks(&self, ticks: f64, time: f64) -> f64 {
        self.source.frequency().duration_of_ticks(ticks, time)
    }

    /// The rate, in ticks per second, as of [Clock::now()].
    pub fn rate(&self) -> f64 {
        self.rate_at_time(self.now())
    }

    #[allow(missing_docs)]
    pub fn rate_at_time(&self, time: f64) -> f64 {
        self.source.frequency().value_at_time(time)
    }

    /// Jumps to a new rate.
    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        let time = self.earliest_change();
        self.source.frequency_mut().set_value(rate, time)
    }

    /// Moves linearly to a new rate over `duration` seconds.
    pub fn ramp_rate_to(&mut self, rate: f64, duration: f64) -> Result<()> {
        let time = self.earliest_change();
        self.source.frequency_mut().ramp_to(rate, duration, time)
    }

    /// Moves exponentially to a new rate over `duration` seconds.
    pub fn exponential_ramp_rate_to(&mut self, rate: f64, duration: f64) -> Result<()> {
        let time = self.earliest_change();
        self.source
            .frequency_mut()
            .exponential_ramp_to(rate, duration, time)
    }

    /// Approaches a new rate over `duration` seconds.
    pub fn target_ramp_rate_to(&mut self, rate: f64, duration: f64) -> Result<()> {
        let time = self.earliest_change();
        self.source
            .frequency_mut()
            .target_ramp_to(rate, duration, time)
    }

    /// Returns the next tick before `horizon`, advancing past it. Returns None
    /// once everything before `horizon` has been delivered.
    pub fn poll(&mut self, horizon: f64) -> Option<Tick> {
        loop {
            let cursor = self.cursor;
            if cursor >= horizon {
                self.source.forget_before(cursor.min(self.host_now()));
                return None;
            }
            let segment_end = self
                .source
                .next_change_after(cursor)
                .map_or(horizon, |change| change.min(horizon));
            if self.source.state_at(cursor) != PlaybackState::Started {
                self.cursor = segment_end;
                self.last_tick = None;
                continue;
            }

            // Between changes, the count moves with the rate integral alone.
            let anchor = self.source.anchor_at(cursor);
            let base = self.source.ticks_at_time(anchor);
            let frequency = self.source.frequency();
            let anchor_integral = frequency.ticks_at_time(anchor);
            let current = base + frequency.ticks_at_time(cursor) - anchor_integral;
            let next = if self.last_tick == Some(cursor) {
                current.round() + 1.0
            } else {
                (current - Self::TICK_EPSILON).ceil()
            };
            let time = frequency
                .time_of_tick(anchor_integral + next - base)
                .max(cursor);
            if time >= segment_end {
                self.cursor = segment_end;
                self.last_tick = None;
                continue;
            }
            self.cursor = time;
            self.last_tick = Some(time);
            return Some(Tick {
                time,
                ticks: next as i64,
            });
        }
    }

    /// Delivers every tick up to [Clock::now()] to the callback. Returns the
    /// number of ticks delivered.
    pub fn tick(&mut self) -> usize {
        let horizon = self.earliest_change();
        self.advance_to(horizon)
    }

    /// Delivers every tick before `horizon` to the callback, regardless of the
    /// host clock. Useful for rendering offline.
    pub fn advance_to(&mut self, horizon: f64) -> usize {
        let mut count = 0;
        while let Some(tick) = self.poll(horizon) {
            count += 1;
            if let Some(callback) = self.callback.as_mut() {
                if let Err(e) = callback(tick) {
                    log::error!("Clock: tick callback failed at {:.6}: {e:?}", tick.time);
                }
            }
        }
        log::trace!("Clock: delivered {count} ticks up to {horizon:.6}");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use float_cmp::approx_eq;
    use std::sync::{Arc, Mutex};

    fn clock_with(frequency: f64) -> (Clock, ManualClock) {
        let host = ManualClock::default();
        let settings = ClockSettings {
            lookahead: 0.0,
            ..Default::default()
        };
        (
            Clock::new_with(settings, Box::new(host.clone()), frequency).unwrap(),
            host,
        )
    }

    fn collect(clock: &mut Clock, horizon: f64) -> Vec<Tick> {
        core::iter::from_fn(|| clock.poll(horizon)).collect()
    }

    #[test]
    fn ticks_land_on_rate_boundaries() {
        let (mut clock, _) = clock_with(4.0);
        clock.start_at(1.0, None).unwrap();
        let ticks = collect(&mut clock, 2.0);
        assert_eq!(
            ticks.iter().map(|t| t.time).collect::<Vec<_>>(),
            vec![1.0, 1.25, 1.5, 1.75],
            "the tick at the horizon belongs to the next pass"
        );
        assert_eq!(
            ticks.iter().map(|t| t.ticks).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        let next = collect(&mut clock, 2.5);
        assert_eq!(next[0], Tick { time: 2.0, ticks: 4 });
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn paused_spans_are_skipped() {
        let (mut clock, _) = clock_with(2.0);
        clock.start_at(0.0, None).unwrap();
        clock.pause_at(1.0).unwrap();
        clock.start_at(3.0, None).unwrap();
        clock.stop_at(4.0).unwrap();

        let ticks = collect(&mut clock, 10.0);
        let times: Vec<_> = ticks.iter().map(|t| t.time).collect();
        let counts: Vec<_> = ticks.iter().map(|t| t.ticks).collect();
        assert_eq!(times, vec![0.0, 0.5, 3.0, 3.5]);
        assert_eq!(counts, vec![0, 1, 2, 3], "the count resumes after a pause");
    }

    #[test]
    fn ramped_ticks_follow_the_integral() {
        let (mut clock, _) = clock_with(2.0);
        clock
            .source
            .frequency_mut()
            .linear_ramp_to_value_at_time(4.0, 1.0)
            .unwrap();
        clock.start_at(0.0, None).unwrap();
        let ticks = collect(&mut clock, 1.0);
        assert_eq!(ticks.len(), 3, "a 2→4 ramp over one second holds 3 ticks");
        for tick in ticks {
            assert!(approx_eq!(
                f64,
                clock.ticks_at_time(tick.time),
                tick.ticks as f64,
                epsilon = 1e-9
            ));
        }
    }

    #[test]
    fn changes_before_the_horizon_are_clamped() {
        let (mut clock, host) = clock_with(10.0);
        clock.start().unwrap();
        host.set(1.0);
        assert_eq!(clock.tick(), 10);
        assert_eq!(clock.horizon(), 1.0);

        clock.stop_at(0.5).unwrap();
        assert_eq!(
            clock.state_at(0.75),
            PlaybackState::Started,
            "delivered ticks can't be taken back"
        );
        assert_eq!(clock.state_at(1.0), PlaybackState::Stopped);
    }

    #[test]
    fn rate_changes_apply_at_the_horizon() {
        let (mut clock, host) = clock_with(10.0);
        clock.start().unwrap();
        host.set(1.0);
        clock.tick();

        clock.set_rate(20.0).unwrap();
        assert_eq!(clock.rate_at_time(0.5), 10.0);
        assert_eq!(clock.rate(), 20.0);
        host.set(2.0);
        assert_eq!(clock.tick(), 20);
        assert!(approx_eq!(f64, clock.ticks_at_time(2.0), 30.0, epsilon = 1e-9));
        assert!(clock.set_rate(0.0).is_err());
    }

    #[test]
    fn failing_callbacks_do_not_stop_the_clock() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut clock, host) = clock_with(4.0);
        let seen = Arc::new(Mutex::new(Vec::default()));
        let seen_clone = Arc::clone(&seen);
        clock.set_callback(move |tick| {
            seen_clone.lock().unwrap().push(tick.ticks);
            if tick.ticks == 1 {
                anyhow::bail!("tick one is unlucky");
            }
            Ok(())
        });
        clock.start().unwrap();
        host.set(1.0);
        assert_eq!(clock.tick(), 4);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn lookahead_moves_the_window() {
        let host = ManualClock::default();
        let mut clock =
            Clock::new_with(ClockSettings::default(), Box::new(host.clone()), 100.0).unwrap();
        assert_eq!(clock.now(), 0.1);
        clock.start().unwrap();
        assert_eq!(clock.tick(), 0, "starting at now() leaves nothing to deliver yet");
        host.set(0.1);
        assert_eq!(clock.tick(), 10);
        assert!(clock.set_lookahead(-1.0).is_err());
    }
}
