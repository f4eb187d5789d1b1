// Copyright (c) 2024 Mike Tsao

use super::Draw;
use crate::{
    clock::{Clock, PlaybackState, Tick},
    error::{Result, SchedulerError},
    time_value::{TimeContext, TimeExpr, TransportPosition},
    timeline::{Timeline, TimelineState},
    traits::{Configurable, HostClock},
    types::{EventId, SampleRate, Tempo, TimeSignature, UidFactory},
    util::ClockSettings,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Work scheduled on a [Transport]. It receives the transport, so that it can
/// schedule or cancel more work, and the time at which it should be heard.
pub type TransportCallback = Box<dyn FnMut(&mut Transport, f64) -> anyhow::Result<()> + Send>;

/// A span of ticks that playback repeats when looping. `start` is included and
/// `end` isn't.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopRegion {
    #[allow(missing_docs)]
    pub start: i64,
    #[allow(missing_docs)]
    pub end: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Repeat {
    start: i64,
    interval: i64,
    end: Option<i64>,
}
impl Repeat {
    /// The first occurrence at or after `ticks`, if the repeat hasn't ended by
    /// then.
    fn next_at_or_after(&self, ticks: i64) -> Option<i64> {
        let next = if ticks <= self.start {
            self.start
        } else {
            let elapsed = ticks - self.start;
            self.start + (elapsed + self.interval - 1) / self.interval * self.interval
        };
        self.contains(next).then_some(next)
    }

    fn contains(&self, ticks: i64) -> bool {
        self.end.map_or(true, |end| ticks < end)
    }
}

struct ScheduledRecord {
    // None while the callback is running.
    callback: Option<TransportCallback>,
    repeat: Option<Repeat>,
}

/// [Transport] is the musical face of a [Clock]. It keeps time in bars and
/// beats, and fires scheduled callbacks on the tick where they belong.
///
/// Every scheduled time is converted to ticks when it's scheduled, so a later
/// tempo change moves the event along with the music. Changes to tempo, state,
/// and position take effect at the clock's horizon, so nothing that has
/// already been handed out is ever moved.
pub struct Transport {
    clock: Clock,

    events: Timeline<EventId>,
    records: FxHashMap<EventId, ScheduledRecord>,
    uid_factory: UidFactory<EventId>,

    /// Keyed by ticks.
    time_signatures: TimelineState<TimeSignature>,

    loop_region: LoopRegion,
    is_looping: bool,

    swing: f64,
    swing_subdivision: i64,

    draw: Draw,

    is_processing: bool,
}
impl core::fmt::Debug for Transport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transport")
            .field("clock", &self.clock)
            .field("pending", &self.records.len())
            .field("loop_region", &self.loop_region)
            .field("is_looping", &self.is_looping)
            .field("swing", &self.swing)
            .finish_non_exhaustive()
    }
}
impl Transport {
    /// Creates a stopped [Transport] at 120 BPM in 4/4, driven by `host`.
    pub fn new_with(settings: ClockSettings, host: Box<dyn HostClock>) -> Result<Self> {
        settings.validate()?;
        let ppq = settings.ppq;
        let clock = Clock::new_with(settings, host, Self::tempo_to_rate(Tempo::default(), ppq))?;
        let quarter = ppq as i64;
        Ok(Self {
            clock,
            events: Timeline::default(),
            records: FxHashMap::default(),
            uid_factory: UidFactory::default(),
            time_signatures: TimelineState::new(Some(TimeSignature::default())),
            loop_region: LoopRegion {
                start: 0,
                end: 16 * quarter,
            },
            is_looping: false,
            swing: 0.0,
            swing_subdivision: quarter / 2,
            draw: Draw::default(),
            is_processing: false,
        })
    }

    fn tempo_to_rate(tempo: Tempo, ppq: u32) -> f64 {
        tempo.0 * ppq as f64 / 60.0
    }

    fn rate_to_tempo(&self, rate: f64) -> Tempo {
        Tempo(rate * 60.0 / self.ppq() as f64)
    }

    #[allow(missing_docs)]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    #[allow(missing_docs)]
    pub fn ppq(&self) -> u32 {
        self.clock.settings().ppq
    }

    /// The queue for visual updates that should line up with scheduled audio.
    pub fn draw(&self) -> &Draw {
        &self.draw
    }

    /// The host's time plus the lookahead.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    //
    // Tempo
    //

    /// The tempo as of [Transport::now()].
    pub fn bpm(&self) -> Tempo {
        self.rate_to_tempo(self.clock.rate())
    }

    #[allow(missing_docs)]
    pub fn bpm_at_time(&self, time: f64) -> Tempo {
        self.rate_to_tempo(self.clock.rate_at_time(time))
    }

    /// Changes the tempo. Events already handed out keep their times.
    pub fn set_bpm(&mut self, tempo: Tempo) -> Result<()> {
        let tempo = Tempo::new_with(tempo.0)?;
        self.clock.set_rate(Self::tempo_to_rate(tempo, self.ppq()))
    }

    /// Moves linearly to `tempo` over `duration` seconds.
    pub fn ramp_bpm_to(&mut self, tempo: Tempo, duration: f64) -> Result<()> {
        let tempo = Tempo::new_with(tempo.0)?;
        self.clock
            .ramp_rate_to(Self::tempo_to_rate(tempo, self.ppq()), duration)
    }

    /// Moves exponentially to `tempo` over `duration` seconds.
    pub fn exponential_ramp_bpm_to(&mut self, tempo: Tempo, duration: f64) -> Result<()> {
        let tempo = Tempo::new_with(tempo.0)?;
        self.clock
            .exponential_ramp_rate_to(Self::tempo_to_rate(tempo, self.ppq()), duration)
    }

    //
    // Time signature
    //

    /// The time signature in effect at the current position.
    pub fn time_signature(&self) -> TimeSignature {
        self.time_signatures
            .get_value_at_time(self.ticks())
            .unwrap_or_default()
    }

    /// Changes the time signature from the current position onward. Any
    /// changes already recorded at or after that position are forgotten.
    pub fn set_time_signature(&mut self, time_signature: TimeSignature) -> Result<()> {
        let time_signature = TimeSignature::new_with(time_signature.top, time_signature.bottom)?;
        let at = self
            .clock
            .ticks_at_time(self.clock.earliest_change())
            .max(0.0);
        self.time_signatures.cancel(at);
        self.time_signatures.set_state_at_time(time_signature, at)
    }

    //
    // Time conversion
    //

    /// A snapshot for resolving time expressions. Its "now" is the current
    /// transport position, so relative expressions like `"+4n"` count from
    /// there.
    pub fn time_context(&self) -> TimeContext {
        let context = TimeContext::from_parts(
            self.bpm(),
            self.time_signature(),
            self.ppq(),
            self.sample_rate(),
        );
        context.with_now(context.ticks_to_seconds(self.ticks()))
    }

    /// Resolves `expr` to seconds at the current tempo.
    pub fn to_seconds(&self, expr: &TimeExpr) -> Result<f64> {
        Ok(self.time_context().resolve(expr)?.0)
    }

    /// Resolves `expr` to ticks at the current tempo.
    pub fn to_ticks(&self, expr: &TimeExpr) -> Result<f64> {
        self.time_context().to_ticks(expr)
    }

    /// Times resolve to the nearest whole tick.
    fn resolve_ticks(&self, expr: &TimeExpr) -> Result<i64> {
        let ticks = self.to_ticks(expr)?;
        if !ticks.is_finite() {
            return Err(SchedulerError::range(format!("'{expr}' isn't a usable time")));
        }
        Ok(ticks.round() as i64)
    }

    //
    // Scheduling
    //

    /// Runs `callback` once, on the tick that `time` resolves to.
    pub fn schedule(
        &mut self,
        callback: impl FnMut(&mut Transport, f64) -> anyhow::Result<()> + Send + 'static,
        time: &TimeExpr,
    ) -> Result<EventId> {
        let ticks = self.resolve_ticks(time)?;
        let id = self.uid_factory.mint_next();
        self.events.insert(ticks as f64, id)?;
        self.records.insert(
            id,
            ScheduledRecord {
                callback: Some(Box::new(callback)),
                repeat: None,
            },
        );
        log::debug!("Transport: scheduled event {id} at tick {ticks}");
        Ok(id)
    }

    /// Runs `callback` every `interval`, beginning at `start`. With a
    /// `duration`, occurrences stop before `start + duration`.
    pub fn schedule_repeat(
        &mut self,
        callback: impl FnMut(&mut Transport, f64) -> anyhow::Result<()> + Send + 'static,
        interval: &TimeExpr,
        start: &TimeExpr,
        duration: Option<&TimeExpr>,
    ) -> Result<EventId> {
        let interval_ticks = self.resolve_ticks(interval)?;
        if interval_ticks <= 0 {
            return Err(SchedulerError::range(format!(
                "repeat interval '{interval}' must be at least one tick"
            )));
        }
        let start = self.resolve_ticks(start)?;
        let end = match duration {
            Some(duration) => Some(start + self.resolve_ticks(duration)?),
            None => None,
        };
        let repeat = Repeat {
            start,
            interval: interval_ticks,
            end,
        };
        let id = self.uid_factory.mint_next();
        if let Some(first) = repeat.next_at_or_after(self.next_ticks()) {
            self.events.insert(first as f64, id)?;
        }
        self.records.insert(
            id,
            ScheduledRecord {
                callback: Some(Box::new(callback)),
                repeat: Some(repeat),
            },
        );
        log::debug!("Transport: scheduled repeating event {id} every {interval_ticks} ticks from {start}");
        Ok(id)
    }

    /// Cancels a scheduled event. Returns false if there's no such event, for
    /// example because it already fired.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.try_cancel(id).is_ok()
    }

    /// Like [Transport::cancel()], but reports a missing event as
    /// [SchedulerError::NotFound].
    pub fn try_cancel(&mut self, id: EventId) -> Result<()> {
        if self.records.remove(&id).is_some() {
            self.events.retain(|e| *e != id);
            log::debug!("Transport: cancelled event {id}");
            Ok(())
        } else {
            log::debug!("Transport: nothing to cancel for event {id}");
            Err(SchedulerError::NotFound(id))
        }
    }

    /// Cancels every one-time event at or after `after`, and every repeating
    /// event that begins at or after it.
    pub fn cancel_after(&mut self, after: &TimeExpr) -> Result<()> {
        let after = self.resolve_ticks(after)? as f64;
        let mut doomed: FxHashSet<EventId> = self
            .events
            .between(after, f64::INFINITY)
            .iter()
            .map(|e| e.value)
            .filter(|id| self.records.get(id).is_some_and(|r| r.repeat.is_none()))
            .collect();
        doomed.extend(
            self.records
                .iter()
                .filter(|(_, r)| r.repeat.is_some_and(|repeat| repeat.start as f64 >= after))
                .map(|(id, _)| *id),
        );
        self.events.retain(|id| !doomed.contains(id));
        self.records.retain(|id, _| !doomed.contains(id));
        log::debug!("Transport: cancelled {} events at or after tick {after}", doomed.len());
        Ok(())
    }

    /// Cancels everything.
    pub fn clear(&mut self) {
        self.events.clear();
        self.records.clear();
    }

    /// How many events are waiting to fire, counting each repeating event
    /// once.
    pub fn pending_events(&self) -> usize {
        self.records.len()
    }

    /// The first tick that hasn't been handed out yet.
    fn next_ticks(&self) -> i64 {
        self.clock
            .first_tick_from(self.clock.earliest_change())
            .max(0)
    }

    /// Lines every repeating event up with the grid as seen from `position`.
    /// Needed whenever the position jumps.
    fn restart_repeats(&mut self, position: i64) {
        let mut repeats: Vec<(EventId, Repeat)> = self
            .records
            .iter()
            .filter_map(|(id, r)| r.repeat.map(|repeat| (*id, repeat)))
            .collect();
        if repeats.is_empty() {
            return;
        }
        repeats.sort_by_key(|(id, _)| id.0);
        let ids: FxHashSet<EventId> = repeats.iter().map(|(id, _)| *id).collect();
        self.events.retain(|id| !ids.contains(id));
        for (id, repeat) in repeats {
            if let Some(next) = repeat.next_at_or_after(position) {
                if let Err(e) = self.events.insert(next as f64, id) {
                    log::error!("Transport: couldn't restart event {id}: {e}");
                }
            }
        }
    }

    //
    // Playback state
    //

    /// The state as of [Transport::now()].
    pub fn state(&self) -> PlaybackState {
        self.clock.state()
    }

    /// Starts now.
    pub fn start(&mut self) -> Result<()> {
        self.start_at(self.clock.earliest_change(), None)
    }

    /// Starts at `time`, optionally from the position `offset`.
    pub fn start_at(&mut self, time: f64, offset: Option<&TimeExpr>) -> Result<()> {
        let offset = offset.map(|o| self.resolve_ticks(o)).transpose()?;
        self.clock.start_at(time, offset.map(|o| o as f64))?;
        let time = time.max(self.clock.horizon());
        self.restart_repeats(self.clock.first_tick_from(time).max(0));
        Ok(())
    }

    /// Stops now, rewinding to the beginning.
    pub fn stop(&mut self) -> Result<()> {
        self.clock.stop()
    }

    #[allow(missing_docs)]
    pub fn stop_at(&mut self, time: f64) -> Result<()> {
        self.clock.stop_at(time)
    }

    /// Pauses now, keeping the position.
    pub fn pause(&mut self) -> Result<()> {
        self.clock.pause()
    }

    #[allow(missing_docs)]
    pub fn pause_at(&mut self, time: f64) -> Result<()> {
        self.clock.pause_at(time)
    }

    //
    // Position
    //

    /// The position in ticks as of [Transport::now()].
    pub fn ticks(&self) -> f64 {
        self.clock.ticks()
    }

    /// Jumps to `ticks`.
    pub fn set_ticks(&mut self, ticks: f64) -> Result<()> {
        if !ticks.is_finite() || ticks < 0.0 {
            return Err(SchedulerError::range(format!(
                "position must be a non-negative number of ticks, but got {ticks}"
            )));
        }
        self.clock.set_ticks(ticks)?;
        log::debug!("Transport: moved to tick {ticks}");
        self.restart_repeats(self.next_ticks());
        Ok(())
    }

    /// Seconds spent playing since the last stop.
    pub fn seconds(&self) -> f64 {
        self.clock.seconds()
    }

    /// The current position as bars:beats:sixteenths.
    pub fn position(&self) -> TransportPosition {
        self.position_at_ticks(self.ticks())
    }

    /// Jumps to the position `expr` resolves to.
    pub fn set_position(&mut self, expr: &TimeExpr) -> Result<()> {
        let ticks = self.to_ticks(expr)?;
        self.set_ticks(ticks)
    }

    /// Counts bars through the time-signature history. A change that lands
    /// mid-bar starts a fresh bar.
    fn position_at_ticks(&self, ticks: f64) -> TransportPosition {
        let ppq = self.ppq() as f64;
        let mut bars = 0.0;
        let mut segment_start = 0.0;
        let mut signature = TimeSignature::default();
        for entry in self.time_signatures.entries() {
            if entry.time > ticks {
                break;
            }
            if entry.time > segment_start {
                let ticks_per_bar = signature.quarters_per_bar() * ppq;
                bars += ((entry.time - segment_start) / ticks_per_bar - 1e-9).ceil();
                segment_start = entry.time;
            }
            signature = entry.value;
        }
        let quarters = (ticks - segment_start).max(0.0) / ppq;
        let quarters_per_bar = signature.quarters_per_bar();
        let whole_bars = (quarters / quarters_per_bar).floor();
        let remaining = quarters - whole_bars * quarters_per_bar;
        let beats = remaining.floor();
        TransportPosition {
            bars: bars + whole_bars,
            beats,
            sixteenths: (remaining - beats) * 4.0,
        }
    }

    /// The time of the next `subdivision` boundary, or zero if not started.
    pub fn next_subdivision(&self, subdivision: &TimeExpr) -> Result<f64> {
        let subdivision = self.to_ticks(subdivision)?;
        if !(subdivision.is_finite() && subdivision > 0.0) {
            return Err(SchedulerError::range(format!(
                "subdivisions must be positive, but got {subdivision} ticks"
            )));
        }
        if self.state() != PlaybackState::Started {
            return Ok(0.0);
        }
        let now = self.now();
        let position = self.clock.ticks_at_time(now);
        let remaining = subdivision - position.rem_euclid(subdivision);
        Ok(now + self.clock.duration_of_ticks(remaining, now))
    }

    //
    // Loop
    //

    /// Sets the span that playback repeats while looping.
    pub fn set_loop_points(&mut self, start: &TimeExpr, end: &TimeExpr) -> Result<()> {
        let (start, end) = (self.resolve_ticks(start)?, self.resolve_ticks(end)?);
        if start < 0 || end <= start {
            return Err(SchedulerError::range(format!(
                "loop must satisfy 0 <= start < end, but got {start}..{end} ticks"
            )));
        }
        self.loop_region = LoopRegion { start, end };
        Ok(())
    }

    #[allow(missing_docs)]
    pub fn set_looping(&mut self, is_looping: bool) {
        self.is_looping = is_looping;
    }

    #[allow(missing_docs)]
    pub fn is_looping(&self) -> bool {
        self.is_looping
    }

    #[allow(missing_docs)]
    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    /// How far through the loop playback is, from 0 to 1. Always zero when
    /// not looping.
    pub fn progress(&self) -> f64 {
        if !self.is_looping {
            return 0.0;
        }
        let LoopRegion { start, end } = self.loop_region;
        ((self.ticks() - start as f64) / (end - start) as f64).clamp(0.0, 1.0)
    }

    //
    // Swing
    //

    /// Delays every other `subdivision` by up to two thirds of a subdivision.
    /// An `amount` of zero turns swing off.
    pub fn set_swing(&mut self, amount: f64, subdivision: &TimeExpr) -> Result<()> {
        if !(0.0..=1.0).contains(&amount) {
            return Err(SchedulerError::range(format!(
                "swing must be between 0 and 1, but got {amount}"
            )));
        }
        let subdivision = self.resolve_ticks(subdivision)?;
        if subdivision <= 0 {
            return Err(SchedulerError::range("swing subdivision must be at least one tick"));
        }
        self.swing = amount;
        self.swing_subdivision = subdivision;
        Ok(())
    }

    #[allow(missing_docs)]
    pub fn swing(&self) -> f64 {
        self.swing
    }

    fn swing_offset(&self, ticks: i64, time: f64) -> f64 {
        let subdivision = self.swing_subdivision;
        if self.swing <= 0.0
            || ticks.rem_euclid(subdivision) != 0
            || ticks.rem_euclid(self.ppq() as i64) == 0
            || (ticks / subdivision).rem_euclid(2) == 0
        {
            return 0.0;
        }
        let delay = subdivision as f64 * 2.0 / 3.0;
        self.swing * self.clock.duration_of_ticks(delay, time)
    }

    //
    // Driving
    //

    /// Fires everything due up to [Transport::now()]. Returns the number of
    /// callbacks that ran.
    pub fn tick(&mut self) -> usize {
        let horizon = self.clock.earliest_change();
        self.advance_to(horizon)
    }

    /// Fires everything due before `horizon`, regardless of the host clock.
    pub fn advance_to(&mut self, horizon: f64) -> usize {
        if self.is_processing {
            log::warn!("Transport: ignoring a tick requested from inside a callback");
            return 0;
        }
        self.is_processing = true;
        let mut fired = 0;
        while let Some(tick) = self.clock.poll(horizon) {
            fired += self.process_tick(tick);
        }
        self.is_processing = false;
        log::trace!("Transport: fired {fired} events up to {horizon:.6}");
        fired
    }

    fn process_tick(&mut self, tick: Tick) -> usize {
        let mut ticks = tick.ticks;
        if self.is_looping && ticks >= self.loop_region.end {
            let start = self.loop_region.start;
            log::debug!(
                "Transport: looping from tick {ticks} back to {start} at {:.6}",
                tick.time
            );
            if let Err(e) = self.clock.wrap_ticks_at_time(start as f64, tick.time) {
                log::error!("Transport: couldn't wrap the loop: {e}");
            }
            ticks = start;
            self.restart_repeats(start);
        }
        let time = tick.time + self.swing_offset(ticks, tick.time);

        // Callbacks may add events at this same tick. They go to the back of
        // the line and still fire in this pass.
        let mut fired = 0;
        while let Some(entry) = self.events.take_first_at(ticks as f64) {
            if self.fire(entry.value, ticks, time) {
                fired += 1;
            }
        }
        fired
    }

    fn fire(&mut self, id: EventId, ticks: i64, time: f64) -> bool {
        let Some(repeat) = self.records.get(&id).map(|r| r.repeat) else {
            return false;
        };
        let callback = match repeat {
            None => self.records.remove(&id).and_then(|r| r.callback),
            Some(repeat) => {
                let next = ticks + repeat.interval;
                let has_next = repeat.contains(next);
                if has_next {
                    if let Err(e) = self.events.insert(next as f64, id) {
                        log::error!("Transport: couldn't requeue event {id}: {e}");
                    }
                }
                let callback = self.records.get_mut(&id).and_then(|r| r.callback.take());
                if !has_next {
                    self.records.remove(&id);
                }
                callback
            }
        };
        let Some(mut callback) = callback else {
            return false;
        };
        if let Err(e) = callback(self, time) {
            log::error!("Transport: event {id} failed at {time:.6}: {e:?}");
        }
        if let Some(record) = self.records.get_mut(&id) {
            record.callback = Some(callback);
        }
        true
    }
}
impl Configurable for Transport {
    fn sample_rate(&self) -> SampleRate {
        self.clock.settings().sample_rate
    }

    fn tempo(&self) -> Tempo {
        self.bpm()
    }

    fn update_tempo(&mut self, tempo: Tempo) -> Result<()> {
        self.set_bpm(tempo)
    }

    fn time_signature(&self) -> TimeSignature {
        Transport::time_signature(self)
    }

    fn update_time_signature(&mut self, time_signature: TimeSignature) -> Result<()> {
        self.set_time_signature(time_signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use float_cmp::approx_eq;
    use more_asserts::{assert_le, assert_lt};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<(&'static str, f64)>>>;

    fn transport() -> (Transport, ManualClock) {
        let _ = env_logger::builder().is_test(true).try_init();
        let host = ManualClock::default();
        let settings = ClockSettings {
            lookahead: 0.0,
            ..Default::default()
        };
        (
            Transport::new_with(settings, Box::new(host.clone())).unwrap(),
            host,
        )
    }

    fn expr(s: &str) -> TimeExpr {
        s.parse().unwrap()
    }

    fn recorder(
        log: &Log,
        label: &'static str,
    ) -> impl FnMut(&mut Transport, f64) -> anyhow::Result<()> + Send + 'static {
        let log = Arc::clone(log);
        move |_, time| {
            log.lock().unwrap().push((label, time));
            Ok(())
        }
    }

    fn run(transport: &mut Transport, host: &ManualClock, until: f64) {
        host.set(until);
        transport.tick();
    }

    #[test]
    fn events_fire_in_time_then_insertion_order() {
        let (mut t, host) = transport();
        let log = Log::default();
        t.schedule(recorder(&log, "a"), &expr("4n")).unwrap();
        t.schedule(recorder(&log, "b"), &expr("0")).unwrap();
        t.schedule(recorder(&log, "c"), &expr("4n")).unwrap();
        assert_eq!(t.pending_events(), 3);

        t.start().unwrap();
        run(&mut t, &host, 1.0);
        assert_eq!(
            *log.lock().unwrap(),
            vec![("b", 0.0), ("a", 0.5), ("c", 0.5)]
        );
        assert_eq!(t.pending_events(), 0, "one-time events are forgotten after firing");
    }

    #[test]
    fn cancel_only_works_before_firing() {
        let (mut t, host) = transport();
        let log = Log::default();
        let early = t.schedule(recorder(&log, "early"), &expr("0")).unwrap();
        let late = t.schedule(recorder(&log, "late"), &expr("1m")).unwrap();
        let doomed = t.schedule(recorder(&log, "doomed"), &expr("2n")).unwrap();

        assert!(t.cancel(doomed));
        assert!(!t.cancel(doomed), "cancelling twice is harmless");

        t.start().unwrap();
        run(&mut t, &host, 1.0);
        assert!(!t.cancel(early), "it already fired");
        assert!(t.cancel(late));
        assert!(!t.cancel(EventId(9999)));
        assert!(matches!(
            t.try_cancel(early),
            Err(SchedulerError::NotFound(id)) if id == early
        ));
        run(&mut t, &host, 3.0);
        assert_eq!(*log.lock().unwrap(), vec![("early", 0.0)]);
    }

    #[test]
    fn callbacks_can_schedule_more_work() {
        let (mut t, host) = transport();
        let log = Log::default();
        let inner = recorder(&log, "chained");
        let mut inner = Some(inner);
        t.schedule(
            move |transport, _| {
                if let Some(inner) = inner.take() {
                    transport.schedule(inner, &"1m".parse()?)?;
                }
                Ok(())
            },
            &expr("0"),
        )
        .unwrap();
        t.start().unwrap();
        run(&mut t, &host, 3.0);
        assert_eq!(*log.lock().unwrap(), vec![("chained", 2.0)]);
    }

    #[test]
    fn repeats_stop_after_their_duration() {
        let (mut t, host) = transport();
        let log = Log::default();
        let id = t
            .schedule_repeat(recorder(&log, "r"), &expr("4n"), &expr("0"), Some(&expr("1m")))
            .unwrap();
        t.start().unwrap();
        run(&mut t, &host, 5.0);
        let times: Vec<_> = log.lock().unwrap().iter().map(|(_, t)| *t).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0, 1.5]);
        assert!(!t.cancel(id), "a finished repeat is gone");

        assert!(matches!(
            t.schedule_repeat(recorder(&log, "bad"), &expr("0"), &expr("0"), None),
            Err(SchedulerError::Range(_))
        ));
    }

    #[test]
    fn loops_wrap_at_the_end() {
        let (mut t, host) = transport();
        let log = Log::default();
        t.set_loop_points(&expr("0"), &expr("1m")).unwrap();
        t.set_looping(true);
        t.schedule_repeat(recorder(&log, "beat"), &expr("4n"), &expr("0"), None)
            .unwrap();
        t.schedule(recorder(&log, "start"), &expr("0")).unwrap();
        t.schedule(recorder(&log, "end"), &expr("1m")).unwrap();

        t.start().unwrap();
        run(&mut t, &host, 3.0);
        assert!(approx_eq!(f64, t.progress(), 0.5, epsilon = 1e-9));
        run(&mut t, &host, 4.0);

        let log = log.lock().unwrap();
        let beats: Vec<_> = log
            .iter()
            .filter(|(label, _)| *label == "beat")
            .map(|(_, t)| *t)
            .collect();
        assert_eq!(beats, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5]);
        assert!(
            !log.iter().any(|(label, _)| *label == "end"),
            "an event at the loop end never fires while looping"
        );
        assert_eq!(
            log.iter().filter(|(label, _)| *label == "start").count(),
            1,
            "one-time events fire once even when the loop comes around again"
        );

        assert!(t.set_loop_points(&expr("1m"), &expr("1m")).is_err());
    }

    #[test]
    fn long_loops_keep_little_history() {
        let (mut t, host) = transport();
        let log = Log::default();
        t.set_loop_points(&expr("0"), &expr("1m")).unwrap();
        t.set_looping(true);
        t.schedule_repeat(recorder(&log, "bar"), &expr("1m"), &expr("0"), None)
            .unwrap();
        t.start().unwrap();

        let mut now = 0.0;
        for _ in 0..80 {
            now += 0.5;
            run(&mut t, &host, now);
            assert_le!(
                t.clock().source().history_len(),
                6,
                "loop wraps at {now} piled up"
            );
        }
        assert_eq!(log.lock().unwrap().len(), 20, "one bar per pass");
    }

    #[test]
    fn swing_delays_odd_subdivisions() {
        let (mut t, host) = transport();
        let log = Log::default();
        t.set_swing(0.5, &expr("8n")).unwrap();
        for (label, time) in [("1", "0"), ("2", "8n"), ("3", "4n"), ("4", "4n + 8n")] {
            t.schedule(recorder(&log, label), &expr(time)).unwrap();
        }
        t.start().unwrap();
        run(&mut t, &host, 1.0);

        let swung = 0.5 * (64.0 / 384.0);
        let expected = [0.0, 0.25 + swung, 0.5, 0.75 + swung];
        for ((label, actual), expected) in log.lock().unwrap().iter().zip(expected) {
            assert!(
                approx_eq!(f64, *actual, expected, epsilon = 1e-9),
                "event {label} should fire at {expected}, but fired at {actual}"
            );
        }
        assert!(t.set_swing(1.5, &expr("8n")).is_err());
    }

    #[test]
    fn tempo_changes_never_move_dispatched_events() {
        let (mut t, host) = transport();
        let log = Log::default();
        t.schedule(recorder(&log, "dispatched"), &expr("4n")).unwrap();
        t.schedule(recorder(&log, "pending"), &expr("1m")).unwrap();
        t.start().unwrap();
        run(&mut t, &host, 1.0);

        t.set_bpm(Tempo(240.0)).unwrap();
        assert_eq!(t.bpm(), Tempo(240.0));
        assert_eq!(t.bpm_at_time(0.5), Tempo(120.0));
        run(&mut t, &host, 3.0);
        assert_eq!(
            *log.lock().unwrap(),
            vec![("dispatched", 0.5), ("pending", 1.5)],
            "the second half bar should go twice as fast"
        );
        assert!(matches!(t.set_bpm(Tempo(0.0)), Err(SchedulerError::Range(_))));
    }

    #[test]
    fn failing_callbacks_are_skipped() {
        let (mut t, host) = transport();
        let log = Log::default();
        t.schedule(|_, _| anyhow::bail!("this one breaks"), &expr("0"))
            .unwrap();
        t.schedule(recorder(&log, "after"), &expr("0")).unwrap();
        t.start().unwrap();
        run(&mut t, &host, 0.1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn bad_times_commit_nothing() {
        let (mut t, _) = transport();
        let log = Log::default();
        assert!(matches!(
            t.schedule(recorder(&log, "x"), &expr("4n * 4n")),
            Err(SchedulerError::Unit(_))
        ));
        assert!("4q".parse::<TimeExpr>().is_err());
        assert_eq!(t.pending_events(), 0);
    }

    #[test]
    fn ticking_from_a_callback_is_ignored() {
        let (mut t, host) = transport();
        let inner_count = Arc::new(Mutex::new(None));
        let inner_clone = Arc::clone(&inner_count);
        t.schedule(
            move |transport, _| {
                *inner_clone.lock().unwrap() = Some(transport.tick());
                Ok(())
            },
            &expr("0"),
        )
        .unwrap();
        t.start().unwrap();
        run(&mut t, &host, 0.1);
        assert_eq!(*inner_count.lock().unwrap(), Some(0));
    }

    #[test]
    fn position_follows_time_signature_history() {
        let (mut t, host) = transport();
        t.start().unwrap();
        host.set(4.0);
        assert_eq!(t.position().to_string(), "2:0:0");

        t.set_time_signature(TimeSignature::new_with(3, 4).unwrap())
            .unwrap();
        host.set(5.25);
        assert_eq!(t.time_signature(), TimeSignature::new_with(3, 4).unwrap());
        assert_eq!(t.position().to_string(), "2:2:2");

        assert!(t
            .set_time_signature(TimeSignature { top: 0, bottom: 4 })
            .is_err());
    }

    #[test]
    fn seeking_rephases_repeats() {
        let (mut t, host) = transport();
        let log = Log::default();
        t.schedule_repeat(recorder(&log, "beat"), &expr("4n"), &expr("0"), None)
            .unwrap();
        t.start().unwrap();
        run(&mut t, &host, 0.25);
        t.set_ticks(100.0).unwrap();
        run(&mut t, &host, 0.5);

        let times: Vec<_> = log.lock().unwrap().iter().map(|(_, t)| *t).collect();
        assert_eq!(times.len(), 2);
        assert!(
            approx_eq!(f64, times[1], 0.25 + 92.0 / 384.0, epsilon = 1e-9),
            "after jumping to tick 100, the next beat is tick 192"
        );
    }

    #[test]
    fn next_subdivision() {
        let (mut t, host) = transport();
        assert_eq!(t.next_subdivision(&expr("4n")).unwrap(), 0.0);
        t.start().unwrap();
        host.set(0.3);
        assert!(approx_eq!(
            f64,
            t.next_subdivision(&expr("4n")).unwrap(),
            0.5,
            epsilon = 1e-9
        ));
        assert_lt!(t.next_subdivision(&expr("16n")).unwrap(), 0.5);
    }

    #[test]
    fn relative_times_count_from_the_position() {
        let (mut t, host) = transport();
        t.start().unwrap();
        host.set(1.0);
        assert!(approx_eq!(
            f64,
            t.to_seconds(&expr("+4n")).unwrap(),
            1.5,
            epsilon = 1e-9
        ));
        assert!(approx_eq!(f64, t.to_ticks(&expr("1m")).unwrap(), 768.0, epsilon = 1e-9));
    }

    #[test]
    fn pause_keeps_position_and_stop_rewinds() {
        let (mut t, host) = transport();
        let log = Log::default();
        t.schedule_repeat(recorder(&log, "beat"), &expr("4n"), &expr("0"), None)
            .unwrap();
        t.start().unwrap();
        run(&mut t, &host, 1.0);

        t.pause().unwrap();
        assert_eq!(t.state(), PlaybackState::Paused);
        assert!(approx_eq!(f64, t.ticks(), 384.0, epsilon = 1e-9));
        run(&mut t, &host, 2.0);
        assert!(
            approx_eq!(f64, t.ticks(), 384.0, epsilon = 1e-9),
            "paused time doesn't count"
        );

        t.start().unwrap();
        run(&mut t, &host, 3.0);

        t.stop().unwrap();
        assert_eq!(t.state(), PlaybackState::Stopped);
        assert_eq!(t.ticks(), 0.0);
        run(&mut t, &host, 3.75);

        t.start().unwrap();
        run(&mut t, &host, 4.5);
        let times: Vec<f64> = log.lock().unwrap().iter().map(|(_, time)| *time).collect();
        let expected = [0.0, 0.5, 2.0, 2.5, 3.75, 4.25];
        assert_eq!(times.len(), expected.len(), "got {times:?}");
        for (time, expected) in times.iter().zip(expected) {
            assert!(
                approx_eq!(f64, *time, expected, epsilon = 1e-9),
                "resuming continues the grid, and restarting after a stop begins it again: {times:?}"
            );
        }
    }

    #[test]
    fn clear_silences_everything() {
        let (mut t, host) = transport();
        let log = Log::default();
        t.schedule(recorder(&log, "once"), &expr("1m")).unwrap();
        t.schedule_repeat(recorder(&log, "beat"), &expr("4n"), &expr("0"), None)
            .unwrap();
        t.clear();
        assert_eq!(t.pending_events(), 0);

        t.start().unwrap();
        run(&mut t, &host, 4.0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn cancel_after_includes_its_boundary() {
        let (mut t, host) = transport();
        let log = Log::default();
        t.schedule(recorder(&log, "before"), &expr("4n")).unwrap();
        t.schedule(recorder(&log, "at"), &expr("1m")).unwrap();
        t.schedule(recorder(&log, "after"), &expr("2m")).unwrap();
        t.schedule_repeat(recorder(&log, "bars"), &expr("1m"), &expr("0"), None)
            .unwrap();
        t.schedule_repeat(recorder(&log, "late"), &expr("4n"), &expr("1m"), None)
            .unwrap();

        t.cancel_after(&expr("1m")).unwrap();
        assert_eq!(
            t.pending_events(),
            2,
            "a repeat that began earlier survives, even though it recurs later"
        );

        t.start().unwrap();
        run(&mut t, &host, 4.5);
        assert_eq!(
            *log.lock().unwrap(),
            vec![("bars", 0.0), ("before", 0.5), ("bars", 2.0), ("bars", 4.0)]
        );
    }

    #[test]
    fn set_position_jumps_ahead() {
        let (mut t, host) = transport();
        let log = Log::default();
        t.schedule(recorder(&log, "early"), &expr("4n")).unwrap();
        t.schedule(recorder(&log, "bar two"), &expr("1m")).unwrap();
        t.start().unwrap();
        run(&mut t, &host, 0.25);

        t.set_position(&expr("1:0:0")).unwrap();
        run(&mut t, &host, 1.5);
        assert_eq!(*log.lock().unwrap(), vec![("bar two", 0.25)]);
        assert_eq!(t.pending_events(), 1, "skipped events stay pending");
        assert!(approx_eq!(f64, t.ticks(), 1248.0, epsilon = 1e-9));
        assert_eq!(t.position().to_string(), "1:2:2");

        assert!(t.set_ticks(-1.0).is_err());
    }

    #[test]
    fn exponential_tempo_ramp() {
        let (mut t, _host) = transport();
        t.start().unwrap();
        t.exponential_ramp_bpm_to(Tempo(240.0), 1.0).unwrap();

        assert!(approx_eq!(
            f64,
            t.bpm_at_time(0.5).0,
            120.0 * 2f64.sqrt(),
            epsilon = 1e-9
        ));
        assert_eq!(t.bpm_at_time(2.0), Tempo(240.0));
        assert!(approx_eq!(
            f64,
            t.clock().ticks_at_time(1.0),
            384.0 / std::f64::consts::LN_2,
            epsilon = 1e-6
        ));
        assert!(t.exponential_ramp_bpm_to(Tempo(0.0), 1.0).is_err());
    }
}
