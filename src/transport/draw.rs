// Copyright (c) 2024 Mike Tsao

use crate::{
    error::{Result, SchedulerError},
    timeline::SharedTimeline,
};
use derivative::Derivative;

/// Work queued for [Draw].
pub type DrawCallback = Box<dyn FnOnce() + Send + Sync>;

/// Lines up visual updates with audio that was scheduled ahead of time.
///
/// Audio callbacks run up to a lookahead early. A callback that wants the
/// screen to change when the sound is actually heard hands a closure to
/// [Draw::schedule()] with the audio timestamp, and a UI thread calls
/// [Draw::process()] once per frame with the host's current time.
///
/// Clones share the same queue, so the audio side and the UI side can each
/// hold one.
#[derive(Clone, Derivative)]
#[derivative(Debug, Default)]
pub struct Draw {
    #[derivative(Debug = "ignore")]
    queue: SharedTimeline<DrawCallback>,

    /// How early a callback may run, in seconds.
    #[derivative(Default(value = "0.008"))]
    anticipation: f64,

    /// How late a callback may run before it's dropped, in seconds.
    #[derivative(Default(value = "0.25"))]
    expiration: f64,
}
impl Draw {
    #[allow(missing_docs)]
    pub fn new_with(anticipation: f64, expiration: f64) -> Result<Self> {
        for (name, value) in [("anticipation", anticipation), ("expiration", expiration)] {
            if !value.is_finite() || value < 0.0 {
                return Err(SchedulerError::range(format!(
                    "draw {name} must be non-negative, but got {value}"
                )));
            }
        }
        Ok(Self {
            anticipation,
            expiration,
            ..Default::default()
        })
    }

    #[allow(missing_docs)]
    pub fn anticipation(&self) -> f64 {
        self.anticipation
    }

    #[allow(missing_docs)]
    pub fn expiration(&self) -> f64 {
        self.expiration
    }

    /// Queues `callback` to run when the host clock reaches `time`.
    pub fn schedule(
        &self,
        callback: impl FnOnce() + Send + Sync + 'static,
        time: f64,
    ) -> Result<()> {
        self.queue.insert(time, Box::new(callback))
    }

    /// Drops every callback queued at or after `after`.
    pub fn cancel(&self, after: f64) {
        self.queue.cancel(after);
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Runs every callback that is due as of `now`, and silently drops the
    /// ones that are too late to matter. Returns the number that ran.
    pub fn process(&self, now: f64) -> usize {
        let mut fired = 0;
        loop {
            // The lock is released before the callback runs, so a callback
            // may queue more work.
            let entry = {
                let mut queue = self.queue.write();
                match queue.peek() {
                    Some(e) if e.time - self.anticipation <= now => queue.shift(),
                    _ => None,
                }
            };
            let Some(entry) = entry else {
                break;
            };
            if now - entry.time <= self.expiration {
                (entry.value)();
                fired += 1;
            } else {
                log::debug!(
                    "Draw: dropping callback for {:.6}, which expired before {now:.6}",
                    entry.time
                );
            }
        }
        fired
    }
}
