// Copyright (c) 2024 Mike Tsao

use crate::{traits::ProvidesService, types::CrossbeamChannel};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use ensnare_scheduler::prelude::*;
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// Commands for [ClockService].
#[derive(Clone, Debug)]
pub enum ClockServiceInput {
    /// Changes how often the service wakes up, in seconds.
    SetUpdateInterval(f64),
    /// Stops the service thread.
    Quit,
}

/// Reports from [ClockService].
#[derive(Clone, Debug, PartialEq)]
pub enum ClockServiceEvent {
    /// A wakeup ran this many scheduled callbacks. Wakeups that ran none
    /// aren't reported.
    Processed(usize),
    /// The service thread has exited.
    Quit,
}

/// Calls [Transport::tick()] periodically on a dedicated thread, so that
/// scheduled callbacks keep firing without the caller's involvement.
///
/// The thread wakes up every `update_interval` from the transport's
/// [ClockSettings]. Callbacks run with the transport locked.
///
/// At most [ClockService::EVENT_CAPACITY] events wait in
/// [ProvidesService::receiver()]. A client that falls behind loses the oldest
/// [ClockServiceEvent::Processed] reports, but always gets
/// [ClockServiceEvent::Quit].
#[derive(Debug)]
pub struct ClockService {
    inputs: CrossbeamChannel<ClockServiceInput>,
    events: CrossbeamChannel<ClockServiceEvent>,
}
impl ProvidesService<ClockServiceInput, ClockServiceEvent> for ClockService {
    fn sender(&self) -> &Sender<ClockServiceInput> {
        &self.inputs.sender
    }

    fn receiver(&self) -> &Receiver<ClockServiceEvent> {
        &self.events.receiver
    }
}
impl ClockService {
    /// How many events can wait for the client.
    pub const EVENT_CAPACITY: usize = 16;

    /// Starts driving `transport`.
    pub fn new_with(transport: &SharedTransport) -> Self {
        let r = Self {
            inputs: Default::default(),
            events: CrossbeamChannel::new_bounded(Self::EVENT_CAPACITY),
        };
        r.spawn_thread(Arc::clone(transport));
        r
    }

    fn spawn_thread(&self, transport: SharedTransport) {
        let update_interval = lock(&transport).clock().settings().update_interval;
        let mut daemon = ClockServiceDaemon {
            receiver: self.inputs.receiver.clone(),
            events: self.events.clone(),
            transport,
            update_interval: Duration::from_secs_f64(update_interval),
        };
        std::thread::spawn(move || daemon.execute());
    }
}

fn lock(transport: &Mutex<Transport>) -> MutexGuard<'_, Transport> {
    transport.lock().unwrap_or_else(|poisoned| {
        log::error!("ClockService: a callback panicked while holding the transport");
        poisoned.into_inner()
    })
}

struct ClockServiceDaemon {
    receiver: Receiver<ClockServiceInput>,
    events: CrossbeamChannel<ClockServiceEvent>,
    transport: SharedTransport,
    update_interval: Duration,
}
impl ClockServiceDaemon {
    fn execute(&mut self) {
        let mut deadline = Instant::now();
        loop {
            match self.receiver.recv_deadline(deadline) {
                Ok(input) => match input {
                    ClockServiceInput::SetUpdateInterval(seconds) => {
                        match Duration::try_from_secs_f64(seconds) {
                            Ok(interval) if !interval.is_zero() => {
                                log::debug!("ClockService: update interval is now {seconds}s");
                                self.update_interval = interval;
                                deadline = Instant::now();
                            }
                            _ => log::warn!(
                                "ClockService: ignoring invalid update interval {seconds}"
                            ),
                        }
                    }
                    ClockServiceInput::Quit => {
                        self.report(ClockServiceEvent::Quit);
                        break;
                    }
                },
                Err(RecvTimeoutError::Timeout) => {
                    let processed = lock(&self.transport).tick();
                    if processed > 0 {
                        self.report(ClockServiceEvent::Processed(processed));
                    }
                    let now = Instant::now();
                    deadline += self.update_interval;
                    if deadline < now {
                        log::trace!("ClockService: fell behind; resynchronizing");
                        deadline = now + self.update_interval;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::debug!("ClockService: exiting");
    }

    fn report(&self, event: ClockServiceEvent) {
        let displaced = self.events.send_displacing(event);
        if displaced > 0 {
            log::trace!("ClockService: client is behind; dropped {displaced} old events");
        }
    }
}
