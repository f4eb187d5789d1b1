// Copyright (c) 2024 Mike Tsao

//! Channel plumbing shared by services.

use crossbeam::channel::{Receiver, Sender, TrySendError};

/// Both ends of one crossbeam channel. A service keeps a clone so that it can
/// manage its own backlog.
#[derive(Debug)]
pub struct CrossbeamChannel<T> {
    #[allow(missing_docs)]
    pub sender: Sender<T>,
    #[allow(missing_docs)]
    pub receiver: Receiver<T>,
}
impl<T> Default for CrossbeamChannel<T> {
    fn default() -> Self {
        let (sender, receiver) = crossbeam::channel::unbounded();
        Self { sender, receiver }
    }
}
impl<T> Clone for CrossbeamChannel<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}
impl<T> CrossbeamChannel<T> {
    /// A channel that holds at most `capacity` messages, and at least one.
    pub fn new_bounded(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam::channel::bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Sends without blocking. If the channel is full, the oldest queued
    /// messages are discarded until `message` fits. Returns how many were
    /// discarded.
    pub fn send_displacing(&self, message: T) -> usize {
        let mut message = message;
        let mut displaced = 0;
        loop {
            match self.sender.try_send(message) {
                Ok(()) => return displaced,
                Err(TrySendError::Full(m)) => {
                    if self.receiver.try_recv().is_ok() {
                        displaced += 1;
                    }
                    message = m;
                }
                Err(TrySendError::Disconnected(_)) => return displaced,
            }
        }
    }
}
