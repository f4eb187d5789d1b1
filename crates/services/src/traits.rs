// Copyright (c) 2024 Mike Tsao

//! Traits used by services.

use crossbeam::channel::{Receiver, Sender};

/// A service runs on its own thread, takes Inputs, and reports Events, all
/// over crossbeam channels. Clients usually clone [ProvidesService::sender()]
/// and [ProvidesService::receiver()] rather than hold the service itself.
pub trait ProvidesService<I: core::fmt::Debug, E: core::fmt::Debug> {
    /// Where Inputs go.
    fn sender(&self) -> &Sender<I>;

    /// Sends an Input, logging rather than failing if the service is gone.
    fn send_input(&self, input: I) {
        if let Err(e) = self.sender().try_send(input) {
            log::warn!("ProvidesService: couldn't send {:?}", e.into_inner());
        }
    }

    /// Where Events come from.
    fn receiver(&self) -> &Receiver<E>;
}
