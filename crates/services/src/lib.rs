// Copyright (c) 2024 Mike Tsao

//! Runs an ensnare-scheduler [Transport](ensnare_scheduler::Transport) on its
//! own thread, and talks to it with crossbeam channels.

#![deny(missing_docs)]

/// The most commonly used imports.
pub mod prelude {
    pub use super::{
        ClockService, ClockServiceEvent, ClockServiceInput, CrossbeamChannel, ProvidesService,
    };
}

pub use clock::{ClockService, ClockServiceEvent, ClockServiceInput};
pub use traits::ProvidesService;
pub use types::CrossbeamChannel;

mod clock;
mod traits;
mod types;
