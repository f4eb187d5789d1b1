// Copyright (c) 2024 Mike Tsao

//! Common data types used throughout the system.

/// The most commonly used imports.
pub mod prelude {
    pub use super::{EventId, SampleRate, Seconds, SoloId, Tempo, TimeSignature, UidFactory};
}

pub use {
    time::{SampleRate, Seconds, Tempo, TimeSignature},
    uid::{EventId, IsUid, SoloId, UidFactory},
};

mod time;
mod uid;
