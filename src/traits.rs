// Copyright (c) 2024 Mike Tsao

//! The traits that connect the scheduler to its host and keep musical settings
//! in sync.

use crate::{
    error::Result,
    types::{SampleRate, Tempo, TimeSignature},
};

/// Quick import of all important traits.
pub mod prelude {
    pub use super::{Configurable, HostClock};
}

/// A source of "now", in seconds. Implementations must never go backwards.
///
/// The clock is agnostic about where time comes from: a wall clock, an audio
/// device's frame counter, or a value that a test advances by hand.
pub trait HostClock: core::fmt::Debug + Send + Sync {
    /// The current time, in seconds.
    fn now(&self) -> f64;
}

/// Something that is [Configurable] follows the musical settings that govern
/// how time expressions resolve.
pub trait Configurable {
    /// Returns this item's sample rate.
    fn sample_rate(&self) -> SampleRate {
        SampleRate::default()
    }

    /// Returns this item's [Tempo].
    fn tempo(&self) -> Tempo;

    /// Changes the tempo. Fails for tempos that aren't positive.
    fn update_tempo(&mut self, tempo: Tempo) -> Result<()>;

    /// Returns this item's [TimeSignature].
    fn time_signature(&self) -> TimeSignature;

    /// Changes the time signature. Fails if it isn't a valid time signature.
    fn update_time_signature(&mut self, time_signature: TimeSignature) -> Result<()>;
}
