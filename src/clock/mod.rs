// Copyright (c) 2024 Mike Tsao

//! Tick generation. A [Clock] integrates an automatable rate ([TickParam])
//! over a start/stop/pause history ([TickSource]) and delivers exact tick
//! timestamps ahead of a [HostClock](crate::traits::HostClock).

/// The most commonly used imports.
pub mod prelude {
    pub use super::{Clock, ManualClock, PlaybackState, SystemClock, Tick};
}

pub use clock::{Clock, Tick, TickCallback};
pub use host::{ManualClock, SystemClock};
pub use tick_param::{RateCurve, TickParam};
pub use tick_source::{PlaybackState, TickSource};

#[allow(clippy::module_inception)]
mod clock;
mod host;
mod tick_param;
mod tick_source;
