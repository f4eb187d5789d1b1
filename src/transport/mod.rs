// Copyright (c) 2024 Mike Tsao

//! Musical time on top of a [Clock](crate::clock::Clock): tempo, meter,
//! loops, swing, and callbacks scheduled in bars and beats.

/// The most commonly used imports.
pub mod prelude {
    pub use super::{global::SharedTransport, Draw, LoopRegion, Transport};
}

pub use draw::{Draw, DrawCallback};
pub use transport::{LoopRegion, Transport, TransportCallback};

pub mod global;

mod draw;
#[allow(clippy::module_inception)]
mod transport;
