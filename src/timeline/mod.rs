// Copyright (c) 2024 Mike Tsao

//! Sorted, time-stamped containers: the event queues and state histories that
//! the clock and transport are built on.

/// The most commonly used imports.
pub mod prelude {
    pub use super::{SharedTimeline, Timeline, TimelineEntry, TimelineState};
}

pub use shared::SharedTimeline;
pub use state::TimelineState;
pub use timeline::{Timeline, TimelineEntry};

mod shared;
mod state;
#[allow(clippy::module_inception)]
mod timeline;
