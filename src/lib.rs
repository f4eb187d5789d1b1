// Copyright (c) 2024 Mike Tsao

#![deny(missing_docs, unused_imports, unused_variables)]
#![allow(rustdoc::private_intra_doc_links)]

//! Ensnare Scheduler keeps musical time for audio applications.
//!
//! There are several layers, depending on how much you want to manage
//! yourself.
//!
//! * *Most batteries included*: Create a [Transport], schedule callbacks in
//! musical terms such as `"4n"` or `"2:0:0"`, and call [Transport::tick()]
//! periodically, or hand the transport to a driver thread that does it for
//! you. Callbacks run ahead of time and receive the exact time at which they
//! should be heard.
//! * *Lower level*: Drive a [Clock](clock::Clock) directly to receive every
//! tick, placed exactly even while the tempo ramps.
//! * *Building blocks*: [Timeline](timeline::Timeline) and
//! [TimelineState](timeline::TimelineState) are sorted, time-stamped
//! containers, and [TimeExpr](time_value::TimeExpr) parses and resolves time
//! expressions.
//!
//! ```
//! use ensnare_scheduler::prelude::*;
//!
//! let context = TimeContext::default();
//! let expr: TimeExpr = "2*1:2 - 1m".parse().unwrap();
//! assert_eq!(context.resolve(&expr).unwrap().0, 4.0);
//! ```

/// A collection of imports that are useful to users of this crate. `use
/// ensnare_scheduler::prelude::*;` for easier onboarding.
pub mod prelude {
    pub use super::{
        clock::prelude::*, error::SchedulerError, solo::prelude::*, time_value::prelude::*,
        timeline::prelude::*, traits::prelude::*, transport::prelude::*, types::prelude::*,
        util::prelude::*,
    };
}

// Fundamental structures that are important enough to re-export at top level.
pub use {
    error::{Result, SchedulerError},
    transport::Transport,
};

pub mod clock;
pub mod error;
pub mod solo;
pub mod time_value;
pub mod timeline;
pub mod traits;
pub mod transport;
pub mod types;
pub mod util;
