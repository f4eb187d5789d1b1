// Copyright (c) 2024 Mike Tsao

//! System utilities.

/// Commonly used imports.
pub mod prelude {
    pub use super::settings::{ClockSettings, ClockSettingsBuilder};
}

pub use settings::{ClockSettings, ClockSettingsBuilder, ClockSettingsBuilderError};

mod settings;
