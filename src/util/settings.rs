// Copyright (c) 2024 Mike Tsao

//! Structs that hold configuration information about the scheduler. Intended
//! to be serialized.

use crate::{
    error::{Result, SchedulerError},
    types::SampleRate,
};
use derivative::Derivative;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// The knobs that govern how a [Clock](crate::clock::Clock) dispatches work.
///
/// Deserialization fills in defaults for missing fields, so a settings file
/// needs to mention only what it changes.
#[derive(Clone, Debug, Builder, Derivative, PartialEq, Serialize, Deserialize)]
#[derivative(Default)]
#[builder(default, build_fn(private, name = "build_from_builder"))]
#[serde(default, rename_all = "kebab-case")]
pub struct ClockSettings {
    /// How far ahead of the host clock, in seconds, callbacks may be
    /// dispatched.
    #[derivative(Default(value = "0.1"))]
    pub lookahead: f64,

    /// How often, in seconds, the periodic driver should wake up. Must be
    /// comfortably shorter than `lookahead`, or callbacks will be late.
    #[derivative(Default(value = "0.05"))]
    pub update_interval: f64,

    /// Ticks per quarter note.
    #[derivative(Default(value = "192"))]
    pub ppq: u32,

    /// Used to resolve time expressions measured in samples.
    pub sample_rate: SampleRate,
}
impl ClockSettingsBuilder {
    /// Builds the [ClockSettings], rejecting values that can't drive a clock.
    pub fn build(&self) -> core::result::Result<ClockSettings, ClockSettingsBuilderError> {
        let settings = self.build_from_builder()?;
        settings
            .validate()
            .map_err(|e| ClockSettingsBuilderError::ValidationError(e.to_string()))?;
        Ok(settings)
    }
}
impl ClockSettings {
    /// Checks the invariants that deserialization can't enforce.
    pub fn validate(&self) -> Result<()> {
        if self.ppq == 0 {
            return Err(SchedulerError::range("PPQ must be positive"));
        }
        if !self.lookahead.is_finite() || self.lookahead < 0.0 {
            return Err(SchedulerError::range(format!(
                "lookahead must be non-negative, but got {}",
                self.lookahead
            )));
        }
        if !self.update_interval.is_finite() || self.update_interval <= 0.0 {
            return Err(SchedulerError::range(format!(
                "update interval must be positive, but got {}",
                self.update_interval
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = ClockSettings::default();
        assert_eq!(s.lookahead, 0.1);
        assert_eq!(s.update_interval, 0.05);
        assert_eq!(s.ppq, 192);
        assert_eq!(s.sample_rate, SampleRate::DEFAULT);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn builder_validates() {
        let s = ClockSettingsBuilder::default().ppq(96).build().unwrap();
        assert_eq!(s.ppq, 96);
        assert_eq!(s.lookahead, 0.1, "unset fields should take defaults");

        assert!(ClockSettingsBuilder::default().ppq(0).build().is_err());
        assert!(ClockSettingsBuilder::default()
            .lookahead(-0.5)
            .build()
            .is_err());
        assert!(ClockSettingsBuilder::default()
            .update_interval(0.0)
            .build()
            .is_err());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let s: ClockSettings =
            serde_json::from_str(r#"{ "lookahead": 0.025, "sample-rate": 48000 }"#).unwrap();
        assert_eq!(s.lookahead, 0.025);
        assert_eq!(s.sample_rate, SampleRate(48000));
        assert_eq!(s.update_interval, 0.05);
        assert_eq!(s.ppq, 192);

        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("update-interval"), "field names are kebab-case");

        let bad: ClockSettings = serde_json::from_str(r#"{ "ppq": 0 }"#).unwrap();
        assert!(bad.validate().is_err(), "deserializing doesn't validate");
    }
}
