// Copyright (c) 2024 Mike Tsao

//! The errors that scheduling operations can produce.

use crate::types::EventId;
use thiserror::Error;

/// Everything that can go wrong while parsing times, configuring clocks, or
/// managing scheduled events.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SchedulerError {
    /// A time expression couldn't be parsed. `token` is the offending piece of
    /// the input.
    #[error("can't parse time expression at '{token}': {reason}")]
    Parse {
        #[allow(missing_docs)]
        token: String,
        #[allow(missing_docs)]
        reason: String,
    },

    /// Arithmetic between incompatible units, such as multiplying two
    /// durations.
    #[error("unit mismatch: {0}")]
    Unit(String),

    /// A value was outside the range that has a meaning, such as a
    /// non-positive tempo or PPQ.
    #[error("out of range: {0}")]
    Range(String),

    /// No scheduled event has this id, usually because it already fired.
    /// Returned by [Transport::try_cancel()](crate::Transport::try_cancel).
    #[error("no scheduled event with id {0}")]
    NotFound(EventId),

    /// The process-wide transport was initialized twice without a teardown in
    /// between.
    #[error("the global transport is already initialized")]
    AlreadyInitialized,
}
impl SchedulerError {
    pub(crate) fn parse(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            token: token.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn range(message: impl Into<String>) -> Self {
        Self::Range(message.into())
    }
}

/// Shorthand for results whose error is [SchedulerError].
pub type Result<T> = core::result::Result<T, SchedulerError>;
