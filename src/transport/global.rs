// Copyright (c) 2024 Mike Tsao

//! An optional process-wide [Transport]. Nothing here happens implicitly:
//! [init()] creates it, [teardown()] releases it, and [get()] returns None in
//! between. Most code should pass a [SharedTransport] around instead.

use super::Transport;
use crate::{
    error::{Result, SchedulerError},
    traits::HostClock,
    util::ClockSettings,
};
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex, MutexGuard};

/// A [Transport] behind the mutex that every caller shares.
pub type SharedTransport = Arc<Mutex<Transport>>;

static GLOBAL_TRANSPORT: Lazy<Mutex<Option<SharedTransport>>> = Lazy::new(Default::default);

fn slot() -> MutexGuard<'static, Option<SharedTransport>> {
    GLOBAL_TRANSPORT
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Creates the global transport. Fails if one already exists.
pub fn init(settings: ClockSettings, host: Box<dyn HostClock>) -> Result<SharedTransport> {
    let mut slot = slot();
    if slot.is_some() {
        return Err(SchedulerError::AlreadyInitialized);
    }
    let transport = Arc::new(Mutex::new(Transport::new_with(settings, host)?));
    *slot = Some(Arc::clone(&transport));
    log::debug!("global transport initialized");
    Ok(transport)
}

/// The global transport, if it has been initialized.
pub fn get() -> Option<SharedTransport> {
    slot().clone()
}

/// The global transport, creating it first if necessary.
pub fn get_or_init(settings: ClockSettings, host: Box<dyn HostClock>) -> Result<SharedTransport> {
    let mut slot = slot();
    if let Some(transport) = slot.as_ref() {
        return Ok(Arc::clone(transport));
    }
    let transport = Arc::new(Mutex::new(Transport::new_with(settings, host)?));
    *slot = Some(Arc::clone(&transport));
    Ok(transport)
}

/// Releases the global transport. Handles that callers still hold keep
/// working. Returns false if there was nothing to release.
pub fn teardown() -> bool {
    let released = slot().take().is_some();
    if released {
        log::debug!("global transport released");
    }
    released
}
