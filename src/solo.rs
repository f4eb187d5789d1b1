// Copyright (c) 2024 Mike Tsao

//! Exclusive solo. At most one participant holds solo at a time, and while one
//! does, every other participant sharing the same [SoloRegistry] is muted.

use crate::{
    error::Result,
    timeline::TimelineState,
    types::{SoloId, UidFactory},
};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The most commonly used imports.
pub mod prelude {
    pub use super::{Solo, SoloRegistry};
}

/// Records who held solo, and when. Participants get the registry explicitly,
/// so separate registries never interfere with each other.
///
/// When two participants solo at the same time, the one that asked last wins.
#[derive(Debug)]
pub struct SoloRegistry {
    owners: RwLock<TimelineState<Option<SoloId>>>,
    uid_factory: UidFactory<SoloId>,
}
impl Default for SoloRegistry {
    fn default() -> Self {
        Self {
            owners: RwLock::new(TimelineState::with_memory(Some(None), Self::MEMORY)),
            uid_factory: UidFactory::default(),
        }
    }
}
impl SoloRegistry {
    /// How many ownership changes are remembered.
    pub const MEMORY: usize = 1024;

    /// Creates a registry ready to be shared among participants.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn read(&self) -> RwLockReadGuard<'_, TimelineState<Option<SoloId>>> {
        self.owners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TimelineState<Option<SoloId>>> {
        self.owners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Who holds solo at `time`, if anyone.
    pub fn soloed_at(&self, time: f64) -> Option<SoloId> {
        self.read().get_value_at_time(time).flatten()
    }

    fn set_owner(&self, owner: Option<SoloId>, time: f64) -> Result<()> {
        self.write().set_state_at_time(owner, time)
    }
}

/// One participant in a [SoloRegistry], such as a track or a channel strip.
#[derive(Debug, Clone)]
pub struct Solo {
    id: SoloId,
    registry: Arc<SoloRegistry>,
}
impl Solo {
    /// Joins `registry` as a new participant.
    pub fn new_with(registry: &Arc<SoloRegistry>) -> Self {
        Self {
            id: registry.uid_factory.mint_next(),
            registry: Arc::clone(registry),
        }
    }

    #[allow(missing_docs)]
    pub fn id(&self) -> SoloId {
        self.id
    }

    /// Takes solo at `time`, or gives it up. Giving up solo that someone else
    /// holds does nothing.
    pub fn set_soloed(&self, soloed: bool, time: f64) -> Result<()> {
        if soloed {
            log::debug!("Solo: {} takes solo at {time:.6}", self.id);
            self.registry.set_owner(Some(self.id), time)
        } else if self.is_soloed(time) {
            log::debug!("Solo: {} releases solo at {time:.6}", self.id);
            self.registry.set_owner(None, time)
        } else {
            Ok(())
        }
    }

    #[allow(missing_docs)]
    pub fn is_soloed(&self, time: f64) -> bool {
        self.registry.soloed_at(time) == Some(self.id)
    }

    /// True if another participant holds solo at `time`.
    pub fn is_muted(&self, time: f64) -> bool {
        self.registry
            .soloed_at(time)
            .is_some_and(|owner| owner != self.id)
    }
}
