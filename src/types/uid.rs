// Copyright (c) 2024 Mike Tsao

//! Identifiers for scheduled events and solo participants, and the factory
//! that keeps them unique.

use core::sync::atomic::Ordering;
use core::{hash::Hash, marker::PhantomData, sync::atomic::AtomicUsize};
use serde::{Deserialize, Serialize};
use synonym::Synonym;

/// Identifies something scheduled on a
/// [Transport](crate::transport::Transport). Returned by the `schedule*`
/// methods and accepted by `cancel()`.
#[derive(Synonym, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EventId(pub usize);
impl IsUid for EventId {
    fn as_usize(&self) -> usize {
        self.0
    }
}

/// Identifies a participant in a [SoloRegistry](crate::solo::SoloRegistry).
#[derive(Synonym, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SoloId(pub usize);
impl IsUid for SoloId {
    fn as_usize(&self) -> usize {
        self.0
    }
}

/// An optional Uid trait.
pub trait IsUid: Eq + Hash + Clone + From<usize> {
    /// Returns the raw uid.
    fn as_usize(&self) -> usize;
}

/// Generates unique uids. Minting is lock-free, so a factory can be shared by
/// reference across threads.
#[derive(Debug)]
pub struct UidFactory<U: IsUid> {
    next_uid_value: AtomicUsize,
    _phantom: PhantomData<U>,
}
impl<U: IsUid> Default for UidFactory<U> {
    fn default() -> Self {
        Self::new(Self::FIRST_UID)
    }
}
impl<U: IsUid> UidFactory<U> {
    /// Zero is never minted by a default factory, so it can serve as a
    /// sentinel.
    pub const FIRST_UID: usize = 1;

    /// Creates a new [UidFactory] starting with the given value.
    pub fn new(first_uid: usize) -> Self {
        Self {
            next_uid_value: AtomicUsize::new(first_uid),
            _phantom: Default::default(),
        }
    }

    /// Generates the next unique uid.
    pub fn mint_next(&self) -> U {
        let uid_value = self.next_uid_value.fetch_add(1, Ordering::Relaxed);
        U::from(uid_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uid_factory() {
        let f = UidFactory::<EventId>::default();

        let uid_1 = f.mint_next();
        let uid_2 = f.mint_next();
        assert_ne!(uid_1, uid_2, "Minted ids should not repeat");
        assert_eq!(uid_1.0, UidFactory::<EventId>::FIRST_UID);
        assert!(uid_1.0 < uid_2.0, "Minted ids should increase");

        let mut ids: HashSet<EventId> = Default::default();
        for _ in 0..64 {
            let uid = f.mint_next();
            assert!(!ids.contains(&uid), "each minted id should be unique");
            ids.insert(uid);
        }
    }

    #[test]
    fn factories_are_independent() {
        let events = UidFactory::<EventId>::new(100);
        let solos = UidFactory::<SoloId>::default();
        assert_eq!(events.mint_next().as_usize(), 100);
        assert_eq!(solos.mint_next().as_usize(), 1);
    }
}
