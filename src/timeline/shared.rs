// Copyright (c) 2024 Mike Tsao

use super::Timeline;
use crate::error::Result;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A [Timeline] that several threads can hold at once. Clones share the same
/// entries. Mutations take the write lock and queries share the read lock.
#[derive(Debug)]
pub struct SharedTimeline<T>(pub Arc<RwLock<Timeline<T>>>);
impl<T> Default for SharedTimeline<T> {
    fn default() -> Self {
        Self(Arc::new(RwLock::new(Timeline::default())))
    }
}
impl<T> Clone for SharedTimeline<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}
impl<T> SharedTimeline<T> {
    /// A poisoned lock means a panic happened mid-mutation elsewhere. The
    /// entries are still sorted, because every mutation is a single Vec
    /// operation, so it's safe to keep going.
    pub fn read(&self) -> RwLockReadGuard<'_, Timeline<T>> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[allow(missing_docs)]
    pub fn write(&self) -> RwLockWriteGuard<'_, Timeline<T>> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[allow(missing_docs)]
    pub fn insert(&self, time: f64, value: T) -> Result<()> {
        self.write().insert(time, value)
    }

    #[allow(missing_docs)]
    pub fn cancel(&self, after: f64) {
        self.write().cancel(after)
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let a = SharedTimeline::default();
        let b = a.clone();
        a.insert(1.0, "from a").unwrap();
        b.insert(0.5, "from b").unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.read().peek().unwrap().value, "from b");

        let handle = std::thread::spawn({
            let c = a.clone();
            move || c.cancel(1.0)
        });
        handle.join().unwrap();
        assert_eq!(b.len(), 1);
    }
}
