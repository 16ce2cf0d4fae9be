//! Copy-on-write list of registered interfaces.
//!
//! Readers take a cheap `Arc` snapshot and iterate it without holding any
//! lock; writers publish a new vector. A reader never blocks a writer for
//! longer than an `Arc` clone.

use std::sync::{Arc, PoisonError, RwLock};

pub struct SnapshotList<T> {
    items: RwLock<Arc<Vec<Arc<T>>>>,
}

impl<T> Default for SnapshotList<T> {
    fn default() -> Self {
        Self { items: RwLock::new(Arc::new(Vec::new())) }
    }
}

impl<T> SnapshotList<T> {
    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        Arc::clone(&self.items.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn push(&self, item: Arc<T>) {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(items.len() + 1);
        next.extend(items.iter().cloned());
        next.push(item);
        *items = Arc::new(next);
    }

    /// Removes and returns the first item matching `pred`.
    pub fn remove_by(&self, pred: impl Fn(&T) -> bool) -> Option<Arc<T>> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let pos = items.iter().position(|i| pred(&**i))?;
        let mut next: Vec<Arc<T>> = items.iter().cloned().collect();
        let removed = next.remove(pos);
        *items = Arc::new(next);
        Some(removed)
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<Arc<T>> {
        self.snapshot().iter().find(|i| pred(&***i)).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_survives_removal() {
        let list = SnapshotList::default();
        list.push(Arc::new(1));
        list.push(Arc::new(2));
        list.push(Arc::new(3));

        let before = list.snapshot();
        assert_eq!(list.remove_by(|v| *v == 2).as_deref(), Some(&2));
        assert_eq!(before.len(), 3);
        assert_eq!(list.len(), 2);
        assert_eq!(list.find(|v| *v == 3).as_deref(), Some(&3));
        assert!(list.find(|v| *v == 2).is_none());
        assert!(list.remove_by(|v| *v == 9).is_none());
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let list = Arc::new(SnapshotList::default());
        let writer = {
            let list = list.clone();
            std::thread::spawn(move || {
                for i in 0..200u32 {
                    list.push(Arc::new(i));
                    if i % 2 == 0 {
                        list.remove_by(|v| *v == i);
                    }
                }
            })
        };
        let reader = {
            let list = list.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let snap = list.snapshot();
                    let unique: std::collections::HashSet<u32> = snap.iter().map(|v| **v).collect();
                    assert_eq!(unique.len(), snap.len());
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(list.len(), 100);
        assert!(!list.is_empty());
    }
}
