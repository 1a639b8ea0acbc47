//! Published snapshots, swapped in atomically.
//!
//! A snapshot is built completely outside the lock and then published; a
//! query holds an `Arc` to the snapshot it started with, so a concurrent
//! rebuild or retirement never changes the data under it.
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use coderag_text::SparseIndex;

/// Both indices of one named chunk set.
pub struct Snapshot<D> {
    pub name: String,
    pub dense: D,
    pub sparse: SparseIndex,
    pub chunk_count: usize,
}

pub struct SnapshotRegistry<D> {
    snapshots: RwLock<HashMap<String, Arc<Snapshot<D>>>>,
}

impl<D> Default for SnapshotRegistry<D> {
    fn default() -> Self {
        Self { snapshots: RwLock::new(HashMap::new()) }
    }
}

impl<D> SnapshotRegistry<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Snapshot<D>>> {
        self.snapshots.read().get(name).cloned()
    }

    /// Publishes `snapshot`, returning the one it replaced.
    pub fn publish(&self, snapshot: Snapshot<D>) -> Option<Arc<Snapshot<D>>> {
        self.snapshots.write().insert(snapshot.name.clone(), Arc::new(snapshot))
    }

    /// Publishes `snapshot` unless one is already present; returns whichever
    /// is published afterwards.
    pub fn publish_if_absent(&self, snapshot: Snapshot<D>) -> Arc<Snapshot<D>> {
        self.snapshots.write().entry(snapshot.name.clone()).or_insert_with(|| Arc::new(snapshot)).clone()
    }

    pub fn retire(&self, name: &str) -> Option<Arc<Snapshot<D>>> {
        self.snapshots.write().remove(name)
    }

    /// Published names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshots.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}
