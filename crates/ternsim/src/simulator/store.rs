use crate::HashMap;
use crate::prim::{Graph, NodeId};
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};

/// Current value of every storage element.
#[derive(Debug, Default)]
pub(crate) struct Store {
    values: HashMap<NodeId, Value>,
}

impl Store {
    /// Every storage element becomes fully unknown.
    pub(crate) fn reset(&mut self, graph: &Graph) {
        self.values.clear();
        for id in graph.storage_nodes() {
            let node = graph.node(id);
            self.values.insert(id, Value::x(node.width, &node.dims));
        }
    }

    pub(crate) fn get(&self, storage: NodeId) -> Option<&Value> {
        self.values.get(&storage)
    }

    /// Replaces the element at `path`. Returns whether anything changed.
    pub(crate) fn write(&mut self, storage: NodeId, path: &[usize], value: Value) -> bool {
        let Some(root) = self.values.get_mut(&storage) else {
            panic!("write to undeclared storage {storage}");
        };
        let slot = root.get_mut(path);
        if *slot == value {
            false
        } else {
            *slot = value;
            true
        }
    }
}

/// Writes computed but not yet visible, keyed by storage and element path.
/// Later writes to the same key move it to the back so commit order matches
/// program order.
#[derive(Debug, Default, Clone)]
pub(crate) struct Shadow {
    pending: IndexMap<(NodeId, Vec<usize>), Value>,
}

impl Shadow {
    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The element at `path` as it will look after commit.
    pub(crate) fn read(&self, store: &Store, storage: NodeId, path: &[usize]) -> Value {
        let Some(root) = store.get(storage) else {
            panic!("read of undeclared storage {storage}");
        };
        let mut value = root.get(path).clone();
        // Replay pending writes in order: enclosing ones replace the element,
        // nested ones patch part of it.
        for ((id, at), pending) in &self.pending {
            if *id != storage {
                continue;
            }
            if path.starts_with(at) {
                value = pending.get(&path[at.len()..]).clone();
            } else if at.starts_with(path) {
                *value.get_mut(&at[path.len()..]) = pending.clone();
            }
        }
        value
    }

    pub(crate) fn write(&mut self, storage: NodeId, path: Vec<usize>, value: Value) {
        let key = (storage, path);
        self.pending.shift_remove(&key);
        self.pending.insert(key, value);
    }

    /// Folds two alternative continuations of `self` back in. Every
    /// location either branch wrote becomes the [`Value::combine`] of both
    /// outcomes.
    pub(crate) fn merge_branches(&mut self, store: &Store, then: &Shadow, other: &Shadow) {
        let keys: IndexSet<&(NodeId, Vec<usize>)> =
            then.pending.keys().chain(other.pending.keys()).collect();
        for (storage, path) in keys {
            let merged = then
                .read(store, *storage, path)
                .combine(&other.read(store, *storage, path));
            self.write(*storage, path.clone(), merged);
        }
    }

    /// Applies all pending writes in order. Returns the storages that changed.
    pub(crate) fn commit(&mut self, store: &mut Store) -> Vec<NodeId> {
        let mut changed = Vec::new();
        for ((storage, path), value) in self.pending.drain(..) {
            if store.write(storage, &path, value) && !changed.contains(&storage) {
                changed.push(storage);
            }
        }
        changed
    }
}
