use super::{Direction, Graph, ModuleId, NodeId, PrimKind, StorageInfo, StorageKind};
use std::collections::BTreeSet;
use std::fmt;

/// Set of modules permitted to read or write a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessSet {
    /// No restriction.
    Any,
    Only(BTreeSet<ModuleId>),
}

impl AccessSet {
    pub fn none() -> Self {
        AccessSet::Only(BTreeSet::new())
    }

    pub fn only(modules: impl IntoIterator<Item = ModuleId>) -> Self {
        AccessSet::Only(modules.into_iter().collect())
    }

    pub fn contains(&self, module: ModuleId) -> bool {
        match self {
            AccessSet::Any => true,
            AccessSet::Only(set) => set.contains(&module),
        }
    }

    pub fn intersect(&self, other: &AccessSet) -> AccessSet {
        match (self, other) {
            (AccessSet::Any, x) | (x, AccessSet::Any) => x.clone(),
            (AccessSet::Only(a), AccessSet::Only(b)) => {
                AccessSet::Only(a.intersection(b).copied().collect())
            }
        }
    }
}

impl fmt::Display for AccessSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessSet::Any => write!(f, "*"),
            AccessSet::Only(set) => {
                let names: Vec<String> = set.iter().map(|m| m.to_string()).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
        }
    }
}

impl Graph {
    /// Readers and writers of a storage element. Ports are additionally
    /// visible to the parent module; inputs are driven by the parent.
    pub(super) fn storage_access(&self, info: &StorageInfo) -> (AccessSet, AccessSet) {
        let Some(owner) = info.module else {
            return (AccessSet::Any, AccessSet::Any);
        };
        let parent = self.module(owner).parent;
        match info.kind {
            StorageKind::Reg | StorageKind::Wire => {
                (AccessSet::only([owner]), AccessSet::only([owner]))
            }
            StorageKind::Port(direction) => {
                let readers = AccessSet::only(std::iter::once(owner).chain(parent));
                let writers = match (direction, parent) {
                    (Direction::Input, Some(parent)) => AccessSet::only([parent]),
                    (Direction::Input, None) => AccessSet::Any,
                    (Direction::Output, _) => AccessSet::only([owner]),
                };
                (readers, writers)
            }
        }
    }

    fn readers_of(&self, ids: &[NodeId]) -> AccessSet {
        ids.iter().fold(AccessSet::Any, |acc, &id| {
            acc.intersect(&self.node(id).readers)
        })
    }

    fn writers_of(&self, ids: &[NodeId]) -> AccessSet {
        ids.iter().fold(AccessSet::Any, |acc, &id| {
            acc.intersect(&self.node(id).writers)
        })
    }

    /// Structural readers/writers of a non-storage node.
    pub(super) fn derived_access(&self, kind: &PrimKind) -> (AccessSet, AccessSet) {
        match kind {
            PrimKind::Storage(id) => self.storage_access(&self.storages[id.0]),
            PrimKind::Register { storage, .. } => {
                let node = self.node(*storage);
                (node.readers.clone(), node.writers.clone())
            }
            PrimKind::Const(_) => (AccessSet::Any, AccessSet::none()),
            PrimKind::Slice { base, .. } => {
                let node = self.node(*base);
                (node.readers.clone(), node.writers.clone())
            }
            PrimKind::BitIndex { base, index } | PrimKind::Index { base, index } => {
                let readers = self.readers_of(&[*base, *index]);
                let writers = self.node(*base).writers.intersect(&self.node(*index).readers);
                (readers, writers)
            }
            PrimKind::Mux { select, ports } => {
                let mut all = ports.clone();
                all.push(*select);
                let readers = self.readers_of(&all);
                let writers = self.writers_of(ports).intersect(&self.node(*select).readers);
                (readers, writers)
            }
            PrimKind::Table(entries) | PrimKind::Concat(entries) => {
                (self.readers_of(entries), self.writers_of(entries))
            }
            other => (self.readers_of(&other.children()), AccessSet::none()),
        }
    }
}
