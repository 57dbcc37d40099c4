//! Change capture for mapping trees.
//!
//! [`DeltaTrackingTree`] wraps a [`MappingTree`] and appends one [`MappingChange`] per mutation.
//! The log is drained atomically by [`DeltaTrackingTree::take_delta`]; the next drain only sees
//! changes made after it.

use std::ops::Deref;

use crate::{
    mapping::{EntryMapping, MappingNode, MappingTree},
    translation::{Entry, Translatable, Translator},
};

/// A single recorded mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MappingChange {
    /// A mapping was stored (or replaced) at `entry`.
    Inserted {
        /// The key that changed
        entry: Entry,
        /// The new value
        mapping: EntryMapping,
    },
    /// The mapping at `entry` was cleared.
    Removed {
        /// The key that changed
        entry: Entry,
    },
}

impl MappingChange {
    /// The key this change applies to.
    #[must_use]
    pub fn entry(&self) -> &Entry {
        match self {
            MappingChange::Inserted { entry, .. } | MappingChange::Removed { entry } => entry,
        }
    }
}

impl Translatable for MappingChange {
    fn translate(&self, translator: &dyn Translator) -> Self {
        match self {
            MappingChange::Inserted { entry, mapping } => MappingChange::Inserted {
                entry: translator.translate_entry(entry),
                mapping: mapping.clone(),
            },
            MappingChange::Removed { entry } => MappingChange::Removed {
                entry: translator.translate_entry(entry),
            },
        }
    }
}

/// An ordered list of changes, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappingDelta {
    changes: Vec<MappingChange>,
}

impl MappingDelta {
    /// Number of recorded changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Iterates over the changes in the order they happened.
    pub fn iter(&self) -> std::slice::Iter<'_, MappingChange> {
        self.changes.iter()
    }

    /// Keys touched by this delta, in order, possibly repeated.
    #[must_use]
    pub fn entries(&self) -> Vec<&Entry> {
        self.changes.iter().map(MappingChange::entry).collect()
    }
}

impl Translatable for MappingDelta {
    fn translate(&self, translator: &dyn Translator) -> Self {
        MappingDelta {
            changes: self.changes.translate(translator),
        }
    }
}

impl<'a> IntoIterator for &'a MappingDelta {
    type Item = &'a MappingChange;
    type IntoIter = std::slice::Iter<'a, MappingChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// A mapping tree that logs every mutation.
///
/// Read access goes through [`Deref`] to the inner tree; every mutating method is re-exposed here
/// so no change can bypass the log.
#[derive(Clone, Debug, Default)]
pub struct DeltaTrackingTree {
    tree: MappingTree,
    delta: MappingDelta,
}

impl DeltaTrackingTree {
    /// Wraps `tree`. Its existing contents are not part of the delta.
    #[must_use]
    pub fn new(tree: MappingTree) -> Self {
        DeltaTrackingTree {
            tree,
            delta: MappingDelta::default(),
        }
    }

    /// Stores or clears a mapping and records the change.
    pub fn insert(&mut self, entry: &Entry, mapping: Option<EntryMapping>) -> Option<EntryMapping> {
        let change = match &mapping {
            Some(mapping) => MappingChange::Inserted {
                entry: entry.clone(),
                mapping: mapping.clone(),
            },
            None => MappingChange::Removed {
                entry: entry.clone(),
            },
        };

        let previous = self.tree.insert(entry, mapping);
        if previous.is_some() || matches!(change, MappingChange::Inserted { .. }) {
            self.delta.changes.push(change);
        }
        previous
    }

    /// Clears a mapping and records the change if one was present.
    pub fn remove(&mut self, entry: &Entry) -> Option<EntryMapping> {
        self.insert(entry, None)
    }

    /// Detaches a subtree, recording one removal per mapping it carried.
    pub fn remove_subtree(&mut self, entry: &Entry) -> Option<MappingNode> {
        let detached = self.tree.remove_subtree(entry)?;
        for node in detached.nodes_recursively() {
            if node.value().is_some() {
                self.delta.changes.push(MappingChange::Removed {
                    entry: node.entry().clone(),
                });
            }
        }
        Some(detached)
    }

    /// Drains the change log.
    pub fn take_delta(&mut self) -> MappingDelta {
        std::mem::take(&mut self.delta)
    }

    /// Number of changes waiting to be drained.
    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.delta.len()
    }

    /// Consumes the wrapper and returns the plain tree.
    #[must_use]
    pub fn into_inner(self) -> MappingTree {
        self.tree
    }
}

impl Deref for DeltaTrackingTree {
    type Target = MappingTree;

    fn deref(&self) -> &Self::Target {
        &self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mapping::VoidEntryResolver,
        test::{class, field},
        translation::MappingTranslator,
    };

    #[test]
    fn test_delta_records_in_order() {
        let owner = class("a");
        let member = field(&owner, "b", "I");

        let mut tree = DeltaTrackingTree::default();
        tree.insert(&owner, Some(EntryMapping::new("Foo")));
        tree.insert(&member, Some(EntryMapping::new("bar")));
        tree.remove(&owner);

        let delta = tree.take_delta();
        assert_eq!(delta.len(), 3);
        assert_eq!(delta.entries(), vec![&owner, &member, &owner]);
        assert!(matches!(delta.iter().last(), Some(MappingChange::Removed { .. })));
    }

    #[test]
    fn test_take_delta_drains() {
        let mut tree = DeltaTrackingTree::default();
        tree.insert(&class("a"), Some(EntryMapping::new("Foo")));

        assert_eq!(tree.take_delta().len(), 1);
        assert!(tree.take_delta().is_empty());
        assert_eq!(tree.pending_changes(), 0);
    }

    #[test]
    fn test_removing_absent_mapping_is_not_recorded() {
        let mut tree = DeltaTrackingTree::default();
        assert!(tree.remove(&class("a")).is_none());
        assert!(tree.take_delta().is_empty());
    }

    #[test]
    fn test_delta_translates() {
        let owner = class("a");
        let mut tree = DeltaTrackingTree::default();
        tree.insert(&owner, Some(EntryMapping::new("Foo")));
        let delta = tree.take_delta();

        let translated = MappingTranslator::new(&tree, &VoidEntryResolver).translate(&delta);
        assert_eq!(translated.entries(), vec![&class("Foo")]);
    }
}
