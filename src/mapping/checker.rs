//! Removal of stale mappings.
//!
//! Mapping sets outlive the artifact they were written for. When an updated artifact no longer
//! declares an entry, its mapping can never apply again and only gets in the way of validation.
//! The same holds for a mapping recorded against an inherited reference instead of the
//! declaration. [`drop_broken_mappings`] filters both out, together with everything nested below
//! them.

use std::collections::BTreeMap;

use log::debug;

use crate::{
    mapping::{EntryIndex, EntryMapping, EntryResolver, MappingTree},
    translation::Entry,
};

/// Mappings removed by [`drop_broken_mappings`], keyed by obfuscated entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DroppedMappings {
    entries: BTreeMap<Entry, EntryMapping>,
}

impl DroppedMappings {
    /// Number of dropped mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was dropped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the mapping of `entry` was dropped.
    #[must_use]
    pub fn contains(&self, entry: &Entry) -> bool {
        self.entries.contains_key(entry)
    }

    /// The dropped mappings in entry order.
    pub fn iter(&self) -> impl Iterator<Item = (&Entry, &EntryMapping)> {
        self.entries.iter()
    }
}

/// Returns a copy of `tree` without mappings for entries `index` does not know or `resolver`
/// does not consider canonical.
///
/// Dropping an entry drops its whole subtree, so the members of a vanished class go with it.
///
/// ## Arguments
/// * 'tree' - Obfuscated → deobfuscated mappings to check
/// * 'index' - The entries of the current artifact
/// * 'resolver' - Resolves member references to their declaration
pub fn drop_broken_mappings(
    tree: &MappingTree,
    index: &dyn EntryIndex,
    resolver: &dyn EntryResolver,
) -> (MappingTree, DroppedMappings) {
    let mut kept = MappingTree::new();
    let mut dropped = DroppedMappings::default();

    let mut broken: Vec<Entry> = Vec::new();

    for node in tree {
        let entry = node.entry();
        let orphaned = broken.iter().any(|root| entry.has_ancestor(root));

        if !orphaned {
            if let Some(reason) = breakage(entry, index, resolver) {
                debug!("Dropping {entry:?} and its children ({reason})");
                broken.push(entry.clone());
            } else {
                if let Some(mapping) = node.value() {
                    kept.insert(entry, Some(mapping.clone()));
                }
                continue;
            }
        }

        if let Some(mapping) = node.value() {
            dropped.entries.insert(entry.clone(), mapping.clone());
        }
    }

    (kept, dropped)
}

fn breakage(
    entry: &Entry,
    index: &dyn EntryIndex,
    resolver: &dyn EntryResolver,
) -> Option<&'static str> {
    if !index.has_entry(entry) {
        return Some("entry no longer exists");
    }
    if resolver.resolve_entry(entry) != *entry {
        return Some("mapped through an inherited reference");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::{
        mapping::{ClassHierarchy, VoidEntryResolver},
        test::{class, field, method},
    };

    #[test]
    fn test_drop_broken_mappings() {
        let owner = class("a");
        let live = field(&owner, "b", "I");
        let gone = field(&owner, "c", "I");

        let mut hierarchy = ClassHierarchy::new();
        hierarchy.add_class(&owner, []);
        hierarchy.add_member(&live);

        let tree: MappingTree = [
            (owner.clone(), EntryMapping::new("Foo")),
            (live.clone(), EntryMapping::new("alive")),
            (gone.clone(), EntryMapping::new("dead")),
            (class("z"), EntryMapping::new("Missing")),
        ]
        .into_iter()
        .collect();

        let (kept, dropped) = drop_broken_mappings(&tree, &hierarchy, &VoidEntryResolver);
        assert_eq!(kept.len(), 2);
        assert!(kept.contains(&live));
        assert_eq!(dropped.len(), 2);
        assert!(dropped.contains(&gone));
        assert!(dropped.contains(&class("z")));
    }

    /// Resolves every method to its declaration in the root class `a`.
    struct RootResolver;

    impl EntryResolver for RootResolver {
        fn resolve_entry(&self, entry: &Entry) -> Entry {
            if entry.method_descriptor().is_some() {
                entry.with_parent(Some(class("a")))
            } else {
                entry.clone()
            }
        }

        fn resolve_entry_owners(&self, entry: &Entry) -> BTreeSet<Entry> {
            BTreeSet::from([self.resolve_entry(entry).containing_class()])
        }

        fn resolve_equivalent_entries(&self, entry: &Entry) -> Vec<Entry> {
            vec![self.resolve_entry(entry)]
        }

        fn resolve_equivalent_methods(&self, method: &Entry) -> BTreeSet<Entry> {
            BTreeSet::from([self.resolve_entry(method)])
        }
    }

    #[test]
    fn test_non_canonical_references_are_dropped() {
        let base = class("a");
        let sub = class("b");
        let declared = method(&base, "m", "()V");
        let overriding = method(&sub, "m", "()V");

        let mut hierarchy = ClassHierarchy::new();
        hierarchy.add_class(&base, []);
        hierarchy.add_class(&sub, [base.clone()]);
        hierarchy.add_member(&declared);
        hierarchy.add_member(&overriding);

        let tree: MappingTree = [
            (declared.clone(), EntryMapping::new("run")),
            (overriding.clone(), EntryMapping::new("start")),
        ]
        .into_iter()
        .collect();

        let (kept, dropped) = drop_broken_mappings(&tree, &hierarchy, &RootResolver);
        assert!(kept.contains(&declared));
        assert!(!kept.contains(&overriding));
        assert!(dropped.contains(&overriding));
        assert_eq!(dropped.len(), 1);
    }

    #[test]
    fn test_members_of_missing_classes_are_dropped() {
        let gone = class("z");
        let nested = Entry::inner_class(&gone, "y");
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.add_class(&class("a"), []);
        hierarchy.add_class(&nested, []);
        hierarchy.add_member(&field(&nested, "f", "I"));

        let tree: MappingTree = [
            (gone.clone(), EntryMapping::new("Missing")),
            (nested.clone(), EntryMapping::new("Inner")),
            (field(&nested, "f", "I"), EntryMapping::new("value")),
            (field(&class("q"), "f", "I"), EntryMapping::new("orphan")),
        ]
        .into_iter()
        .collect();

        let (kept, dropped) = drop_broken_mappings(&tree, &hierarchy, &VoidEntryResolver);
        assert!(kept.is_empty());
        assert_eq!(dropped.len(), 4);
        assert!(dropped.contains(&field(&nested, "f", "I")));
        assert!(dropped.contains(&field(&class("q"), "f", "I")));
    }
}
