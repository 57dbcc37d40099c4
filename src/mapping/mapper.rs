//! The bidirectional mapper.
//!
//! [`BidirectionalMapper`] owns two [`MappingTree`]s: obfuscated → deobfuscated names, and the
//! mirror deobfuscated → obfuscated. The obfuscated tree is the source of truth; the mirror is
//! keyed by the *deobfuscated* form of every mapped entry and stores the obfuscated simple name, so
//! that [`BidirectionalMapper::obfuscate`] can walk back from any deobfuscated identifier.
//!
//! # Mirror invariant
//!
//! For every obfuscated entry `e` carrying a mapping, the mirror holds a node at
//! `deobfuscate(e)` whose target name is `e.name()`. Because mirror keys embed the deobfuscated
//! parent chain and the deobfuscated descriptors, renaming a class moves:
//!
//! - the mirror subtree of the class itself (nested classes and members), and
//! - every mapped member elsewhere whose descriptor mentions the class.
//!
//! Both are handled by the update routine, which finishes by checking the invariant for the entry
//! it touched.
//!
//! An unmapped entry answers to its own name, but owns no mirror node. A node found at its
//! location belongs to whichever entry was renamed onto it and is never taken over. The validator
//! prevents such collisions for every entry the mapper knows of, either through the obfuscated
//! tree or through an [`EntryIndex`] registered with [`BidirectionalMapper::with_entry_index`].
//!
//! # Examples
//!
//! ```rust
//! use mapscope::{BidirectionalMapper, Entry, EntryMapping};
//!
//! let mut mapper = BidirectionalMapper::default();
//! let class = Entry::class("a");
//! mapper.map_from_obf(&class, Some(EntryMapping::new("net/example/Foo")))?;
//!
//! assert_eq!(mapper.deobfuscate(&class), Entry::class("net/example/Foo"));
//! assert_eq!(mapper.obfuscate(&Entry::class("net/example/Foo")), class);
//! # Ok::<(), mapscope::Error>(())
//! ```

use std::{fmt, sync::Arc};

use crate::{
    mapping::{
        validator, DeltaTrackingTree, EntryIndex, EntryMapping, EntryResolver, MappingDelta,
        MappingTree, RemappableIndex, VoidEntryResolver,
    },
    translation::{Entry, MappingTranslator, Translatable},
    Error, Result,
};

/// Keeps obfuscated → deobfuscated mappings and their mirror consistent.
pub struct BidirectionalMapper {
    obf_to_deobf: DeltaTrackingTree,
    deobf_to_obf: MappingTree,
    resolver: Arc<dyn EntryResolver>,
    index: Option<Arc<dyn EntryIndex + Send + Sync>>,
    remapped: Vec<Box<dyn RemappableIndex>>,
}

impl BidirectionalMapper {
    /// Creates an empty mapper using `resolver` for canonicalisation and propagation.
    #[must_use]
    pub fn new(resolver: Arc<dyn EntryResolver>) -> Self {
        BidirectionalMapper {
            obf_to_deobf: DeltaTrackingTree::default(),
            deobf_to_obf: MappingTree::new(),
            resolver,
            index: None,
            remapped: Vec::new(),
        }
    }

    /// Creates a mapper holding every mapping of `tree`.
    ///
    /// Mappings are applied parents first and without validation or propagation. The delta of
    /// the returned mapper is empty.
    ///
    /// # Errors
    /// Returns [`Error::InvariantViolation`] if `tree` maps two entries of one scope onto the same
    /// deobfuscated identity.
    pub fn from_tree(tree: &MappingTree, resolver: Arc<dyn EntryResolver>) -> Result<Self> {
        let mut mapper = BidirectionalMapper::new(resolver);
        for node in tree {
            if let Some(mapping) = node.value() {
                mapper.set_obf_to_deobf(node.entry(), Some(mapping.clone()))?;
            }
        }

        mapper.obf_to_deobf.take_delta();
        Ok(mapper)
    }

    /// Registers an index keyed by deobfuscated identity. It is told about every identity change
    /// from now on.
    #[must_use]
    pub fn with_remapped_index(mut self, index: Box<dyn RemappableIndex>) -> Self {
        self.remapped.push(index);
        self
    }

    /// Registers the entries of the analysed artifact. Renames onto the name of an existing but
    /// unmapped entry are rejected from now on.
    #[must_use]
    pub fn with_entry_index(mut self, index: Arc<dyn EntryIndex + Send + Sync>) -> Self {
        self.index = Some(index);
        self
    }

    /// Returns true if `entry` is known to exist, either because the obfuscated tree holds a node
    /// for it or because the registered index declares it.
    #[must_use]
    pub fn is_known_entry(&self, entry: &Entry) -> bool {
        self.obf_to_deobf.find_node(entry).is_some()
            || self.index.as_ref().is_some_and(|index| index.has_entry(entry))
    }

    /// The resolver used for canonicalisation.
    #[must_use]
    pub fn resolver(&self) -> &dyn EntryResolver {
        self.resolver.as_ref()
    }

    /// Translator from obfuscated to deobfuscated names.
    #[must_use]
    pub fn deobfuscator(&self) -> MappingTranslator<'_> {
        MappingTranslator::new(&self.obf_to_deobf, self.resolver.as_ref())
    }

    /// Translator from deobfuscated to obfuscated names.
    #[must_use]
    pub fn obfuscator(&self) -> MappingTranslator<'_> {
        MappingTranslator::new(&self.deobf_to_obf, &VoidEntryResolver)
    }

    /// Projects an obfuscated value into the deobfuscated space.
    #[must_use]
    pub fn deobfuscate<T: Translatable>(&self, value: &T) -> T {
        self.deobfuscator().translate(value)
    }

    /// Projects a deobfuscated value into the obfuscated space.
    #[must_use]
    pub fn obfuscate<T: Translatable>(&self, value: &T) -> T {
        self.obfuscator().translate(value)
    }

    /// Renames (or, with `None`, un-renames) an obfuscated entry and everything equivalent to it.
    ///
    /// The entry is first resolved to its declaration; the rename is then validated for every
    /// member of the equivalence class before any of them is committed, so a rejected rename
    /// leaves both trees untouched.
    ///
    /// ## Arguments
    /// * 'entry' - The obfuscated entry to rename
    /// * 'mapping' - The new mapping, or `None` to clear it
    ///
    /// # Errors
    /// Returns [`Error::NameConflict`] or [`Error::IllegalName`] for rejected renames, and
    /// [`Error::InvariantViolation`] if the mirror could not be kept consistent.
    pub fn map_from_obf(&mut self, entry: &Entry, mapping: Option<EntryMapping>) -> Result<()> {
        let resolved = self.resolver.resolve_entry(entry);
        let mut targets = self.resolver.resolve_equivalent_entries(&resolved);
        if targets.is_empty() {
            targets.push(resolved);
        }

        if let Some(mapping) = &mapping {
            validator::validate_rename(self, &targets, mapping.target_name())?;
        }

        for target in &targets {
            self.set_obf_to_deobf(target, mapping.clone())?;
        }
        Ok(())
    }

    /// Same as [`BidirectionalMapper::map_from_obf`] for an entry given in deobfuscated form.
    ///
    /// # Errors
    /// See [`BidirectionalMapper::map_from_obf`].
    pub fn map_from_deobf(&mut self, entry: &Entry, mapping: Option<EntryMapping>) -> Result<()> {
        let obfuscated = self.obfuscate(entry);
        self.map_from_obf(&obfuscated, mapping)
    }

    /// Clears the mapping of an obfuscated entry and its equivalence class.
    ///
    /// # Errors
    /// Returns [`Error::InvariantViolation`] if the mirror could not be kept consistent.
    pub fn remove_by_obf(&mut self, entry: &Entry) -> Result<()> {
        self.map_from_obf(entry, None)
    }

    /// Clears the mapping of an entry given in deobfuscated form.
    ///
    /// # Errors
    /// Returns [`Error::InvariantViolation`] if the mirror could not be kept consistent.
    pub fn remove_by_deobf(&mut self, entry: &Entry) -> Result<()> {
        self.map_from_deobf(entry, None)
    }

    /// Re-applies the current mapping of `entry` to its whole equivalence class.
    ///
    /// # Errors
    /// See [`BidirectionalMapper::map_from_obf`].
    pub fn propagate_from_obf(&mut self, entry: &Entry) -> Result<()> {
        let resolved = self.resolver.resolve_entry(entry);
        let mapping = self.obf_to_deobf.get(&resolved).cloned();
        self.map_from_obf(&resolved, mapping)
    }

    /// The mapping stored for an obfuscated entry.
    #[must_use]
    pub fn get_deobf_mapping(&self, entry: &Entry) -> Option<&EntryMapping> {
        self.obf_to_deobf.get(entry)
    }

    /// The mirror mapping stored for a deobfuscated entry.
    #[must_use]
    pub fn get_obf_mapping(&self, entry: &Entry) -> Option<&EntryMapping> {
        self.deobf_to_obf.get(entry)
    }

    /// Returns true if the obfuscated entry carries a mapping.
    #[must_use]
    pub fn has_deobf_mapping(&self, entry: &Entry) -> bool {
        self.obf_to_deobf.contains(entry)
    }

    /// Returns true if the deobfuscated entry has a mirror mapping.
    #[must_use]
    pub fn has_obf_mapping(&self, entry: &Entry) -> bool {
        self.deobf_to_obf.contains(entry)
    }

    /// Every obfuscated entry carrying a mapping, parents first.
    #[must_use]
    pub fn obf_entries(&self) -> Vec<Entry> {
        self.obf_to_deobf.mapped_entries()
    }

    /// Every deobfuscated entry with a mirror mapping, parents first.
    #[must_use]
    pub fn deobf_entries(&self) -> Vec<Entry> {
        self.deobf_to_obf.mapped_entries()
    }

    /// Children of an obfuscated entry in the obfuscated tree.
    #[must_use]
    pub fn obf_children(&self, entry: &Entry) -> Vec<Entry> {
        self.obf_to_deobf.children(entry)
    }

    /// Children of a deobfuscated entry in the mirror tree.
    #[must_use]
    pub fn deobf_children(&self, entry: &Entry) -> Vec<Entry> {
        self.deobf_to_obf.children(entry)
    }

    /// The obfuscated → deobfuscated tree.
    #[must_use]
    pub fn obf_to_deobf(&self) -> &MappingTree {
        &self.obf_to_deobf
    }

    /// The deobfuscated → obfuscated mirror.
    #[must_use]
    pub fn deobf_to_obf(&self) -> &MappingTree {
        &self.deobf_to_obf
    }

    /// Drains the changes made to the obfuscated tree since the last call.
    pub fn take_mapping_delta(&mut self) -> MappingDelta {
        self.obf_to_deobf.take_delta()
    }

    /// Consumes the mapper and returns the obfuscated → deobfuscated tree.
    #[must_use]
    pub fn into_obf_to_deobf(self) -> MappingTree {
        self.obf_to_deobf.into_inner()
    }

    /// Checks the mirror invariant in both directions for every stored mapping.
    ///
    /// # Errors
    /// Returns [`Error::InvariantViolation`] naming the first inconsistent entry.
    pub fn verify_mirror(&self) -> Result<()> {
        for entry in self.obf_to_deobf.mapped_entries() {
            self.check_mirror(&entry)?;
        }

        for node in &self.deobf_to_obf {
            let Some(mapping) = node.value() else {
                continue;
            };
            let obfuscated = self.obfuscate(node.entry());
            if obfuscated.name() != mapping.target_name()
                || self.deobfuscate(&obfuscated) != *node.entry()
            {
                return Err(Error::InvariantViolation(format!(
                    "mirror entry {:?} does not round trip (obfuscates to {:?})",
                    node.entry(),
                    obfuscated
                )));
            }
        }
        Ok(())
    }

    /// Commits a single mapping and brings the mirror in line with it.
    fn set_obf_to_deobf(&mut self, entry: &Entry, mapping: Option<EntryMapping>) -> Result<()> {
        let previous = self.deobfuscate(entry);
        let claimed = !self.obf_to_deobf.contains(entry) && self.deobf_to_obf.contains(&previous);
        let dependents: Vec<(Entry, Entry)> = if entry.is_class() {
            self.obf_to_deobf
                .mapped_entries()
                .into_iter()
                .filter(|candidate| candidate.references_class(entry))
                .map(|candidate| {
                    let deobfuscated = self.deobfuscate(&candidate);
                    (candidate, deobfuscated)
                })
                .collect()
        } else {
            Vec::new()
        };

        let mirrored = mapping.as_ref().map(|_| EntryMapping::new(entry.name()));
        self.obf_to_deobf.insert(entry, mapping);
        let current = self.deobfuscate(entry);

        if previous != current {
            for index in &mut self.remapped {
                index.remap_entry(&previous, &current);
            }
        }

        let taken = if claimed {
            None
        } else {
            self.deobf_to_obf.remove_subtree(&previous)
        };
        if let Some(node) = taken {
            for (key, value) in node.into_mappings() {
                if key != previous {
                    let moved = key.replace_ancestor(&previous, &current);
                    self.deobf_to_obf.insert(&moved, Some(value));
                }
            }
        }
        // A cleared entry owns nothing at its identity location, which may belong to another entry.
        if mirrored.is_some() {
            self.deobf_to_obf.insert(&current, mirrored);
        }

        for (dependent, before) in dependents {
            let stale = before.replace_ancestor(&previous, &current);
            let fresh = self.deobfuscate(&dependent);
            if stale == fresh {
                continue;
            }

            for index in &mut self.remapped {
                index.remap_entry(&stale, &fresh);
            }
            if let Some(node) = self.deobf_to_obf.remove_subtree(&stale) {
                for (key, value) in node.into_mappings() {
                    self.deobf_to_obf
                        .insert(&key.replace_ancestor(&stale, &fresh), Some(value));
                }
            }
        }

        self.check_mirror(entry)
    }

    fn check_mirror(&self, entry: &Entry) -> Result<()> {
        if !self.obf_to_deobf.contains(entry) {
            return Ok(());
        }

        let deobfuscated = self.deobfuscate(entry);
        match self.deobf_to_obf.get(&deobfuscated) {
            Some(mirror) if mirror.target_name() == entry.name() => Ok(()),
            Some(mirror) => Err(Error::InvariantViolation(format!(
                "{:?} deobfuscates to {:?} whose mirror points at '{}'",
                entry,
                deobfuscated,
                mirror.target_name()
            ))),
            None => Err(Error::InvariantViolation(format!(
                "{entry:?} deobfuscates to {deobfuscated:?} which has no mirror mapping"
            ))),
        }
    }
}

impl Default for BidirectionalMapper {
    fn default() -> Self {
        BidirectionalMapper::new(Arc::new(VoidEntryResolver))
    }
}

impl fmt::Debug for BidirectionalMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BidirectionalMapper")
            .field("obf_to_deobf", &self.obf_to_deobf)
            .field("deobf_to_obf", &self.deobf_to_obf)
            .field("has_entry_index", &self.index.is_some())
            .field("remapped_indices", &self.remapped.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mapping::{ClassHierarchy, IndexEntryResolver},
        test::{class, field, method},
    };
    use std::sync::Mutex;

    #[test]
    fn test_class_rename_moves_members_in_mirror() {
        let owner = class("a");
        let member = field(&owner, "b", "I");

        let mut mapper = BidirectionalMapper::default();
        mapper.map_from_obf(&member, Some(EntryMapping::new("count"))).unwrap();
        mapper.map_from_obf(&owner, Some(EntryMapping::new("Foo"))).unwrap();

        let deobf_member = field(&class("Foo"), "count", "I");
        assert_eq!(mapper.deobfuscate(&member), deobf_member);
        assert_eq!(mapper.get_obf_mapping(&deobf_member).unwrap().target_name(), "b");
        assert_eq!(mapper.obfuscate(&deobf_member), member);
        assert!(mapper.deobf_to_obf().find_node(&owner).is_none());
        mapper.verify_mirror().unwrap();
    }

    #[test]
    fn test_class_rename_rekeys_referencing_members() {
        let owner = class("a");
        let other = class("b");
        let member = method(&other, "c", "(La;)La;");

        let mut mapper = BidirectionalMapper::default();
        mapper.map_from_obf(&member, Some(EntryMapping::new("convert"))).unwrap();
        mapper.map_from_obf(&owner, Some(EntryMapping::new("Foo"))).unwrap();

        let deobf_member = method(&other, "convert", "(LFoo;)LFoo;");
        assert_eq!(mapper.deobfuscate(&member), deobf_member);
        assert!(mapper.has_obf_mapping(&deobf_member));
        assert!(!mapper.has_obf_mapping(&method(&other, "convert", "(La;)La;")));
        mapper.verify_mirror().unwrap();
    }

    #[test]
    fn test_self_referencing_member_survives_owner_rename() {
        let owner = class("a");
        let member = method(&owner, "m", "(La;)V");

        let mut mapper = BidirectionalMapper::default();
        mapper.map_from_obf(&member, Some(EntryMapping::new("merge"))).unwrap();
        mapper.map_from_obf(&owner, Some(EntryMapping::new("Foo"))).unwrap();

        assert_eq!(mapper.deobfuscate(&member), method(&class("Foo"), "merge", "(LFoo;)V"));
        mapper.verify_mirror().unwrap();

        mapper.remove_by_obf(&owner).unwrap();
        assert_eq!(mapper.deobfuscate(&member), method(&owner, "merge", "(La;)V"));
        mapper.verify_mirror().unwrap();
    }

    #[test]
    fn test_removal_keeps_children() {
        let owner = class("a");
        let member = field(&owner, "b", "I");

        let mut mapper = BidirectionalMapper::default();
        mapper.map_from_obf(&owner, Some(EntryMapping::new("Foo"))).unwrap();
        mapper.map_from_obf(&member, Some(EntryMapping::new("count"))).unwrap();
        mapper.remove_by_obf(&owner).unwrap();

        assert!(!mapper.has_deobf_mapping(&owner));
        assert_eq!(mapper.deobf_entries(), vec![field(&owner, "count", "I")]);
        mapper.verify_mirror().unwrap();
    }

    #[test]
    fn test_rename_to_same_name_twice() {
        let owner = class("a");
        let mut mapper = BidirectionalMapper::default();
        mapper.map_from_obf(&owner, Some(EntryMapping::new("Foo"))).unwrap();
        mapper.map_from_obf(&owner, Some(EntryMapping::new("Foo"))).unwrap();

        assert_eq!(mapper.deobf_entries(), vec![class("Foo")]);
        mapper.verify_mirror().unwrap();
    }

    #[test]
    fn test_nested_class_rename() {
        let outer = class("a");
        let inner = Entry::inner_class(&outer, "b");

        let mut mapper = BidirectionalMapper::default();
        mapper.map_from_obf(&inner, Some(EntryMapping::new("Inner"))).unwrap();
        mapper.map_from_obf(&outer, Some(EntryMapping::new("Outer"))).unwrap();

        assert_eq!(mapper.deobfuscate(&inner).full_name(), "Outer$Inner");
        assert_eq!(mapper.obfuscate(&class("Outer$Inner")), inner);
        mapper.verify_mirror().unwrap();
    }

    #[test]
    fn test_map_from_deobf() {
        let owner = class("a");
        let mut mapper = BidirectionalMapper::default();
        mapper.map_from_obf(&owner, Some(EntryMapping::new("Foo"))).unwrap();
        mapper.map_from_deobf(&class("Foo"), Some(EntryMapping::new("Bar"))).unwrap();

        assert_eq!(mapper.get_deobf_mapping(&owner).unwrap().target_name(), "Bar");
        mapper.remove_by_deobf(&class("Bar")).unwrap();
        assert!(mapper.obf_entries().is_empty());
        assert!(mapper.deobf_entries().is_empty());
    }

    #[test]
    fn test_delta_is_drained() {
        let mut mapper = BidirectionalMapper::default();
        mapper.map_from_obf(&class("a"), Some(EntryMapping::new("Foo"))).unwrap();

        let delta = mapper.take_mapping_delta();
        assert_eq!(delta.entries(), vec![&class("a")]);
        assert!(mapper.take_mapping_delta().is_empty());
    }

    #[test]
    fn test_from_tree() {
        let owner = class("a");
        let member = field(&owner, "b", "La;");
        let tree: MappingTree = [
            (owner.clone(), EntryMapping::new("Foo")),
            (member.clone(), EntryMapping::new("self")),
        ]
        .into_iter()
        .collect();

        let mut mapper = BidirectionalMapper::from_tree(&tree, Arc::new(VoidEntryResolver)).unwrap();
        assert_eq!(mapper.deobfuscate(&member), field(&class("Foo"), "self", "LFoo;"));
        assert!(mapper.take_mapping_delta().is_empty());
        mapper.verify_mirror().unwrap();
    }

    #[test]
    fn test_unmapped_entry_leaves_claimed_mirror_node_alone() {
        let owner = class("a");
        let renamed = field(&owner, "b", "I");
        let original = field(&owner, "a", "I");

        let mut mapper = BidirectionalMapper::default();
        mapper.map_from_obf(&renamed, Some(EntryMapping::new("a"))).unwrap();
        mapper.map_from_obf(&original, Some(EntryMapping::new("x"))).unwrap();
        mapper.verify_mirror().unwrap();

        assert_eq!(mapper.obfuscate(&mapper.deobfuscate(&renamed)), renamed);
        assert_eq!(mapper.obfuscate(&mapper.deobfuscate(&original)), original);
        assert_eq!(mapper.get_obf_mapping(&original).unwrap().target_name(), "b");

        mapper.remove_by_obf(&original).unwrap();
        mapper.verify_mirror().unwrap();
        assert_eq!(mapper.get_obf_mapping(&original).unwrap().target_name(), "b");
    }

    #[test]
    fn test_entry_index_protects_unmapped_names() {
        let owner = class("a");
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.add_class(&owner, []);
        hierarchy.add_member(&field(&owner, "a", "I"));
        hierarchy.add_member(&field(&owner, "b", "I"));

        let mut mapper = BidirectionalMapper::default().with_entry_index(Arc::new(hierarchy));
        let result = mapper.map_from_obf(&field(&owner, "b", "I"), Some(EntryMapping::new("a")));
        assert!(matches!(result, Err(Error::NameConflict { .. })));
        assert!(mapper.obf_entries().is_empty());
        assert!(mapper.deobf_entries().is_empty());

        mapper
            .map_from_obf(&field(&owner, "a", "I"), Some(EntryMapping::new("x")))
            .unwrap();
        mapper
            .map_from_obf(&field(&owner, "b", "I"), Some(EntryMapping::new("a")))
            .unwrap();
        mapper.verify_mirror().unwrap();
    }

    #[test]
    fn test_propagation_and_remapped_index() {
        let base = class("a");
        let sub = class("b");
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.add_class(&base, []);
        hierarchy.add_class(&sub, [base.clone()]);
        hierarchy.add_member(&method(&base, "a", "()V"));
        hierarchy.add_member(&method(&sub, "a", "()V"));

        let deobf_index = Arc::new(Mutex::new(hierarchy.clone()));
        let resolver = Arc::new(IndexEntryResolver::new(Arc::new(hierarchy)));
        let mut mapper = BidirectionalMapper::new(resolver)
            .with_remapped_index(Box::new(Arc::clone(&deobf_index)));

        mapper
            .map_from_obf(&method(&sub, "a", "()V"), Some(EntryMapping::new("run")))
            .unwrap();
        assert!(mapper.has_deobf_mapping(&method(&base, "a", "()V")));
        assert!(mapper.has_deobf_mapping(&method(&sub, "a", "()V")));

        mapper.map_from_obf(&base, Some(EntryMapping::new("Base"))).unwrap();
        let index = deobf_index.lock().unwrap();
        assert!(index.declares(&class("Base"), &method(&class("Base"), "run", "()V")));
        assert_eq!(index.super_types(&sub), &[class("Base")]);
    }
}
