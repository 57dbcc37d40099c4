//! Inheritance-aware entry resolution.
//!
//! [`ClassHierarchy`] is the minimal view of an analysed artifact the mapping engine needs: every
//! class with its direct super types, the members each class declares, and the bridge methods the
//! compiler generated together with the method each one forwards to. [`IndexEntryResolver`]
//! answers the [`EntryResolver`] questions over such a hierarchy.
//!
//! Lookups walk the hierarchy breadth-first, so when a member is declared by several super types
//! the closest declaration wins and ties are broken by the order super types were registered.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    mapping::{EntryIndex, EntryResolver, RemappableIndex},
    translation::Entry,
};

/// Classes, their super types, their declared members and bridge methods.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassHierarchy {
    supers: BTreeMap<Entry, Vec<Entry>>,
    members: BTreeMap<Entry, BTreeSet<Entry>>,
    bridges: BTreeMap<Entry, Entry>,
}

impl ClassHierarchy {
    /// Creates an empty hierarchy.
    #[must_use]
    pub fn new() -> Self {
        ClassHierarchy::default()
    }

    /// Registers `class` with its direct super types (super class first, then interfaces).
    ///
    /// Registering a class twice appends super types that were not known yet.
    pub fn add_class(&mut self, class: &Entry, supers: impl IntoIterator<Item = Entry>) {
        let known = self.supers.entry(class.clone()).or_default();
        for super_type in supers {
            if !known.contains(&super_type) {
                known.push(super_type);
            }
        }
    }

    /// Registers a member as declared by its owner. The owner is registered if unknown.
    pub fn add_member(&mut self, member: &Entry) {
        let owner = member.containing_class();
        self.supers.entry(owner.clone()).or_default();
        self.members.entry(owner).or_default().insert(member.clone());
    }

    /// Registers `bridge` as a compiler generated forwarder to `target`. Both are registered as
    /// members.
    pub fn add_bridge(&mut self, bridge: &Entry, target: &Entry) {
        self.add_member(bridge);
        self.add_member(target);
        self.bridges.insert(bridge.clone(), target.clone());
    }

    /// Every registered class.
    pub fn classes(&self) -> impl Iterator<Item = &Entry> {
        self.supers.keys()
    }

    /// Direct super types of `class`.
    #[must_use]
    pub fn super_types(&self, class: &Entry) -> &[Entry] {
        self.supers.get(class).map_or(&[][..], Vec::as_slice)
    }

    /// Direct subtypes of `class`.
    #[must_use]
    pub fn sub_types(&self, class: &Entry) -> Vec<Entry> {
        self.supers
            .iter()
            .filter(|(_, supers)| supers.contains(class))
            .map(|(sub, _)| sub.clone())
            .collect()
    }

    /// All transitive super types of `class`, closest first.
    #[must_use]
    pub fn ancestors(&self, class: &Entry) -> Vec<Entry> {
        self.walk(class, |current| self.super_types(current).to_vec())
    }

    /// All transitive subtypes of `class`, closest first.
    #[must_use]
    pub fn descendants(&self, class: &Entry) -> Vec<Entry> {
        self.walk(class, |current| self.sub_types(current))
    }

    /// Members declared directly by `class`.
    pub fn declared_members(&self, class: &Entry) -> impl Iterator<Item = &Entry> {
        self.members.get(class).into_iter().flatten()
    }

    /// Returns true if `class` declares a member with the name and descriptor of `member`.
    #[must_use]
    pub fn declares(&self, class: &Entry, member: &Entry) -> bool {
        let candidate = member.with_parent(Some(class.clone()));
        self.members
            .get(class)
            .is_some_and(|declared| declared.contains(&candidate))
    }

    /// The method `bridge` forwards to, if it is a bridge.
    #[must_use]
    pub fn bridge_target(&self, bridge: &Entry) -> Option<&Entry> {
        self.bridges.get(bridge)
    }

    /// Bridges that forward to `target`.
    #[must_use]
    pub fn bridges_to(&self, target: &Entry) -> Vec<Entry> {
        self.bridges
            .iter()
            .filter(|(_, forwarded)| *forwarded == target)
            .map(|(bridge, _)| bridge.clone())
            .collect()
    }

    fn walk(&self, start: &Entry, next: impl Fn(&Entry) -> Vec<Entry>) -> Vec<Entry> {
        let mut visited = HashSet::from([start.clone()]);
        let mut queue = VecDeque::from([start.clone()]);
        let mut order = Vec::new();

        while let Some(current) = queue.pop_front() {
            for neighbour in next(&current) {
                if visited.insert(neighbour.clone()) {
                    order.push(neighbour.clone());
                    queue.push_back(neighbour);
                }
            }
        }
        order
    }
}

impl EntryIndex for ClassHierarchy {
    fn has_entry(&self, entry: &Entry) -> bool {
        if entry.is_class() {
            return self.supers.contains_key(entry);
        }

        self.members
            .get(&entry.containing_class())
            .is_some_and(|declared| declared.contains(entry))
    }
}

impl RemappableIndex for ClassHierarchy {
    fn remap_entry(&mut self, old: &Entry, new: &Entry) {
        let rekey = |entry: &Entry| {
            if entry == old || entry.has_ancestor(old) {
                entry.replace_ancestor(old, new)
            } else {
                entry.clone()
            }
        };

        self.supers = std::mem::take(&mut self.supers)
            .into_iter()
            .map(|(class, supers)| (rekey(&class), supers.iter().map(&rekey).collect()))
            .collect();
        self.members = std::mem::take(&mut self.members)
            .into_iter()
            .map(|(class, members)| (rekey(&class), members.iter().map(&rekey).collect()))
            .collect();
        self.bridges = std::mem::take(&mut self.bridges)
            .into_iter()
            .map(|(bridge, target)| (rekey(&bridge), rekey(&target)))
            .collect();
    }
}

impl<T: RemappableIndex> RemappableIndex for Arc<Mutex<T>> {
    fn remap_entry(&mut self, old: &Entry, new: &Entry) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remap_entry(old, new);
    }
}

/// [`EntryResolver`] backed by a [`ClassHierarchy`].
#[derive(Clone, Debug)]
pub struct IndexEntryResolver {
    hierarchy: Arc<ClassHierarchy>,
}

impl IndexEntryResolver {
    /// Creates a resolver over `hierarchy`.
    #[must_use]
    pub fn new(hierarchy: Arc<ClassHierarchy>) -> Self {
        IndexEntryResolver { hierarchy }
    }

    /// The hierarchy this resolver reads.
    #[must_use]
    pub fn hierarchy(&self) -> &ClassHierarchy {
        &self.hierarchy
    }

    /// Breadth-first search for the classes declaring `member`, starting at its owner. A
    /// declaring class hides the declarations of its own super types.
    fn declaring_classes(&self, member: &Entry) -> Vec<Entry> {
        let owner = member.containing_class();
        let mut visited = HashSet::from([owner.clone()]);
        let mut queue = VecDeque::from([owner]);
        let mut found = Vec::new();

        while let Some(current) = queue.pop_front() {
            if self.hierarchy.declares(&current, member) {
                found.push(current);
                continue;
            }
            for super_type in self.hierarchy.super_types(&current) {
                if visited.insert(super_type.clone()) {
                    queue.push_back(super_type.clone());
                }
            }
        }
        found
    }

    /// Classes related to `class` by inheritance in either direction, including itself.
    fn related_classes(&self, class: &Entry) -> Vec<Entry> {
        let mut related = vec![class.clone()];
        related.extend(self.hierarchy.ancestors(class));
        related.extend(self.hierarchy.descendants(class));
        related
    }
}

impl EntryResolver for IndexEntryResolver {
    fn resolve_entry(&self, entry: &Entry) -> Entry {
        if entry.is_class() {
            return entry.clone();
        }

        match self.declaring_classes(entry).into_iter().next() {
            Some(owner) => entry.with_parent(Some(owner)),
            None => entry.clone(),
        }
    }

    fn resolve_entry_owners(&self, entry: &Entry) -> BTreeSet<Entry> {
        if entry.is_class() {
            return BTreeSet::from([entry.clone()]);
        }

        let owners: BTreeSet<Entry> = self.declaring_classes(entry).into_iter().collect();
        if owners.is_empty() {
            BTreeSet::from([entry.containing_class()])
        } else {
            owners
        }
    }

    fn resolve_equivalent_entries(&self, entry: &Entry) -> Vec<Entry> {
        if entry.method_descriptor().is_some() {
            return self.resolve_equivalent_methods(entry).into_iter().collect();
        }

        vec![self.resolve_entry(entry)]
    }

    fn resolve_equivalent_methods(&self, method: &Entry) -> BTreeSet<Entry> {
        let mut equivalent = BTreeSet::new();
        let mut pending: Vec<Entry> = self
            .resolve_entry_owners(method)
            .into_iter()
            .map(|owner| method.with_parent(Some(owner)))
            .collect();

        while let Some(current) = pending.pop() {
            if !equivalent.insert(current.clone()) {
                continue;
            }

            for class in self.related_classes(&current.containing_class()) {
                if self.hierarchy.declares(&class, &current) {
                    let related = current.with_parent(Some(class));
                    if !equivalent.contains(&related) {
                        pending.push(related);
                    }
                }
            }

            if let Some(target) = self.hierarchy.bridge_target(&current) {
                pending.push(target.clone());
            }
            pending.extend(self.hierarchy.bridges_to(&current));
        }

        equivalent
    }
}
