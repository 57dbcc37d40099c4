//! Hierarchical mapping store.
//!
//! A [`MappingTree`] maps [`Entry`] keys to [`EntryMapping`] values. Keys are not stored flat:
//! each entry lives at the position given by its parent chain, so a field of class `a` is a child
//! of the node for `a`. Intermediate nodes exist whenever a descendant carries a mapping, even if
//! they carry none themselves, and are pruned again once they are empty.
//!
//! Because a node's key contains its whole parent chain, renaming an ancestor in a tree keyed by
//! *translated* names means re-keying the subtree. [`MappingTree::remove_subtree`] detaches a
//! subtree in one step for exactly that purpose.
//!
//! Children are kept in a [`BTreeMap`], which makes every traversal deterministic. Traversals are
//! pre-order: a parent is always visited before its children.

use std::collections::BTreeMap;

use crate::{mapping::EntryMapping, translation::Entry};

/// One node of a [`MappingTree`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingNode {
    entry: Entry,
    value: Option<EntryMapping>,
    children: BTreeMap<Entry, MappingNode>,
}

impl MappingNode {
    fn new(entry: Entry) -> Self {
        MappingNode {
            entry,
            value: None,
            children: BTreeMap::new(),
        }
    }

    /// The key of this node.
    #[must_use]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// The mapping stored at this node, if any.
    #[must_use]
    pub fn value(&self) -> Option<&EntryMapping> {
        self.value.as_ref()
    }

    /// Direct children of this node.
    pub fn children(&self) -> impl Iterator<Item = &MappingNode> {
        self.children.values()
    }

    /// Looks up a direct child.
    #[must_use]
    pub fn child(&self, entry: &Entry) -> Option<&MappingNode> {
        self.children.get(entry)
    }

    /// Returns true if the node carries no mapping and has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    /// This node and all its descendants, pre-order.
    pub fn nodes_recursively(&self) -> NodeIter<'_> {
        NodeIter { stack: vec![self] }
    }

    /// Entries of this node and all its descendants, pre-order.
    #[must_use]
    pub fn entries_recursively(&self) -> Vec<Entry> {
        self.nodes_recursively()
            .map(|node| node.entry.clone())
            .collect()
    }

    /// Consumes the node and returns every `(entry, mapping)` pair that carries a mapping,
    /// pre-order.
    #[must_use]
    pub fn into_mappings(self) -> Vec<(Entry, EntryMapping)> {
        let mut pairs = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Some(value) = node.value {
                pairs.push((node.entry, value));
            }
            stack.extend(node.children.into_values().rev());
        }
        pairs
    }
}

/// Pre-order iterator over mapping nodes.
pub struct NodeIter<'a> {
    stack: Vec<&'a MappingNode>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a MappingNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.values().rev());
        Some(node)
    }
}

/// Ordered, hierarchical map from entries to mappings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappingTree {
    roots: BTreeMap<Entry, MappingNode>,
}

impl MappingTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        MappingTree::default()
    }

    /// Stores `mapping` at `entry`, creating intermediate nodes as needed.
    ///
    /// Inserting `None` is the same as [`MappingTree::remove`]. Returns the previous mapping.
    pub fn insert(&mut self, entry: &Entry, mapping: Option<EntryMapping>) -> Option<EntryMapping> {
        let Some(mapping) = mapping else {
            return self.remove(entry);
        };

        let path = entry.ancestry();
        let mut level = &mut self.roots;
        let (last, ancestors) = path.split_last()?;
        for ancestor in ancestors {
            level = &mut level
                .entry(ancestor.clone())
                .or_insert_with(|| MappingNode::new(ancestor.clone()))
                .children;
        }

        level
            .entry(last.clone())
            .or_insert_with(|| MappingNode::new(last.clone()))
            .value
            .replace(mapping)
    }

    /// Clears the mapping stored at `entry` and prunes nodes left empty. Returns the previous
    /// mapping.
    pub fn remove(&mut self, entry: &Entry) -> Option<EntryMapping> {
        let path = entry.ancestry();
        remove_value(&mut self.roots, &path)
    }

    /// Detaches the whole subtree rooted at `entry` and prunes ancestors left empty.
    pub fn remove_subtree(&mut self, entry: &Entry) -> Option<MappingNode> {
        let path = entry.ancestry();
        detach(&mut self.roots, &path)
    }

    /// The mapping stored at `entry`.
    #[must_use]
    pub fn get(&self, entry: &Entry) -> Option<&EntryMapping> {
        self.find_node(entry).and_then(MappingNode::value)
    }

    /// Returns true if a mapping is stored at `entry`.
    #[must_use]
    pub fn contains(&self, entry: &Entry) -> bool {
        self.get(entry).is_some()
    }

    /// The node at `entry`, whether or not it carries a mapping.
    #[must_use]
    pub fn find_node(&self, entry: &Entry) -> Option<&MappingNode> {
        let path = entry.ancestry();
        let (first, rest) = path.split_first()?;

        let mut node = self.roots.get(first)?;
        for step in rest {
            node = node.children.get(step)?;
        }
        Some(node)
    }

    /// Entries of the direct children of `entry`.
    #[must_use]
    pub fn children(&self, entry: &Entry) -> Vec<Entry> {
        self.find_node(entry)
            .map(|node| node.children.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Entries of the top-level nodes.
    #[must_use]
    pub fn root_entries(&self) -> Vec<Entry> {
        self.roots.keys().cloned().collect()
    }

    /// Entries that share the scope of `entry`: the other children of its parent, or the other
    /// roots for top-level classes.
    #[must_use]
    pub fn siblings(&self, entry: &Entry) -> Vec<Entry> {
        let candidates = match entry.parent() {
            Some(parent) => self.children(parent),
            None => self.root_entries(),
        };
        candidates
            .into_iter()
            .filter(|candidate| candidate != entry)
            .collect()
    }

    /// Every node's entry, pre-order, including nodes that only exist as ancestors.
    #[must_use]
    pub fn all_entries(&self) -> Vec<Entry> {
        self.iter().map(|node| node.entry.clone()).collect()
    }

    /// Every entry that carries a mapping, pre-order.
    #[must_use]
    pub fn mapped_entries(&self) -> Vec<Entry> {
        self.iter()
            .filter(|node| node.value.is_some())
            .map(|node| node.entry.clone())
            .collect()
    }

    /// Pre-order iterator over all nodes.
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter {
            stack: self.roots.values().rev().collect(),
        }
    }

    /// Number of stored mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().filter(|node| node.value.is_some()).count()
    }

    /// Returns true if no mapping is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl<'a> IntoIterator for &'a MappingTree {
    type Item = &'a MappingNode;
    type IntoIter = NodeIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<(Entry, EntryMapping)> for MappingTree {
    fn from_iter<I: IntoIterator<Item = (Entry, EntryMapping)>>(iter: I) -> Self {
        let mut tree = MappingTree::new();
        for (entry, mapping) in iter {
            tree.insert(&entry, Some(mapping));
        }
        tree
    }
}

fn remove_value(level: &mut BTreeMap<Entry, MappingNode>, path: &[Entry]) -> Option<EntryMapping> {
    let (first, rest) = path.split_first()?;
    let node = level.get_mut(first)?;

    let removed = if rest.is_empty() {
        node.value.take()
    } else {
        remove_value(&mut node.children, rest)
    };

    if node.is_empty() {
        level.remove(first);
    }
    removed
}

fn detach(level: &mut BTreeMap<Entry, MappingNode>, path: &[Entry]) -> Option<MappingNode> {
    let (first, rest) = path.split_first()?;
    if rest.is_empty() {
        return level.remove(first);
    }

    let node = level.get_mut(first)?;
    let detached = detach(&mut node.children, rest);
    if node.is_empty() {
        level.remove(first);
    }
    detached
}
