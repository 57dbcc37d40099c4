//! Capabilities the mapping engine needs from program analysis.
//!
//! The mapper never inspects class files. Everything it needs to know about inheritance and
//! member declarations comes through the traits in this module:
//!
//! - [`EntryResolver`] - which declaration a reference denotes and which entries must be renamed
//!   together
//! - [`EntryIndex`] - whether an entry exists at all
//! - [`RemappableIndex`] - structures keyed by deobfuscated identity that follow renames

use std::collections::BTreeSet;

use crate::translation::Entry;

/// Resolves references to declarations and computes rename equivalence classes.
pub trait EntryResolver: Send + Sync {
    /// The canonical form of `entry`: the declaration it refers to.
    fn resolve_entry(&self, entry: &Entry) -> Entry;

    /// Classes that own a declaration matching `entry`.
    fn resolve_entry_owners(&self, entry: &Entry) -> BTreeSet<Entry>;

    /// Every entry that must carry the same name as `entry`, in a stable order.
    fn resolve_equivalent_entries(&self, entry: &Entry) -> Vec<Entry>;

    /// Every method that must carry the same name as `method`: overrides in both directions and
    /// bridge twins.
    fn resolve_equivalent_methods(&self, method: &Entry) -> BTreeSet<Entry>;
}

/// Resolver that knows nothing: every entry is canonical and its own equivalence class.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoidEntryResolver;

impl EntryResolver for VoidEntryResolver {
    fn resolve_entry(&self, entry: &Entry) -> Entry {
        entry.clone()
    }

    fn resolve_entry_owners(&self, entry: &Entry) -> BTreeSet<Entry> {
        BTreeSet::from([entry.containing_class()])
    }

    fn resolve_equivalent_entries(&self, entry: &Entry) -> Vec<Entry> {
        vec![entry.clone()]
    }

    fn resolve_equivalent_methods(&self, method: &Entry) -> BTreeSet<Entry> {
        BTreeSet::from([method.clone()])
    }
}

/// Membership test over the entries of an analysed artifact.
pub trait EntryIndex {
    /// Returns true if `entry` is declared in the artifact.
    fn has_entry(&self, entry: &Entry) -> bool;
}

/// A structure keyed by deobfuscated identity that must follow renames.
pub trait RemappableIndex: Send {
    /// Re-keys everything stored under `old` to `new`.
    fn remap_entry(&mut self, old: &Entry, new: &Entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{class, method};

    #[test]
    fn test_void_resolver_is_identity() {
        let owner = class("a");
        let target = method(&owner, "a", "()V");
        let resolver = VoidEntryResolver;

        assert_eq!(resolver.resolve_entry(&target), target);
        assert_eq!(resolver.resolve_entry_owners(&target), BTreeSet::from([owner]));
        assert_eq!(resolver.resolve_equivalent_entries(&target), vec![target.clone()]);
        assert_eq!(resolver.resolve_equivalent_methods(&target).len(), 1);
    }
}
