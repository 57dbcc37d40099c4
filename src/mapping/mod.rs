//! Mapping state and the operations that keep it consistent.
//!
//! # Architecture
//!
//! - [`MappingTree`] - ordered hierarchical store from [`crate::Entry`] to [`EntryMapping`]
//! - [`DeltaTrackingTree`] - a tree that records every change until drained
//! - [`EntryResolver`] - canonical entries and equivalence classes
//! - [`ClassHierarchy`] / [`IndexEntryResolver`] - inheritance-aware resolution
//! - [`BidirectionalMapper`] - one tree per direction, kept mirror-consistent
//! - [`validator`] - rename legality and conflict detection
//! - [`algebra`] - inversion and composition of whole trees
//! - [`checker`] - removal of mappings for entries that no longer exist
//!
//! # Key Components
//!
//! The mapper is the only place where both trees are mutated. Everything else in this module is
//! either a read-only query or operates on a tree handed to it.

pub mod algebra;
pub mod checker;
mod delta;
mod hierarchy;
mod mapper;
mod resolver;
mod tree;
pub mod validator;

use std::fmt;

pub use delta::{DeltaTrackingTree, MappingChange, MappingDelta};
pub use hierarchy::{ClassHierarchy, IndexEntryResolver};
pub use mapper::BidirectionalMapper;
pub use resolver::{EntryIndex, EntryResolver, RemappableIndex, VoidEntryResolver};
pub use tree::{MappingNode, MappingTree, NodeIter};

/// A rename record: the name an entry carries in the target space, plus optional documentation.
///
/// The target name is a simple name. For nested classes it is the inner name only; for top-level
/// classes it is the full internal name including the package.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct EntryMapping {
    target_name: String,
    docs: Option<String>,
}

impl EntryMapping {
    /// Creates a mapping to `target_name` without documentation.
    #[must_use]
    pub fn new(target_name: impl Into<String>) -> Self {
        EntryMapping {
            target_name: target_name.into(),
            docs: None,
        }
    }

    /// The name in the target space.
    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Attached documentation, if any.
    #[must_use]
    pub fn docs(&self) -> Option<&str> {
        self.docs.as_deref()
    }

    /// Returns a copy with `docs` attached (or removed for `None`).
    #[must_use]
    pub fn with_docs(&self, docs: Option<String>) -> Self {
        EntryMapping {
            target_name: self.target_name.clone(),
            docs,
        }
    }

    /// Returns a copy carrying a different target name and the same docs.
    #[must_use]
    pub fn with_target_name(&self, target_name: impl Into<String>) -> Self {
        EntryMapping {
            target_name: target_name.into(),
            docs: self.docs.clone(),
        }
    }
}

impl fmt::Display for EntryMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target_name)
    }
}
