//! Identity of classes, fields and methods within one identifier space.
//!
//! An [`Entry`] is an immutable value made of a name, an optional parent entry and a kind tag.
//! Top-level classes have no parent; nested classes hang off their outer class; fields and
//! methods hang off their owning class. Every parent chain therefore ends at a top-level class.
//!
//! Entries compare, order and hash structurally, so the same class referenced from two places is
//! the same key in a [`crate::mapping::MappingTree`]. Parent chains are shared through [`Arc`],
//! which keeps cloning cheap while the mapping trees re-key subtrees.
//!
//! # Naming
//!
//! - Top-level classes use internal JVM names such as `net/example/Foo`.
//! - [`Entry::class`] splits at the last `$` into outer and inner class, so `a$b` is class `b`
//!   nested inside class `a`. A leading or trailing `$` is never treated as a separator.
//! - Fields display as `owner.name:descriptor`, methods as `owner.name(args)ret`.
//!
//! # Examples
//!
//! ```rust
//! use mapscope::Entry;
//!
//! let owner = Entry::class("a$b");
//! assert_eq!(owner.name(), "b");
//! assert_eq!(owner.parent(), Some(&Entry::class("a")));
//!
//! let method = Entry::parse_method(&owner, "a", "(I)V")?;
//! assert_eq!(method.to_string(), "a$b.a(I)V");
//! # Ok::<(), mapscope::Error>(())
//! ```

use std::{fmt, sync::Arc};

use strum::{Display, EnumDiscriminants, FromRepr};

use crate::{
    translation::{MethodDescriptor, Translatable, Translator, TypeDescriptor},
    Result,
};

/// Separator between an outer class and its nested class in a full class name.
pub const NESTING_SEPARATOR: char = '$';

/// Separator between package segments in an internal class name.
pub const PACKAGE_SEPARATOR: char = '/';

/// The closed set of entry kinds, with the payload each kind carries.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, EnumDiscriminants)]
#[strum_discriminants(
    name(EntryTag),
    derive(Display, FromRepr, Hash, PartialOrd, Ord),
    allow(missing_docs)
)]
pub enum EntryKind {
    /// A top-level or nested class.
    Class,
    /// A field with its type.
    Field(TypeDescriptor),
    /// A method with its signature.
    Method(MethodDescriptor),
}

impl EntryKind {
    /// The bare tag of this kind.
    #[must_use]
    pub fn tag(&self) -> EntryTag {
        EntryTag::from(self)
    }
}

impl Translatable for EntryKind {
    fn translate(&self, translator: &dyn Translator) -> Self {
        match self {
            EntryKind::Class => EntryKind::Class,
            EntryKind::Field(descriptor) => EntryKind::Field(descriptor.translate(translator)),
            EntryKind::Method(descriptor) => EntryKind::Method(descriptor.translate(translator)),
        }
    }
}

/// Identity of a class, field or method within one identifier space.
///
/// Field order matters for the derived [`Ord`]: siblings sort by name first, then by kind and
/// descriptor.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entry {
    parent: Option<Arc<Entry>>,
    name: String,
    kind: EntryKind,
}

impl Entry {
    /// Creates a class entry from its full internal name.
    ///
    /// Nested classes are recognised by the last `$` in the name and become children of their
    /// outer class. This makes `Entry::class("a$b")` equal to
    /// `Entry::inner_class(&Entry::class("a"), "b")`.
    #[must_use]
    pub fn class(full_name: &str) -> Self {
        match split_nested(full_name) {
            Some((outer, inner)) => Entry {
                parent: Some(Arc::new(Entry::class(outer))),
                name: inner.to_string(),
                kind: EntryKind::Class,
            },
            None => Entry {
                parent: None,
                name: full_name.to_string(),
                kind: EntryKind::Class,
            },
        }
    }

    /// Creates a class nested inside `outer`.
    #[must_use]
    pub fn inner_class(outer: &Entry, name: &str) -> Self {
        Entry {
            parent: Some(Arc::new(outer.containing_class())),
            name: name.to_string(),
            kind: EntryKind::Class,
        }
    }

    /// Creates a field owned by `owner`.
    #[must_use]
    pub fn field(owner: &Entry, name: &str, descriptor: TypeDescriptor) -> Self {
        Entry {
            parent: Some(Arc::new(owner.containing_class())),
            name: name.to_string(),
            kind: EntryKind::Field(descriptor),
        }
    }

    /// Creates a method owned by `owner`.
    #[must_use]
    pub fn method(owner: &Entry, name: &str, descriptor: MethodDescriptor) -> Self {
        Entry {
            parent: Some(Arc::new(owner.containing_class())),
            name: name.to_string(),
            kind: EntryKind::Method(descriptor),
        }
    }

    /// Creates a field from descriptor text.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `descriptor` is not a valid field descriptor.
    pub fn parse_field(owner: &Entry, name: &str, descriptor: &str) -> Result<Self> {
        Ok(Entry::field(owner, name, TypeDescriptor::parse(descriptor)?))
    }

    /// Creates a method from descriptor text.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `descriptor` is not a valid method descriptor.
    pub fn parse_method(owner: &Entry, name: &str, descriptor: &str) -> Result<Self> {
        Ok(Entry::method(owner, name, MethodDescriptor::parse(descriptor)?))
    }

    /// The simple name: the inner name for nested classes, the full internal name for top-level
    /// classes, the member name otherwise.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning entry, `None` for top-level classes.
    #[must_use]
    pub fn parent(&self) -> Option<&Entry> {
        self.parent.as_deref()
    }

    /// The kind tag and its payload.
    #[must_use]
    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    /// Returns true for classes.
    #[must_use]
    pub fn is_class(&self) -> bool {
        matches!(self.kind, EntryKind::Class)
    }

    /// Returns true for fields and methods.
    #[must_use]
    pub fn is_member(&self) -> bool {
        !self.is_class()
    }

    /// The method descriptor, for methods only.
    #[must_use]
    pub fn method_descriptor(&self) -> Option<&MethodDescriptor> {
        match &self.kind {
            EntryKind::Method(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    /// The field type, for fields only.
    #[must_use]
    pub fn field_descriptor(&self) -> Option<&TypeDescriptor> {
        match &self.kind {
            EntryKind::Field(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    /// Full internal name of a class (`outer$inner`). For members this is their plain name.
    #[must_use]
    pub fn full_name(&self) -> String {
        match (&self.kind, self.parent()) {
            (EntryKind::Class, Some(outer)) => {
                format!("{}{}{}", outer.full_name(), NESTING_SEPARATOR, self.name)
            }
            _ => self.name.clone(),
        }
    }

    /// The package part of a top-level class name, if any (`a/b` for `a/b/C`).
    #[must_use]
    pub fn package_name(&self) -> Option<&str> {
        if self.parent.is_some() || !self.is_class() {
            return None;
        }

        self.name
            .rfind(PACKAGE_SEPARATOR)
            .map(|index| &self.name[..index])
    }

    /// The class this entry belongs to: itself for classes, the owner for members.
    #[must_use]
    pub fn containing_class(&self) -> Entry {
        match (&self.kind, self.parent()) {
            (EntryKind::Class, _) | (_, None) => self.clone(),
            (_, Some(owner)) => owner.containing_class(),
        }
    }

    /// The outermost class in the parent chain.
    #[must_use]
    pub fn top_level_class(&self) -> Entry {
        match self.parent() {
            Some(parent) => parent.top_level_class(),
            None => self.clone(),
        }
    }

    /// Returns a copy carrying `name` instead of the current name.
    #[must_use]
    pub fn with_name(&self, name: &str) -> Self {
        Entry {
            parent: self.parent.clone(),
            name: name.to_string(),
            kind: self.kind.clone(),
        }
    }

    /// Returns a copy owned by `parent`.
    #[must_use]
    pub fn with_parent(&self, parent: Option<Entry>) -> Self {
        Entry {
            parent: parent.map(Arc::new),
            name: self.name.clone(),
            kind: self.kind.clone(),
        }
    }

    /// Returns a copy carrying a different kind payload.
    #[must_use]
    pub fn with_kind(&self, kind: EntryKind) -> Self {
        Entry {
            parent: self.parent.clone(),
            name: self.name.clone(),
            kind,
        }
    }

    /// The parent chain from the top-level class down to (and including) this entry.
    #[must_use]
    pub fn ancestry(&self) -> Vec<Entry> {
        let mut chain = Vec::new();
        let mut current = Some(self);
        while let Some(entry) = current {
            chain.push(entry.clone());
            current = entry.parent();
        }
        chain.reverse();
        chain
    }

    /// Returns true if `ancestor` is a strict ancestor of this entry.
    #[must_use]
    pub fn has_ancestor(&self, ancestor: &Entry) -> bool {
        let mut current = self.parent();
        while let Some(entry) = current {
            if entry == ancestor {
                return true;
            }
            current = entry.parent();
        }
        false
    }

    /// Substitutes `old` by `new` wherever it appears in the parent chain of this entry
    /// (including the entry itself). Entries outside the subtree of `old` are returned unchanged.
    #[must_use]
    pub fn replace_ancestor(&self, old: &Entry, new: &Entry) -> Entry {
        if self == old {
            return new.clone();
        }

        match self.parent() {
            Some(parent) if parent == old || parent.has_ancestor(old) => {
                self.with_parent(Some(parent.replace_ancestor(old, new)))
            }
            _ => self.clone(),
        }
    }

    /// Returns true if two entries of the same scope would clash when given the same name.
    ///
    /// Classes clash with classes, fields with fields, and methods with methods whose argument
    /// lists are equal.
    #[must_use]
    pub fn can_conflict_with(&self, other: &Entry) -> bool {
        if self.parent != other.parent {
            return false;
        }

        match (&self.kind, &other.kind) {
            (EntryKind::Class, EntryKind::Class) | (EntryKind::Field(_), EntryKind::Field(_)) => {
                true
            }
            (EntryKind::Method(first), EntryKind::Method(second)) => {
                first.can_conflict_with(second)
            }
            _ => false,
        }
    }

    /// Returns true if the descriptor of this member mentions `class` or one of its nested
    /// classes. Always false for classes.
    #[must_use]
    pub fn references_class(&self, class: &Entry) -> bool {
        match &self.kind {
            EntryKind::Class => false,
            EntryKind::Field(descriptor) => descriptor.references_class(class),
            EntryKind::Method(descriptor) => descriptor.references_class(class),
        }
    }
}

impl Translatable for Entry {
    fn translate(&self, translator: &dyn Translator) -> Self {
        translator.translate_entry(self)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, self.parent()) {
            (EntryKind::Class, _) => f.write_str(&self.full_name()),
            (EntryKind::Field(descriptor), Some(owner)) => {
                write!(f, "{}.{}:{}", owner, self.name, descriptor)
            }
            (EntryKind::Method(descriptor), Some(owner)) => {
                write!(f, "{}.{}{}", owner, self.name, descriptor)
            }
            (EntryKind::Field(descriptor), None) => write!(f, "{}:{}", self.name, descriptor),
            (EntryKind::Method(descriptor), None) => write!(f, "{}{}", self.name, descriptor),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind.tag(), self)
    }
}

/// Splits `outer$inner` at the last separator, ignoring separators at either end.
fn split_nested(full_name: &str) -> Option<(&str, &str)> {
    let index = full_name.rfind(NESTING_SEPARATOR)?;
    if index == 0 || index + 1 == full_name.len() {
        return None;
    }

    Some((&full_name[..index], &full_name[index + 1..]))
}
