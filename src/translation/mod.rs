//! Identifier model and translation between identifier spaces.
//!
//! - [`Entry`] / [`EntryKind`] - identity of classes, fields and methods
//! - [`TypeDescriptor`] / [`MethodDescriptor`] - JVM descriptors carried by members
//! - [`Translator`] / [`Translatable`] - projection of values into another space
//! - [`MappingTranslator`] - translator backed by a [`crate::mapping::MappingTree`]

mod descriptor;
mod entry;
mod translator;

pub use descriptor::{MethodDescriptor, TypeDescriptor};
pub use entry::{Entry, EntryKind, EntryTag, NESTING_SEPARATOR, PACKAGE_SEPARATOR};
pub use translator::{MappingTranslator, Translatable, Translator};
