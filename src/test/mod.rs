//! Shared factories for unit tests.

use crate::translation::Entry;

/// A class entry from its full internal name.
pub fn class(name: &str) -> Entry {
    Entry::class(name)
}

/// A field of `owner` from descriptor text.
pub fn field(owner: &Entry, name: &str, descriptor: &str) -> Entry {
    Entry::parse_field(owner, name, descriptor).unwrap()
}

/// A method of `owner` from descriptor text.
pub fn method(owner: &Entry, name: &str, descriptor: &str) -> Entry {
    Entry::parse_method(owner, name, descriptor).unwrap()
}
