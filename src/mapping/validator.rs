//! Rename validation.
//!
//! A rename is checked for every entry of its equivalence class before anything is committed:
//!
//! 1. The new name must be a legal identifier for the kind of entry being renamed.
//! 2. No other entry of the same scope may already carry the name, where two entries only clash
//!    if they could coexist under one name (classes with classes, fields with fields, methods
//!    with methods of equal argument lists).
//! 3. The deobfuscated location the entry would move to must not belong to another obfuscated
//!    entry, whether that entry was renamed onto it or is known and still carries its own name.
//!
//! Keeping the current name is always accepted. Validation only reads the mapper.

use crate::{
    mapping::BidirectionalMapper,
    translation::{Entry, PACKAGE_SEPARATOR},
    Error, Result,
};

/// Reserved words that can never be used as identifiers.
const KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "false", "final", "finally",
    "float", "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "null", "package", "private", "protected", "public", "return", "short",
    "static", "strictfp", "super", "switch", "synchronized", "this", "throw", "throws",
    "transient", "true", "try", "void", "volatile", "while",
];

/// Characters that may never appear in a field or method name.
const ILLEGAL_MEMBER_CHARACTERS: &[char] = &['/', '.', ';', '[', '<', '>'];

/// Validates renaming every entry of `targets` to `name`.
///
/// ## Arguments
/// * 'mapper' - The current mapping state
/// * 'targets' - Obfuscated entries forming one equivalence class
/// * 'name' - The proposed deobfuscated simple name
///
/// # Errors
/// Returns [`Error::IllegalName`] if `name` is not a legal identifier for one of the targets, and
/// [`Error::NameConflict`] if it collides with another entry.
pub fn validate_rename(mapper: &BidirectionalMapper, targets: &[Entry], name: &str) -> Result<()> {
    for target in targets {
        if mapper.deobfuscate(target).name() == name {
            continue;
        }
        validate_name(target, name)?;
        check_siblings(mapper, target, targets, name)?;
        check_location(mapper, target, targets, name)?;
    }
    Ok(())
}

/// Checks that `name` is a legal identifier for `entry`.
///
/// Top-level class names may carry a package (`pkg/sub/Name`); nested classes and members must
/// be a single identifier. `$` is rejected in class names because nesting is expressed through
/// the parent chain.
///
/// # Errors
/// Returns [`Error::IllegalName`] describing the first problem found.
pub fn validate_name(entry: &Entry, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(illegal(name, "name is empty"));
    }

    if entry.is_class() {
        if name.contains('$') {
            return Err(illegal(name, "class names may not contain '$'"));
        }
        if entry.parent().is_some() && name.contains(PACKAGE_SEPARATOR) {
            return Err(illegal(name, "nested classes cannot declare a package"));
        }

        return name
            .split(PACKAGE_SEPARATOR)
            .try_for_each(|segment| validate_identifier(name, segment));
    }

    if let Some(character) = name.chars().find(|c| ILLEGAL_MEMBER_CHARACTERS.contains(c)) {
        return Err(illegal(
            name,
            &format!("member names may not contain '{character}'"),
        ));
    }
    validate_identifier(name, name)
}

fn validate_identifier(name: &str, segment: &str) -> Result<()> {
    let mut characters = segment.chars();
    let Some(first) = characters.next() else {
        return Err(illegal(name, "empty package segment"));
    };

    if !(first.is_alphabetic() || first == '_' || first == '$') {
        return Err(illegal(
            name,
            &format!("'{segment}' does not start with a letter"),
        ));
    }
    if let Some(character) = characters.find(|c| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
    {
        return Err(illegal(
            name,
            &format!("'{segment}' contains '{character}'"),
        ));
    }
    if KEYWORDS.contains(&segment) {
        return Err(illegal(name, &format!("'{segment}' is a reserved word")));
    }
    Ok(())
}

/// Rejects `name` if another entry of the scope of `target` already answers to it.
fn check_siblings(
    mapper: &BidirectionalMapper,
    target: &Entry,
    targets: &[Entry],
    name: &str,
) -> Result<()> {
    let renamed = mapper.deobfuscate(target).with_name(name);
    let scope = match target.parent() {
        Some(parent) => mapper.obf_children(parent),
        None => mapper.obf_to_deobf().root_entries(),
    };

    for sibling in scope {
        if sibling == *target || targets.contains(&sibling) {
            continue;
        }

        let deobfuscated = mapper.deobfuscate(&sibling);
        if deobfuscated.name() == name && renamed.can_conflict_with(&deobfuscated) {
            return Err(conflict(mapper, target, name));
        }
    }
    Ok(())
}

/// Rejects `name` if the location `target` would move to in the mirror belongs to someone else.
///
/// The location is taken if its scope leads back to another class, if another entry was already
/// renamed onto it, or if an existing unmapped entry answers to it by its own name.
fn check_location(
    mapper: &BidirectionalMapper,
    target: &Entry,
    targets: &[Entry],
    name: &str,
) -> Result<()> {
    if let Some(parent) = target.parent() {
        if mapper.obfuscate(&mapper.deobfuscate(parent)) != *parent {
            return Err(conflict(mapper, target, name));
        }
    }

    let renamed = mapper.deobfuscate(target).with_name(name);
    let owner = mapper.obfuscate(&renamed);
    if owner == *target || targets.contains(&owner) {
        return Ok(());
    }

    let claimed = mapper.deobf_to_obf().find_node(&renamed).is_some()
        || (mapper.is_known_entry(&owner) && mapper.deobfuscate(&owner) == renamed);
    if claimed {
        return Err(conflict(mapper, target, name));
    }
    Ok(())
}

fn illegal(name: &str, reason: &str) -> Error {
    Error::IllegalName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn conflict(mapper: &BidirectionalMapper, target: &Entry, name: &str) -> Error {
    let scope = match target.parent() {
        Some(parent) => mapper.deobfuscate(parent).to_string(),
        None => String::from("the top-level classes"),
    };
    Error::NameConflict {
        name: name.to_string(),
        scope,
    }
}
