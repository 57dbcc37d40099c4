//! Whole-tree operations used when importing and merging mapping sets.
//!
//! - [`invert`] swaps the two identifier spaces of a tree.
//! - [`compose`] chains two trees (`obf → mid` and `mid → final`) into one (`obf → final`).
//!
//! Both operations walk their input pre-order, so the image of a parent is always known before
//! any of its children is placed.

use std::collections::{HashMap, HashSet};

use crate::{
    mapping::{EntryMapping, MappingTree, VoidEntryResolver},
    translation::{Entry, MappingTranslator, Translatable, NESTING_SEPARATOR},
};

/// Inverts a mapping tree.
///
/// Every node is re-keyed under the image of its parent, with its target name as the new name
/// and its descriptors translated through `tree`. The new mapping points back at the original
/// simple name and keeps the documentation. Only the part after the last `$` of a target name is
/// used, since nesting is carried by the parent chain. This applies to members too, so a member
/// mapped to `access$000` is keyed as `000` in the inverted tree.
///
/// For trees without cyclic renames `invert(&invert(&tree)) == tree`.
#[must_use]
pub fn invert(tree: &MappingTree) -> MappingTree {
    let translator = MappingTranslator::new(tree, &VoidEntryResolver);
    let mut images: HashMap<Entry, Entry> = HashMap::new();
    let mut inverted = MappingTree::new();

    for node in tree {
        let entry = node.entry();
        let parent = entry.parent().map(|parent| {
            images
                .get(parent)
                .cloned()
                .unwrap_or_else(|| translator.translate(parent))
        });

        let name = node
            .value()
            .map_or(entry.name(), |mapping| inner_name(mapping.target_name()));

        let image = entry
            .with_parent(parent)
            .with_name(name)
            .with_kind(entry.kind().translate(&translator));

        if let Some(mapping) = node.value() {
            let reverse = EntryMapping::new(entry.name()).with_docs(mapping.docs().map(String::from));
            inverted.insert(&image, Some(reverse));
        }
        images.insert(entry.clone(), image);
    }

    inverted
}

/// Composes `left` (obfuscated → intermediate) with `right` (intermediate → final).
///
/// The result is keyed in the obfuscated space of `left`:
///
/// - entries mapped by both get the final name from `right`, and `right`'s docs when it has any,
/// - entries `left` leaves unmapped but whose identity `right` maps get `right`'s mapping,
/// - entries mapped only by `left` are kept if `keep_left_only` is set,
/// - entries mapped only by `right` are kept if `keep_right_only` is set, re-keyed into the
///   obfuscated space as far as `left` knows their parents.
#[must_use]
pub fn compose(
    left: &MappingTree,
    right: &MappingTree,
    keep_left_only: bool,
    keep_right_only: bool,
) -> MappingTree {
    let forward = MappingTranslator::new(left, &VoidEntryResolver);
    let mut composed = MappingTree::new();
    let mut reached: HashSet<Entry> = HashSet::new();

    for node in left {
        let entry = node.entry();
        let intermediate = forward.translate(entry);

        match (node.value(), right.get(&intermediate)) {
            (Some(first), Some(second)) => {
                let docs = second.docs().or(first.docs()).map(String::from);
                composed.insert(entry, Some(second.with_docs(docs)));
            }
            (Some(first), None) if keep_left_only => {
                composed.insert(entry, Some(first.clone()));
            }
            (None, Some(second)) => {
                composed.insert(entry, Some(second.clone()));
            }
            _ => {}
        }
        reached.insert(intermediate);
    }

    if keep_right_only {
        let inverse_left = invert(left);
        let backward = MappingTranslator::new(&inverse_left, &VoidEntryResolver);
        for node in right {
            let Some(mapping) = node.value() else {
                continue;
            };
            if reached.contains(node.entry()) {
                continue;
            }
            composed.insert(&backward.translate(node.entry()), Some(mapping.clone()));
        }
    }

    composed
}

fn inner_name(name: &str) -> &str {
    name.rsplit(NESTING_SEPARATOR).next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{class, field, method};

    fn sample() -> MappingTree {
        let owner = class("a");
        let inner = Entry::inner_class(&owner, "b");
        [
            (owner.clone(), EntryMapping::new("net/Foo")),
            (inner.clone(), EntryMapping::new("Inner")),
            (
                field(&owner, "c", "La$b;"),
                EntryMapping::new("inner").with_docs(Some("the inner".into())),
            ),
            (method(&inner, "d", "(La;)V"), EntryMapping::new("attach")),
            (field(&class("x"), "y", "I"), EntryMapping::new("count")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_invert() {
        let inverted = invert(&sample());
        let foo = class("net/Foo");

        assert_eq!(inverted.get(&foo).unwrap().target_name(), "a");
        assert_eq!(inverted.get(&class("net/Foo$Inner")).unwrap().target_name(), "b");

        let member = field(&foo, "inner", "Lnet/Foo$Inner;");
        let mapping = inverted.get(&member).unwrap();
        assert_eq!(mapping.target_name(), "c");
        assert_eq!(mapping.docs(), Some("the inner"));

        assert!(inverted.contains(&method(&class("net/Foo$Inner"), "attach", "(Lnet/Foo;)V")));
        assert!(inverted.contains(&field(&class("x"), "count", "I")));
        assert!(!inverted.contains(&class("x")));
    }

    #[test]
    fn test_invert_twice_is_identity() {
        let tree = sample();
        assert_eq!(invert(&invert(&tree)), tree);
    }

    #[test]
    fn test_invert_uses_inner_name_of_class_targets() {
        let inner = Entry::inner_class(&class("a"), "b");
        let tree: MappingTree = [(inner, EntryMapping::new("Outer$Inner"))].into_iter().collect();

        let inverted = invert(&tree);
        assert!(inverted.contains(&class("a$Inner")));
    }

    #[test]
    fn test_invert_uses_inner_name_of_member_targets() {
        let owner = class("a");
        let tree: MappingTree = [(method(&owner, "b", "()V"), EntryMapping::new("access$000"))]
            .into_iter()
            .collect();

        let inverted = invert(&tree);
        assert_eq!(inverted.get(&method(&owner, "000", "()V")).unwrap().target_name(), "b");
        assert!(!inverted.contains(&method(&owner, "access$000", "()V")));
    }

    #[test]
    fn test_compose_maps_unmapped_left_nodes_through_right() {
        let owner = class("a");
        let left: MappingTree = [(field(&owner, "b", "I"), EntryMapping::new("mid"))]
            .into_iter()
            .collect();
        let right: MappingTree = [
            (owner.clone(), EntryMapping::new("Final")),
            (field(&owner, "mid", "I"), EntryMapping::new("fin")),
        ]
        .into_iter()
        .collect();

        let composed = compose(&left, &right, false, false);
        assert_eq!(composed.get(&owner).unwrap().target_name(), "Final");
        assert_eq!(composed.get(&field(&owner, "b", "I")).unwrap().target_name(), "fin");
        assert_eq!(composed.len(), 2);
    }

    #[test]
    fn test_compose() {
        let owner = class("a");
        let left: MappingTree = [
            (owner.clone(), EntryMapping::new("Mid")),
            (field(&owner, "b", "I"), EntryMapping::new("midField")),
            (field(&owner, "c", "I"), EntryMapping::new("leftOnly")),
        ]
        .into_iter()
        .collect();

        let mid = class("Mid");
        let right: MappingTree = [
            (mid.clone(), EntryMapping::new("Final")),
            (field(&mid, "midField", "I"), EntryMapping::new("finalField")),
            (field(&mid, "d", "I"), EntryMapping::new("rightOnly")),
        ]
        .into_iter()
        .collect();

        let strict = compose(&left, &right, false, false);
        assert_eq!(strict.get(&owner).unwrap().target_name(), "Final");
        assert_eq!(strict.get(&field(&owner, "b", "I")).unwrap().target_name(), "finalField");
        assert!(!strict.contains(&field(&owner, "c", "I")));
        assert_eq!(strict.len(), 2);

        let merged = compose(&left, &right, true, true);
        assert_eq!(merged.get(&field(&owner, "c", "I")).unwrap().target_name(), "leftOnly");
        assert_eq!(merged.get(&field(&owner, "d", "I")).unwrap().target_name(), "rightOnly");
        assert_eq!(merged.len(), 4);
    }
}
