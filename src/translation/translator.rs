//! Projection of translatable values from one identifier space into another.
//!
//! A [`Translator`] only knows how to translate a single [`Entry`]; everything else that mentions
//! identifiers (descriptors, kinds, collections of entries) implements [`Translatable`] in terms of
//! it. [`MappingTranslator`] is the translator backed by a [`MappingTree`]: names come from the
//! tree, descriptors are rewritten class by class, and the resolver decides which declaration a
//! reference is looked up under.

use crate::{
    mapping::{EntryResolver, MappingTree},
    translation::Entry,
};

/// Translates single entries between identifier spaces.
pub trait Translator {
    /// Returns the image of `entry` in the target space.
    fn translate_entry(&self, entry: &Entry) -> Entry;
}

/// A value that mentions identifiers and can therefore be translated.
pub trait Translatable: Sized {
    /// Returns the image of `self` under `translator`.
    fn translate(&self, translator: &dyn Translator) -> Self;
}

impl<T: Translatable> Translatable for Vec<T> {
    fn translate(&self, translator: &dyn Translator) -> Self {
        self.iter().map(|item| item.translate(translator)).collect()
    }
}

impl<T: Translatable> Translatable for Option<T> {
    fn translate(&self, translator: &dyn Translator) -> Self {
        self.as_ref().map(|item| item.translate(translator))
    }
}

/// A translator reading names out of a mapping tree.
///
/// The parent chain is translated first, then the entry's own name is looked up under the
/// declaration the resolver reports for it (so an inherited reference picks up the name of the
/// declaring class' member), and finally the descriptor is translated.
pub struct MappingTranslator<'a> {
    mappings: &'a MappingTree,
    resolver: &'a dyn EntryResolver,
}

impl<'a> MappingTranslator<'a> {
    /// Creates a translator over `mappings`.
    ///
    /// ## Arguments
    /// * 'mappings' - The tree the target names are read from
    /// * 'resolver' - Resolves references to their declaring entry before the lookup
    #[must_use]
    pub fn new(mappings: &'a MappingTree, resolver: &'a dyn EntryResolver) -> Self {
        MappingTranslator { mappings, resolver }
    }

    /// Translates any translatable value.
    #[must_use]
    pub fn translate<T: Translatable>(&self, value: &T) -> T {
        value.translate(self)
    }
}

impl Translator for MappingTranslator<'_> {
    fn translate_entry(&self, entry: &Entry) -> Entry {
        let parent = entry.parent().map(|parent| self.translate_entry(parent));

        let resolved = self.resolver.resolve_entry(entry);
        let name = self
            .mappings
            .get(&resolved)
            .map_or(entry.name(), |mapping| mapping.target_name());

        let kind = entry.kind().translate(self);

        entry.with_parent(parent).with_name(name).with_kind(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mapping::{EntryMapping, VoidEntryResolver},
        test::{class, field, method},
    };

    #[test]
    fn test_translate_renames_chain_and_descriptor() {
        let owner = class("a");
        let inner = Entry::inner_class(&owner, "b");
        let target = method(&inner, "c", "(La;La$b;)I");

        let mut tree = MappingTree::new();
        tree.insert(&owner, Some(EntryMapping::new("net/Foo")));
        tree.insert(&inner, Some(EntryMapping::new("Inner")));
        tree.insert(&target, Some(EntryMapping::new("run")));

        let translator = MappingTranslator::new(&tree, &VoidEntryResolver);
        let translated = translator.translate(&target);

        assert_eq!(translated.to_string(), "net/Foo$Inner.run(Lnet/Foo;Lnet/Foo$Inner;)I");
    }

    #[test]
    fn test_translate_unmapped_entry_is_identity() {
        let tree = MappingTree::new();
        let translator = MappingTranslator::new(&tree, &VoidEntryResolver);
        let entry = field(&class("a"), "b", "La;");

        assert_eq!(translator.translate(&entry), entry);
    }

    #[test]
    fn test_translate_collections() {
        let owner = class("a");
        let mut tree = MappingTree::new();
        tree.insert(&owner, Some(EntryMapping::new("Foo")));

        let translator = MappingTranslator::new(&tree, &VoidEntryResolver);
        let translated = translator.translate(&vec![owner.clone(), class("b")]);
        assert_eq!(translated, vec![class("Foo"), class("b")]);

        assert_eq!(translator.translate(&Some(owner)), Some(class("Foo")));
    }
}
