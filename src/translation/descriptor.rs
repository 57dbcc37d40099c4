//! JVM type and method descriptors.
//!
//! Fields and methods are identified not only by their owner and name but also by their
//! descriptor. Descriptors mention classes by their internal name (`Lpkg/Name;`), so they live in
//! an identifier space just like entries do and have to be translated alongside them.
//!
//! # Grammar
//!
//! ```text
//! TypeDescriptor   := 'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z'
//!                   | 'L' ClassName ';'
//!                   | '[' TypeDescriptor
//! MethodDescriptor := '(' TypeDescriptor* ')' ( TypeDescriptor | 'V' )
//! ```

use std::fmt;

use crate::{
    translation::{Entry, Translatable, Translator},
    Result,
};

/// A single JVM field descriptor, such as `I`, `[J` or `Ljava/lang/String;`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeDescriptor(String);

impl TypeDescriptor {
    /// The `void` return type. Only legal as the return type of a [`MethodDescriptor`].
    pub const VOID: &'static str = "V";

    /// Parses and validates a field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `descriptor` is not exactly one well formed type.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let consumed = scan_type(descriptor, 0, false)?;
        if consumed != descriptor.len() {
            return Err(malformed_error!(
                "Trailing data in type descriptor '{}'",
                descriptor
            ));
        }

        Ok(TypeDescriptor(descriptor.to_string()))
    }

    /// Creates the descriptor of an object of the given class (`L<name>;`).
    #[must_use]
    pub fn of_class(class: &Entry) -> Self {
        TypeDescriptor(format!("L{};", class.full_name()))
    }

    /// The raw descriptor text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the primitive types, including `V`.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        self.0.len() == 1
    }

    /// Returns true for `V`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.0 == Self::VOID
    }

    /// Returns true for array types.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.0.starts_with('[')
    }

    /// Number of array dimensions (`0` for non-array types).
    #[must_use]
    pub fn array_dimensions(&self) -> usize {
        self.0.bytes().take_while(|b| *b == b'[').count()
    }

    /// Internal name of the referenced class, looking through array dimensions.
    ///
    /// `[[La/b;` yields `a/b`; primitive types yield `None`.
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        let element = &self.0[self.array_dimensions()..];
        element
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
    }

    /// The class referenced by this descriptor, if any.
    #[must_use]
    pub fn class_entry(&self) -> Option<Entry> {
        self.class_name().map(Entry::class)
    }

    /// Returns a copy whose class reference (if any) is replaced by `class`.
    #[must_use]
    pub fn with_class(&self, class: &Entry) -> Self {
        if self.class_name().is_none() {
            return self.clone();
        }

        let dimensions = self.array_dimensions();
        TypeDescriptor(format!("{}L{};", "[".repeat(dimensions), class.full_name()))
    }

    /// Returns true if the descriptor refers to `class` or to a class nested inside it.
    #[must_use]
    pub fn references_class(&self, class: &Entry) -> bool {
        self.class_entry()
            .is_some_and(|referenced| referenced == *class || referenced.has_ancestor(class))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({})", self.0)
    }
}

impl Translatable for TypeDescriptor {
    fn translate(&self, translator: &dyn Translator) -> Self {
        match self.class_entry() {
            Some(class) => self.with_class(&translator.translate_entry(&class)),
            None => self.clone(),
        }
    }
}

/// A JVM method descriptor, such as `()V` or `(ILa;)[J`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodDescriptor {
    arguments: Vec<TypeDescriptor>,
    return_type: TypeDescriptor,
}

impl MethodDescriptor {
    /// Parses and validates a method descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the text does not follow the method descriptor grammar.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let Some(body) = descriptor.strip_prefix('(') else {
            return Err(malformed_error!(
                "Method descriptor '{}' does not start with '('",
                descriptor
            ));
        };
        let Some(close) = body.find(')') else {
            return Err(malformed_error!(
                "Method descriptor '{}' has no closing ')'",
                descriptor
            ));
        };

        let (argument_text, return_text) = (&body[..close], &body[close + 1..]);

        let mut arguments = Vec::new();
        let mut position = 0;
        while position < argument_text.len() {
            let end = scan_type(argument_text, position, false)?;
            arguments.push(TypeDescriptor(argument_text[position..end].to_string()));
            position = end;
        }

        let end = scan_type(return_text, 0, true)?;
        if end != return_text.len() {
            return Err(malformed_error!(
                "Trailing data in method descriptor '{}'",
                descriptor
            ));
        }

        Ok(MethodDescriptor {
            arguments,
            return_type: TypeDescriptor(return_text.to_string()),
        })
    }

    /// Builds a descriptor from already validated parts.
    #[must_use]
    pub fn new(arguments: Vec<TypeDescriptor>, return_type: TypeDescriptor) -> Self {
        MethodDescriptor {
            arguments,
            return_type,
        }
    }

    /// The argument types, in declaration order.
    #[must_use]
    pub fn arguments(&self) -> &[TypeDescriptor] {
        &self.arguments
    }

    /// The return type.
    #[must_use]
    pub fn return_type(&self) -> &TypeDescriptor {
        &self.return_type
    }

    /// Two methods of the same class clash when their argument lists are equal, regardless of
    /// their return types.
    #[must_use]
    pub fn can_conflict_with(&self, other: &MethodDescriptor) -> bool {
        self.arguments == other.arguments
    }

    /// Returns true if any argument or the return type refers to `class` or a class nested inside
    /// it.
    #[must_use]
    pub fn references_class(&self, class: &Entry) -> bool {
        self.arguments
            .iter()
            .chain(std::iter::once(&self.return_type))
            .any(|descriptor| descriptor.references_class(class))
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for argument in &self.arguments {
            f.write_str(argument.as_str())?;
        }
        write!(f, "){}", self.return_type)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodDescriptor({self})")
    }
}

impl Translatable for MethodDescriptor {
    fn translate(&self, translator: &dyn Translator) -> Self {
        MethodDescriptor {
            arguments: self.arguments.translate(translator),
            return_type: self.return_type.translate(translator),
        }
    }
}

/// Scans one type starting at `start` and returns the offset just past it.
fn scan_type(text: &str, start: usize, allow_void: bool) -> Result<usize> {
    let bytes = text.as_bytes();
    let mut position = start;

    while bytes.get(position) == Some(&b'[') {
        position += 1;
    }
    let is_array = position > start;

    match bytes.get(position) {
        Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => Ok(position + 1),
        Some(b'V') if allow_void && !is_array => Ok(position + 1),
        Some(b'L') => {
            let Some(length) = text[position..].find(';') else {
                return Err(malformed_error!(
                    "Unterminated class type in descriptor '{}'",
                    text
                ));
            };
            if length == 1 {
                return Err(malformed_error!("Empty class name in descriptor '{}'", text));
            }
            Ok(position + length + 1)
        }
        Some(other) => Err(malformed_error!(
            "Unexpected '{}' in descriptor '{}'",
            *other as char,
            text
        )),
        None => Err(malformed_error!("Truncated descriptor '{}'", text)),
    }
}
