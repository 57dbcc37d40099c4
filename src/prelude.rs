//! # mapscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the mapscope library.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all mapscope operations
pub use crate::Error;

/// The result type used throughout mapscope
pub use crate::Result;

// ================================================================================================
// Identifiers and Translation
// ================================================================================================

/// Identity of classes, fields and methods
pub use crate::translation::{Entry, EntryKind};

/// Member descriptors
pub use crate::translation::{MethodDescriptor, TypeDescriptor};

/// Projection of values between name spaces
pub use crate::translation::{MappingTranslator, Translatable, Translator};

// ================================================================================================
// Mapping State
// ================================================================================================

/// Mapping trees and their records
pub use crate::mapping::{EntryMapping, MappingNode, MappingTree};

/// The bidirectional mapper and its change log
pub use crate::mapping::{BidirectionalMapper, MappingChange, MappingDelta};

/// Entry resolution across class hierarchies
pub use crate::mapping::{ClassHierarchy, EntryResolver, IndexEntryResolver, VoidEntryResolver};

// ================================================================================================
// Collaboration
// ================================================================================================

/// Sync server, client and their configuration
pub use crate::network::{ArtifactChecksum, ServerConfig, SyncClient, SyncServer};
