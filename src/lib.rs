// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # mapscope
//!
//! A bidirectional name mapping engine for obfuscated programs, with a TCP server that lets
//! several people rename the same program at once.
//!
//! Every identifier of the program (classes, fields and methods) is an [`Entry`]. A
//! [`BidirectionalMapper`] keeps two trees in lockstep: one from obfuscated entries to their
//! deobfuscated names, and its mirror from deobfuscated entries back to obfuscated names. Renames
//! are validated against both trees before anything is written, and propagate to every entry that
//! must share a name, such as overriding methods.
//!
//! ## Features
//!
//! - **Mirror-consistent mapping** - both directions are updated together or not at all
//! - **Rename validation** - identifier rules and per-scope conflict detection
//! - **Inheritance aware** - renaming a method renames its overrides and bridges
//! - **Tree algebra** - inversion and composition of whole mapping sets
//! - **Collaborative sessions** - a sync server with per-entry locking and confirmations
//!
//! ## Quick Start
//!
//! ```rust
//! use mapscope::prelude::*;
//!
//! let mut mapper = BidirectionalMapper::default();
//! let class = Entry::class("a");
//! let field = Entry::parse_field(&class, "b", "I")?;
//!
//! mapper.map_from_obf(&class, Some(EntryMapping::new("net/example/Counter")))?;
//! mapper.map_from_obf(&field, Some(EntryMapping::new("count")))?;
//!
//! let deobfuscated = mapper.deobfuscate(&field);
//! assert_eq!(deobfuscated.name(), "count");
//! assert_eq!(mapper.obfuscate(&deobfuscated), field);
//! # Ok::<(), mapscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`translation`] - the entry model, JVM descriptors and translators
//! - [`mapping`] - mapping trees, the bidirectional mapper, validation and tree algebra
//! - [`network`] - wire protocol, sync server and client
//! - [`prelude`] - convenient re-exports of commonly used types
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result):
//!
//! ```rust
//! use mapscope::{BidirectionalMapper, Entry, EntryMapping, Error};
//!
//! let mut mapper = BidirectionalMapper::default();
//! match mapper.map_from_obf(&Entry::class("a"), Some(EntryMapping::new("not a name"))) {
//!     Err(Error::IllegalName { reason, .. }) => println!("rejected: {reason}"),
//!     Err(e) => println!("Other error: {e}"),
//!     Ok(()) => println!("renamed"),
//! }
//! ```
//!
//! ## Development and Testing
//!
//! ### Fuzzing
//!
//! ```bash
//! cargo +nightly fuzz run packet --release
//! ```
//!
//! ### Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use mapscope::prelude::*;
///
/// let mapper = BidirectionalMapper::default();
/// assert!(mapper.obf_to_deobf().is_empty());
/// ```
pub mod prelude;

/// Identifiers and their translation between name spaces.
///
/// # Key Types
///
/// - [`Entry`] - a class, field or method, identified by its parent chain
/// - [`translation::TypeDescriptor`] / [`translation::MethodDescriptor`] - member descriptors
/// - [`translation::Translator`] - projects entries into another name space
pub mod translation;

/// Mapping trees and the bidirectional mapper.
///
/// # Key Types
///
/// - [`MappingTree`] - hierarchical store of [`EntryMapping`]s
/// - [`BidirectionalMapper`] - paired trees with validated, propagating updates
/// - [`mapping::EntryResolver`] - equivalence of entries across a class hierarchy
///
/// # Examples
///
/// ```rust
/// use mapscope::{mapping::algebra::invert, Entry, EntryMapping, MappingTree};
///
/// let mut tree = MappingTree::new();
/// tree.insert(&Entry::class("a"), Some(EntryMapping::new("Foo")));
///
/// let inverted = invert(&tree);
/// assert_eq!(
///     inverted.get(&Entry::class("Foo")).map(EntryMapping::target_name),
///     Some("a")
/// );
/// ```
pub mod mapping;

/// Collaborative editing over TCP.
///
/// # Key Types
///
/// - [`network::SyncServer`] - hosts one mapping state for many clients
/// - [`network::SyncClient`] - a blocking client connection
/// - [`network::ClientPacket`] / [`network::ServerPacket`] - the wire protocol
pub mod network;

/// `mapscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `mapscope` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// The identity of a class, field or method.
pub use translation::{Entry, EntryKind};

/// Mapping state.
pub use mapping::{BidirectionalMapper, EntryMapping, MappingTree};
