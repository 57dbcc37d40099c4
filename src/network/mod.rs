//! Collaborative synchronization of mapping state over TCP.
//!
//! One [`SyncServer`] owns the authoritative [`crate::BidirectionalMapper`]. Clients connect, log
//! in against the artifact checksum, receive every mapping, and from then on send rename requests
//! and receive the renames of everyone else.
//!
//! # Architecture
//!
//! - [`io`] - big-endian wire primitives and the entry encoding
//! - [`ClientPacket`] / [`ServerPacket`] - the two packet families and their opcodes
//! - [`SyncSession`] - roster, usernames and the per-entry lock tables
//! - [`SyncServer`] - acceptor, per-connection I/O threads and the single mutation thread
//! - [`SyncClient`] - a blocking client connection
//! - [`ServerConfig`] / [`ArtifactChecksum`] - server configuration
//!
//! # Locking
//!
//! Every accepted change is stamped with a fresh [`SyncId`] and broadcast to every other client.
//! Until each of them has confirmed that sync id, none of them may change the same entry again:
//! otherwise a client could rename an entry based on a name it has not seen yet. The requester
//! itself is free to keep editing.

pub mod io;

mod checksum;
mod client;
mod config;
mod packet;
mod server;
mod session;

pub use checksum::ArtifactChecksum;
pub use client::SyncClient;
pub use config::ServerConfig;
pub use packet::{ClientOpcode, ClientPacket, ServerOpcode, ServerPacket};
pub use server::SyncServer;
pub use session::{ClientId, SyncSession};

/// TCP port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 34712;

/// Version of the wire protocol. Clients speaking another version are turned away at login.
pub const PROTOCOL_VERSION: u16 = 0;

/// Size of an [`ArtifactChecksum`] in bytes (SHA-1).
pub const CHECKSUM_SIZE: usize = 20;

/// Identifier of one broadcast change awaiting confirmation.
pub type SyncId = u16;

/// Sync id attached to messages that do not take a lock: the initial confirmation after login and
/// corrections sent in reply to a rejected request.
pub const DUMMY_SYNC_ID: SyncId = 0;

/// Kick reasons sent to clients. Clients are expected to translate these keys for display.
pub mod kick_reason {
    /// The client speaks another protocol version.
    pub const WRONG_VERSION: &str = "disconnect.wrong_version";
    /// Another client already uses the requested username.
    pub const USERNAME_TAKEN: &str = "disconnect.username_taken";
    /// The password does not match the server's.
    pub const WRONG_PASSWORD: &str = "disconnect.wrong_password";
    /// The client has a different artifact open.
    pub const WRONG_JAR: &str = "disconnect.wrong_jar";
    /// The server is shutting down.
    pub const SERVER_CLOSED: &str = "disconnect.server_closed";
    /// The client sent something the server could not understand.
    pub const PROTOCOL_VIOLATION: &str = "disconnect.protocol_violation";
}
