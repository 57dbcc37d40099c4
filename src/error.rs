use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into three groups with very different blast radii: rename rejections are
/// recoverable and only ever reported back to the requesting client, connection faults are fatal
/// to a single connection, and an invariant violation is fatal to the whole mutation context.
///
/// # Error Categories
///
/// ## Rename Errors
/// - [`Error::NameConflict`] - The proposed name collides with an existing entry
/// - [`Error::IllegalName`] - The proposed name is not a legal identifier
///
/// ## Decoding Errors
/// - [`Error::Malformed`] - Corrupted descriptor or wire data
///
/// ## Session Errors
/// - [`Error::ProtocolViolation`] - Unknown or malformed request on a connection
/// - [`Error::ChecksumMismatch`] - The peers annotate different artifacts
/// - [`Error::VersionMismatch`] - The peers speak different protocol versions
/// - [`Error::TransportFault`] - Socket level I/O error
/// - [`Error::Kicked`] - The server closed the session
///
/// ## Internal Errors
/// - [`Error::InvariantViolation`] - The obfuscated/deobfuscated mirror no longer holds
/// - [`Error::SyncIdsExhausted`] - Every sync id is held by an outstanding lock
/// - [`Error::ServerStopped`] - The mutation context is no longer running
///
/// # Examples
///
/// ```rust
/// use mapscope::{BidirectionalMapper, Entry, EntryMapping, Error};
///
/// let mut mapper = BidirectionalMapper::default();
/// let first = Entry::class("a");
/// let second = Entry::class("b");
///
/// mapper.map_from_obf(&first, Some(EntryMapping::new("Foo")))?;
/// match mapper.map_from_obf(&second, Some(EntryMapping::new("Foo"))) {
///     Err(Error::NameConflict { name, .. }) => assert_eq!(name, "Foo"),
///     other => panic!("unexpected result: {other:?}"),
/// }
/// # Ok::<(), mapscope::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Descriptor text or wire data could not be decoded.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The proposed name is already taken inside the scope of the renamed entry.
    ///
    /// Raised by the validator before anything is committed, so both mapping trees are left
    /// exactly as they were.
    #[error("Name '{name}' is not unique in {scope}")]
    NameConflict {
        /// The rejected name
        name: String,
        /// Human readable description of the scope that already holds the name
        scope: String,
    },

    /// The proposed name is not a legal identifier for the renamed entry.
    #[error("Illegal name '{name}': {reason}")]
    IllegalName {
        /// The rejected name
        name: String,
        /// Why the name was rejected
        reason: String,
    },

    /// A peer sent an unknown opcode or a payload that could not be decoded.
    ///
    /// Fatal to the offending connection only.
    #[error("Protocol violation - {0}")]
    ProtocolViolation(String),

    /// The peers annotate different binary artifacts.
    #[error("Artifact checksum mismatch")]
    ChecksumMismatch,

    /// The peers speak different protocol versions.
    #[error("Protocol version mismatch - expected {expected}, got {actual}")]
    VersionMismatch {
        /// Version spoken by this side
        expected: u32,
        /// Version announced by the peer
        actual: u32,
    },

    /// Socket level I/O error.
    ///
    /// Never propagated beyond the connection it occurred on.
    #[error("{0}")]
    TransportFault(#[from] std::io::Error),

    /// The server closed this session, carrying the reason it announced.
    #[error("Kicked by server - {0}")]
    Kicked(String),

    /// The obfuscated to deobfuscated mirror no longer holds after an update.
    ///
    /// This is a logic failure, not a user error. The server treats it as fatal to the mutation
    /// context.
    #[error("Mapping invariant violated - {0}")]
    InvariantViolation(String),

    /// Every usable sync id is currently held by an outstanding lock.
    #[error("No free sync id available")]
    SyncIdsExhausted,

    /// The server's mutation context is no longer running.
    #[error("Server is not running")]
    ServerStopped,
}
