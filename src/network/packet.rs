//! Packets of the sync protocol.
//!
//! Each packet is a one byte opcode followed by its fields. Opcodes are scoped by direction, so
//! the same byte means different things for [`ClientPacket`] (client to server) and
//! [`ServerPacket`] (server to client).
//!
//! | Opcode | Client → Server | Server → Client |
//! |--------|-----------------|-----------------|
//! | 0 | `Login` | `Kick` |
//! | 1 | `ConfirmChange` | `SyncMappings` |
//! | 2 | `Rename` | `Rename` |
//! | 3 | `RemoveMapping` | `RemoveMapping` |
//! | 4 | `ChangeDocs` | `ChangeDocs` |
//! | 5 | | `UserList` |

use std::io::{Read, Write};

use strum::{Display, FromRepr};

use crate::{
    mapping::EntryMapping,
    network::{
        io::{
            read_array, read_be, read_bool, read_entry, read_optional_string, read_string,
            write_be, write_bool, write_entry, write_optional_string, write_string,
        },
        ArtifactChecksum, SyncId,
    },
    translation::Entry,
    Error, Result,
};

/// Largest number of mappings preallocated while decoding a [`ServerPacket::SyncMappings`].
const MAX_PREALLOCATED_MAPPINGS: usize = 4096;

/// Opcodes of packets sent by clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, FromRepr)]
#[repr(u8)]
pub enum ClientOpcode {
    /// Handshake
    Login = 0,
    /// Acknowledges a broadcast change
    ConfirmChange = 1,
    /// Requests a rename
    Rename = 2,
    /// Requests removal of a mapping
    RemoveMapping = 3,
    /// Requests a documentation change
    ChangeDocs = 4,
}

/// Opcodes of packets sent by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, FromRepr)]
#[repr(u8)]
pub enum ServerOpcode {
    /// Connection is being closed
    Kick = 0,
    /// Full mapping state after login
    SyncMappings = 1,
    /// Another client renamed an entry
    Rename = 2,
    /// Another client removed a mapping
    RemoveMapping = 3,
    /// Another client changed documentation
    ChangeDocs = 4,
    /// Usernames of every logged in client
    UserList = 5,
}

/// A packet sent from a client to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientPacket {
    /// First packet of every connection.
    Login {
        /// Protocol version the client speaks
        version: u16,
        /// Checksum of the client's artifact
        checksum: ArtifactChecksum,
        /// Password, if the client has one
        password: Option<String>,
        /// Name shown to other users
        username: String,
    },
    /// Acknowledges the change with `sync_id`.
    ConfirmChange {
        /// The acknowledged change
        sync_id: SyncId,
    },
    /// Renames an obfuscated entry.
    Rename {
        /// The obfuscated entry
        entry: Entry,
        /// The new deobfuscated simple name
        new_name: String,
        /// Whether viewers should rebuild their class tree
        refresh_class_tree: bool,
    },
    /// Clears the mapping of an obfuscated entry.
    RemoveMapping {
        /// The obfuscated entry
        entry: Entry,
    },
    /// Sets or clears the documentation of an obfuscated entry.
    ChangeDocs {
        /// The obfuscated entry
        entry: Entry,
        /// New documentation, `None` to clear
        docs: Option<String>,
    },
}

impl ClientPacket {
    /// The opcode this packet is sent with.
    #[must_use]
    pub fn opcode(&self) -> ClientOpcode {
        match self {
            ClientPacket::Login { .. } => ClientOpcode::Login,
            ClientPacket::ConfirmChange { .. } => ClientOpcode::ConfirmChange,
            ClientPacket::Rename { .. } => ClientOpcode::Rename,
            ClientPacket::RemoveMapping { .. } => ClientOpcode::RemoveMapping,
            ClientPacket::ChangeDocs { .. } => ClientOpcode::ChangeDocs,
        }
    }

    /// Decodes the next packet from `reader`.
    ///
    /// # Errors
    /// Returns [`Error::ProtocolViolation`] for unknown opcodes, [`Error::Malformed`] for invalid
    /// fields and [`Error::TransportFault`] if the stream fails.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let byte = read_be::<u8, _>(reader)?;
        let Some(opcode) = ClientOpcode::from_repr(byte) else {
            return Err(Error::ProtocolViolation(format!(
                "unknown client opcode {byte}"
            )));
        };

        match opcode {
            ClientOpcode::Login => Ok(ClientPacket::Login {
                version: read_be(reader)?,
                checksum: ArtifactChecksum::new(read_array(reader)?),
                password: read_optional_string(reader)?,
                username: read_string(reader)?,
            }),
            ClientOpcode::ConfirmChange => Ok(ClientPacket::ConfirmChange {
                sync_id: read_be(reader)?,
            }),
            ClientOpcode::Rename => Ok(ClientPacket::Rename {
                entry: read_entry(reader)?,
                new_name: read_string(reader)?,
                refresh_class_tree: read_bool(reader)?,
            }),
            ClientOpcode::RemoveMapping => Ok(ClientPacket::RemoveMapping {
                entry: read_entry(reader)?,
            }),
            ClientOpcode::ChangeDocs => Ok(ClientPacket::ChangeDocs {
                entry: read_entry(reader)?,
                docs: read_optional_string(reader)?,
            }),
        }
    }

    /// Encodes this packet to `writer`.
    ///
    /// # Errors
    /// Returns [`Error::TransportFault`] if the stream fails, or [`Error::Malformed`] for strings
    /// that exceed the wire limit.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        write_be(writer, self.opcode() as u8)?;

        match self {
            ClientPacket::Login {
                version,
                checksum,
                password,
                username,
            } => {
                write_be(writer, *version)?;
                writer.write_all(checksum.as_bytes())?;
                write_optional_string(writer, password.as_deref())?;
                write_string(writer, username)
            }
            ClientPacket::ConfirmChange { sync_id } => write_be(writer, *sync_id),
            ClientPacket::Rename {
                entry,
                new_name,
                refresh_class_tree,
            } => {
                write_entry(writer, entry)?;
                write_string(writer, new_name)?;
                write_bool(writer, *refresh_class_tree)
            }
            ClientPacket::RemoveMapping { entry } => write_entry(writer, entry),
            ClientPacket::ChangeDocs { entry, docs } => {
                write_entry(writer, entry)?;
                write_optional_string(writer, docs.as_deref())
            }
        }
    }

    /// Encodes this packet into a fresh buffer.
    ///
    /// # Errors
    /// See [`ClientPacket::write`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write(&mut buffer)?;
        Ok(buffer)
    }
}

/// A packet sent from the server to a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerPacket {
    /// The server closes the connection.
    Kick {
        /// Translation key of the reason
        reason: String,
    },
    /// Full mapping state, sent once after a successful login.
    SyncMappings {
        /// Checksum of the server's artifact
        checksum: ArtifactChecksum,
        /// Every obfuscated entry with its mapping, parents first
        mappings: Vec<(Entry, EntryMapping)>,
    },
    /// An entry was renamed.
    Rename {
        /// Change to confirm, or [`crate::network::DUMMY_SYNC_ID`] for corrections
        sync_id: SyncId,
        /// The obfuscated entry
        entry: Entry,
        /// Its new deobfuscated simple name
        new_name: String,
        /// Whether viewers should rebuild their class tree
        refresh_class_tree: bool,
    },
    /// A mapping was cleared.
    RemoveMapping {
        /// Change to confirm
        sync_id: SyncId,
        /// The obfuscated entry
        entry: Entry,
    },
    /// Documentation changed.
    ChangeDocs {
        /// Change to confirm
        sync_id: SyncId,
        /// The obfuscated entry
        entry: Entry,
        /// New documentation, `None` if cleared
        docs: Option<String>,
    },
    /// Usernames of every logged in client, sorted.
    UserList {
        /// The usernames
        users: Vec<String>,
    },
}

impl ServerPacket {
    /// The opcode this packet is sent with.
    #[must_use]
    pub fn opcode(&self) -> ServerOpcode {
        match self {
            ServerPacket::Kick { .. } => ServerOpcode::Kick,
            ServerPacket::SyncMappings { .. } => ServerOpcode::SyncMappings,
            ServerPacket::Rename { .. } => ServerOpcode::Rename,
            ServerPacket::RemoveMapping { .. } => ServerOpcode::RemoveMapping,
            ServerPacket::ChangeDocs { .. } => ServerOpcode::ChangeDocs,
            ServerPacket::UserList { .. } => ServerOpcode::UserList,
        }
    }

    /// The sync id a client must confirm after applying this packet, if any.
    #[must_use]
    pub fn sync_id(&self) -> Option<SyncId> {
        match self {
            ServerPacket::Rename { sync_id, .. }
            | ServerPacket::RemoveMapping { sync_id, .. }
            | ServerPacket::ChangeDocs { sync_id, .. } => Some(*sync_id),
            _ => None,
        }
    }

    /// Decodes the next packet from `reader`.
    ///
    /// # Errors
    /// Returns [`Error::ProtocolViolation`] for unknown opcodes, [`Error::Malformed`] for invalid
    /// fields and [`Error::TransportFault`] if the stream fails.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let byte = read_be::<u8, _>(reader)?;
        let Some(opcode) = ServerOpcode::from_repr(byte) else {
            return Err(Error::ProtocolViolation(format!(
                "unknown server opcode {byte}"
            )));
        };

        match opcode {
            ServerOpcode::Kick => Ok(ServerPacket::Kick {
                reason: read_string(reader)?,
            }),
            ServerOpcode::SyncMappings => {
                let checksum = ArtifactChecksum::new(read_array(reader)?);
                let count = read_be::<u32, _>(reader)? as usize;

                let mut mappings = Vec::with_capacity(count.min(MAX_PREALLOCATED_MAPPINGS));
                for _ in 0..count {
                    let entry = read_entry(reader)?;
                    let target_name = read_string(reader)?;
                    let docs = read_optional_string(reader)?;
                    mappings.push((entry, EntryMapping::new(target_name).with_docs(docs)));
                }
                Ok(ServerPacket::SyncMappings { checksum, mappings })
            }
            ServerOpcode::Rename => Ok(ServerPacket::Rename {
                sync_id: read_be(reader)?,
                entry: read_entry(reader)?,
                new_name: read_string(reader)?,
                refresh_class_tree: read_bool(reader)?,
            }),
            ServerOpcode::RemoveMapping => Ok(ServerPacket::RemoveMapping {
                sync_id: read_be(reader)?,
                entry: read_entry(reader)?,
            }),
            ServerOpcode::ChangeDocs => Ok(ServerPacket::ChangeDocs {
                sync_id: read_be(reader)?,
                entry: read_entry(reader)?,
                docs: read_optional_string(reader)?,
            }),
            ServerOpcode::UserList => {
                let count = read_be::<u16, _>(reader)?;
                let users = (0..count)
                    .map(|_| read_string(reader))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ServerPacket::UserList { users })
            }
        }
    }

    /// Encodes this packet to `writer`.
    ///
    /// # Errors
    /// Returns [`Error::TransportFault`] if the stream fails, or [`Error::Malformed`] for strings
    /// or lists that exceed the wire limits.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        write_be(writer, self.opcode() as u8)?;

        match self {
            ServerPacket::Kick { reason } => write_string(writer, reason),
            ServerPacket::SyncMappings { checksum, mappings } => {
                writer.write_all(checksum.as_bytes())?;
                let Ok(count) = u32::try_from(mappings.len()) else {
                    return Err(malformed_error!("Too many mappings: {}", mappings.len()));
                };
                write_be(writer, count)?;
                for (entry, mapping) in mappings {
                    write_entry(writer, entry)?;
                    write_string(writer, mapping.target_name())?;
                    write_optional_string(writer, mapping.docs())?;
                }
                Ok(())
            }
            ServerPacket::Rename {
                sync_id,
                entry,
                new_name,
                refresh_class_tree,
            } => {
                write_be(writer, *sync_id)?;
                write_entry(writer, entry)?;
                write_string(writer, new_name)?;
                write_bool(writer, *refresh_class_tree)
            }
            ServerPacket::RemoveMapping { sync_id, entry } => {
                write_be(writer, *sync_id)?;
                write_entry(writer, entry)
            }
            ServerPacket::ChangeDocs {
                sync_id,
                entry,
                docs,
            } => {
                write_be(writer, *sync_id)?;
                write_entry(writer, entry)?;
                write_optional_string(writer, docs.as_deref())
            }
            ServerPacket::UserList { users } => {
                let Ok(count) = u16::try_from(users.len()) else {
                    return Err(malformed_error!("Too many users: {}", users.len()));
                };
                write_be(writer, count)?;
                for user in users {
                    write_string(writer, user)?;
                }
                Ok(())
            }
        }
    }

    /// Encodes this packet into a fresh buffer.
    ///
    /// # Errors
    /// See [`ServerPacket::write`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write(&mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::test::{class, method};

    #[test]
    fn test_confirm_layout() {
        let bytes = ClientPacket::ConfirmChange { sync_id: 0x0102 }
            .to_bytes()
            .unwrap();
        assert_eq!(bytes, [1, 0x01, 0x02]);
    }

    #[test]
    fn test_login_round_trip() {
        let packet = ClientPacket::Login {
            version: 0,
            checksum: ArtifactChecksum::from_bytes(b"jar"),
            password: Some("secret".into()),
            username: "alice".into(),
        };

        let bytes = packet.to_bytes().unwrap();
        assert_eq!(bytes[0], ClientOpcode::Login as u8);
        assert_eq!(ClientPacket::read(&mut Cursor::new(bytes)).unwrap(), packet);
    }

    #[test]
    fn test_sync_mappings_round_trip() {
        let owner = class("a");
        let packet = ServerPacket::SyncMappings {
            checksum: ArtifactChecksum::default(),
            mappings: vec![
                (owner.clone(), EntryMapping::new("Foo").with_docs(Some("docs".into()))),
                (method(&owner, "a", "()V"), EntryMapping::new("run")),
            ],
        };

        let bytes = packet.to_bytes().unwrap();
        assert_eq!(ServerPacket::read(&mut Cursor::new(bytes)).unwrap(), packet);
    }

    #[test]
    fn test_unknown_opcodes() {
        assert!(matches!(
            ClientPacket::read(&mut Cursor::new([5u8])),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(matches!(
            ServerPacket::read(&mut Cursor::new([0xffu8])),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_truncated_packet() {
        let mut bytes = ServerPacket::Kick {
            reason: "disconnect.server_closed".into(),
        }
        .to_bytes()
        .unwrap();
        bytes.truncate(5);

        assert!(matches!(
            ServerPacket::read(&mut Cursor::new(bytes)),
            Err(Error::TransportFault(_))
        ));
    }

    #[test]
    fn test_sync_id() {
        let packet = ServerPacket::RemoveMapping {
            sync_id: 9,
            entry: class("a"),
        };
        assert_eq!(packet.sync_id(), Some(9));
        assert_eq!(ServerPacket::UserList { users: vec![] }.sync_id(), None);
        assert_eq!(ServerOpcode::UserList.to_string(), "UserList");
    }
}
