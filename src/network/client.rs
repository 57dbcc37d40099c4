//! A blocking sync client.

use std::{
    io::{BufReader, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, trace};

use crate::{
    mapping::{EntryMapping, MappingTree},
    network::{ArtifactChecksum, ClientPacket, ServerPacket, SyncId, DUMMY_SYNC_ID, PROTOCOL_VERSION},
    translation::Entry,
    Error, Result,
};

/// One logged in connection to a [`crate::network::SyncServer`].
///
/// The client does not apply incoming changes anywhere: callers receive them through
/// [`SyncClient::next_change`], apply them to their own state, and confirm them with
/// [`SyncClient::confirm`].
///
/// # Examples
///
/// ```rust,no_run
/// use mapscope::{network::{ArtifactChecksum, SyncClient}, Entry};
///
/// let checksum = ArtifactChecksum::from_bytes(b"program");
/// let mut client = SyncClient::connect("127.0.0.1:34712", "alice", None, checksum)?;
/// client.rename(&Entry::class("a"), "Foo", false)?;
/// # Ok::<(), mapscope::Error>(())
/// ```
#[derive(Debug)]
pub struct SyncClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    mappings: MappingTree,
    users: Vec<String>,
}

impl SyncClient {
    /// Connects, logs in and receives the initial mapping state.
    ///
    /// The initial state is acknowledged right away, so the returned client may send changes.
    ///
    /// ## Arguments
    /// * 'addr' - Address of the server
    /// * 'username' - Name shown to other users
    /// * 'password' - Server password, if it has one
    /// * 'checksum' - Checksum of the local artifact
    ///
    /// # Errors
    /// Returns [`Error::Kicked`] if the server refuses the login, [`Error::ChecksumMismatch`] if
    /// the server annotates another artifact, and [`Error::TransportFault`] on socket errors.
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        username: &str,
        password: Option<&str>,
        checksum: ArtifactChecksum,
    ) -> Result<SyncClient> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;

        let mut client = SyncClient {
            reader: BufReader::new(stream.try_clone()?),
            writer: stream,
            mappings: MappingTree::new(),
            users: Vec::new(),
        };

        client.send(&ClientPacket::Login {
            version: PROTOCOL_VERSION,
            checksum,
            password: password.map(String::from),
            username: username.to_owned(),
        })?;

        loop {
            match client.recv()? {
                ServerPacket::SyncMappings {
                    checksum: remote,
                    mappings,
                } => {
                    if remote != checksum {
                        return Err(Error::ChecksumMismatch);
                    }
                    debug!("Received {} mappings", mappings.len());
                    client.mappings = mappings.into_iter().collect();
                    break;
                }
                ServerPacket::UserList { users } => client.users = users,
                other => {
                    return Err(Error::ProtocolViolation(format!(
                        "{} before SyncMappings",
                        other.opcode()
                    )))
                }
            }
        }

        client.confirm(DUMMY_SYNC_ID)?;
        Ok(client)
    }

    /// The mapping state received at login.
    #[must_use]
    pub fn mappings(&self) -> &MappingTree {
        &self.mappings
    }

    /// Looks up the mapping of `entry` in the state received at login.
    #[must_use]
    pub fn initial_mapping(&self, entry: &Entry) -> Option<&EntryMapping> {
        self.mappings.get(entry)
    }

    /// The most recent user list sent by the server.
    #[must_use]
    pub fn users(&self) -> &[String] {
        &self.users
    }

    /// Limits how long [`SyncClient::recv`] blocks. `None` blocks forever.
    ///
    /// # Errors
    /// Returns [`Error::TransportFault`] if the socket rejects the timeout.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    /// Sends one packet.
    ///
    /// # Errors
    /// Returns [`Error::TransportFault`] if the socket fails.
    pub fn send(&mut self, packet: &ClientPacket) -> Result<()> {
        trace!("Sending {}", packet.opcode());
        let bytes = packet.to_bytes()?;
        self.writer.write_all(&bytes)?;
        Ok(())
    }

    /// Receives the next packet, whatever it is.
    ///
    /// # Errors
    /// Returns [`Error::Kicked`] if the packet is a kick, otherwise see [`ServerPacket::read`].
    pub fn recv(&mut self) -> Result<ServerPacket> {
        match ServerPacket::read(&mut self.reader)? {
            ServerPacket::Kick { reason } => Err(Error::Kicked(reason)),
            packet => {
                trace!("Received {}", packet.opcode());
                Ok(packet)
            }
        }
    }

    /// Receives the next change, remembering user lists on the way.
    ///
    /// # Errors
    /// See [`SyncClient::recv`].
    pub fn next_change(&mut self) -> Result<ServerPacket> {
        loop {
            match self.recv()? {
                ServerPacket::UserList { users } => self.users = users,
                packet => return Ok(packet),
            }
        }
    }

    /// Asks the server to rename `entry`.
    ///
    /// # Errors
    /// Returns [`Error::TransportFault`] if the socket fails.
    pub fn rename(&mut self, entry: &Entry, new_name: &str, refresh_class_tree: bool) -> Result<()> {
        self.send(&ClientPacket::Rename {
            entry: entry.clone(),
            new_name: new_name.to_owned(),
            refresh_class_tree,
        })
    }

    /// Asks the server to clear the mapping of `entry`.
    ///
    /// # Errors
    /// Returns [`Error::TransportFault`] if the socket fails.
    pub fn remove_mapping(&mut self, entry: &Entry) -> Result<()> {
        self.send(&ClientPacket::RemoveMapping {
            entry: entry.clone(),
        })
    }

    /// Asks the server to set or clear the documentation of `entry`.
    ///
    /// # Errors
    /// Returns [`Error::TransportFault`] if the socket fails.
    pub fn change_docs(&mut self, entry: &Entry, docs: Option<&str>) -> Result<()> {
        self.send(&ClientPacket::ChangeDocs {
            entry: entry.clone(),
            docs: docs.map(String::from),
        })
    }

    /// Acknowledges the change `sync_id`.
    ///
    /// # Errors
    /// Returns [`Error::TransportFault`] if the socket fails.
    pub fn confirm(&mut self, sync_id: SyncId) -> Result<()> {
        self.send(&ClientPacket::ConfirmChange { sync_id })
    }

    /// Closes the connection.
    pub fn disconnect(self) {
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}
