//! The sync server.
//!
//! # Threads
//!
//! - `Server client listener` accepts connections.
//! - `Server I/O thread #n` reads and decodes the packets of connection `n`.
//! - `Server writer #n` writes the packets queued for connection `n`, so a slow client never
//!   blocks anyone else. It reports its exit so the mutation thread can join it.
//! - `Server mutation thread` owns the [`BidirectionalMapper`] and the [`SyncSession`] and
//!   handles every event in the order it arrives.
//!
//! All threads talk to the mutation thread through one unbounded [`crossbeam_channel`]. Because
//! a connection's reader is its only packet source, the packets of one client are handled in the
//! order they were sent.
//!
//! # Failure handling
//!
//! Undecodable input and failed writes only cost the offending connection. An
//! [`Error::InvariantViolation`] from the mapper means the mapping state can no longer be trusted:
//! the mutation thread kicks everyone and stops. A change that cannot get a sync id because every
//! id is outstanding is still broadcast, with the dummy id, so no client misses it.

use std::{
    collections::HashMap,
    io::{BufReader, BufWriter, Write},
    ops::ControlFlow,
    net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, trace, warn};

use crate::{
    mapping::{BidirectionalMapper, EntryMapping},
    network::{
        kick_reason, ArtifactChecksum, ClientId, ClientPacket, ServerConfig, ServerPacket, SyncId,
        SyncSession, DUMMY_SYNC_ID, PROTOCOL_VERSION,
    },
    translation::Entry,
    Error, Result,
};

type Inspection = Box<dyn FnOnce(&BidirectionalMapper, &SyncSession) + Send>;

/// Everything the mutation thread reacts to.
enum ServerEvent {
    Connected {
        client: ClientId,
        outbound: Sender<Outbound>,
        writer: JoinHandle<()>,
    },
    Packet {
        client: ClientId,
        packet: ClientPacket,
    },
    Disconnected {
        client: ClientId,
    },
    ProtocolViolation {
        client: ClientId,
        message: String,
    },
    TransportFault {
        client: ClientId,
        message: String,
    },
    WriterExited {
        client: ClientId,
    },
    Inspect(Inspection),
    Shutdown,
}

/// Work for a connection's writer thread.
enum Outbound {
    Packet(ServerPacket),
    Close,
}

/// A running sync server.
///
/// Dropping the server stops it. Use [`SyncServer::stop`] to get the final mapping state back.
///
/// # Examples
///
/// ```rust,no_run
/// use mapscope::{
///     network::{ServerConfig, SyncServer},
///     BidirectionalMapper,
/// };
///
/// let server = SyncServer::start(ServerConfig::default(), BidirectionalMapper::default())?;
/// println!("listening on {}", server.local_addr());
/// let mapper = server.stop()?;
/// # Ok::<(), mapscope::Error>(())
/// ```
pub struct SyncServer {
    local_addr: SocketAddr,
    events: Sender<ServerEvent>,
    running: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
    mutation: Option<JoinHandle<BidirectionalMapper>>,
}

impl SyncServer {
    /// Binds the listening socket and starts serving `mapper`.
    ///
    /// ## Arguments
    /// * 'config' - Listen address, password and artifact checksum
    /// * 'mapper' - The authoritative mapping state
    ///
    /// # Errors
    /// Returns [`Error::TransportFault`] if the socket cannot be bound or a thread cannot be
    /// spawned.
    pub fn start(config: ServerConfig, mapper: BidirectionalMapper) -> Result<SyncServer> {
        let listener = TcpListener::bind(config.socket_addr())?;
        let local_addr = listener.local_addr()?;
        let (events, receiver) = crossbeam_channel::unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let mutation = thread::Builder::new()
            .name("Server mutation thread".to_owned())
            .spawn(move || MutationContext::new(config, mapper).run(&receiver))?;

        let acceptor = {
            let events = events.clone();
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("Server client listener".to_owned())
                .spawn(move || accept_clients(&listener, &events, &running))?
        };

        info!("Server started on {local_addr}");
        Ok(SyncServer {
            local_addr,
            events,
            running,
            acceptor: Some(acceptor),
            mutation: Some(mutation),
        })
    }

    /// The address the server actually listens on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs `inspect` on the mutation thread, after every event queued so far, and returns its
    /// result.
    ///
    /// # Errors
    /// Returns [`Error::ServerStopped`] if the mutation thread is no longer running.
    pub fn inspect<T, F>(&self, inspect: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&BidirectionalMapper, &SyncSession) -> T + Send + 'static,
    {
        let (reply, result) = crossbeam_channel::bounded(1);
        let inspection: Inspection = Box::new(move |mapper, session| {
            let _ = reply.send(inspect(mapper, session));
        });

        self.events
            .send(ServerEvent::Inspect(inspection))
            .map_err(|_| Error::ServerStopped)?;
        result.recv().map_err(|_| Error::ServerStopped)
    }

    /// Kicks every client, stops all threads and returns the final mapping state.
    ///
    /// # Errors
    /// Returns [`Error::ServerStopped`] if the mutation thread died.
    pub fn stop(mut self) -> Result<BidirectionalMapper> {
        self.shutdown();
        self.mutation
            .take()
            .ok_or(Error::ServerStopped)?
            .join()
            .map_err(|_| Error::ServerStopped)
    }

    fn shutdown(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping server on {}", self.local_addr);
        let _ = self.events.send(ServerEvent::Shutdown);

        // The listener only notices the flag once accept returns.
        let wake = match self.local_addr {
            SocketAddr::V4(addr) if addr.ip().is_unspecified() => {
                SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port())
            }
            SocketAddr::V6(addr) if addr.ip().is_unspecified() => {
                SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port())
            }
            addr => addr,
        };
        if let Err(error) = TcpStream::connect(wake) {
            warn!("Failed to wake client listener: {error}");
        }

        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
    }
}

impl Drop for SyncServer {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(mutation) = self.mutation.take() {
            let _ = mutation.join();
        }
    }
}

fn accept_clients(listener: &TcpListener, events: &Sender<ServerEvent>, running: &AtomicBool) {
    let mut next_id = 0u64;

    for stream in listener.incoming() {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let stream = match stream {
            Ok(stream) => stream,
            Err(error) => {
                warn!("Failed to accept connection: {error}");
                continue;
            }
        };

        let client = ClientId::new(next_id);
        next_id += 1;

        if let Err(error) = spawn_connection(client, stream, events) {
            if matches!(error, Error::ServerStopped) {
                break;
            }
            warn!("Failed to set up connection {client}: {error}");
        }
    }
    trace!("Client listener stopped");
}

fn spawn_connection(client: ClientId, stream: TcpStream, events: &Sender<ServerEvent>) -> Result<()> {
    let peer = stream.peer_addr()?;
    stream.set_nodelay(true)?;

    let (outbound, queue) = crossbeam_channel::unbounded();
    let writer = {
        let stream = stream.try_clone()?;
        let events = events.clone();
        thread::Builder::new()
            .name(format!("Server writer {client}"))
            .spawn(move || write_packets(client, stream, &queue, &events))?
    };

    events
        .send(ServerEvent::Connected {
            client,
            outbound,
            writer,
        })
        .map_err(|_| Error::ServerStopped)?;

    let events = events.clone();
    thread::Builder::new()
        .name(format!("Server I/O thread {client}"))
        .spawn(move || read_packets(client, stream, &events))?;

    info!("Client {client} connected from {peer}");
    Ok(())
}

fn read_packets(client: ClientId, stream: TcpStream, events: &Sender<ServerEvent>) {
    let mut reader = BufReader::new(stream);

    loop {
        let event = match ClientPacket::read(&mut reader) {
            Ok(packet) => {
                trace!("Received {} from {client}", packet.opcode());
                ServerEvent::Packet { client, packet }
            }
            Err(Error::TransportFault(_)) => {
                let _ = events.send(ServerEvent::Disconnected { client });
                return;
            }
            Err(error) => {
                let _ = events.send(ServerEvent::ProtocolViolation {
                    client,
                    message: error.to_string(),
                });
                return;
            }
        };

        if events.send(event).is_err() {
            return;
        }
    }
}

fn write_packets(
    client: ClientId,
    stream: TcpStream,
    queue: &Receiver<Outbound>,
    events: &Sender<ServerEvent>,
) {
    let mut writer = BufWriter::new(&stream);

    for outbound in queue {
        let packet = match outbound {
            Outbound::Packet(packet) => packet,
            Outbound::Close => break,
        };

        let written = packet
            .write(&mut writer)
            .and_then(|()| writer.flush().map_err(Error::from));
        if let Err(error) = written {
            let _ = events.send(ServerEvent::TransportFault {
                client,
                message: error.to_string(),
            });
            break;
        }
    }

    let _ = writer.flush();
    let _ = stream.shutdown(Shutdown::Both);
    let _ = events.send(ServerEvent::WriterExited { client });
}

/// A live connection as seen from the mutation thread.
struct Connection {
    outbound: Sender<Outbound>,
    writer: JoinHandle<()>,
}

/// State owned by the mutation thread.
struct MutationContext {
    config: ServerConfig,
    mapper: BidirectionalMapper,
    session: SyncSession,
    connections: HashMap<ClientId, Connection>,
    /// Writers of kicked connections that have not exited yet.
    retired: HashMap<ClientId, JoinHandle<()>>,
}

impl MutationContext {
    fn new(config: ServerConfig, mapper: BidirectionalMapper) -> Self {
        MutationContext {
            config,
            mapper,
            session: SyncSession::new(),
            connections: HashMap::new(),
            retired: HashMap::new(),
        }
    }

    fn run(mut self, events: &Receiver<ServerEvent>) -> BidirectionalMapper {
        trace!("Mutation thread started");

        for event in events {
            if self.handle_event(event).is_break() {
                break;
            }
        }

        let clients: Vec<ClientId> = self.session.clients().collect();
        for client in clients {
            self.kick(client, kick_reason::SERVER_CLOSED, true);
        }
        for (_, writer) in self.retired.drain() {
            let _ = writer.join();
        }

        trace!("Mutation thread stopped");
        self.mapper
    }

    fn handle_event(&mut self, event: ServerEvent) -> ControlFlow<()> {
        match event {
            ServerEvent::Connected {
                client,
                outbound,
                writer,
            } => {
                self.session.connect(client);
                self.connections
                    .insert(client, Connection { outbound, writer });
            }
            ServerEvent::Packet { client, packet } => {
                if !self.session.is_connected(client) {
                    return ControlFlow::Continue(());
                }
                match self.handle_packet(client, packet) {
                    Ok(()) => {}
                    Err(error @ Error::InvariantViolation(_)) => {
                        error!("Stopping server: {error}");
                        return ControlFlow::Break(());
                    }
                    Err(error) => {
                        warn!("Kicking {client}: {error}");
                        self.kick(client, kick_reason::PROTOCOL_VIOLATION, true);
                    }
                }
            }
            ServerEvent::Disconnected { client } => {
                if self.session.is_connected(client) {
                    self.kick(client, "disconnect.disconnected", false);
                }
            }
            ServerEvent::ProtocolViolation { client, message } => {
                warn!("Protocol violation from {client}: {message}");
                self.kick(client, kick_reason::PROTOCOL_VIOLATION, true);
            }
            ServerEvent::TransportFault { client, message } => {
                warn!("Lost connection to {client}: {message}");
                self.kick(client, &message, false);
            }
            ServerEvent::WriterExited { client } => {
                if let Some(writer) = self.retired.remove(&client) {
                    let _ = writer.join();
                    trace!("Writer of {client} joined");
                }
            }
            ServerEvent::Inspect(inspect) => inspect(&self.mapper, &self.session),
            ServerEvent::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn handle_packet(&mut self, client: ClientId, packet: ClientPacket) -> Result<()> {
        let logged_in = self.session.username(client).is_some();

        match packet {
            ClientPacket::Login {
                version,
                checksum,
                password,
                username,
            } => {
                if logged_in {
                    return Err(Error::ProtocolViolation("repeated login".to_owned()));
                }
                self.handle_login(client, version, checksum, password.as_deref(), username);
                Ok(())
            }
            _ if !logged_in => Err(Error::ProtocolViolation(format!(
                "{} before login",
                packet.opcode()
            ))),
            ClientPacket::ConfirmChange { sync_id } => {
                trace!("{client} confirmed change {sync_id}");
                self.session.confirm_change(client, sync_id);
                Ok(())
            }
            ClientPacket::Rename {
                entry,
                new_name,
                refresh_class_tree,
            } => self.handle_rename(client, &entry, &new_name, refresh_class_tree),
            ClientPacket::RemoveMapping { entry } => self.handle_remove(client, &entry),
            ClientPacket::ChangeDocs { entry, docs } => self.handle_docs(client, &entry, docs),
        }
    }

    fn handle_login(
        &mut self,
        client: ClientId,
        version: u16,
        checksum: ArtifactChecksum,
        password: Option<&str>,
        username: String,
    ) {
        if version != PROTOCOL_VERSION {
            let error = Error::VersionMismatch {
                expected: u32::from(PROTOCOL_VERSION),
                actual: u32::from(version),
            };
            info!("Rejecting {client}: {error}");
            self.kick(client, kick_reason::WRONG_VERSION, true);
            return;
        }
        if self.session.is_username_taken(&username) {
            info!("Rejecting {client}: username '{username}' is taken");
            self.kick(client, kick_reason::USERNAME_TAKEN, true);
            return;
        }
        if !self.config.accepts_password(password) {
            info!("Rejecting {client}: wrong password");
            self.kick(client, kick_reason::WRONG_PASSWORD, true);
            return;
        }
        if checksum != self.config.checksum {
            info!("Rejecting {client}: {}", Error::ChecksumMismatch);
            self.kick(client, kick_reason::WRONG_JAR, true);
            return;
        }

        info!("{client} logged in as '{username}'");
        self.session.set_username(client, username);

        let mappings = self
            .mapper
            .obf_to_deobf()
            .iter()
            .filter_map(|node| node.value().map(|value| (node.entry().clone(), value.clone())))
            .collect();
        self.send(
            client,
            ServerPacket::SyncMappings {
                checksum: self.config.checksum,
                mappings,
            },
        );
        self.broadcast_user_list();
    }

    fn handle_rename(
        &mut self,
        client: ClientId,
        entry: &Entry,
        new_name: &str,
        refresh_class_tree: bool,
    ) -> Result<()> {
        if !self.session.can_modify_entry(client, entry) {
            debug!("{client} may not rename {entry:?} yet");
            self.send_correct_mapping(client, entry, refresh_class_tree);
            return Ok(());
        }

        let mapping = match self.mapper.get_deobf_mapping(entry) {
            Some(current) => current.with_target_name(new_name),
            None => EntryMapping::new(new_name),
        };
        if !self.apply(client, entry, Some(mapping))? {
            self.send_correct_mapping(client, entry, refresh_class_tree);
            return Ok(());
        }

        info!("{client} renamed {entry:?} to '{new_name}'");
        let sync_id = self.lock_entry(client, entry);
        self.broadcast_except(
            client,
            &ServerPacket::Rename {
                sync_id,
                entry: entry.clone(),
                new_name: new_name.to_owned(),
                refresh_class_tree,
            },
        );
        Ok(())
    }

    fn handle_remove(&mut self, client: ClientId, entry: &Entry) -> Result<()> {
        if !self.session.can_modify_entry(client, entry) {
            debug!("{client} may not remove {entry:?} yet");
            self.send_correct_mapping(client, entry, false);
            return Ok(());
        }

        self.apply(client, entry, None)?;

        info!("{client} removed the mapping of {entry:?}");
        let sync_id = self.lock_entry(client, entry);
        self.broadcast_except(
            client,
            &ServerPacket::RemoveMapping {
                sync_id,
                entry: entry.clone(),
            },
        );
        Ok(())
    }

    fn handle_docs(&mut self, client: ClientId, entry: &Entry, docs: Option<String>) -> Result<()> {
        let current = self.mapper.get_deobf_mapping(entry).cloned();
        if !self.session.can_modify_entry(client, entry) {
            debug!("{client} may not document {entry:?} yet");
            self.send(
                client,
                ServerPacket::ChangeDocs {
                    sync_id: DUMMY_SYNC_ID,
                    entry: entry.clone(),
                    docs: current.and_then(|mapping| mapping.docs().map(String::from)),
                },
            );
            return Ok(());
        }

        let mapping = match current {
            Some(mapping) if docs.is_none() && mapping.target_name() == entry.name() => None,
            Some(mapping) => Some(mapping.with_docs(docs.clone())),
            None if docs.is_none() => None,
            None => Some(EntryMapping::new(entry.name()).with_docs(docs.clone())),
        };
        if !self.apply(client, entry, mapping)? {
            let restored = self
                .mapper
                .get_deobf_mapping(entry)
                .and_then(|mapping| mapping.docs().map(String::from));
            self.send(
                client,
                ServerPacket::ChangeDocs {
                    sync_id: DUMMY_SYNC_ID,
                    entry: entry.clone(),
                    docs: restored,
                },
            );
            return Ok(());
        }

        info!("{client} changed the docs of {entry:?}");
        let sync_id = self.lock_entry(client, entry);
        self.broadcast_except(
            client,
            &ServerPacket::ChangeDocs {
                sync_id,
                entry: entry.clone(),
                docs,
            },
        );
        Ok(())
    }

    /// Commits a change requested by `client`. Returns false if the mapper rejected it.
    fn apply(
        &mut self,
        client: ClientId,
        entry: &Entry,
        mapping: Option<EntryMapping>,
    ) -> Result<bool> {
        match self.mapper.map_from_obf(entry, mapping) {
            Ok(()) => {}
            Err(error @ (Error::NameConflict { .. } | Error::IllegalName { .. })) => {
                debug!("Rejected change of {entry:?} from {client}: {error}");
                return Ok(false);
            }
            Err(error) => return Err(error),
        }

        for change in self.mapper.take_mapping_delta().iter() {
            debug!("{client}: {change:?}");
        }
        Ok(true)
    }

    /// Locks a committed change. When no sync id is free the change is still broadcast, with the
    /// dummy id and without a lock.
    fn lock_entry(&mut self, client: ClientId, entry: &Entry) -> SyncId {
        match self.session.lock_entry(client, entry) {
            Ok(sync_id) => sync_id,
            Err(error) => {
                warn!("Broadcasting change of {entry:?} without a lock: {error}");
                DUMMY_SYNC_ID
            }
        }
    }

    fn send_correct_mapping(&self, client: ClientId, entry: &Entry, refresh_class_tree: bool) {
        let packet = match self.mapper.get_deobf_mapping(entry) {
            Some(mapping) => ServerPacket::Rename {
                sync_id: DUMMY_SYNC_ID,
                entry: entry.clone(),
                new_name: mapping.target_name().to_owned(),
                refresh_class_tree,
            },
            None => ServerPacket::RemoveMapping {
                sync_id: DUMMY_SYNC_ID,
                entry: entry.clone(),
            },
        };
        self.send(client, packet);
    }

    fn send(&self, client: ClientId, packet: ServerPacket) {
        if let Some(connection) = self.connections.get(&client) {
            trace!("Sending {} to {client}", packet.opcode());
            // A closed queue means the writer already reported its failure.
            let _ = connection.outbound.send(Outbound::Packet(packet));
        }
    }

    fn broadcast_except(&self, excluded: ClientId, packet: &ServerPacket) {
        let recipients: Vec<ClientId> = self
            .session
            .logged_in()
            .filter(|client| *client != excluded)
            .collect();
        for client in recipients {
            self.send(client, packet.clone());
        }
    }

    fn broadcast_user_list(&self) {
        let packet = ServerPacket::UserList {
            users: self.session.usernames(),
        };
        let recipients: Vec<ClientId> = self.session.logged_in().collect();
        for client in recipients {
            self.send(client, packet.clone());
        }
    }

    /// Drops a client. The reason is only delivered if `notify` is set, i.e. the connection is
    /// still believed to work.
    fn kick(&mut self, client: ClientId, reason: &str, notify: bool) {
        if let Some(connection) = self.connections.remove(&client) {
            if notify {
                let _ = connection.outbound.send(Outbound::Packet(ServerPacket::Kick {
                    reason: reason.to_owned(),
                }));
            }
            let _ = connection.outbound.send(Outbound::Close);
            self.retired.insert(client, connection.writer);
        }

        let username = self.session.disconnect(client);
        info!(
            "Kicked {} because {reason}",
            username.as_deref().unwrap_or("unauthenticated client")
        );
        if username.is_some() {
            self.broadcast_user_list();
        }
    }
}
