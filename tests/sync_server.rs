//! End-to-end tests of the sync server over loopback TCP.

use std::{
    io::{BufReader, Write},
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream},
    thread,
    time::{Duration, Instant},
};

use mapscope::{
    network::{
        kick_reason, ArtifactChecksum, ClientPacket, ServerConfig, ServerPacket, SyncClient,
        SyncServer, SyncSession, PROTOCOL_VERSION,
    },
    BidirectionalMapper, Entry, EntryMapping, Error,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn checksum() -> ArtifactChecksum {
    ArtifactChecksum::from_bytes(b"the program under study")
}

fn config() -> ServerConfig {
    ServerConfig::default()
        .with_bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .with_port(0)
        .with_checksum(checksum())
}

fn start(config: ServerConfig, mapper: BidirectionalMapper) -> SyncServer {
    SyncServer::start(config, mapper).unwrap()
}

fn join(server: &SyncServer, username: &str) -> SyncClient {
    let client = SyncClient::connect(server.local_addr(), username, None, checksum()).unwrap();
    client.set_read_timeout(Some(TIMEOUT)).unwrap();
    client
}

fn init_method() -> Entry {
    Entry::parse_method(&Entry::class("a"), "a", "()V").unwrap()
}

/// Polls the mutation thread until `check` holds.
fn wait_until<F>(server: &SyncServer, check: F)
where
    F: Fn(&BidirectionalMapper, &SyncSession) -> bool + Clone + Send + 'static,
{
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let check = check.clone();
        if server.inspect(move |mapper, session| check(mapper, session)).unwrap() {
            return;
        }
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(10));
    }
}

fn deobf_name(server: &SyncServer, entry: &Entry) -> Option<String> {
    let entry = entry.clone();
    server
        .inspect(move |mapper, _| {
            mapper
                .get_deobf_mapping(&entry)
                .map(|mapping| mapping.target_name().to_owned())
        })
        .unwrap()
}

/// Sends a raw login and returns the first packet the server answers with.
fn raw_login(addr: SocketAddr, version: u16, username: &str) -> ServerPacket {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    let login = ClientPacket::Login {
        version,
        checksum: checksum(),
        password: None,
        username: username.to_owned(),
    };
    stream.write_all(&login.to_bytes().unwrap()).unwrap();
    ServerPacket::read(&mut BufReader::new(stream)).unwrap()
}

fn kick_reason_of(result: Result<SyncClient, Error>) -> String {
    match result {
        Err(Error::Kicked(reason)) => reason,
        other => panic!("expected a kick, got {other:?}"),
    }
}

#[test]
fn rename_locks_other_clients_until_confirmed() {
    let server = start(config(), BidirectionalMapper::default());
    let mut alice = join(&server, "alice");
    let mut bob = join(&server, "bob");
    let entry = init_method();

    alice.rename(&entry, "init", false).unwrap();
    let sync_id = match bob.next_change().unwrap() {
        ServerPacket::Rename {
            sync_id,
            entry: renamed,
            new_name,
            ..
        } => {
            assert_eq!(renamed, entry);
            assert_eq!(new_name, "init");
            sync_id
        }
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(sync_id, 1);

    let waiting = server
        .inspect(move |_, session| {
            let bob = session.client_by_username("bob");
            let pending = session.pending_confirmations(sync_id).cloned();
            (bob, pending)
        })
        .unwrap();
    let (Some(bob_id), Some(pending)) = waiting else {
        panic!("lock was not recorded");
    };
    assert_eq!(pending.len(), 1);
    assert!(pending.contains(&bob_id));

    // Bob has not confirmed yet, so the server answers with the current name instead.
    bob.rename(&entry, "start", false).unwrap();
    match bob.next_change().unwrap() {
        ServerPacket::Rename {
            sync_id: 0,
            new_name,
            ..
        } => assert_eq!(new_name, "init"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(deobf_name(&server, &entry).as_deref(), Some("init"));

    bob.confirm(sync_id).unwrap();
    bob.rename(&entry, "start", false).unwrap();
    match alice.next_change().unwrap() {
        ServerPacket::Rename {
            sync_id, new_name, ..
        } => {
            assert_eq!(sync_id, 2);
            assert_eq!(new_name, "start");
        }
        other => panic!("unexpected {other:?}"),
    }

    alice.disconnect();
    wait_until(&server, |_, session| {
        session.client_by_username("alice").is_none() && session.outstanding_changes() == 0
    });
    assert_eq!(deobf_name(&server, &entry).as_deref(), Some("start"));

    // Bob is still connected and alone, so his changes take effect without any lock.
    bob.rename(&entry, "begin", false).unwrap();
    let expected = entry.clone();
    wait_until(&server, move |mapper, _| {
        mapper
            .get_deobf_mapping(&expected)
            .is_some_and(|mapping| mapping.target_name() == "begin")
    });

    let mapper = server.stop().unwrap();
    assert!(matches!(
        bob.next_change(),
        Err(Error::Kicked(reason)) if reason == kick_reason::SERVER_CLOSED
    ));
    mapper.verify_mirror().unwrap();
}

#[test]
fn login_receives_existing_mappings_and_user_list() {
    let owner = Entry::class("a");
    let mut mapper = BidirectionalMapper::default();
    mapper
        .map_from_obf(&owner, Some(EntryMapping::new("net/example/Main")))
        .unwrap();
    mapper
        .map_from_obf(&init_method(), Some(EntryMapping::new("run")))
        .unwrap();

    let server = start(config(), mapper);
    let mut alice = join(&server, "alice");
    assert_eq!(alice.mappings().len(), 2);
    assert_eq!(
        alice.initial_mapping(&owner).map(EntryMapping::target_name),
        Some("net/example/Main")
    );

    let _bob = join(&server, "bob");
    loop {
        match alice.recv().unwrap() {
            ServerPacket::UserList { users } if users == ["alice", "bob"] => break,
            ServerPacket::UserList { .. } => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn rejected_rename_is_corrected_and_not_broadcast() {
    let server = start(config(), BidirectionalMapper::default());
    let mut alice = join(&server, "alice");
    let mut bob = join(&server, "bob");
    let owner = Entry::class("a");
    let first = Entry::parse_field(&owner, "a", "I").unwrap();
    let second = Entry::parse_field(&owner, "b", "I").unwrap();

    alice.rename(&first, "count", false).unwrap();
    let sync_id = bob.next_change().unwrap().sync_id().unwrap();
    bob.confirm(sync_id).unwrap();

    alice.rename(&second, "count", false).unwrap();
    match alice.next_change().unwrap() {
        ServerPacket::RemoveMapping { sync_id: 0, entry } => assert_eq!(entry, second),
        other => panic!("unexpected {other:?}"),
    }

    alice.rename(&second, "not valid", false).unwrap();
    match alice.next_change().unwrap() {
        ServerPacket::RemoveMapping { sync_id: 0, entry } => assert_eq!(entry, second),
        other => panic!("unexpected {other:?}"),
    }

    // The next thing bob hears about is the following successful change.
    alice.rename(&second, "total", false).unwrap();
    match bob.next_change().unwrap() {
        ServerPacket::Rename { entry, new_name, .. } => {
            assert_eq!(entry, second);
            assert_eq!(new_name, "total");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn remove_and_docs_are_broadcast() {
    let server = start(config(), BidirectionalMapper::default());
    let mut alice = join(&server, "alice");
    let mut bob = join(&server, "bob");
    let entry = Entry::class("a");

    alice.rename(&entry, "Main", true).unwrap();
    let sync_id = bob.next_change().unwrap().sync_id().unwrap();
    bob.confirm(sync_id).unwrap();

    alice.change_docs(&entry, Some("Entry point")).unwrap();
    match bob.next_change().unwrap() {
        ServerPacket::ChangeDocs { sync_id, docs, .. } => {
            assert_eq!(docs.as_deref(), Some("Entry point"));
            bob.confirm(sync_id).unwrap();
        }
        other => panic!("unexpected {other:?}"),
    }
    let docs = server
        .inspect(|mapper, _| {
            mapper
                .get_deobf_mapping(&Entry::class("a"))
                .and_then(|mapping| mapping.docs().map(String::from))
        })
        .unwrap();
    assert_eq!(docs.as_deref(), Some("Entry point"));

    alice.remove_mapping(&entry).unwrap();
    match bob.next_change().unwrap() {
        ServerPacket::RemoveMapping { entry: removed, .. } => assert_eq!(removed, entry),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(deobf_name(&server, &entry), None);
}

#[test]
fn login_rejections() {
    let server = start(config().with_password("hunter2"), BidirectionalMapper::default());
    let addr = server.local_addr();

    match raw_login(addr, PROTOCOL_VERSION + 1, "alice") {
        ServerPacket::Kick { reason } => assert_eq!(reason, kick_reason::WRONG_VERSION),
        other => panic!("unexpected {other:?}"),
    }

    let result = SyncClient::connect(addr, "alice", None, checksum());
    assert_eq!(kick_reason_of(result), kick_reason::WRONG_PASSWORD);

    let result = SyncClient::connect(addr, "alice", Some("hunter2"), ArtifactChecksum::default());
    assert_eq!(kick_reason_of(result), kick_reason::WRONG_JAR);

    let _alice = SyncClient::connect(addr, "alice", Some("hunter2"), checksum()).unwrap();
    let result = SyncClient::connect(addr, "alice", Some("hunter2"), checksum());
    assert_eq!(kick_reason_of(result), kick_reason::USERNAME_TAKEN);
}

#[test]
fn protocol_violations_only_cost_the_offender() {
    let server = start(config(), BidirectionalMapper::default());
    let mut alice = join(&server, "alice");

    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    stream.write_all(&[0x7f]).unwrap();
    match ServerPacket::read(&mut BufReader::new(stream)).unwrap() {
        ServerPacket::Kick { reason } => assert_eq!(reason, kick_reason::PROTOCOL_VIOLATION),
        other => panic!("unexpected {other:?}"),
    }

    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    let rename = ClientPacket::Rename {
        entry: Entry::class("a"),
        new_name: "Main".into(),
        refresh_class_tree: false,
    };
    stream.write_all(&rename.to_bytes().unwrap()).unwrap();
    match ServerPacket::read(&mut BufReader::new(stream)).unwrap() {
        ServerPacket::Kick { reason } => assert_eq!(reason, kick_reason::PROTOCOL_VIOLATION),
        other => panic!("unexpected {other:?}"),
    }

    alice.rename(&Entry::class("a"), "Main", false).unwrap();
    wait_until(&server, |mapper, _| mapper.has_deobf_mapping(&Entry::class("a")));
    assert_eq!(deobf_name(&server, &Entry::class("a")).as_deref(), Some("Main"));
}
