//! Integration tests for the sync engine against the document server.

use docsync_engine::{
    DurableCache, HttpTransport, LocalCache, LoopbackClient, LoopbackServer, ManualClock,
    MemoryCache, Resolution, RetryConfig, SyncConfig, SyncCoordinator, SyncError, SyncState,
    WriteOutcome,
};
use docsync_protocol::{
    ApiRequest, ApiResponse, DocumentContent, DocumentId, ListQuery, TeamId, UserId,
};
use docsync_server::{DocumentServer, ServerConfig};
use docsync_storage::FileLog;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

/// Routes loopback requests into an in-process document server.
struct InProcessServer(Arc<DocumentServer>);

impl LoopbackServer for InProcessServer {
    fn handle(&self, request: &ApiRequest) -> ApiResponse {
        self.0.handle(request)
    }
}

type Transport = HttpTransport<LoopbackClient<InProcessServer>>;
type Client = SyncCoordinator<Transport, MemoryCache>;

const START: u64 = 1_700_000_000_000;

fn transport(server: &Arc<DocumentServer>, credentials: &str) -> Transport {
    HttpTransport::new(
        "http://docsync.test",
        LoopbackClient::new(InProcessServer(Arc::clone(server))),
    )
    .with_credentials(credentials)
}

fn config() -> SyncConfig {
    SyncConfig::new().with_retry(RetryConfig::new().with_jitter(Duration::ZERO))
}

fn client(server: &Arc<DocumentServer>, user: &str, clock: &Arc<ManualClock>) -> Client {
    SyncCoordinator::new(config(), transport(server, user), MemoryCache::new())
        .with_clock(clock.clone())
}

fn scene(n: u64) -> DocumentContent {
    DocumentContent::from_value(json!({
        "elements": [{ "id": format!("rect-{n}"), "type": "rectangle", "x": n }],
        "appState": { "viewBackgroundColor": "#ffffff" },
        "files": {}
    }))
    .unwrap()
}

fn server() -> Arc<DocumentServer> {
    Arc::new(DocumentServer::new(ServerConfig::default()))
}

fn team_document(server: &Arc<DocumentServer>, members: &[&str]) -> (TeamId, DocumentId) {
    let team = TeamId::new("design");
    for member in members {
        server.grant_team(team.clone(), UserId::new(*member));
    }
    let clock = Arc::new(ManualClock::new(START));
    let owner = client(server, members[0], &clock);
    let record = owner
        .create_document(Some("Board".into()), Some(team.clone()))
        .unwrap();
    (team, record.id)
}

#[test]
fn edit_advances_server_version() {
    let server = server();
    let clock = Arc::new(ManualClock::new(START));
    let alice = client(&server, "alice", &clock);

    let created = alice.create_document(Some("Sketch".into()), None).unwrap();
    let id = created.id;
    server.store().write(&id, 1, scene(1), None).unwrap();
    server.store().write(&id, 2, scene(2), None).unwrap();

    let view = alice.open_document(&id).unwrap();
    assert_eq!(view.version, 3);
    assert_eq!(view.content, scene(2));

    alice.record_edit(scene(3), None).unwrap();
    clock.advance(1_200);
    let outcome = alice.run_ready().unwrap();

    let WriteOutcome::Accepted(record) = outcome else {
        panic!("expected accepted write, got {outcome:?}");
    };
    assert_eq!(record.version, 4);
    assert_eq!(alice.state(), SyncState::Synced);
    assert_eq!(server.store().get(&id).unwrap().content, scene(3));
}

#[test]
fn concurrent_editors_conflict_and_resolve() {
    let server = server();
    let (_, id) = team_document(&server, &["alice", "bob"]);
    server.store().write(&id, 1, scene(1), None).unwrap();
    server.store().write(&id, 2, scene(2), None).unwrap();

    let clock = Arc::new(ManualClock::new(START));
    let alice = client(&server, "alice", &clock);
    let bob = client(&server, "bob", &clock);
    assert_eq!(alice.open_document(&id).unwrap().version, 3);
    assert_eq!(bob.open_document(&id).unwrap().version, 3);

    bob.record_edit(scene(20), None).unwrap();
    assert!(bob.flush_document(&id).unwrap().is_accepted());

    alice.record_edit(scene(10), None).unwrap();
    let outcome = alice.flush_document(&id).unwrap();
    let WriteOutcome::Conflict(context) = outcome else {
        panic!("expected conflict, got {outcome:?}");
    };
    assert_eq!(context.local_version, 3);
    assert_eq!(context.server_version, 4);
    assert_eq!(alice.state(), SyncState::Conflict);
    assert_eq!(server.store().get(&id).unwrap().content, scene(20));

    let view = alice
        .resolve_conflict(&id, Resolution::OverwriteServer)
        .unwrap();
    assert_eq!(view.version, 5);
    assert_eq!(view.state, SyncState::Synced);

    let stored = server.store().get(&id).unwrap();
    assert_eq!(stored.version, 5);
    assert_eq!(stored.content, scene(10));
}

#[test]
fn rapid_edits_produce_one_write() {
    let server = server();
    let clock = Arc::new(ManualClock::new(START));
    let alice = client(&server, "alice", &clock);
    let id = alice.create_document(None, None).unwrap().id;
    alice.open_document(&id).unwrap();

    for n in 1..=5 {
        alice.record_edit(scene(n), None).unwrap();
        clock.advance(100);
        assert!(alice.run_ready().is_none());
    }
    clock.advance(1_200);
    assert!(alice.run_ready().unwrap().is_accepted());
    assert!(alice.run_ready().is_none());

    let stored = server.store().get(&id).unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.content, scene(5));
    assert_eq!(alice.stats().writes_attempted, 1);
}

#[test]
fn final_version_counts_accepted_writes() {
    let server = server();
    let (_, id) = team_document(&server, &["alice", "bob"]);

    let clock = Arc::new(ManualClock::new(START));
    let alice = client(&server, "alice", &clock);
    let bob = client(&server, "bob", &clock);
    alice.open_document(&id).unwrap();
    bob.open_document(&id).unwrap();

    for round in 0..12u64 {
        let (writer, other) = if round % 3 == 0 { (&bob, &alice) } else { (&alice, &bob) };
        writer.record_edit(scene(round), None).unwrap();
        writer.flush_document(&id);
        if writer.state() == SyncState::Conflict {
            writer
                .resolve_conflict(&id, Resolution::ReloadServer)
                .unwrap();
        }
        // The other editor catches up before its next turn.
        if other.state() == SyncState::Synced {
            other.open_document(&id).unwrap();
        }
        clock.advance(50);
    }

    let accepted = alice.stats().writes_accepted + bob.stats().writes_accepted;
    assert!(accepted > 0);
    assert_eq!(server.store().get(&id).unwrap().version, 1 + accepted);
}

#[test]
fn racing_writers_have_a_single_winner() {
    const WRITERS: usize = 6;
    let server = server();
    let members: Vec<String> = (0..WRITERS).map(|i| format!("user-{i}")).collect();
    let member_refs: Vec<&str> = members.iter().map(String::as_str).collect();
    let (_, id) = team_document(&server, &member_refs);

    let clock = Arc::new(ManualClock::new(START));
    let clients: Vec<Client> = members
        .iter()
        .map(|user| client(&server, user, &clock))
        .collect();
    for (n, client) in clients.iter().enumerate() {
        client.open_document(&id).unwrap();
        client.record_edit(scene(n as u64), None).unwrap();
    }

    let barrier = Barrier::new(WRITERS);
    let outcomes: Vec<WriteOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = clients
            .iter()
            .map(|client| {
                let barrier = &barrier;
                let id = &id;
                scope.spawn(move || {
                    barrier.wait();
                    client.flush_document(id).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let accepted = outcomes.iter().filter(|o| o.is_accepted()).count();
    let conflicts = outcomes
        .iter()
        .filter(|o| matches!(o, WriteOutcome::Conflict(c) if c.server_version == 2))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(conflicts, WRITERS - 1);
    assert_eq!(server.store().get(&id).unwrap().version, 2);
}

#[test]
fn offline_edit_syncs_after_reconnect() {
    let server = server();
    let clock = Arc::new(ManualClock::new(START));
    let alice = client(&server, "alice", &clock);
    let id = alice.create_document(None, None).unwrap().id;
    alice.open_document(&id).unwrap();

    alice.remote().client().set_online(false);
    alice.record_edit(scene(1), None).unwrap();
    clock.advance(1_200);
    assert!(matches!(
        alice.run_ready(),
        Some(WriteOutcome::Retrying { attempt: 1, .. })
    ));
    assert_eq!(alice.state(), SyncState::Offline);
    assert!(!docsync_engine::RemoteStore::is_connected(alice.remote()));

    alice.record_edit(scene(2), None).unwrap();
    alice.remote().client().set_online(true);
    clock.advance(1_200);
    assert!(alice.run_ready().unwrap().is_accepted());
    assert_eq!(alice.state(), SyncState::Synced);

    let stored = server.store().get(&id).unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.content, scene(2));
}

#[test]
fn restart_resumes_from_durable_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.log");
    let server = server();
    let clock = Arc::new(ManualClock::new(START));

    let id = {
        let cache = DurableCache::open(FileLog::open(&path).unwrap()).unwrap();
        let alice = SyncCoordinator::new(config(), transport(&server, "alice"), cache)
            .with_clock(clock.clone());
        let id = alice.create_document(None, None).unwrap().id;
        alice.open_document(&id).unwrap();

        alice.remote().client().set_online(false);
        alice.record_edit(scene(42), None).unwrap();
        assert!(alice.close_document(&id).is_some());
        assert_eq!(alice.pending_len(), 0);
        id
    };
    assert_eq!(server.store().get(&id).unwrap().version, 1);

    let cache = DurableCache::open(FileLog::open(&path).unwrap()).unwrap();
    let entry = cache.get(&id).unwrap().unwrap();
    assert!(entry.dirty);
    assert_eq!(entry.version, 1);

    let alice = SyncCoordinator::new(config(), transport(&server, "alice"), cache)
        .with_clock(clock.clone());
    let view = alice.open_document(&id).unwrap();
    assert_eq!(view.state, SyncState::Dirty);
    assert_eq!(view.content, scene(42));

    assert!(alice.run_ready().unwrap().is_accepted());
    assert_eq!(server.store().get(&id).unwrap().content, scene(42));
    assert!(!alice.cache().get(&id).unwrap().unwrap().dirty);
}

#[test]
fn revoked_member_becomes_unavailable() {
    let server = server();
    let (team, id) = team_document(&server, &["alice", "bob"]);
    let clock = Arc::new(ManualClock::new(START));
    let bob = client(&server, "bob", &clock);
    bob.open_document(&id).unwrap();

    server.revoke_team(&team, &UserId::new("bob"));
    bob.record_edit(scene(1), None).unwrap();
    assert!(matches!(
        bob.flush_document(&id),
        Some(WriteOutcome::Dropped { .. })
    ));
    assert_eq!(bob.state(), SyncState::Unavailable);
    assert!(matches!(
        bob.open_document(&id),
        Err(SyncError::Forbidden(_))
    ));
}

#[test]
fn deleted_elsewhere_becomes_unavailable() {
    let server = server();
    let (_, id) = team_document(&server, &["alice", "bob"]);
    let clock = Arc::new(ManualClock::new(START));
    let alice = client(&server, "alice", &clock);
    let bob = client(&server, "bob", &clock);
    bob.open_document(&id).unwrap();

    alice.delete_document(&id).unwrap();
    bob.record_edit(scene(1), None).unwrap();
    clock.advance(1_200);
    assert!(matches!(
        bob.run_ready(),
        Some(WriteOutcome::Dropped { .. })
    ));
    assert_eq!(bob.state(), SyncState::Unavailable);
}

#[test]
fn team_listing_reflects_writes() {
    let server = server();
    let (team, id) = team_document(&server, &["alice", "bob"]);
    let clock = Arc::new(ManualClock::new(START));
    let bob = client(&server, "bob", &clock);

    let rows = bob.refresh_listing(&ListQuery::team(team.clone())).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "Board");

    bob.open_document(&id).unwrap();
    bob.record_edit(scene(1), Some("Board v2".into())).unwrap();
    bob.flush_document(&id).unwrap();

    let rows = bob.refresh_listing(&ListQuery::team(team)).unwrap();
    assert_eq!(rows[0].title, "Board v2");
    assert_eq!(rows[0].version, 2);
    assert!(bob.refresh_listing(&ListQuery::personal()).unwrap().is_empty());
}

#[test]
fn signed_tokens_authenticate_the_client() {
    let server = Arc::new(DocumentServer::new(
        ServerConfig::default().with_auth(b"integration-secret".to_vec()),
    ));
    let token = server
        .issue_token(&UserId::new("alice"))
        .unwrap()
        .unwrap();
    let clock = Arc::new(ManualClock::new(START));

    let alice = client(&server, &token, &clock);
    let record = alice.create_document(Some("Signed".into()), None).unwrap();
    assert_eq!(record.owner_user_id, UserId::new("alice"));

    let forger = client(&server, "alice", &clock);
    assert!(matches!(
        forger.open_document(&record.id),
        Err(SyncError::Unauthorized(_))
    ));
}
