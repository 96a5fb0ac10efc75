//! Participants exchanging frames through a RoomRelay.

use std::sync::Arc;

use codeshare_collab::{
    ConnectionState, EditorSession, Language, LinkConfig, LinkEvent, MemorySurface, PeerInfo,
    PeerLink, QueuedHost, RoomRelay, RoomSnapshot, SessionConfig, TextSurface,
};
use codeshare_core::BoundaryConfig;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

const PREFIX: &str = "def f():\n    ";

struct Participant {
    session: EditorSession<MemorySurface, QueuedHost>,
    link: PeerLink,
    rx: broadcast::Receiver<Arc<Vec<u8>>>,
}

impl Participant {
    async fn join(relay: &RoomRelay, name: &str, config: SessionConfig, body: &str) -> Self {
        let info = PeerInfo::new(name);
        let session = EditorSession::mount(
            info.peer_id,
            config,
            Language::Python,
            BoundaryConfig::new(PREFIX, ""),
            body,
            MemorySurface::default(),
            QueuedHost::default(),
        );
        let rx = relay.add_peer(info.clone()).await;
        let link = PeerLink::new(info, relay.room_id(), &LinkConfig::default());
        let mut p = Self { session, link, rx };
        p.connect(relay);
        p
    }

    fn connect(&mut self, relay: &RoomRelay) {
        for frame in self.link.connect(self.session.sync_request()).unwrap() {
            relay.relay(frame);
        }
    }

    fn type_at_end(&mut self, text: &str) {
        let len = self.session.text().len();
        self.session.surface_mut().splice(len..len, text);
        self.session.on_surface_edit();
    }

    /// Send everything the session produced since the last flush.
    fn flush(&mut self, relay: &RoomRelay) {
        for state_vector in self.session.host_mut().take_sync_requests() {
            relay.relay(self.link.send_sync_request(state_vector).unwrap());
        }
        for delta in self.session.host_mut().take_deltas() {
            if let Some(frame) = self.link.send_delta(delta).unwrap() {
                relay.relay(frame);
            }
        }
        for report in self.session.host_mut().take_presence() {
            let msg = codeshare_collab::PresenceMessage::Report {
                participant_id: self.session.participant_id(),
                report,
            };
            if let Some(frame) = self.link.send_presence(&msg).unwrap() {
                relay.relay(frame);
            }
        }
    }

    /// Handle every frame currently buffered for this participant.
    fn drain(&mut self, relay: &RoomRelay) -> usize {
        let mut handled = 0;
        while let Ok(frame) = self.rx.try_recv() {
            let Some(event) = self.link.receive(&frame).unwrap() else {
                continue;
            };
            handled += 1;
            match event {
                LinkEvent::RemoteDelta { update, .. } | LinkEvent::SyncAnswer { update, .. } => {
                    self.session.receive_delta(&update);
                }
                LinkEvent::SyncRequest { state_vector, .. } => {
                    let answer = self.session.answer_sync(&state_vector).unwrap();
                    relay.relay(self.link.send_sync_answer(answer).unwrap());
                }
                LinkEvent::Presence { message, .. } => self.session.receive_presence(&message),
                LinkEvent::Snapshot(snapshot) => {
                    self.session.receive_snapshot(&snapshot);
                }
                LinkEvent::PeerJoined(_) | LinkEvent::PeerLeft(_) => {}
            }
        }
        handled
    }

    /// Drop everything buffered, as a disconnected socket would.
    fn discard(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// Drain all participants until no frame is left in flight.
fn settle(relay: &RoomRelay, participants: &mut [&mut Participant]) {
    loop {
        let mut handled = 0;
        for p in participants.iter_mut() {
            handled += p.drain(relay);
            p.flush(relay);
        }
        if handled == 0 {
            break;
        }
    }
}

#[tokio::test]
async fn test_two_participants_converge() {
    let relay = RoomRelay::new(Uuid::new_v4(), 256);
    let mut alice = Participant::join(&relay, "alice", SessionConfig::default(), "").await;
    let mut bob = Participant::join(&relay, "bob", SessionConfig::default(), "").await;
    settle(&relay, &mut [&mut alice, &mut bob]);

    alice.type_at_end("x = 1");
    bob.type_at_end("y = 2");
    alice.flush(&relay);
    bob.flush(&relay);
    settle(&relay, &mut [&mut alice, &mut bob]);

    assert_eq!(alice.session.text(), bob.session.text());
    let body = bob.session.body();
    assert!(body.contains("x = 1") && body.contains("y = 2"), "body {body:?}");
    assert_eq!(relay.peer_count().await, 2);
}

#[tokio::test]
async fn test_offline_edits_replayed_on_reconnect() {
    let relay = RoomRelay::new(Uuid::new_v4(), 256);
    let mut alice = Participant::join(&relay, "alice", SessionConfig::default(), "").await;
    let mut bob = Participant::join(&relay, "bob", SessionConfig::default(), "").await;
    settle(&relay, &mut [&mut alice, &mut bob]);

    if let Some(frame) = bob.link.disconnect() {
        relay.relay(frame);
    }
    assert_eq!(bob.link.connection_state(), ConnectionState::Disconnected);

    bob.type_at_end("offline");
    bob.flush(&relay);
    assert_eq!(bob.link.offline_queue_len(), 1);

    alice.type_at_end("online");
    alice.flush(&relay);
    alice.drain(&relay);
    bob.discard();
    assert_ne!(alice.session.text(), bob.session.text());

    bob.connect(&relay);
    assert_eq!(bob.link.offline_queue_len(), 0);
    settle(&relay, &mut [&mut alice, &mut bob]);

    assert_eq!(alice.session.text(), bob.session.text());
    let body = alice.session.body();
    assert!(body.contains("offline") && body.contains("online"), "body {body:?}");
}

#[tokio::test]
async fn test_presence_crosses_relay() {
    let relay = RoomRelay::new(Uuid::new_v4(), 256);
    let mut alice = Participant::join(&relay, "alice", SessionConfig::default(), "return 1").await;
    let mut bob = Participant::join(&relay, "bob", SessionConfig::default(), "return 1").await;
    settle(&relay, &mut [&mut alice, &mut bob]);

    alice.session.selection_changed(PREFIX.len(), PREFIX.len() + 6);
    alice.flush(&relay);
    settle(&relay, &mut [&mut alice, &mut bob]);

    let decorations = bob.session.surface().decorations();
    assert_eq!(decorations.len(), 1);
    assert_eq!(decorations.items[0].participant(), alice.session.participant_id());
    assert!(alice.session.surface().decorations().is_empty());
}

#[tokio::test]
async fn test_snapshot_frame_reaches_late_joiner() {
    let relay = RoomRelay::new(Uuid::new_v4(), 256);
    let mut host = Participant::join(&relay, "host", SessionConfig::default(), "return 2").await;
    settle(&relay, &mut [&mut host]);

    let config = SessionConfig {
        in_room: true,
        ..SessionConfig::default()
    };
    let mut late = Participant::join(&relay, "late", config, "pass").await;

    let snapshot = RoomSnapshot::new(host.session.text());
    relay.relay(host.link.send_snapshot(&snapshot).unwrap());

    let frame = timeout(Duration::from_secs(1), late.rx.recv()).await.unwrap().unwrap();
    // The first frame is the late joiner's own join notice.
    assert!(late.link.receive(&frame).unwrap().is_none());
    settle(&relay, &mut [&mut host, &mut late]);

    assert_eq!(late.session.text(), "def f():\n    return 2");
    assert_eq!(late.session.host().changes, vec!["return 2".to_string()]);
    assert_eq!(host.session.text(), late.session.text());
}

#[tokio::test]
async fn test_late_joiner_edit_on_adopted_snapshot_converges() {
    let relay = RoomRelay::new(Uuid::new_v4(), 256);
    let mut host = Participant::join(&relay, "host", SessionConfig::default(), "return 2").await;
    settle(&relay, &mut [&mut host]);

    let config = SessionConfig {
        in_room: true,
        ..SessionConfig::default()
    };
    let mut late = Participant::join(&relay, "late", config, "pass").await;
    relay.relay(host.link.send_snapshot(&RoomSnapshot::new(host.session.text())).unwrap());

    // Adopt the snapshot and type before the host has answered any sync.
    late.drain(&relay);
    assert_eq!(late.session.text(), "def f():\n    return 2");
    late.type_at_end(" + 1");
    assert!(late.session.host().deltas.is_empty());
    assert_eq!(late.session.host().sync_requests.len(), 1);
    late.flush(&relay);

    settle(&relay, &mut [&mut host, &mut late]);

    assert_eq!(late.session.text(), "def f():\n    return 2 + 1");
    assert_eq!(host.session.text(), late.session.text());
    assert_eq!(host.session.text().matches(PREFIX).count(), 1);
}
