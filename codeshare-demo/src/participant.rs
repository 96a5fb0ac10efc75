//! A demo participant: an editor session wired to a relay through a link.

use std::error::Error;
use std::sync::Arc;

use codeshare_collab::{
    EditorSession, Language, LinkConfig, LinkEvent, MemorySurface, PeerInfo, PeerLink, PresenceMessage,
    QueuedHost, RoomRelay, RoomSnapshot, SessionConfig,
};
use codeshare_core::BoundaryConfig;
use log::{debug, info, warn};
use tokio::sync::broadcast;

pub type DemoResult<T> = Result<T, Box<dyn Error>>;

pub struct Participant {
    pub name: String,
    pub session: EditorSession<MemorySurface, QueuedHost>,
    link: PeerLink,
    rx: broadcast::Receiver<Arc<Vec<u8>>>,
    /// Answers joiners with a room snapshot.
    hosts_room: bool,
}

impl Participant {
    pub async fn join(
        relay: &RoomRelay,
        name: &str,
        config: SessionConfig,
        boundary: BoundaryConfig,
        body: &str,
    ) -> DemoResult<Self> {
        let info = PeerInfo::new(name);
        let hosts_room = !config.in_room;
        let session = EditorSession::mount(
            info.peer_id,
            config,
            Language::Python,
            boundary,
            body,
            MemorySurface::default(),
            QueuedHost::default(),
        );
        let rx = relay.add_peer(info.clone()).await;
        let mut link = PeerLink::new(info, relay.room_id(), &LinkConfig::default());

        for frame in link.connect(session.sync_request())? {
            relay.relay(frame);
        }
        let join = session.join_message(name);
        if let Some(frame) = link.send_presence(&join)? {
            relay.relay(frame);
        }

        info!("{name} joined room {}", relay.room_id());
        Ok(Self {
            name: name.to_string(),
            session,
            link,
            rx,
            hosts_room,
        })
    }

    /// Insert `text` at the end of the buffer, as a keystroke burst would.
    pub fn type_at_end(&mut self, text: &str) {
        let len = self.session.text().len();
        self.session.surface_mut().splice(len..len, text);
        let outcome = self.session.on_surface_edit();
        debug!("{} typed {text:?}: {outcome:?}", self.name);
    }

    /// Delete the first `n` bytes of the buffer.
    pub fn delete_head(&mut self, n: usize) {
        self.session.surface_mut().splice(0..n, "");
        let outcome = self.session.on_surface_edit();
        info!("{} deleted {n} leading bytes: {outcome:?}", self.name);
    }

    /// Send everything the session produced since the last flush.
    pub fn flush(&mut self, relay: &RoomRelay) -> DemoResult<()> {
        self.session.flush_presence();
        for state_vector in self.session.host_mut().take_sync_requests() {
            relay.relay(self.link.send_sync_request(state_vector)?);
        }
        for delta in self.session.host_mut().take_deltas() {
            if let Some(frame) = self.link.send_delta(delta)? {
                relay.relay(frame);
            }
        }
        for report in self.session.host_mut().take_presence() {
            let msg = PresenceMessage::Report {
                participant_id: self.session.participant_id(),
                report,
            };
            if let Some(frame) = self.link.send_presence(&msg)? {
                relay.relay(frame);
            }
        }
        Ok(())
    }

    /// Handle every frame currently buffered. Returns how many were ours to
    /// handle.
    pub fn drain(&mut self, relay: &RoomRelay) -> DemoResult<usize> {
        let mut handled = 0;
        while let Ok(frame) = self.rx.try_recv() {
            let event = match self.link.receive(&frame) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    warn!("{} dropped a frame: {e}", self.name);
                    continue;
                }
            };
            handled += 1;
            match event {
                LinkEvent::RemoteDelta { update, .. } | LinkEvent::SyncAnswer { update, .. } => {
                    self.session.receive_delta(&update);
                }
                LinkEvent::SyncRequest { state_vector, .. } => {
                    let answer = self.session.answer_sync(&state_vector)?;
                    relay.relay(self.link.send_sync_answer(answer)?);
                }
                LinkEvent::Presence { message, .. } => self.session.receive_presence(&message),
                LinkEvent::Snapshot(snapshot) => {
                    let decision = self.session.receive_snapshot(&snapshot);
                    info!("{} received room snapshot: {decision:?}", self.name);
                }
                LinkEvent::PeerJoined(peer) => {
                    info!("{} sees {} join", self.name, peer.name);
                    if self.hosts_room {
                        let snapshot = RoomSnapshot::new(self.session.text());
                        relay.relay(self.link.send_snapshot(&snapshot)?);
                    }
                    let join = self.session.join_message(self.name.clone());
                    if let Some(frame) = self.link.send_presence(&join)? {
                        relay.relay(frame);
                    }
                }
                LinkEvent::PeerLeft(peer_id) => {
                    self.session.receive_presence(&PresenceMessage::Leave {
                        participant_id: peer_id,
                    });
                }
            }
        }
        Ok(handled)
    }

    pub async fn leave(mut self, relay: &RoomRelay) -> DemoResult<()> {
        let leave = self.session.leave_message();
        if let Some(frame) = self.link.send_presence(&leave)? {
            relay.relay(frame);
        }
        if let Some(frame) = self.link.disconnect() {
            relay.relay(frame);
        }
        relay.remove_peer(&self.session.participant_id()).await;
        info!("{} left", self.name);
        Ok(())
    }
}

/// Drain all participants until no frame is left in flight.
pub fn settle(relay: &RoomRelay, participants: &mut [&mut Participant]) -> DemoResult<()> {
    loop {
        let mut handled = 0;
        for p in participants.iter_mut() {
            handled += p.drain(relay)?;
            p.flush(relay)?;
        }
        if handled == 0 {
            return Ok(());
        }
    }
}
