//! In-process transport: room membership plus an unbounded delivery queue per
//! connection. Suitable for embedding the channel into any socket server
//! that pumps each connection's receiver, and for exercising the channel
//! end-to-end in tests.

use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::transport::{ChannelEvent, ConnectionId, Transport};

#[derive(Default)]
pub struct LocalHub {
    rooms: DashMap<String, HashSet<ConnectionId>>,
    senders: DashMap<ConnectionId, mpsc::UnboundedSender<ChannelEvent>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and hand back its event stream.
    pub fn register(&self, conn: ConnectionId) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(conn, tx);
        rx
    }

    /// Drop a connection: its queue closes and it leaves every room.
    pub fn disconnect(&self, conn: ConnectionId) {
        self.senders.remove(&conn);
        for mut room in self.rooms.iter_mut() {
            room.value_mut().remove(&conn);
        }
    }

    fn send(&self, conn: ConnectionId, event: &ChannelEvent) {
        if let Some(tx) = self.senders.get(&conn) {
            // A closed receiver means the connection is gone; nothing to do.
            let _ = tx.send(event.clone());
        }
    }
}

impl Transport for std::sync::Arc<LocalHub> {
    fn join_room(&self, conn: ConnectionId, room: &str) {
        self.rooms.entry(room.to_string()).or_default().insert(conn);
    }

    fn leave_room(&self, conn: ConnectionId, room: &str) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&conn);
        }
    }

    fn emit_to_room(&self, room: &str, event: &ChannelEvent) {
        let members: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return,
        };
        for conn in members {
            self.send(conn, event);
        }
    }

    fn unicast(&self, conn: ConnectionId, event: &ChannelEvent) {
        self.send(conn, event);
    }
}
