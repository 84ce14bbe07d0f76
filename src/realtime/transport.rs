//! Wire types and the transport seam of the realtime layer.
//!
//! The channel logic is transport-agnostic: anything that can join a
//! connection to a topic, fan an event out to a topic, and unicast to a
//! single connection can carry it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::state::Role;

/// Opaque handle for one realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A courier position fix. Ephemeral: lives only in the channel's in-memory
/// cache, overwritten by the next accepted sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
    pub ts: DateTime<Utc>,
    pub courier_user_id: Uuid,
}

/// Whether a location event is a fresh broadcast or the cached last-known
/// position replayed to a late joiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Live,
    Cache,
}

/// Events emitted into an order's room.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChannelEvent {
    Location {
        order_id: Uuid,
        source: LocationSource,
        #[serde(flatten)]
        sample: LocationSample,
    },
    Joined {
        order_id: Uuid,
        user_id: Uuid,
        role: Role,
        ts: DateTime<Utc>,
    },
}

pub fn order_room(order_id: Uuid) -> String {
    format!("order:{order_id}")
}

pub trait Transport: Send + Sync + 'static {
    fn join_room(&self, conn: ConnectionId, room: &str);
    fn leave_room(&self, conn: ConnectionId, room: &str);
    fn emit_to_room(&self, room: &str, event: &ChannelEvent);
    fn unicast(&self, conn: ConnectionId, event: &ChannelEvent);
}
