//! Per-order presence channel: room authorization, the last-known-location
//! cache, and the rate-limited courier position broadcast.
//!
//! One `OrderChannel` instance exists per process, owned by whoever wires the
//! transport; all of its state (cache, rate-limit table) is process-local and
//! best-effort, outside any database transaction. All failures here are
//! per-message acknowledgements, never connection-terminating.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::errors::CoreError;
use crate::domain::state::Role;

use super::directory::OrderDirectory;
use super::transport::{
    order_room, ChannelEvent, ConnectionId, LocationSample, LocationSource, Transport,
};

/// Minimum spacing between accepted samples per connection.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Error, PartialEq)]
pub enum ChannelError {
    #[error("Order not found")]
    NotFound,
    #[error("Not authorized for this order")]
    NotAuthorized,
    #[error("Only couriers may publish locations")]
    NotCourier,
    #[error("Location updates are limited to one per window")]
    TooFrequent,
    #[error("Latitude/longitude out of range")]
    InvalidCoordinates,
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<CoreError> for ChannelError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound(_) => ChannelError::NotFound,
            CoreError::Forbidden => ChannelError::NotAuthorized,
            other => ChannelError::Persistence(other.to_string()),
        }
    }
}

/// Outcome of a successful authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub is_assigned_courier: bool,
}

/// An incoming position fix from a courier device.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LocationUpdate {
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
    pub ts: Option<DateTime<Utc>>,
}

impl LocationUpdate {
    fn coordinates_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

pub struct OrderChannel<T, D> {
    transport: T,
    directory: D,
    last_location: DashMap<Uuid, LocationSample>,
    last_publish: DashMap<ConnectionId, Instant>,
    window: Duration,
}

impl<T: Transport, D: OrderDirectory> OrderChannel<T, D> {
    pub fn new(transport: T, directory: D) -> Self {
        Self::with_window(transport, directory, RATE_LIMIT_WINDOW)
    }

    pub fn with_window(transport: T, directory: D, window: Duration) -> Self {
        Self {
            transport,
            directory,
            last_location: DashMap::new(),
            last_publish: DashMap::new(),
            window,
        }
    }

    /// May `user_id` (acting as `role`) observe `order_id`? Allowed for the
    /// order's customer, the merchant's user, and the currently assigned
    /// courier only.
    pub fn authorize(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Access, ChannelError> {
        let access = self
            .directory
            .order_access(order_id)?
            .ok_or(ChannelError::NotFound)?;
        if !access.allows(user_id, role) {
            return Err(ChannelError::NotAuthorized);
        }
        Ok(Access {
            is_assigned_courier: access.is_assigned_courier(user_id),
        })
    }

    /// Join `conn` to the order's room. A late joiner receives the cached
    /// last-known position (tagged `cache`) before any live broadcast can
    /// reach it.
    pub fn join(
        &self,
        conn: ConnectionId,
        order_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<(), ChannelError> {
        self.authorize(order_id, user_id, role)?;
        let room = order_room(order_id);
        self.transport.join_room(conn, &room);

        if let Some(sample) = self.last_location.get(&order_id) {
            self.transport.unicast(
                conn,
                &ChannelEvent::Location {
                    order_id,
                    source: LocationSource::Cache,
                    sample: sample.clone(),
                },
            );
        }

        self.transport.emit_to_room(
            &room,
            &ChannelEvent::Joined {
                order_id,
                user_id,
                role,
                ts: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn leave(&self, conn: ConnectionId, order_id: Uuid) {
        self.transport.leave_room(conn, &order_room(order_id));
    }

    /// Forget a connection's rate-limit state. The transport owner calls this
    /// when the connection drops, so the table tracks live connections only.
    pub fn disconnect(&self, conn: ConnectionId) {
        self.last_publish.remove(&conn);
    }

    /// Accept one courier position fix: cache it as the order's last-known
    /// position and broadcast it (tagged `live`) to the room.
    ///
    /// Check order: courier role, rate window, coordinate range, then
    /// authorization against the *currently assigned* courier. Rejected
    /// samples are dropped, not queued, and do not arm the rate window.
    pub fn publish_location(
        &self,
        conn: ConnectionId,
        order_id: Uuid,
        user_id: Uuid,
        role: Role,
        update: LocationUpdate,
    ) -> Result<(), ChannelError> {
        if role != Role::Courier {
            return Err(ChannelError::NotCourier);
        }

        if let Some(last) = self.last_publish.get(&conn) {
            if last.elapsed() < self.window {
                return Err(ChannelError::TooFrequent);
            }
        }

        if !update.coordinates_valid() {
            return Err(ChannelError::InvalidCoordinates);
        }

        let access = self.authorize(order_id, user_id, role)?;
        if !access.is_assigned_courier {
            return Err(ChannelError::NotAuthorized);
        }

        // Publishing implies presence; join in case the courier never did.
        let room = order_room(order_id);
        self.transport.join_room(conn, &room);

        let sample = LocationSample {
            lat: update.lat,
            lng: update.lng,
            heading: update.heading,
            speed: update.speed,
            accuracy: update.accuracy,
            ts: update.ts.unwrap_or_else(Utc::now),
            courier_user_id: user_id,
        };
        self.last_location.insert(order_id, sample.clone());
        self.transport.emit_to_room(
            &room,
            &ChannelEvent::Location {
                order_id,
                source: LocationSource::Live,
                sample,
            },
        );
        self.last_publish.insert(conn, Instant::now());
        Ok(())
    }

    pub fn last_known_location(&self, order_id: Uuid) -> Option<LocationSample> {
        self.last_location.get(&order_id).map(|s| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::orders::OrderAccess;

    struct StaticDirectory {
        orders: HashMap<Uuid, OrderAccess>,
    }

    impl OrderDirectory for StaticDirectory {
        fn order_access(&self, order_id: Uuid) -> Result<Option<OrderAccess>, CoreError> {
            Ok(self.orders.get(&order_id).copied())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Recorded {
        Join(ConnectionId, String),
        Leave(ConnectionId, String),
        Emit(String, ChannelEvent),
        Unicast(ConnectionId, ChannelEvent),
    }

    #[derive(Default)]
    struct RecordingTransport {
        log: Mutex<Vec<Recorded>>,
    }

    impl RecordingTransport {
        fn events(&self) -> Vec<Recorded> {
            self.log.lock().unwrap().clone()
        }
    }

    impl Transport for &'static RecordingTransport {
        fn join_room(&self, conn: ConnectionId, room: &str) {
            self.log.lock().unwrap().push(Recorded::Join(conn, room.into()));
        }
        fn leave_room(&self, conn: ConnectionId, room: &str) {
            self.log.lock().unwrap().push(Recorded::Leave(conn, room.into()));
        }
        fn emit_to_room(&self, room: &str, event: &ChannelEvent) {
            self.log
                .lock()
                .unwrap()
                .push(Recorded::Emit(room.into(), event.clone()));
        }
        fn unicast(&self, conn: ConnectionId, event: &ChannelEvent) {
            self.log
                .lock()
                .unwrap()
                .push(Recorded::Unicast(conn, event.clone()));
        }
    }

    struct Fixture {
        order_id: Uuid,
        customer: Uuid,
        merchant_user: Uuid,
        courier_user: Uuid,
        transport: &'static RecordingTransport,
        channel: OrderChannel<&'static RecordingTransport, StaticDirectory>,
    }

    /// Channel over one order with an assigned courier (unless `assigned` is
    /// false) and a tiny rate window so tests can cross it by sleeping.
    fn fixture(assigned: bool) -> Fixture {
        let order_id = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let merchant_user = Uuid::new_v4();
        let courier_user = Uuid::new_v4();
        let directory = StaticDirectory {
            orders: HashMap::from([(
                order_id,
                OrderAccess {
                    customer_user_id: customer,
                    merchant_user_id: merchant_user,
                    courier_user_id: assigned.then_some(courier_user),
                },
            )]),
        };
        let transport: &'static RecordingTransport =
            Box::leak(Box::new(RecordingTransport::default()));
        Fixture {
            order_id,
            customer,
            merchant_user,
            courier_user,
            transport,
            channel: OrderChannel::with_window(transport, directory, Duration::from_millis(50)),
        }
    }

    fn update(lat: f64, lng: f64) -> LocationUpdate {
        LocationUpdate {
            lat,
            lng,
            heading: Some(90.0),
            speed: Some(5.5),
            accuracy: Some(3.0),
            ts: None,
        }
    }

    #[test]
    fn authorize_admits_each_participant_and_rejects_strangers() {
        let f = fixture(true);
        assert!(f.channel.authorize(f.order_id, f.customer, Role::Customer).is_ok());
        assert!(f.channel.authorize(f.order_id, f.merchant_user, Role::Merchant).is_ok());
        let access = f
            .channel
            .authorize(f.order_id, f.courier_user, Role::Courier)
            .expect("assigned courier");
        assert!(access.is_assigned_courier);

        assert_eq!(
            f.channel.authorize(f.order_id, Uuid::new_v4(), Role::Customer),
            Err(ChannelError::NotAuthorized)
        );
        // Right user id under the wrong role is still a mismatch.
        assert_eq!(
            f.channel.authorize(f.order_id, f.customer, Role::Merchant),
            Err(ChannelError::NotAuthorized)
        );
        assert_eq!(
            f.channel.authorize(Uuid::new_v4(), f.customer, Role::Customer),
            Err(ChannelError::NotFound)
        );
    }

    #[test]
    fn unassigned_order_admits_no_courier() {
        let f = fixture(false);
        assert_eq!(
            f.channel.authorize(f.order_id, f.courier_user, Role::Courier),
            Err(ChannelError::NotAuthorized)
        );
    }

    #[test]
    fn publish_requires_the_courier_role() {
        let f = fixture(true);
        let conn = ConnectionId::new();
        assert_eq!(
            f.channel
                .publish_location(conn, f.order_id, f.customer, Role::Customer, update(1.0, 1.0)),
            Err(ChannelError::NotCourier)
        );
    }

    #[test]
    fn publish_rejects_out_of_range_or_non_finite_coordinates() {
        let f = fixture(true);
        let conn = ConnectionId::new();
        for (lat, lng) in [
            (90.1, 0.0),
            (-90.1, 0.0),
            (0.0, 180.1),
            (0.0, -180.1),
            (f64::NAN, 0.0),
            (0.0, f64::INFINITY),
        ] {
            assert_eq!(
                f.channel.publish_location(
                    conn,
                    f.order_id,
                    f.courier_user,
                    Role::Courier,
                    update(lat, lng)
                ),
                Err(ChannelError::InvalidCoordinates),
                "lat={lat} lng={lng}"
            );
        }
        // Boundary values are valid.
        assert!(f
            .channel
            .publish_location(conn, f.order_id, f.courier_user, Role::Courier, update(90.0, -180.0))
            .is_ok());
    }

    #[test]
    fn publish_rejects_a_courier_who_is_not_assigned() {
        let f = fixture(true);
        let conn = ConnectionId::new();
        let other_courier = Uuid::new_v4();
        assert_eq!(
            f.channel
                .publish_location(conn, f.order_id, other_courier, Role::Courier, update(1.0, 1.0)),
            Err(ChannelError::NotAuthorized)
        );
    }

    #[test]
    fn accepted_publish_caches_and_broadcasts_live() {
        let f = fixture(true);
        let conn = ConnectionId::new();
        f.channel
            .publish_location(conn, f.order_id, f.courier_user, Role::Courier, update(10.5, -70.25))
            .expect("publish");

        let cached = f.channel.last_known_location(f.order_id).expect("cached");
        assert_eq!(cached.lat, 10.5);
        assert_eq!(cached.lng, -70.25);
        assert_eq!(cached.courier_user_id, f.courier_user);

        let room = order_room(f.order_id);
        let events = f.transport.events();
        assert!(events.contains(&Recorded::Join(conn, room.clone())));
        assert!(matches!(
            events.last(),
            Some(Recorded::Emit(r, ChannelEvent::Location { source: LocationSource::Live, .. }))
                if *r == room
        ));
    }

    #[test]
    fn second_publish_inside_the_window_is_too_frequent() {
        let f = fixture(true);
        let conn = ConnectionId::new();
        f.channel
            .publish_location(conn, f.order_id, f.courier_user, Role::Courier, update(1.0, 1.0))
            .expect("first publish");
        assert_eq!(
            f.channel
                .publish_location(conn, f.order_id, f.courier_user, Role::Courier, update(2.0, 2.0)),
            Err(ChannelError::TooFrequent)
        );
        // The cache still holds the first sample.
        assert_eq!(f.channel.last_known_location(f.order_id).unwrap().lat, 1.0);

        std::thread::sleep(Duration::from_millis(60));
        f.channel
            .publish_location(conn, f.order_id, f.courier_user, Role::Courier, update(3.0, 3.0))
            .expect("publish after the window");
        assert_eq!(f.channel.last_known_location(f.order_id).unwrap().lat, 3.0);
    }

    #[test]
    fn rate_window_is_per_connection() {
        let f = fixture(true);
        let first = ConnectionId::new();
        let second = ConnectionId::new();
        f.channel
            .publish_location(first, f.order_id, f.courier_user, Role::Courier, update(1.0, 1.0))
            .expect("first connection");
        f.channel
            .publish_location(second, f.order_id, f.courier_user, Role::Courier, update(2.0, 2.0))
            .expect("second connection is not throttled by the first");
    }

    #[test]
    fn disconnect_drops_the_rate_limit_entry() {
        let f = fixture(true);
        let conn = ConnectionId::new();
        f.channel
            .publish_location(conn, f.order_id, f.courier_user, Role::Courier, update(1.0, 1.0))
            .expect("first publish");
        f.channel.disconnect(conn);
        // No stale window survives the disconnect.
        f.channel
            .publish_location(conn, f.order_id, f.courier_user, Role::Courier, update(2.0, 2.0))
            .expect("publish after reconnect");
    }

    #[test]
    fn rejected_publish_does_not_arm_the_rate_window() {
        let f = fixture(true);
        let conn = ConnectionId::new();
        assert_eq!(
            f.channel
                .publish_location(conn, f.order_id, f.courier_user, Role::Courier, update(99.0, 0.0)),
            Err(ChannelError::InvalidCoordinates)
        );
        // A valid sample right after the rejection must go through.
        f.channel
            .publish_location(conn, f.order_id, f.courier_user, Role::Courier, update(1.0, 1.0))
            .expect("rejection must not shadow a valid sample");
    }

    #[test]
    fn late_joiner_receives_the_cache_before_any_live_event() {
        let f = fixture(true);
        let courier_conn = ConnectionId::new();
        f.channel
            .publish_location(
                courier_conn,
                f.order_id,
                f.courier_user,
                Role::Courier,
                update(12.34, 56.78),
            )
            .expect("publish");

        let watcher = ConnectionId::new();
        f.channel
            .join(watcher, f.order_id, f.customer, Role::Customer)
            .expect("join");

        let events = f.transport.events();
        let room = order_room(f.order_id);
        let join_pos = events
            .iter()
            .position(|e| *e == Recorded::Join(watcher, room.clone()))
            .expect("watcher joined");

        // Immediately after joining: one cache unicast carrying the published
        // payload, then the joined broadcast.
        match &events[join_pos + 1] {
            Recorded::Unicast(
                conn,
                ChannelEvent::Location {
                    order_id,
                    source,
                    sample,
                },
            ) => {
                assert_eq!(*conn, watcher);
                assert_eq!(*order_id, f.order_id);
                assert_eq!(*source, LocationSource::Cache);
                assert_eq!(sample.lat, 12.34);
                assert_eq!(sample.lng, 56.78);
            }
            other => panic!("expected cache unicast, got {other:?}"),
        }
        assert!(matches!(
            &events[join_pos + 2],
            Recorded::Emit(r, ChannelEvent::Joined { .. }) if *r == room
        ));
    }

    #[test]
    fn join_without_history_sends_no_cache_event() {
        let f = fixture(true);
        let watcher = ConnectionId::new();
        f.channel
            .join(watcher, f.order_id, f.customer, Role::Customer)
            .expect("join");
        assert!(!f
            .transport
            .events()
            .iter()
            .any(|e| matches!(e, Recorded::Unicast(..))));
    }

    #[test]
    fn join_is_gated_by_authorization() {
        let f = fixture(true);
        let watcher = ConnectionId::new();
        assert_eq!(
            f.channel.join(watcher, f.order_id, Uuid::new_v4(), Role::Customer),
            Err(ChannelError::NotAuthorized)
        );
        assert!(f.transport.events().is_empty());
    }

    #[test]
    fn leave_needs_no_authorization() {
        let f = fixture(true);
        let watcher = ConnectionId::new();
        f.channel
            .join(watcher, f.order_id, f.customer, Role::Customer)
            .expect("join");
        f.channel.leave(watcher, f.order_id);
        assert!(f
            .transport
            .events()
            .contains(&Recorded::Leave(watcher, order_room(f.order_id))));
    }
}
