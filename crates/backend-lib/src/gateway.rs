// ============================
// backend-lib/src/gateway.rs
// ============================
//! Broadcast gateway.
//!
//! Delivery is best-effort and never blocks: every recipient gets a
//! `try_send` on its own bounded outbox. A full or closed outbox is logged
//! and counted and does not affect the other recipients or the operation
//! that triggered the broadcast. Acks travel through the same outbox, so
//! each connection observes frames in the order they were issued to it.
use std::sync::Arc;

use metrics::counter;
use roomsync_common::{events, ConnectionId, RoomEvent, RoomSnapshot, ServerFrame};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::directory::ConnectionDirectory;
use crate::metrics::BROADCAST_DROPPED;

/// Fan-out of push frames to connections
#[derive(Clone)]
pub struct BroadcastGateway {
    directory: Arc<ConnectionDirectory>,
}

impl BroadcastGateway {
    pub fn new(directory: Arc<ConnectionDirectory>) -> Self {
        Self { directory }
    }

    /// Push `room-updated-{platform}` to every member listed in the snapshot
    pub fn notify_room(&self, platform: &str, snapshot: &RoomSnapshot) -> usize {
        let frame = ServerFrame::push(events::room_updated(platform), snapshot);
        let recipients = snapshot.users.iter().map(|u| u.socket_id);
        self.fan_out(recipients, &frame)
    }

    /// Push `room-event-{platform}` to `recipients`
    pub fn notify_event(
        &self,
        platform: &str,
        recipients: &[ConnectionId],
        event: &RoomEvent,
    ) -> usize {
        let frame = ServerFrame::push(events::room_event(platform), event);
        self.fan_out(recipients.iter().copied(), &frame)
    }

    /// Push an event to specific connections
    pub fn notify_connections(
        &self,
        recipients: &[ConnectionId],
        event: &str,
        payload: impl Serialize,
    ) -> usize {
        let frame = ServerFrame::push(event, payload);
        self.fan_out(recipients.iter().copied(), &frame)
    }

    /// Push an event to every live connection
    pub fn notify_all(&self, event: &str, payload: impl Serialize) -> usize {
        let frame = ServerFrame::push(event, payload);
        let mut delivered = 0;
        for (id, outbox) in self.directory.outboxes() {
            if deliver(id, &outbox, frame.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    fn fan_out(&self, recipients: impl Iterator<Item = ConnectionId>, frame: &ServerFrame) -> usize {
        let mut delivered = 0;
        for id in recipients {
            let Some(outbox) = self.directory.outbox(id) else {
                debug!(%id, event = %frame.event, "recipient already disconnected");
                continue;
            };
            if deliver(id, &outbox, frame.clone()) {
                delivered += 1;
            }
        }
        delivered
    }
}

fn deliver(id: ConnectionId, outbox: &crate::directory::Outbox, frame: ServerFrame) -> bool {
    match outbox.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(frame)) => {
            warn!(%id, event = %frame.event, "outbox full, dropping frame");
            counter!(BROADCAST_DROPPED, "reason" => "full").increment(1);
            false
        },
        Err(TrySendError::Closed(frame)) => {
            debug!(%id, event = %frame.event, "outbox closed, dropping frame");
            counter!(BROADCAST_DROPPED, "reason" => "closed").increment(1);
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsync_common::{RoomData, RoomUser};
    use tokio::sync::mpsc;

    fn snapshot(ids: &[ConnectionId]) -> RoomSnapshot {
        RoomSnapshot {
            room_id: "r1".to_string(),
            users: ids
                .iter()
                .enumerate()
                .map(|(i, id)| RoomUser {
                    socket_id: *id,
                    user_id: None,
                    name: format!("u{i}"),
                    can_edit: i == 0,
                })
                .collect(),
            data: RoomData::new(),
            last_event_id: None,
            can_edit: None,
        }
    }

    #[tokio::test]
    async fn full_outbox_does_not_block_other_members() {
        let directory = Arc::new(ConnectionDirectory::new());
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        let slow = directory.register(slow_tx);
        let fast = directory.register(fast_tx);
        let gateway = BroadcastGateway::new(directory);

        let snap = snapshot(&[slow, fast]);
        assert_eq!(gateway.notify_room("web", &snap), 2);
        // slow outbox is now full
        assert_eq!(gateway.notify_room("web", &snap), 1);

        let first = fast_rx.recv().await.unwrap();
        let second = fast_rx.recv().await.unwrap();
        assert_eq!(first.event, "room-updated-web");
        assert_eq!(second.event, "room-updated-web");
    }

    #[tokio::test]
    async fn closed_and_forgotten_recipients_are_skipped() {
        let directory = Arc::new(ConnectionDirectory::new());
        let (closed_tx, closed_rx) = mpsc::channel(4);
        let (live_tx, mut live_rx) = mpsc::channel(4);
        let closed = directory.register(closed_tx);
        let live = directory.register(live_tx);
        drop(closed_rx);
        let gateway = BroadcastGateway::new(directory.clone());

        let gone = uuid::Uuid::new_v4();
        let delivered = gateway.notify_connections(&[closed, gone, live], "notifications", "hi");

        assert_eq!(delivered, 1);
        assert_eq!(live_rx.recv().await.unwrap().payload, "hi");
    }

    #[tokio::test]
    async fn per_member_order_is_preserved() {
        let directory = Arc::new(ConnectionDirectory::new());
        let (tx, mut rx) = mpsc::channel(8);
        let id = directory.register(tx);
        let gateway = BroadcastGateway::new(directory);

        gateway.notify_room("web", &snapshot(&[id]));
        gateway.notify_event(
            "web",
            &[id],
            &RoomEvent {
                room_id: "r1".to_string(),
                event_id: Some("e1".to_string()),
                data: RoomData::new(),
                timestamp: chrono::Utc::now(),
            },
        );
        gateway.notify_all("alert-web", serde_json::json!({"platform": "web"}));

        assert_eq!(rx.recv().await.unwrap().event, "room-updated-web");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "room-event-web");
        assert_eq!(event.payload["eventId"], "e1");
        assert_eq!(rx.recv().await.unwrap().event, "alert-web");
    }
}
