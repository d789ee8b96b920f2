// ============================
// backend-lib/src/room_actor.rs
// ============================
//! One actor task per room.
//!
//! Every mutating operation on a room is a command on the actor's queue, so
//! joins, leaves, updates and disconnect cleanup for one room never
//! interleave. When the last member leaves, the actor removes its own
//! registry entry (only if the generation still matches) and stops. Commands
//! still queued at that point are dropped with the receiver, their reply
//! channels close, and callers see `AppError::RoomClosed`.
use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use roomsync_common::{ConnectionId, RoomData, RoomSnapshot, UserProfile};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::AppError;
use crate::gateway::BroadcastGateway;
use crate::metrics::{EDITOR_PROMOTED, ROOM_DESTROYED, ROOM_UPDATED, UPDATE_FORBIDDEN};
use crate::registry::remove_room;
use crate::room::{LeaveOutcome, Room};

/// Room id -> handle of the live actor
pub type RoomTable = Arc<DashMap<String, RoomHandle>>;

/// Message sent *into* the actor
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        connection_id: ConnectionId,
        platform: String,
        profile: UserProfile,
        resp_tx: oneshot::Sender<RoomSnapshot>,
    },
    Leave {
        connection_id: ConnectionId,
        platform: String,
        resp_tx: oneshot::Sender<bool>,
    },
    /// Remove a connection from every platform of this room
    Evict {
        connection_id: ConnectionId,
        resp_tx: oneshot::Sender<usize>,
    },
    Update {
        connection_id: ConnectionId,
        platform: String,
        data: RoomData,
        event_id: Option<String>,
        resp_tx: oneshot::Sender<Result<RoomSnapshot, AppError>>,
    },
    Info {
        platform: String,
        viewer: Option<ConnectionId>,
        resp_tx: oneshot::Sender<Option<RoomSnapshot>>,
    },
}

/// Handle that other components keep: the actor's command channel
#[derive(Clone, Debug)]
pub struct RoomHandle {
    room_id: Arc<str>,
    generation: u64,
    cmd_tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    pub async fn join(
        &self,
        connection_id: ConnectionId,
        platform: String,
        profile: UserProfile,
    ) -> Result<RoomSnapshot, AppError> {
        self.request(|resp_tx| RoomCommand::Join {
            connection_id,
            platform,
            profile,
            resp_tx,
        })
        .await
    }

    pub async fn leave(&self, connection_id: ConnectionId, platform: String) -> Result<bool, AppError> {
        self.request(|resp_tx| RoomCommand::Leave {
            connection_id,
            platform,
            resp_tx,
        })
        .await
    }

    pub async fn evict(&self, connection_id: ConnectionId) -> Result<usize, AppError> {
        self.request(|resp_tx| RoomCommand::Evict {
            connection_id,
            resp_tx,
        })
        .await
    }

    pub async fn update(
        &self,
        connection_id: ConnectionId,
        platform: String,
        data: RoomData,
        event_id: Option<String>,
    ) -> Result<RoomSnapshot, AppError> {
        self.request(|resp_tx| RoomCommand::Update {
            connection_id,
            platform,
            data,
            event_id,
            resp_tx,
        })
        .await?
    }

    pub async fn info(
        &self,
        platform: String,
        viewer: Option<ConnectionId>,
    ) -> Result<Option<RoomSnapshot>, AppError> {
        self.request(|resp_tx| RoomCommand::Info {
            platform,
            viewer,
            resp_tx,
        })
        .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx
            .send(build(resp_tx))
            .map_err(|_| AppError::RoomClosed(self.room_id.to_string()))?;
        resp_rx
            .await
            .map_err(|_| AppError::RoomClosed(self.room_id.to_string()))
    }
}

pub struct RoomActor {
    room: Room,
    generation: u64,
    gateway: BroadcastGateway,
    rooms: RoomTable,
}

impl RoomActor {
    pub fn new(room_id: &str, generation: u64, gateway: BroadcastGateway, rooms: RoomTable) -> Self {
        RoomActor {
            room: Room::new(room_id),
            generation,
            gateway,
            rooms,
        }
    }

    fn handle_join(
        &mut self,
        connection_id: ConnectionId,
        platform: &str,
        profile: &UserProfile,
    ) -> RoomSnapshot {
        let outcome = self.room.join(platform, connection_id, profile);
        if outcome.changed {
            info!(
                room_id = self.room.room_id(),
                platform,
                %connection_id,
                can_edit = ?outcome.snapshot.can_edit,
                "member joined"
            );
            let mut broadcast = outcome.snapshot.clone();
            broadcast.can_edit = None;
            self.gateway.notify_room(platform, &broadcast);
        }
        outcome.snapshot
    }

    fn handle_leave(&mut self, connection_id: ConnectionId, platform: &str) -> bool {
        match self.room.leave(platform, connection_id) {
            LeaveOutcome::NotMember => false,
            LeaveOutcome::Left { remaining, promoted } => {
                info!(room_id = self.room.room_id(), platform, %connection_id, "member left");
                if let Some(promoted) = promoted {
                    info!(room_id = self.room.room_id(), platform, %promoted, "editor promoted");
                    counter!(EDITOR_PROMOTED).increment(1);
                }
                if let Some(snapshot) = remaining {
                    self.gateway.notify_room(platform, &snapshot);
                }
                true
            },
        }
    }

    fn handle_update(
        &mut self,
        connection_id: ConnectionId,
        platform: &str,
        data: RoomData,
        event_id: Option<String>,
    ) -> Result<RoomSnapshot, AppError> {
        match self.room.update_data(platform, connection_id, data, event_id) {
            Ok(outcome) => {
                let mut broadcast = outcome.snapshot.clone();
                broadcast.can_edit = None;
                self.gateway.notify_room(platform, &broadcast);
                self.gateway
                    .notify_event(platform, &outcome.recipients, &outcome.event);
                counter!(ROOM_UPDATED, "platform" => platform.to_string()).increment(1);
                Ok(outcome.snapshot)
            },
            Err(err) => {
                if matches!(err, AppError::Forbidden) {
                    debug!(room_id = self.room.room_id(), platform, %connection_id, "update rejected");
                    counter!(UPDATE_FORBIDDEN).increment(1);
                }
                Err(err)
            },
        }
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoomCommand>) {
        while let Some(cmd) = rx.recv().await {
            let mut retired = false;
            match cmd {
                RoomCommand::Join {
                    connection_id,
                    platform,
                    profile,
                    resp_tx,
                } => {
                    let snapshot = self.handle_join(connection_id, &platform, &profile);
                    let _ = resp_tx.send(snapshot);
                },
                RoomCommand::Leave {
                    connection_id,
                    platform,
                    resp_tx,
                } => {
                    let left = self.handle_leave(connection_id, &platform);
                    retired = self.retire_if_empty();
                    let _ = resp_tx.send(left);
                },
                RoomCommand::Evict {
                    connection_id,
                    resp_tx,
                } => {
                    let mut removed = 0;
                    for platform in self.room.platforms_of(connection_id) {
                        if self.handle_leave(connection_id, &platform) {
                            removed += 1;
                        }
                    }
                    retired = self.retire_if_empty();
                    let _ = resp_tx.send(removed);
                },
                RoomCommand::Update {
                    connection_id,
                    platform,
                    data,
                    event_id,
                    resp_tx,
                } => {
                    let result = self.handle_update(connection_id, &platform, data, event_id);
                    let _ = resp_tx.send(result);
                },
                RoomCommand::Info {
                    platform,
                    viewer,
                    resp_tx,
                } => {
                    let _ = resp_tx.send(self.room.snapshot(&platform, viewer));
                },
            }

            if retired {
                break;
            }
        }
    }

    /// Unregister an empty room before its caller hears back, so nobody
    /// can look it up once the last leave has been acknowledged
    fn retire_if_empty(&self) -> bool {
        if !self.room.is_empty() {
            return false;
        }
        let room_id = self.room.room_id();
        let generation = self.generation;
        remove_room(&self.rooms, room_id, generation);
        info!(
            room_id,
            generation,
            lifetime_secs = (chrono::Utc::now() - self.room.created_at()).num_seconds(),
            "room destroyed"
        );
        counter!(ROOM_DESTROYED).increment(1);
        true
    }
}

/// Spawn a new room actor and return its handle
pub fn spawn_room_actor(
    room_id: &str,
    generation: u64,
    gateway: BroadcastGateway,
    rooms: RoomTable,
) -> RoomHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let actor = RoomActor::new(room_id, generation, gateway, rooms);

    tokio::spawn(async move {
        actor.run(cmd_rx).await;
    });

    RoomHandle {
        room_id: Arc::from(room_id),
        generation,
        cmd_tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ConnectionDirectory;
    use serde_json::json;

    fn profile(name: &str) -> UserProfile {
        UserProfile {
            name: name.to_string(),
            user_id: None,
            platform: "web".to_string(),
        }
    }

    fn setup() -> (RoomHandle, RoomTable, Arc<ConnectionDirectory>) {
        let directory = Arc::new(ConnectionDirectory::new());
        let rooms: RoomTable = Arc::new(DashMap::new());
        let gateway = BroadcastGateway::new(directory.clone());
        let handle = spawn_room_actor("r1", 1, gateway, rooms.clone());
        rooms.insert("r1".to_string(), handle.clone());
        (handle, rooms, directory)
    }

    #[tokio::test]
    async fn join_update_info() {
        let (handle, _rooms, directory) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        let a = directory.register(tx);

        let snapshot = handle.join(a, "web".into(), profile("a")).await.unwrap();
        assert_eq!(snapshot.can_edit, Some(true));
        assert_eq!(rx.recv().await.unwrap().event, "room-updated-web");

        let data = json!({"k": "v"}).as_object().cloned().unwrap();
        let updated = handle
            .update(a, "web".into(), data.clone(), Some("e1".into()))
            .await
            .unwrap();
        assert_eq!(updated.data, data);

        let info = handle.info("web".into(), None).await.unwrap().unwrap();
        assert_eq!(info.last_event_id.as_deref(), Some("e1"));
        assert!(info.can_edit.is_none());
    }

    #[tokio::test]
    async fn last_leave_retires_actor_and_registry_entry() {
        let (handle, rooms, directory) = setup();
        let a = directory.register(mpsc::channel(8).0);
        handle.join(a, "web".into(), profile("a")).await.unwrap();

        assert!(handle.leave(a, "web".into()).await.unwrap());
        assert!(rooms.get("r1").is_none());

        let err = handle.info("web".into(), None).await.unwrap_err();
        assert!(matches!(err, AppError::RoomClosed(_)));
    }

    #[tokio::test]
    async fn retire_keeps_newer_generation() {
        let (handle, rooms, directory) = setup();
        let a = directory.register(mpsc::channel(8).0);
        handle.join(a, "web".into(), profile("a")).await.unwrap();

        let newer = spawn_room_actor(
            "r1",
            2,
            BroadcastGateway::new(directory.clone()),
            rooms.clone(),
        );
        rooms.insert("r1".to_string(), newer);

        handle.leave(a, "web".into()).await.unwrap();
        assert_eq!(rooms.get("r1").map(|h| h.generation()), Some(2));
    }

    #[tokio::test]
    async fn evict_removes_connection_from_all_platforms() {
        let (handle, _rooms, directory) = setup();
        let a = directory.register(mpsc::channel(8).0);
        let b = directory.register(mpsc::channel(8).0);
        handle.join(a, "web".into(), profile("a")).await.unwrap();
        handle.join(a, "ios".into(), profile("a")).await.unwrap();
        handle.join(b, "web".into(), profile("b")).await.unwrap();

        assert_eq!(handle.evict(a).await.unwrap(), 2);

        let web = handle.info("web".into(), Some(b)).await.unwrap().unwrap();
        assert_eq!(web.users.len(), 1);
        assert_eq!(web.can_edit, Some(true));
        assert!(handle.info("ios".into(), None).await.unwrap().is_none());
    }
}
