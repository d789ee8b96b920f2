// ============================
// backend-lib/src/registry.rs
// ============================
//! Session registry: room id -> live room actor.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use metrics::{counter, gauge};
use tracing::info;

use crate::gateway::BroadcastGateway;
use crate::metrics::{ROOM_ACTIVE, ROOM_CREATED};
use crate::room_actor::{spawn_room_actor, RoomHandle, RoomTable};

/// Registry of all rooms that currently have at least one member
pub struct SessionRegistry {
    rooms: RoomTable,
    next_generation: AtomicU64,
    gateway: BroadcastGateway,
}

impl SessionRegistry {
    pub fn new(gateway: BroadcastGateway) -> Self {
        SessionRegistry {
            rooms: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
            gateway,
        }
    }

    /// Handle of the live actor for `room_id`, spawning one if needed.
    ///
    /// A handle whose actor already stopped is replaced.
    pub fn get_or_create(&self, room_id: &str) -> RoomHandle {
        let mut created = false;
        let handle = {
            let mut entry = self
                .rooms
                .entry(room_id.to_string())
                .or_insert_with(|| {
                    created = true;
                    self.spawn(room_id)
                });
            if entry.is_closed() {
                created = true;
                *entry = self.spawn(room_id);
            }
            entry.clone()
        };

        if created {
            info!(room_id, generation = handle.generation(), "room created");
            counter!(ROOM_CREATED).increment(1);
            gauge!(ROOM_ACTIVE).set(self.rooms.len() as f64);
        }
        handle
    }

    /// Handle of an existing room, without creating one
    pub fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms
            .get(room_id)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn spawn(&self, room_id: &str) -> RoomHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        spawn_room_actor(room_id, generation, self.gateway.clone(), self.rooms.clone())
    }
}

/// Drop the entry for `room_id` if it still belongs to `generation`.
///
/// A newer actor registered under the same id is left alone.
pub(crate) fn remove_room(rooms: &RoomTable, room_id: &str, generation: u64) -> bool {
    let removed = rooms
        .remove_if(room_id, |_, handle| handle.generation() == generation)
        .is_some();
    if removed {
        gauge!(ROOM_ACTIVE).set(rooms.len() as f64);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ConnectionDirectory;
    use roomsync_common::UserProfile;
    use tokio::sync::mpsc;

    fn registry() -> (SessionRegistry, Arc<ConnectionDirectory>) {
        let directory = Arc::new(ConnectionDirectory::new());
        let registry = SessionRegistry::new(BroadcastGateway::new(directory.clone()));
        (registry, directory)
    }

    #[tokio::test]
    async fn get_or_create_reuses_live_room() {
        let (registry, _) = registry();
        let first = registry.get_or_create("r1");
        let second = registry.get_or_create("r1");

        assert_eq!(first.generation(), second.generation());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("r2").is_none());
    }

    #[tokio::test]
    async fn emptied_room_is_recreated_with_new_generation() {
        let (registry, directory) = registry();
        let a = directory.register(mpsc::channel(8).0);
        let profile = UserProfile {
            name: "a".into(),
            user_id: None,
            platform: "web".into(),
        };

        let first = registry.get_or_create("r1");
        first.join(a, "web".into(), profile).await.unwrap();
        first.leave(a, "web".into()).await.unwrap();
        assert!(registry.get("r1").is_none());
        assert!(registry.is_empty());

        let second = registry.get_or_create("r1");
        assert!(second.generation() > first.generation());
        assert!(second.info("web".into(), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_checks_generation() {
        let (registry, _) = registry();
        let handle = registry.get_or_create("r1");

        assert!(!remove_room(&registry.rooms, "r1", handle.generation() + 1));
        assert!(registry.get("r1").is_some());
        assert!(remove_room(&registry.rooms, "r1", handle.generation()));
        assert!(registry.is_empty());
    }
}
