// ============================
// backend-lib/src/coordinator.rs
// ============================
//! Room coordinator: the facade the transports call.
//!
//! Profile checks and membership bookkeeping happen here; room state changes
//! are forwarded to the room's actor. Nothing in this module awaits delivery
//! of a push frame.
use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use roomsync_common::{
    events, ConnectedUser, ConnectionId, RoomData, RoomSnapshot, UserId, UserProfile,
    DEFAULT_NAME, DEFAULT_PLATFORM,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::directory::{ConnectionDirectory, Membership, Outbox};
use crate::error::AppError;
use crate::gateway::BroadcastGateway;
use crate::metrics::{ROOM_JOINED, ROOM_LEFT, USER_CONFIGURED};
use crate::registry::SessionRegistry;
use crate::room_actor::RoomHandle;

/// Attempts against a room whose actor stopped under us
const ROOM_CLOSED_RETRIES: usize = 3;

pub struct RoomCoordinator {
    directory: Arc<ConnectionDirectory>,
    registry: SessionRegistry,
    gateway: BroadcastGateway,
}

impl Default for RoomCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomCoordinator {
    pub fn new() -> Self {
        let directory = Arc::new(ConnectionDirectory::new());
        let gateway = BroadcastGateway::new(directory.clone());
        RoomCoordinator {
            registry: SessionRegistry::new(gateway.clone()),
            directory,
            gateway,
        }
    }

    pub fn directory(&self) -> &ConnectionDirectory {
        &self.directory
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Register a freshly accepted transport connection
    pub fn connect(&self, outbox: Outbox) -> ConnectionId {
        let connection_id = self.directory.register(outbox);
        debug!(%connection_id, "connection registered");
        connection_id
    }

    /// Store the caller's profile, filling in defaults for omitted fields
    pub fn configure_user(
        &self,
        connection_id: ConnectionId,
        name: Option<String>,
        user_id: Option<UserId>,
        platform: Option<String>,
    ) -> Result<UserProfile, AppError> {
        let profile = UserProfile {
            name: name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            user_id,
            platform: platform.unwrap_or_else(|| DEFAULT_PLATFORM.to_string()),
        };
        let previous_platform = self
            .directory
            .lookup(connection_id)
            .ok()
            .map(|previous| previous.platform);
        let profile = self.directory.configure(connection_id, profile)?;

        info!(
            %connection_id,
            name = %profile.name,
            platform = %profile.platform,
            "user configured"
        );
        counter!(USER_CONFIGURED).increment(1);
        if let Some(previous) = previous_platform.filter(|p| *p != profile.platform) {
            self.push_connected_users(&previous);
        }
        self.push_connected_users(&profile.platform);
        Ok(profile)
    }

    /// Join `room_id` on `platform`, leaving any other membership first
    pub async fn join_room(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        platform: &str,
    ) -> Result<RoomSnapshot, AppError> {
        let profile = self.directory.lookup(connection_id)?;
        let target = Membership {
            room_id: room_id.to_string(),
            platform: platform.to_string(),
        };

        if let Some(previous) = self.directory.membership(connection_id) {
            if previous != target {
                debug!(
                    %connection_id,
                    from = %previous.room_id,
                    to = %room_id,
                    "switching rooms"
                );
                self.leave_membership(connection_id, &previous).await?;
                self.directory.set_membership(connection_id, None);
            }
        }

        let snapshot = self
            .with_room(room_id, |handle| {
                let platform = platform.to_string();
                let profile = profile.clone();
                async move { handle.join(connection_id, platform, profile).await }
            })
            .await?;

        self.directory.set_membership(connection_id, Some(target));
        counter!(ROOM_JOINED, "platform" => platform.to_string()).increment(1);
        Ok(snapshot)
    }

    /// Leave `room_id` on `platform`. Not being a member is not an error.
    pub async fn leave_room(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        platform: &str,
    ) -> Result<(), AppError> {
        self.directory.lookup(connection_id)?;
        let target = Membership {
            room_id: room_id.to_string(),
            platform: platform.to_string(),
        };

        let left = self.leave_membership(connection_id, &target).await?;
        if self.directory.membership(connection_id).as_ref() == Some(&target) {
            self.directory.set_membership(connection_id, None);
        }
        if left {
            counter!(ROOM_LEFT, "platform" => platform.to_string()).increment(1);
        }
        Ok(())
    }

    /// Replace the data payload of (`room_id`, `platform`)
    pub async fn update_room_data(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        platform: &str,
        data: RoomData,
        event_id: Option<String>,
    ) -> Result<RoomSnapshot, AppError> {
        self.directory.lookup(connection_id)?;
        let handle = self
            .registry
            .get(room_id)
            .ok_or_else(|| AppError::not_found(room_id, platform))?;

        handle
            .update(connection_id, platform.to_string(), data, event_id)
            .await
            .map_err(|err| closed_as_not_found(err, room_id, platform))
    }

    /// Snapshot of (`room_id`, `platform`); `viewer` adds that connection's
    /// `canEdit`
    pub async fn get_room_info(
        &self,
        room_id: &str,
        platform: &str,
        viewer: Option<ConnectionId>,
    ) -> Result<RoomSnapshot, AppError> {
        let handle = self
            .registry
            .get(room_id)
            .ok_or_else(|| AppError::not_found(room_id, platform))?;

        handle
            .info(platform.to_string(), viewer)
            .await
            .map_err(|err| closed_as_not_found(err, room_id, platform))?
            .ok_or_else(|| AppError::not_found(room_id, platform))
    }

    /// Forget a connection and clean up its membership
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let Some(entry) = self.directory.forget(connection_id) else {
            debug!(%connection_id, "disconnect of unknown connection");
            return;
        };

        if let Some(membership) = entry.membership {
            if let Some(handle) = self.registry.get(&membership.room_id) {
                match handle.evict(connection_id).await {
                    Ok(removed) if removed > 0 => {
                        counter!(ROOM_LEFT, "platform" => membership.platform.clone())
                            .increment(1);
                    },
                    Ok(_) | Err(AppError::RoomClosed(_)) => {},
                    Err(err) => {
                        warn!(%connection_id, room_id = %membership.room_id, %err, "disconnect cleanup failed");
                    },
                }
            }
        }

        if let Some(profile) = entry.profile {
            self.push_connected_users(&profile.platform);
        }
        info!(%connection_id, "connection closed");
    }

    /// Configured connections, optionally restricted to one platform
    pub fn connected_users(&self, platform: Option<&str>) -> Vec<ConnectedUser> {
        self.directory.connected_users(platform)
    }

    /// Push `alert-{platform}` to every live connection
    pub fn alert(&self, platform: &str, body: &Value) -> usize {
        let delivered = self.gateway.notify_all(&events::alert(platform), body);
        info!(platform, delivered, "alert sent");
        delivered
    }

    /// Push a notification to the configured connections of `user_ids` on
    /// `platform`
    pub fn notify_users(
        &self,
        user_ids: &[UserId],
        platform: &str,
        notification: &Value,
    ) -> Result<Vec<ConnectedUser>, AppError> {
        let targets = self.directory.find_by_user_ids(user_ids, platform);
        if targets.is_empty() {
            return Err(AppError::NoActiveSockets);
        }

        let ids: Vec<ConnectionId> = targets.iter().map(|user| user.socket_id).collect();
        let delivered = self
            .gateway
            .notify_connections(&ids, events::NOTIFICATIONS, notification);
        info!(platform, targets = ids.len(), delivered, "notification sent");
        Ok(targets)
    }

    fn push_connected_users(&self, platform: &str) {
        let users = self.directory.connected_users(Some(platform));
        self.gateway
            .notify_all(&events::all_connected_users(platform), &users);
    }

    /// Remove the connection from one (room, platform) pair, if it is there
    async fn leave_membership(
        &self,
        connection_id: ConnectionId,
        membership: &Membership,
    ) -> Result<bool, AppError> {
        let Some(handle) = self.registry.get(&membership.room_id) else {
            return Ok(false);
        };
        match handle
            .leave(connection_id, membership.platform.clone())
            .await
        {
            Ok(left) => Ok(left),
            // the room emptied and stopped, so the connection is gone from it
            Err(AppError::RoomClosed(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Run `op` against the live actor for `room_id`, recreating the room if
    /// its actor stopped between lookup and delivery
    async fn with_room<T, F, Fut>(&self, room_id: &str, mut op: F) -> Result<T, AppError>
    where
        F: FnMut(RoomHandle) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        for attempt in 1..=ROOM_CLOSED_RETRIES {
            let handle = self.registry.get_or_create(room_id);
            match op(handle).await {
                Err(AppError::RoomClosed(_)) => {
                    debug!(room_id, attempt, "room closed under request, retrying");
                },
                other => return other,
            }
        }
        Err(AppError::Internal(format!(
            "room {room_id} closed {ROOM_CLOSED_RETRIES} times in a row"
        )))
    }
}

fn closed_as_not_found(err: AppError, room_id: &str, platform: &str) -> AppError {
    match err {
        AppError::RoomClosed(_) => AppError::not_found(room_id, platform),
        other => other,
    }
}
