// ============================
// backend-lib/src/directory.rs
// ============================
//! Connection directory: live connections, their profiles and memberships.
//!
//! The connection id is the key into every per-connection table, so looking
//! up "the current user" never scans a member list.
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use roomsync_common::{ConnectedUser, ConnectionId, ServerFrame, UserId, UserProfile};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppError;

/// Outbound frame queue of one connection
pub type Outbox = mpsc::Sender<ServerFrame>;

/// The single (room, platform) pair a connection belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub room_id: String,
    pub platform: String,
}

/// Directory entry for one live connection
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub outbox: Outbox,
    pub profile: Option<UserProfile>,
    pub membership: Option<Membership>,
    pub connected_at: DateTime<Utc>,
}

/// Directory of live connections
#[derive(Debug, Default)]
pub struct ConnectionDirectory {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new transport connection and hand out its id
    pub fn register(&self, outbox: Outbox) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            ConnectionEntry {
                outbox,
                profile: None,
                membership: None,
                connected_at: Utc::now(),
            },
        );
        id
    }

    /// Store (or overwrite) the profile of a connection
    pub fn configure(&self, id: ConnectionId, profile: UserProfile) -> Result<UserProfile, AppError> {
        let mut entry = self
            .connections
            .get_mut(&id)
            .ok_or(AppError::UnknownConnection)?;
        entry.profile = Some(profile.clone());
        Ok(profile)
    }

    /// Profile of a connection. Unknown and unconfigured connections fail
    /// with different errors.
    pub fn lookup(&self, id: ConnectionId) -> Result<UserProfile, AppError> {
        let entry = self
            .connections
            .get(&id)
            .ok_or(AppError::UnknownConnection)?;
        entry.profile.clone().ok_or(AppError::Unauthenticated)
    }

    /// Remove a connection, returning what was known about it
    pub fn forget(&self, id: ConnectionId) -> Option<ConnectionEntry> {
        self.connections.remove(&id).map(|(_, entry)| entry)
    }

    pub fn outbox(&self, id: ConnectionId) -> Option<Outbox> {
        self.connections.get(&id).map(|entry| entry.outbox.clone())
    }

    pub fn membership(&self, id: ConnectionId) -> Option<Membership> {
        self.connections
            .get(&id)
            .and_then(|entry| entry.membership.clone())
    }

    /// Record the current membership. A forgotten connection is ignored.
    pub fn set_membership(&self, id: ConnectionId, membership: Option<Membership>) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            entry.membership = membership;
        }
    }

    /// Configured connections, optionally restricted to one platform
    pub fn connected_users(&self, platform: Option<&str>) -> Vec<ConnectedUser> {
        let mut users: Vec<(DateTime<Utc>, ConnectedUser)> = self
            .connections
            .iter()
            .filter_map(|entry| {
                let profile = entry.profile.as_ref()?;
                if platform.is_some_and(|p| p != profile.platform) {
                    return None;
                }
                Some((entry.connected_at, connected_user(*entry.key(), profile)))
            })
            .collect();
        users.sort_by_key(|(at, _)| *at);
        users.into_iter().map(|(_, user)| user).collect()
    }

    /// Configured connections on `platform` whose user id is in `user_ids`
    pub fn find_by_user_ids(&self, user_ids: &[UserId], platform: &str) -> Vec<ConnectedUser> {
        self.connected_users(Some(platform))
            .into_iter()
            .filter(|user| {
                user.user_id
                    .as_ref()
                    .is_some_and(|id| user_ids.iter().any(|wanted| wanted.matches(id)))
            })
            .collect()
    }

    /// Every live connection with its outbox
    pub fn outboxes(&self) -> Vec<(ConnectionId, Outbox)> {
        self.connections
            .iter()
            .map(|entry| (*entry.key(), entry.outbox.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

fn connected_user(id: ConnectionId, profile: &UserProfile) -> ConnectedUser {
    ConnectedUser {
        socket_id: id,
        name: profile.name.clone(),
        user_id: profile.user_id.clone(),
        platform: profile.platform.clone(),
    }
}
