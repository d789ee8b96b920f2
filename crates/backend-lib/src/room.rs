// ============================
// backend-lib/src/room.rs
// ============================
//! Room state.
//!
//! A room is a set of independent per-platform views. Nothing here does I/O;
//! the room actor owns a `Room`, applies commands to it and fans the
//! resulting snapshots out through the gateway.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use roomsync_common::{
    ConnectionId, RoomData, RoomEvent, RoomSnapshot, RoomUser, UserId, UserProfile,
};
use tracing::warn;

use crate::error::AppError;
use crate::metrics::INVARIANT_REPAIRED;
use crate::permissions;

/// One member of a platform view
#[derive(Debug, Clone)]
pub struct Member {
    pub connection_id: ConnectionId,
    pub name: String,
    pub user_id: Option<UserId>,
}

/// State of one (room, platform) pair
#[derive(Debug, Default)]
pub struct PlatformView {
    /// Members in join order
    pub members: Vec<Member>,
    pub data: RoomData,
    pub last_event_id: Option<String>,
    /// The single member allowed to mutate `data`
    pub editor: Option<ConnectionId>,
}

impl PlatformView {
    pub fn is_member(&self, connection_id: ConnectionId) -> bool {
        self.members.iter().any(|m| m.connection_id == connection_id)
    }

    pub fn can_edit(&self, connection_id: ConnectionId) -> bool {
        self.editor == Some(connection_id)
    }

    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|m| m.connection_id).collect()
    }

    fn remove_member(&mut self, connection_id: ConnectionId) -> Option<Member> {
        let index = self
            .members
            .iter()
            .position(|m| m.connection_id == connection_id)?;
        Some(self.members.remove(index))
    }

    /// Snapshot of this view; `viewer` adds that connection's edit right
    pub fn snapshot(&self, room_id: &str, viewer: Option<ConnectionId>) -> RoomSnapshot {
        RoomSnapshot {
            room_id: room_id.to_string(),
            users: self
                .members
                .iter()
                .map(|m| RoomUser {
                    socket_id: m.connection_id,
                    user_id: m.user_id.clone(),
                    name: m.name.clone(),
                    can_edit: self.can_edit(m.connection_id),
                })
                .collect(),
            data: self.data.clone(),
            last_event_id: self.last_event_id.clone(),
            can_edit: viewer.map(|id| self.can_edit(id)),
        }
    }
}

/// Result of a join
#[derive(Debug)]
pub struct JoinOutcome {
    /// Snapshot carrying the joiner's `canEdit`
    pub snapshot: RoomSnapshot,
    /// False when the connection was already a member
    pub changed: bool,
}

/// Result of a leave
#[derive(Debug)]
pub enum LeaveOutcome {
    /// The connection was not a member of that view
    NotMember,
    Left {
        /// Snapshot for the remaining members; `None` once the view is gone
        remaining: Option<RoomSnapshot>,
        promoted: Option<ConnectionId>,
    },
}

/// Result of a successful data update
#[derive(Debug)]
pub struct UpdateOutcome {
    pub snapshot: RoomSnapshot,
    pub event: RoomEvent,
    pub recipients: Vec<ConnectionId>,
}

/// A room and its per-platform views
#[derive(Debug)]
pub struct Room {
    room_id: String,
    created_at: DateTime<Utc>,
    platforms: HashMap<String, PlatformView>,
}

impl Room {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            created_at: Utc::now(),
            platforms: HashMap::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True once no platform has any member left
    pub fn is_empty(&self) -> bool {
        self.platforms.values().all(|view| view.members.is_empty())
    }

    pub fn view(&self, platform: &str) -> Option<&PlatformView> {
        self.platforms.get(platform)
    }

    /// Add a member to the platform view, creating the view on first join
    pub fn join(
        &mut self,
        platform: &str,
        connection_id: ConnectionId,
        profile: &UserProfile,
    ) -> JoinOutcome {
        let view = self.platforms.entry(platform.to_string()).or_default();

        let changed = if view.is_member(connection_id) {
            false
        } else {
            view.members.push(Member {
                connection_id,
                name: profile.name.clone(),
                user_id: profile.user_id.clone(),
            });
            permissions::assign_on_join(view, connection_id);
            true
        };
        repair(&self.room_id, platform, view);

        JoinOutcome {
            snapshot: view.snapshot(&self.room_id, Some(connection_id)),
            changed,
        }
    }

    /// Remove a member; drops the platform view when it becomes empty
    pub fn leave(&mut self, platform: &str, connection_id: ConnectionId) -> LeaveOutcome {
        let Some(view) = self.platforms.get_mut(platform) else {
            return LeaveOutcome::NotMember;
        };
        if view.remove_member(connection_id).is_none() {
            return LeaveOutcome::NotMember;
        }

        let promoted = permissions::reassign_on_leave(view, connection_id);
        if view.members.is_empty() {
            self.platforms.remove(platform);
            return LeaveOutcome::Left {
                remaining: None,
                promoted,
            };
        }

        repair(&self.room_id, platform, view);
        LeaveOutcome::Left {
            remaining: Some(view.snapshot(&self.room_id, None)),
            promoted,
        }
    }

    /// Replace the data payload. Only the current editor may do this.
    pub fn update_data(
        &mut self,
        platform: &str,
        connection_id: ConnectionId,
        data: RoomData,
        event_id: Option<String>,
    ) -> Result<UpdateOutcome, AppError> {
        let room_id = self.room_id.clone();
        let view = self
            .platforms
            .get_mut(platform)
            .ok_or_else(|| AppError::not_found(&room_id, platform))?;
        repair(&room_id, platform, view);

        if !view.can_edit(connection_id) {
            return Err(AppError::Forbidden);
        }

        view.data = data;
        if let Some(event_id) = &event_id {
            view.last_event_id = Some(event_id.clone());
        }

        let event = RoomEvent {
            room_id: room_id.clone(),
            event_id,
            data: view.data.clone(),
            timestamp: Utc::now(),
        };

        Ok(UpdateOutcome {
            snapshot: view.snapshot(&room_id, Some(connection_id)),
            event,
            recipients: view.member_ids(),
        })
    }

    pub fn snapshot(&self, platform: &str, viewer: Option<ConnectionId>) -> Option<RoomSnapshot> {
        self.platforms
            .get(platform)
            .map(|view| view.snapshot(&self.room_id, viewer))
    }

    /// Platforms on which `connection_id` is a member
    pub fn platforms_of(&self, connection_id: ConnectionId) -> Vec<String> {
        self.platforms
            .iter()
            .filter(|(_, view)| view.is_member(connection_id))
            .map(|(platform, _)| platform.clone())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn view_mut(&mut self, platform: &str) -> Option<&mut PlatformView> {
        self.platforms.get_mut(platform)
    }
}

fn repair(room_id: &str, platform: &str, view: &mut PlatformView) {
    if permissions::reconcile(view) {
        warn!(room_id, platform, "room editor repaired");
        metrics::counter!(INVARIANT_REPAIRED).increment(1);
    }
}
