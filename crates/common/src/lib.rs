// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between room-sharing clients and the server.
//! This module defines the WebSocket envelope, the request payloads and the
//! push payloads a client can expect.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one live transport connection.
pub type ConnectionId = Uuid;

/// Opaque application payload stored per (room, platform).
pub type RoomData = serde_json::Map<String, serde_json::Value>;

/// Name used when a client configures itself without one
pub const DEFAULT_NAME: &str = "nameless";
/// Platform used when a client configures itself without one
pub const DEFAULT_PLATFORM: &str = "general";

/// Inbound event names
pub mod events {
    pub const CONFIG_USER: &str = "config-user";
    pub const JOIN_ROOM_WITH_PERMISSIONS: &str = "join-room-with-permissions";
    pub const LEAVE_ROOM_WITH_PERMISSIONS: &str = "leave-room-with-permissions";
    pub const UPDATE_ROOM_DATA: &str = "update-room-data";
    pub const GET_ROOM_INFO: &str = "get-room-info";

    /// Outbound acknowledgement of a request frame
    pub const ACK: &str = "ack";
    /// Outbound frame for input that could not be parsed at all
    pub const ERROR: &str = "error";
    /// Outbound targeted notification
    pub const NOTIFICATIONS: &str = "notifications";

    /// `room-updated-{platform}`
    pub fn room_updated(platform: &str) -> String {
        format!("room-updated-{platform}")
    }

    /// `room-event-{platform}`
    pub fn room_event(platform: &str) -> String {
        format!("room-event-{platform}")
    }

    /// `all-connected-users-{platform}`
    pub fn all_connected_users(platform: &str) -> String {
        format!("all-connected-users-{platform}")
    }

    /// `alert-{platform}`
    pub fn alert(platform: &str) -> String {
        format!("alert-{platform}")
    }
}

/// Frame sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientFrame {
    /// Event name, e.g. `join-room-with-permissions`
    pub event: String,
    /// Correlation id; when present the server answers with an `ack` frame
    #[serde(rename = "ackId", default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
    /// Event specific payload
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Frame sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerFrame {
    pub event: String,
    #[serde(rename = "ackId", default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
    pub payload: serde_json::Value,
}

impl ServerFrame {
    /// Build a push frame
    pub fn push(event: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            event: event.into(),
            ack_id: None,
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Build the acknowledgement for request `ack_id`
    pub fn ack(ack_id: u64, ack: &Ack) -> Self {
        Self {
            event: events::ACK.to_string(),
            ack_id: Some(ack_id),
            payload: serde_json::to_value(ack).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// A user id as clients send it: numeric or free-form text
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl UserId {
    /// Compare ids across representations (`7` matches `"7"`)
    pub fn matches(&self, other: &UserId) -> bool {
        match (self, other) {
            (UserId::Number(a), UserId::Number(b)) => a == b,
            (UserId::Text(a), UserId::Text(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{n}"),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

/// Profile a connection configures for itself
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<UserId>,
    pub platform: String,
}

/// Entry of the connected-users listings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectedUser {
    #[serde(rename = "socketId")]
    pub socket_id: ConnectionId,
    pub name: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<UserId>,
    pub platform: String,
}

/// Payload of `config-user`. Every field may be omitted.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ConfigUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "userId", default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub platform: Option<String>,
}

/// Payload addressing one (room, platform) pair
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoomRequest {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub platform: String,
}

/// Payload of `update-room-data`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateRoomDataRequest {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub platform: String,
    #[serde(default)]
    pub data: RoomData,
    #[serde(rename = "eventId", default)]
    pub event_id: Option<String>,
}

/// One member as it appears in a snapshot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RoomUser {
    #[serde(rename = "socketId")]
    pub socket_id: ConnectionId,
    #[serde(rename = "userId", default)]
    pub user_id: Option<UserId>,
    pub name: String,
    #[serde(rename = "canEdit")]
    pub can_edit: bool,
}

/// Full state of one (room, platform) pair
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub users: Vec<RoomUser>,
    pub data: RoomData,
    #[serde(rename = "lastEventId", default)]
    pub last_event_id: Option<String>,
    /// Edit right of the connection the snapshot was produced for
    #[serde(rename = "canEdit", default, skip_serializing_if = "Option::is_none")]
    pub can_edit: Option<bool>,
}

impl RoomSnapshot {
    /// The member currently holding edit rights
    pub fn editor(&self) -> Option<&RoomUser> {
        self.users.iter().find(|u| u.can_edit)
    }
}

/// Discrete data-change event pushed after a successful update
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RoomEvent {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "eventId")]
    pub event_id: Option<String>,
    pub data: RoomData,
    pub timestamp: DateTime<Utc>,
}

/// Acknowledgement payload. `ok: false` never carries room state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Ack {
    pub ok: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<UserProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomSnapshot>,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            code: None,
            profile: None,
            room: None,
        }
    }

    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            code: Some(code.into()),
            profile: None,
            room: None,
        }
    }

    #[must_use]
    pub fn with_room(mut self, room: RoomSnapshot) -> Self {
        self.room = Some(room);
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

/// Body of `POST /socket/notification`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NotificationRequest {
    #[serde(rename = "userIds")]
    pub user_ids: Vec<UserId>,
    pub notification: serde_json::Value,
    pub platform: String,
}
