// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const USER_CONFIGURED: &str = "user.configured";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_DESTROYED: &str = "room.destroyed";
pub const ROOM_ACTIVE: &str = "room.active";
pub const ROOM_JOINED: &str = "room.joined";
pub const ROOM_LEFT: &str = "room.left";
pub const ROOM_UPDATED: &str = "room.updated";
pub const UPDATE_FORBIDDEN: &str = "room.update.forbidden";
pub const EDITOR_PROMOTED: &str = "room.editor.promoted";
pub const INVARIANT_REPAIRED: &str = "room.invariant.repaired";
pub const BROADCAST_DROPPED: &str = "broadcast.dropped";
pub const HTTP_RATE_LIMITED: &str = "http.rate_limited";
pub const WS_DISCONNECTION: &str = "ws.disconnection";
pub const WS_MALFORMED: &str = "ws.malformed";
pub const WS_EVENT: &str = "ws.event";
pub const WS_EVENT_DURATION: &str = "ws.event.duration_seconds";
