// ============================
// crates/backend-lib/src/handlers/live.rs
// ============================
//! Live WebSocket event handlers.
//!
//! Each inbound frame is decoded, validated and forwarded to the room
//! coordinator. The outcome becomes an `ack` frame when the client asked for
//! one (`ackId` present); pushes caused by the operation are delivered by the
//! broadcast gateway independently.
use std::time::Instant;

use metrics::{counter, histogram};
use roomsync_common::{
    events, Ack, ClientFrame, ConfigUserRequest, ConnectionId, RoomRequest, ServerFrame,
    UpdateRoomDataRequest,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::coordinator::RoomCoordinator;
use crate::error::AppError;
use crate::metrics::{WS_EVENT, WS_EVENT_DURATION};
use crate::validation;

/// Code of the ack sent for an event name the server does not handle
pub const UNKNOWN_EVENT: &str = "UNKNOWN_EVENT";

/// Handle one decoded client frame; returns the ack to send, if any
pub async fn handle_client_frame(
    coordinator: &RoomCoordinator,
    connection_id: ConnectionId,
    frame: ClientFrame,
) -> Option<ServerFrame> {
    let ClientFrame {
        event,
        ack_id,
        payload,
    } = frame;
    let start = Instant::now();
    let label = event_label(&event);

    let ack = match dispatch(coordinator, connection_id, &event, payload).await {
        Ok(ack) => ack,
        Err(err) => {
            match err {
                AppError::Internal(_) => warn!(%connection_id, event, %err, "event failed"),
                _ => debug!(%connection_id, event, %err, "event rejected"),
            }
            err.to_ack()
        },
    };

    counter!(WS_EVENT, "event" => label, "ok" => if ack.ok { "true" } else { "false" })
        .increment(1);
    histogram!(WS_EVENT_DURATION, "event" => label).record(start.elapsed().as_secs_f64());

    ack_id.map(|id| ServerFrame::ack(id, &ack))
}

async fn dispatch(
    coordinator: &RoomCoordinator,
    connection_id: ConnectionId,
    event: &str,
    payload: Value,
) -> Result<Ack, AppError> {
    match event {
        events::CONFIG_USER => {
            let request: ConfigUserRequest = if payload.is_null() {
                ConfigUserRequest::default()
            } else {
                parse(payload)?
            };
            validation::validate_config_user(&request)?;

            let profile = coordinator.configure_user(
                connection_id,
                request.name,
                request.user_id,
                request.platform,
            )?;
            let message = format!(
                "user {}, configured for platform {}",
                profile.name, profile.platform
            );
            Ok(Ack::ok(message).with_profile(profile))
        },

        events::JOIN_ROOM_WITH_PERMISSIONS => {
            let request: RoomRequest = parse(payload)?;
            validation::validate_room_request(&request)?;

            let room = coordinator
                .join_room(connection_id, &request.room_id, &request.platform)
                .await?;
            Ok(Ack::ok("Successfully joined room with permissions").with_room(room))
        },

        events::LEAVE_ROOM_WITH_PERMISSIONS => {
            let request: RoomRequest = parse(payload)?;
            validation::validate_room_request(&request)?;

            coordinator
                .leave_room(connection_id, &request.room_id, &request.platform)
                .await?;
            Ok(Ack::ok("Successfully left room"))
        },

        events::UPDATE_ROOM_DATA => {
            let request: UpdateRoomDataRequest = parse(payload)?;
            validation::validate_update_request(&request)?;

            let room = coordinator
                .update_room_data(
                    connection_id,
                    &request.room_id,
                    &request.platform,
                    request.data,
                    request.event_id,
                )
                .await?;
            Ok(Ack::ok("Room data updated successfully").with_room(room))
        },

        events::GET_ROOM_INFO => {
            let request: RoomRequest = parse(payload)?;
            validation::validate_room_request(&request)?;

            let room = coordinator
                .get_room_info(&request.room_id, &request.platform, Some(connection_id))
                .await?;
            Ok(Ack::ok("Room info retrieved successfully").with_room(room))
        },

        other => Ok(Ack::failed(UNKNOWN_EVENT, format!("Unknown event: {other}"))),
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, AppError> {
    serde_json::from_value(payload).map_err(|e| AppError::InvalidInput(e.to_string()))
}

/// Metric label for an event name; client supplied names are not labels
fn event_label(event: &str) -> &'static str {
    match event {
        events::CONFIG_USER => events::CONFIG_USER,
        events::JOIN_ROOM_WITH_PERMISSIONS => events::JOIN_ROOM_WITH_PERMISSIONS,
        events::LEAVE_ROOM_WITH_PERMISSIONS => events::LEAVE_ROOM_WITH_PERMISSIONS,
        events::UPDATE_ROOM_DATA => events::UPDATE_ROOM_DATA,
        events::GET_ROOM_INFO => events::GET_ROOM_INFO,
        _ => "unknown",
    }
}
