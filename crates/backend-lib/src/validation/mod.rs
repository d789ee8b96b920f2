// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Message validation module.

use regex::Regex;
use roomsync_common::{ConfigUserRequest, RoomRequest, UpdateRoomDataRequest};
use std::sync::LazyLock;
use thiserror::Error;

use crate::error::AppError;

// Common validation constants
const MAX_ROOM_ID_LENGTH: usize = 128;
const MAX_PLATFORM_LENGTH: usize = 32;
const MAX_NAME_LENGTH: usize = 100;
const MAX_EVENT_ID_LENGTH: usize = 128;

// Platforms end up inside event names such as `room-updated-{platform}`
static PLATFORM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex"));
static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^<>/\\{}()\[\];]*$").expect("static regex"));

/// Possible validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid room ID: {0}")]
    InvalidRoomId(String),

    #[error("Invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid event ID: {0}")]
    InvalidEventId(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a room ID
pub fn validate_room_id(room_id: &str) -> ValidationResult<&str> {
    if room_id.is_empty() {
        return Err(ValidationError::InvalidRoomId(
            "Room ID must not be empty".to_string(),
        ));
    }

    if room_id.chars().count() > MAX_ROOM_ID_LENGTH {
        return Err(ValidationError::InvalidRoomId(format!(
            "Room ID cannot exceed {MAX_ROOM_ID_LENGTH} characters"
        )));
    }

    if room_id.chars().any(char::is_control) {
        return Err(ValidationError::InvalidRoomId(
            "Room ID must not contain control characters".to_string(),
        ));
    }

    Ok(room_id)
}

/// Validate a platform tag
pub fn validate_platform(platform: &str) -> ValidationResult<&str> {
    if platform.is_empty() {
        return Err(ValidationError::InvalidPlatform(
            "Platform must not be empty".to_string(),
        ));
    }

    if platform.len() > MAX_PLATFORM_LENGTH {
        return Err(ValidationError::InvalidPlatform(format!(
            "Platform cannot exceed {MAX_PLATFORM_LENGTH} characters"
        )));
    }

    if !PLATFORM_REGEX.is_match(platform) {
        return Err(ValidationError::InvalidPlatform(
            "Platform must contain only alphanumeric characters, '_', '.' and '-'".to_string(),
        ));
    }

    Ok(platform)
}

/// Validate a display name
pub fn validate_name(name: &str) -> ValidationResult<&str> {
    if name.trim().is_empty() {
        return Err(ValidationError::InvalidName(
            "Name must not be blank".to_string(),
        ));
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::InvalidName(format!(
            "Name must be between 1 and {MAX_NAME_LENGTH} characters"
        )));
    }

    if !NAME_REGEX.is_match(name) {
        return Err(ValidationError::InvalidName(
            "Name contains invalid characters".to_string(),
        ));
    }

    Ok(name)
}

/// Validate a client-supplied event ID
pub fn validate_event_id(event_id: &str) -> ValidationResult<&str> {
    if event_id.is_empty() || event_id.chars().count() > MAX_EVENT_ID_LENGTH {
        return Err(ValidationError::InvalidEventId(format!(
            "Event ID must be between 1 and {MAX_EVENT_ID_LENGTH} characters"
        )));
    }
    Ok(event_id)
}

pub fn validate_config_user(request: &ConfigUserRequest) -> ValidationResult<()> {
    if let Some(name) = &request.name {
        validate_name(name)?;
    }
    if let Some(platform) = &request.platform {
        validate_platform(platform)?;
    }
    Ok(())
}

pub fn validate_room_request(request: &RoomRequest) -> ValidationResult<()> {
    validate_room_id(&request.room_id)?;
    validate_platform(&request.platform)?;
    Ok(())
}

pub fn validate_update_request(request: &UpdateRoomDataRequest) -> ValidationResult<()> {
    validate_room_id(&request.room_id)?;
    validate_platform(&request.platform)?;
    if let Some(event_id) = &request.event_id {
        validate_event_id(event_id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_room_id() {
        assert!(validate_room_id("r1").is_ok());
        assert!(validate_room_id("sala de juntas #3").is_ok());
        assert!(validate_room_id("").is_err());
        assert!(validate_room_id("bad\nid").is_err());
        assert!(validate_room_id(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_platform() {
        assert!(validate_platform("web").is_ok());
        assert!(validate_platform("admin_v2.beta-1").is_ok());
        assert!(validate_platform("").is_err());
        assert!(validate_platform("with space").is_err());
        assert!(validate_platform("a/b").is_err());
        assert!(validate_platform(&"p".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Ana María").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name("<script>").is_err());
        assert!(validate_name(&"n".repeat(101)).is_err());
    }

    #[test]
    fn test_optional_config_fields_are_skipped() {
        assert!(validate_config_user(&ConfigUserRequest::default()).is_ok());

        let request = ConfigUserRequest {
            platform: Some("no spaces please".to_string()),
            ..ConfigUserRequest::default()
        };
        assert!(matches!(
            validate_config_user(&request),
            Err(ValidationError::InvalidPlatform(_))
        ));
    }

    #[test]
    fn test_update_request_event_id() {
        let mut request = UpdateRoomDataRequest {
            room_id: "r1".to_string(),
            platform: "web".to_string(),
            data: Default::default(),
            event_id: Some(String::new()),
        };
        assert!(validate_update_request(&request).is_err());

        request.event_id = Some("e1".to_string());
        assert!(validate_update_request(&request).is_ok());
    }

    #[test]
    fn test_validation_error_maps_to_invalid_input() {
        let err: AppError = ValidationError::InvalidPlatform("x".to_string()).into();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }
}
