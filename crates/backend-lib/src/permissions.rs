//! Permission resolver: who may mutate a (room, platform) data payload.
//!
//! The first connection to join an empty view becomes its editor. When the
//! editor leaves, the earliest remaining member by join order is promoted.
//! Ties are broken by join order only; role and identity play no part.
use roomsync_common::ConnectionId;
use tracing::error;

use crate::room::PlatformView;

/// Assign edit rights to a member that just joined `view`.
pub fn assign_on_join(view: &mut PlatformView, connection_id: ConnectionId) -> bool {
    if view.editor.is_none() {
        view.editor = Some(connection_id);
        return true;
    }
    view.editor == Some(connection_id)
}

/// Reassign edit rights after `leaving` was removed from `view`.
///
/// Returns the promoted member, if any.
pub fn reassign_on_leave(view: &mut PlatformView, leaving: ConnectionId) -> Option<ConnectionId> {
    if view.editor != Some(leaving) {
        return None;
    }
    view.editor = view.members.first().map(|m| m.connection_id);
    view.editor
}

/// Repair a view whose editor is stale, or that has members but no editor.
///
/// Returns true when a repair was needed.
pub fn reconcile(view: &mut PlatformView) -> bool {
    let healthy = match view.editor {
        Some(editor) => view.is_member(editor),
        None => view.members.is_empty(),
    };
    if healthy {
        return false;
    }

    let stale = view.editor;
    view.editor = view.members.first().map(|m| m.connection_id);
    error!(
        ?stale,
        repaired = ?view.editor,
        members = view.members.len(),
        "editor invariant violated; re-ran permission resolution"
    );
    true
}
