//! Test utilities shared by the integration tests.
//!
//! `TestClient` stands in for a WebSocket connection: it owns the receiving
//! half of the connection's outbox so tests can inspect every pushed frame.
#![allow(dead_code)]

use std::time::Duration;

use backend_lib::coordinator::RoomCoordinator;
use roomsync_common::{ConnectionId, RoomData, RoomSnapshot, ServerFrame};
use serde_json::Value;
use tokio::sync::mpsc;

const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TestClient {
    pub id: ConnectionId,
    pub rx: mpsc::Receiver<ServerFrame>,
}

impl TestClient {
    /// Every frame already queued for this client
    pub fn drain(&mut self) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Queued frames with the given event name
    pub fn drain_event(&mut self, event: &str) -> Vec<ServerFrame> {
        self.drain()
            .into_iter()
            .filter(|frame| frame.event == event)
            .collect()
    }

    /// Wait for the next frame
    pub async fn next_frame(&mut self) -> ServerFrame {
        tokio::time::timeout(FRAME_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("outbox closed")
    }

    /// Snapshots from queued `room-updated-{platform}` frames
    pub fn room_updates(&mut self, platform: &str) -> Vec<RoomSnapshot> {
        self.drain_event(&format!("room-updated-{platform}"))
            .into_iter()
            .map(|frame| serde_json::from_value(frame.payload).unwrap())
            .collect()
    }
}

/// Register a connection that has not configured a profile yet
pub fn connect(coordinator: &RoomCoordinator) -> TestClient {
    let (tx, rx) = mpsc::channel(256);
    let id = coordinator.connect(tx);
    TestClient { id, rx }
}

/// Register and configure a connection, discarding the configure pushes
pub fn configured(coordinator: &RoomCoordinator, name: &str, platform: &str) -> TestClient {
    let mut client = connect(coordinator);
    coordinator
        .configure_user(
            client.id,
            Some(name.to_string()),
            None,
            Some(platform.to_string()),
        )
        .unwrap();
    client.drain();
    client
}

/// Drop everything queued for `clients`
pub fn drain_all(clients: &mut [&mut TestClient]) {
    for client in clients.iter_mut() {
        client.drain();
    }
}

pub fn data(value: Value) -> RoomData {
    value.as_object().cloned().unwrap_or_default()
}
