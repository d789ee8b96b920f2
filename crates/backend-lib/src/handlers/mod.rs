//! Request handlers for the WebSocket and HTTP surfaces.

pub mod http;
pub mod live;

pub use live::handle_client_frame;
