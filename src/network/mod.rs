//! Network subsystem: the bidirectional stream to the remote endpoint

pub mod connection;
pub mod websocket;

pub use connection::{ConnectionHandle, Connector, LiveConnection, ServerEvent, CLOSE_NORMAL};
pub use websocket::WebSocketConnector;
