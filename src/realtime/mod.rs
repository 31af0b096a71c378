//! Realtime transport: wire protocol, connection state and the WebSocket connector

pub mod messages;
mod transport;
mod websocket;

pub use messages::{ClientEvent, ServerEvent, SessionSettings, ToolDef, TurnDetection};
pub use transport::{Connector, InboundFrame, Link, Transport, OUTBOUND_CAPACITY};
pub use websocket::{subprotocols, WebSocketConnector};
