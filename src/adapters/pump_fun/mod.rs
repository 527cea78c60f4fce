//! Pump.fun Adapter
//!
//! Real-time token launch feed via the PumpPortal WebSocket API.
//!
//! # WebSocket Protocol
//!
//! The feed at `wss://pumpportal.fun/api/data` accepts a JSON subscription
//! request. This adapter only sends `subscribeNewToken`, after which every
//! token creation arrives as one JSON text frame. The server also sends a
//! `{"message": ...}` acknowledgement and `{"errors": ...}` on bad requests.

mod connection;
mod types;

pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionState, FeedError, FeedSource,
    ReconnectPolicy, DEFAULT_RECONNECT_DELAY, DEFAULT_WS_URL,
};
pub use types::{
    parse_feed_message, FeedMessage, FeedParseError, NewTokenMessage, SubscribeMessage,
    MAX_MESSAGE_SIZE,
};
