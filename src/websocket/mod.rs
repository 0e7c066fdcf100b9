//! Real-time WebSocket client for the pick'em pools API.
//!
//! This module maintains one persistent connection to the server, decodes
//! inbound frames into typed envelopes, and fans each message out to the
//! handlers subscribed to its kind. The connection recovers from failures
//! on its own with linear backoff up to a retry ceiling.
//!
//! # Architecture
//!
//! - [`RealtimeClient`]: the public facade — connect, disconnect, send,
//!   subscribe, unsubscribe
//! - [`SubscriptionRegistry`]: ordered per-kind handler lists with
//!   snapshot-based fan-out
//! - [`codec`]: JSON text-frame encoding and [`Envelope`] decoding
//!
//! # Usage
//!
//! ```no_run
//! use pickem_realtime_rs::types::kind;
//! use pickem_realtime_rs::websocket::{handler, ClientConfig, RealtimeClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = RealtimeClient::new(ClientConfig::default());
//!
//!     // Keep a clone of the handler Arc to unsubscribe later.
//!     let on_chat = handler(|envelope| {
//!         println!("chat: {:?}", envelope.payload);
//!     });
//!     client.subscribe(kind::CHAT_MESSAGE, on_chat.clone());
//!
//!     // The session token comes from the auth layer.
//!     client.connect("session-token").await.expect("bad endpoint URL");
//!
//!     tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
//!     client.unsubscribe(kind::CHAT_MESSAGE, &on_chat);
//!     client.disconnect().await;
//! }
//! ```
//!
//! # Reconnection Behavior
//!
//! After an unexpected closure the client retries automatically: the Nth
//! consecutive attempt waits `base_delay_ms * N`, and after `max_attempts`
//! consecutive failures the client goes passively `Disconnected` until the
//! next explicit [`RealtimeClient::connect`]. A successful open resets the
//! attempt counter. An explicit [`RealtimeClient::disconnect`] cancels any
//! pending retry. Watch [`RealtimeClient::state`] to surface
//! "reconnecting"/"offline" states in a UI.
//!
//! # Error Handling
//!
//! Transport failures are logged and drive the reconnect policy; they are
//! never returned from `connect`. A malformed inbound frame is logged and
//! dropped without touching the connection. Encode failures surface from
//! [`RealtimeClient::send`]; sending while not connected is a silent
//! no-op.

pub mod client;
pub mod codec;
pub mod registry;

// Re-export the primary types for easier access
pub use client::{handler, ClientConfig, ConnectionState, RealtimeClient};
pub use codec::Envelope;
pub use registry::{Handler, SubscriptionRegistry};
