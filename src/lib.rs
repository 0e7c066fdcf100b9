pub mod error;
pub mod types;
pub mod websocket;
pub use error::{RealtimeError, Result};
