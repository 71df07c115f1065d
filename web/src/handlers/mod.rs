//! Transport handlers: unary calls over HTTP, streaming calls over WebSocket.

pub mod health;
pub mod streaming;
pub mod unary;

pub use health::health_check;
