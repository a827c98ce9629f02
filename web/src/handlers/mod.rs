//! HTTP request handlers.

pub mod health;
pub mod journeys;
pub mod websocket;

pub use health::health_check;
