//! HTTP Handlers

mod job;
mod ping;
mod websocket;

pub use job::*;
pub use ping::*;
pub use websocket::*;
