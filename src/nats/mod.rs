//! Pub/sub seam: the client trait the core consumes, the `async_nats`
//! adapter, and the registry-message emitter.

mod client;
mod emitter;

pub use client::*;
pub use emitter::*;
