//! Models and client surface for the cluster scheduler.

mod client;
mod events;
mod models;

pub use client::*;
pub use events::*;
pub use models::*;
