//! # route-emitter
//!
//! A long-running agent bridging a cluster scheduler's view of running
//! application instances to a front-end HTTP router's view of reachable
//! endpoints.
//!
//! ## Core Concepts
//! - **Routing table**: bidirectional index over hostnames, endpoints, and
//!   (process, container-port) keys; every mutation returns the exact
//!   registration/unregistration diff it implies
//! - **Syncer**: periodic full-snapshot reconciliation plus the router
//!   heartbeat handshake
//! - **Watcher**: incremental event application, buffering events that arrive
//!   while a snapshot is in flight
//!
//! The table is rebuilt from every snapshot and every binding is re-announced
//! on every heartbeat, so a dropped message or skipped cycle heals itself.

pub mod config;
pub mod constants;
pub mod metrics;
pub mod nats;
pub mod routing_table;
pub mod scheduler;
pub mod syncer;
pub mod watcher;

mod errors;

#[doc(hidden)]
pub use self::config::*;
pub use errors::*;
#[doc(hidden)]
pub use routing_table::*;
#[doc(hidden)]
pub use scheduler::*;

#[doc(hidden)]
pub mod utils;
#[doc(hidden)]
pub use utils::*;

//-----------------------------------------------------------
// Test utils
#[cfg(test)]
#[doc(hidden)]
pub mod test_utils;
