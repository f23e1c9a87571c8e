//! The bidirectional index at the heart of the emitter.
//!
//! Maps routing keys to hostname sets and endpoints, and computes the exact
//! registration/unregistration diff implied by every mutation.

mod by_routing_key;
mod registry_message;
mod schema;
mod table;

pub use by_routing_key::*;
pub use registry_message::*;
pub use schema::*;
pub use table::*;
