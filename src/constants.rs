//! Pub/sub subjects spoken with the front-end router.

/// Outbound registration announcements.
pub const ROUTER_REGISTER_SUBJECT: &str = "router.register";

/// Outbound unregistration announcements.
pub const ROUTER_UNREGISTER_SUBJECT: &str = "router.unregister";

/// Published until the router declares its heartbeat interval.
pub const ROUTER_GREET_SUBJECT: &str = "router.greet";

/// Broadcast by the router; carries `minimumRegisterIntervalInSeconds`.
pub const ROUTER_START_SUBJECT: &str = "router.start";
