// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for Prometheus metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_DISCONNECTION: &str = "ws.disconnection";
pub const WS_ACTIVE: &str = "ws.active";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_JOINED: &str = "room.joined";
pub const ROOM_CLOSED: &str = "room.closed";
pub const OWNER_FAILOVER: &str = "room.owner_failover";
pub const GUESS_ACCEPTED: &str = "guess.accepted";
pub const GUESS_REJECTED: &str = "guess.rejected";
pub const RATE_LIMIT_DENIED: &str = "rate_limit.denied";
pub const BROADCAST_DROPPED: &str = "broadcast.dropped";
pub const STORE_UNAVAILABLE: &str = "store.unavailable";
