// Chat and notification sockets.
//
// A connection authenticates, joins exactly one group, then streams pointer
// frames that are validated against the store and fanned out to the group.

pub mod broadcast;
pub mod error;
mod handler;
pub mod membership;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod validator;

pub use handler::{router, SocketRouterState, SocketSettings};

pub(crate) const HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub(crate) const MAX_FRAME_BYTES: usize = 65_536;
