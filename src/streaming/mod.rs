mod handlers;
mod server;
mod stats;

pub use handlers::ResetRequest;
pub use server::{ServerState, StreamServer, StreamServerBuilder};
pub use stats::{ConnectionStats, ConnectionStatsSnapshot};
