pub mod auth;
pub mod cookie;
pub mod gateway;
pub mod middleware;
pub mod protocol;
pub mod questions;
pub mod rest;
pub mod router;
pub mod session;
pub mod state;
pub mod ws_handler;

// Re-export the pieces the binary needs to build the server.
pub use gateway::{start_heartbeat, PushGateway};
pub use router::build_router;
pub use ws_handler::push_handler;
