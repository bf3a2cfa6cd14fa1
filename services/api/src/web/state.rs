//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::{cookie::SessionCookie, gateway::PushGateway};
use contest_board_core::ports::{
    Broadcaster, ContentStore, SessionReader, SessionStore, UploadStore, UserStore,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests and Push Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub content: Arc<dyn ContentStore>,
    pub uploads: Arc<dyn UploadStore>,
    /// Handlers publish through this; in production it is `gateway`.
    pub broadcaster: Arc<dyn Broadcaster>,
    pub gateway: Arc<PushGateway>,
    pub cookie: Arc<SessionCookie>,
    pub config: Arc<Config>,
}

/// The stores a running service needs, opened at startup.
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    /// The same session store, seen through its read-only port.
    pub session_reader: Arc<dyn SessionReader>,
    pub content: Arc<dyn ContentStore>,
    pub uploads: Arc<dyn UploadStore>,
}

impl AppState {
    /// Wires the stores, the cookie and the gateway together. The HTTP session
    /// layer and the push gateway share one `SessionCookie`.
    pub fn new(config: Arc<Config>, stores: Stores) -> Self {
        let cookie = Arc::new(SessionCookie::new(
            config.session_cookie_name.clone(),
            config.session_secret.as_bytes(),
            config.session_ttl,
        ));
        let gateway = Arc::new(PushGateway::new(stores.session_reader, cookie.clone()));

        Self {
            users: stores.users,
            sessions: stores.sessions,
            content: stores.content,
            uploads: stores.uploads,
            broadcaster: gateway.clone(),
            gateway,
            cookie,
            config,
        }
    }
}
