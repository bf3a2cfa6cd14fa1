//! services/api/src/web/gateway.rs
//!
//! The session-bound push gateway. A push connection is authenticated with the
//! same signed cookie as the HTTP layer, attached to its user's room, and fed
//! events through an unbounded channel so that `notify` never waits on a client.

use crate::web::cookie::{CookieError, SessionCookie};
use crate::web::protocol::{PushEvent, WELCOME_EVENT};
use async_trait::async_trait;
use contest_board_core::{Broadcaster, PortError, SessionReader};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type ConnId = Uuid;

/// Channel sender half for pushing frames to one connection.
pub type PushSender = mpsc::UnboundedSender<PushFrame>;

/// What the socket forwarder writes to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    Event(PushEvent),
    Ping,
    Close,
}

/// Lifecycle of a push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    /// Valid session, but not logged in: receives nothing.
    Authorized,
    /// Logged in and a member of at least its own room.
    Joined,
    Disconnected,
    Rejected,
}

/// Why a handshake was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeRejection {
    #[error("no session cookie")]
    MissingCookie,
    #[error("session cookie signature mismatch")]
    BadSignature,
    #[error("session unknown or expired")]
    UnknownSession,
    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Who an authorized handshake belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushIdentity {
    pub session_id: String,
    pub user_id: Option<Uuid>,
    pub logged_in: bool,
}

/// Returned by `connect`: the id to use on later calls and the outbound stream.
pub struct PushAttachment {
    pub conn_id: ConnId,
    pub receiver: mpsc::UnboundedReceiver<PushFrame>,
}

/// Why a `join` request was not honoured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("connection is not registered")]
    UnknownConnection,
    #[error("connection is not logged in")]
    NotLoggedIn,
    #[error("room belongs to another user")]
    ForeignUserRoom,
}

struct PushConnection {
    session_id: String,
    user_id: Option<Uuid>,
    sender: PushSender,
    rooms: HashSet<String>,
    state: ConnectionState,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnId, PushConnection>,
    rooms: HashMap<String, HashSet<ConnId>>,
}

impl Registry {
    fn join(&mut self, conn_id: ConnId, room: &str) {
        if let Some(conn) = self.connections.get_mut(&conn_id) {
            conn.rooms.insert(room.to_string());
            conn.state = ConnectionState::Joined;
            self.rooms.entry(room.to_string()).or_default().insert(conn_id);
        }
    }

    fn remove(&mut self, conn_id: ConnId) -> Option<PushConnection> {
        let conn = self.connections.remove(&conn_id)?;
        for room in &conn.rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(&conn_id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }
        Some(conn)
    }
}

/// Tracks live push connections and the rooms they belong to.
///
/// Thread-safe via interior `RwLock`; wrapped in `Arc` and shared through `AppState`.
pub struct PushGateway {
    sessions: Arc<dyn SessionReader>,
    cookie: Arc<SessionCookie>,
    registry: RwLock<Registry>,
}

impl PushGateway {
    pub fn new(sessions: Arc<dyn SessionReader>, cookie: Arc<SessionCookie>) -> Self {
        Self {
            sessions,
            cookie,
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Validates the raw `Cookie` header of a handshake against the session store.
    pub async fn authorize(
        &self,
        cookie_header: Option<&str>,
    ) -> Result<PushIdentity, HandshakeRejection> {
        let session_id = self
            .cookie
            .session_id_from_header(cookie_header)
            .map_err(|e| match e {
                CookieError::Missing => HandshakeRejection::MissingCookie,
                CookieError::BadSignature => HandshakeRejection::BadSignature,
            })?;

        let session = self
            .sessions
            .get_session(&session_id)
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => HandshakeRejection::UnknownSession,
                other => HandshakeRejection::StoreUnavailable(other.to_string()),
            })?;

        Ok(PushIdentity {
            logged_in: session.is_logged_in(),
            session_id: session.id,
            user_id: session.user_id,
        })
    }

    /// Registers an authorized connection. Logged-in users are placed in their
    /// own room and greeted; anonymous sessions stay silent.
    pub async fn connect(&self, identity: &PushIdentity) -> PushAttachment {
        let conn_id = Uuid::new_v4();
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut registry = self.registry.write().await;
        registry.connections.insert(
            conn_id,
            PushConnection {
                session_id: identity.session_id.clone(),
                user_id: identity.user_id,
                sender: sender.clone(),
                rooms: HashSet::new(),
                state: ConnectionState::Authorized,
            },
        );

        match identity.user_id.filter(|_| identity.logged_in) {
            Some(user_id) => {
                registry.join(conn_id, &user_id.to_string());
                let _ = sender.send(PushFrame::Event(PushEvent::new(
                    WELCOME_EVENT,
                    json!({ "user_id": user_id }),
                )));
                info!(%conn_id, %user_id, "Push connection joined");
            }
            None => {
                info!(%conn_id, "Push connection authorized without login");
            }
        }

        PushAttachment { conn_id, receiver }
    }

    /// Subscribes a connection to an additional room.
    pub async fn join(&self, conn_id: ConnId, room: &str) -> Result<(), JoinError> {
        let mut guard = self.registry.write().await;
        let registry = &mut *guard;
        let conn = registry
            .connections
            .get(&conn_id)
            .ok_or(JoinError::UnknownConnection)?;
        let user_id = conn.user_id.ok_or(JoinError::NotLoggedIn)?;

        if let Ok(room_user) = Uuid::parse_str(room) {
            if room_user != user_id {
                return Err(JoinError::ForeignUserRoom);
            }
        }

        registry.join(conn_id, room);
        debug!(%conn_id, room, "Push connection joined room");
        Ok(())
    }

    /// Removes a connection from every room it belonged to.
    pub async fn disconnect(&self, conn_id: ConnId) {
        let mut registry = self.registry.write().await;
        if registry.remove(conn_id).is_some() {
            info!(%conn_id, "Push connection disconnected");
        }
    }

    /// Closes every connection opened under `session_id`. Returns how many were closed.
    pub async fn disconnect_session(&self, session_id: &str) -> usize {
        let mut registry = self.registry.write().await;
        let conn_ids: Vec<ConnId> = registry
            .connections
            .iter()
            .filter(|(_, conn)| conn.session_id == session_id)
            .map(|(conn_id, _)| *conn_id)
            .collect();
        for conn_id in &conn_ids {
            if let Some(conn) = registry.remove(*conn_id) {
                let _ = conn.sender.send(PushFrame::Close);
            }
        }
        if !conn_ids.is_empty() {
            info!(count = conn_ids.len(), "Closed push connections of ended session");
        }
        conn_ids.len()
    }

    /// Sends `event` to every current member of `room`.
    pub async fn broadcast_to_room(&self, room: &str, event: PushEvent) -> usize {
        let registry = self.registry.read().await;
        let Some(members) = registry.rooms.get(room) else {
            debug!(room, event = %event.event, "No push connections in room; dropping event");
            return 0;
        };

        let mut delivered = 0;
        for conn_id in members {
            if let Some(conn) = registry.connections.get(conn_id) {
                // A closed channel means the socket is going away; its
                // receive loop will call `disconnect`.
                if conn.sender.send(PushFrame::Event(event.clone())).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub async fn connection_state(&self, conn_id: ConnId) -> ConnectionState {
        self.registry
            .read()
            .await
            .connections
            .get(&conn_id)
            .map(|c| c.state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub async fn room_size(&self, room: &str) -> usize {
        self.registry
            .read()
            .await
            .rooms
            .get(room)
            .map_or(0, HashSet::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.connections.len()
    }

    /// Sends a Ping to every connection; used by the heartbeat task.
    pub async fn ping_all(&self) {
        let registry = self.registry.read().await;
        for conn in registry.connections.values() {
            let _ = conn.sender.send(PushFrame::Ping);
        }
    }

    /// Sends a Close to every connection, then forgets them all.
    pub async fn shutdown_all(&self) {
        let mut registry = self.registry.write().await;
        let count = registry.connections.len();
        for conn in registry.connections.values() {
            let _ = conn.sender.send(PushFrame::Close);
        }
        registry.connections.clear();
        registry.rooms.clear();
        info!(count, "Closed all push connections");
    }
}

#[async_trait]
impl Broadcaster for PushGateway {
    async fn notify(&self, room: &str, event: &str, payload: serde_json::Value) -> usize {
        let delivered = self
            .broadcast_to_room(room, PushEvent::new(event, payload))
            .await;
        if delivered > 0 {
            info!(room, event, delivered, "Push event delivered");
        } else {
            warn!(room, event, "Push event had no live recipients");
        }
        delivered
    }
}

/// Spawns a background task that pings every push connection on an interval
/// until `cancel` fires.
pub fn start_heartbeat(
    gateway: Arc<PushGateway>,
    interval: std::time::Duration,
    cancel: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let count = gateway.connection_count().await;
                    debug!(count, "Push heartbeat ping");
                    gateway.ping_all().await;
                }
            }
        }
    })
}
