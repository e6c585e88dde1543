// ============================
// crates/backend-lib/src/handlers.rs
// ============================
//! Per-connection session handler.
//!
//! One `SessionHandler` is instantiated per WebSocket connection. It
//! decodes nothing itself; the router hands it already-typed
//! `ClientToServer` values (the closed tagged union — no stringly
//! dispatch past the transport boundary), and it answers with a
//! direct response plus the presence adapter's broadcast list, which
//! it fans out through the shared registries.

use metrics::counter;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::coordinator::NewConnection;
use crate::error::{AppError, RoomError};
use crate::metrics as keys;
use crate::presence::{self, Broadcast, Scope};
use crate::{AppState, ClientSender};
use wordrush_common::{Claims, ClientToServer, RoomCode, ServerToClient};

/// Attempts at drawing an unused 5-digit room code before giving up.
const CODE_DRAW_ATTEMPTS: usize = 16;

pub struct SessionHandler {
    state: Arc<AppState>,
    connection_id: String,
    tx: ClientSender,
    claims: Option<Claims>,
    /// Rooms this connection joined, for disconnect cleanup
    joined: HashSet<RoomCode>,
}

impl SessionHandler {
    pub fn new(state: Arc<AppState>, tx: ClientSender) -> Self {
        Self {
            state,
            connection_id: Uuid::new_v4().to_string(),
            tx,
            claims: None,
            joined: HashSet::new(),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Caller identity for rate-limit keys: the verified user id once
    /// a session is open, the transport id before that.
    pub fn caller_id(&self) -> &str {
        self.claims
            .as_ref()
            .map(|c| c.user_id.as_str())
            .unwrap_or(&self.connection_id)
    }

    fn claims(&self) -> Result<&Claims, AppError> {
        self.claims
            .as_ref()
            .ok_or_else(|| AppError::InvalidInput("no session open".to_string()))
    }

    /// Handle one decoded client message. Returns the direct response
    /// for this caller; room/lobby fan-out happens inside.
    pub async fn handle_message(
        &mut self,
        msg: ClientToServer,
    ) -> Result<ServerToClient, AppError> {
        match msg {
            ClientToServer::OpenSession { claims } => {
                // Claims arrive verified by the identity collaborator
                // and are trusted over any client-supplied argument.
                self.claims = Some(claims);
                self.state
                    .lobby_clients
                    .insert(self.connection_id.clone(), self.tx.clone());
                Ok(ServerToClient::SessionOpened {
                    connection_id: self.connection_id.clone(),
                })
            },
            ClientToServer::CreateRoom {
                capacity,
                is_private,
                password,
            } => self.handle_create_room(capacity, is_private, password).await,
            ClientToServer::JoinRoom {
                room_code,
                password,
                role,
            } => self.handle_join(room_code, password, role).await,
            ClientToServer::LeaveRoom { room_code } => self.handle_leave(room_code).await,
            ClientToServer::StartGame { room_code } => {
                let claims = self.claims()?.clone();
                let room = self
                    .state
                    .coordinator
                    .start_game(room_code, &claims.user_id)
                    .await?;
                let broadcasts = presence::after_game_started(&room);
                self.dispatch(broadcasts).await;
                let round = presence::round_view(&room)
                    .ok_or_else(|| AppError::Internal("started game without a round".into()))?;
                Ok(ServerToClient::GameStarted { room_code, round })
            },
            ClientToServer::SubmitGuess { room_code, word } => {
                let claims = self.claims()?.clone();
                let outcome = self
                    .state
                    .coordinator
                    .submit_guess(room_code, &claims.user_id, &word)
                    .await?;
                let broadcasts = presence::after_guess(&outcome, &claims.user_id);
                self.dispatch(broadcasts).await;
                Ok(ServerToClient::GuessAccepted {
                    room_code,
                    user_id: claims.user_id,
                    word: outcome.word,
                    points: outcome.points,
                    total_score: outcome.total_score,
                })
            },
            ClientToServer::CloseRoom { room_code } => {
                let claims = self.claims()?.clone();
                let room = self
                    .state
                    .coordinator
                    .close_room(room_code, &claims.user_id)
                    .await?;
                self.dispatch(presence::after_close(&room)).await;
                self.unregister_room(room_code);
                Ok(ServerToClient::RoomClosed { room_code })
            },
            ClientToServer::ListRooms => {
                let rooms = self
                    .state
                    .coordinator
                    .cached_rooms()
                    .iter()
                    .map(presence::room_summary)
                    .collect();
                Ok(ServerToClient::RoomList { rooms })
            },
        }
    }

    async fn handle_create_room(
        &mut self,
        capacity: Option<u32>,
        is_private: bool,
        password: Option<String>,
    ) -> Result<ServerToClient, AppError> {
        let claims = self.claims()?.clone();

        // Codes come from a small integer range; collisions are
        // expected and retried with a fresh draw.
        let mut last_err = RoomError::DuplicateCode;
        for _ in 0..CODE_DRAW_ATTEMPTS {
            let code: RoomCode = rand::rng().random_range(10_000..=99_999);
            let owner = NewConnection {
                connection_id: self.connection_id.clone(),
                user_id: claims.user_id.clone(),
                username: claims.username.clone(),
                role: claims.role,
            };
            match self
                .state
                .coordinator
                .create_room(code, Some(owner), capacity, is_private, password.clone())
                .await
            {
                Ok(room) => {
                    self.register_room(code);
                    let summary = presence::room_summary(&room);
                    self.dispatch(vec![Broadcast {
                        scope: Scope::Lobby,
                        event: ServerToClient::LobbyRoomUpdated {
                            room: summary.clone(),
                        },
                    }])
                    .await;
                    return Ok(ServerToClient::RoomCreated { room: summary });
                },
                Err(RoomError::DuplicateCode) => {
                    debug!(code, "room code collision, redrawing");
                    last_err = RoomError::DuplicateCode;
                },
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err.into())
    }

    async fn handle_join(
        &mut self,
        room_code: RoomCode,
        password: Option<String>,
        role: wordrush_common::Role,
    ) -> Result<ServerToClient, AppError> {
        let claims = self.claims()?.clone();
        let room = self
            .state
            .coordinator
            .try_add_connection(
                room_code,
                &self.connection_id,
                &claims.user_id,
                &claims.username,
                password.as_deref(),
                role,
            )
            .await?;

        self.register_room(room_code);
        self.dispatch(presence::after_join(&room, &claims.user_id))
            .await;
        Ok(ServerToClient::RoomJoined {
            room_code,
            users: presence::user_views(&room),
        })
    }

    async fn handle_leave(&mut self, room_code: RoomCode) -> Result<ServerToClient, AppError> {
        self.unregister_room(room_code);
        if let Some(outcome) = self
            .state
            .coordinator
            .remove_connection(room_code, &self.connection_id)
            .await
        {
            let users = presence::user_views(&outcome.room);
            self.dispatch(presence::after_leave(&outcome)).await;
            return Ok(ServerToClient::UserLeft {
                room_code,
                user_id: self.caller_id().to_string(),
                users,
            });
        }
        // Leaving a vanished room is as good as done
        Ok(ServerToClient::UserLeft {
            room_code,
            user_id: self.caller_id().to_string(),
            users: Vec::new(),
        })
    }

    /// Disconnect path: leave every joined room, emitting the same
    /// broadcasts an explicit leave would. An in-flight join that
    /// lost the race is resolved here by the removal being a no-op
    /// or removing the just-added connection.
    pub async fn handle_disconnect(&mut self) {
        let rooms: Vec<RoomCode> = self.joined.drain().collect();
        for code in rooms {
            self.unregister_room(code);
            if let Some(outcome) = self
                .state
                .coordinator
                .remove_connection(code, &self.connection_id)
                .await
            {
                self.dispatch(presence::after_leave(&outcome)).await;
            }
        }
        self.state.lobby_clients.remove(&self.connection_id);
    }

    fn register_room(&mut self, code: RoomCode) {
        self.joined.insert(code);
        let mut entry = self.state.room_clients.entry(code).or_default();
        if !entry.iter().any(|(id, _)| id == &self.connection_id) {
            entry.push((self.connection_id.clone(), self.tx.clone()));
        }
    }

    fn unregister_room(&mut self, code: RoomCode) {
        self.joined.remove(&code);
        if let Some(mut entry) = self.state.room_clients.get_mut(&code) {
            entry.retain(|(id, _)| id != &self.connection_id);
        }
    }

    /// Fan the adapter's dispatch list out to the registries.
    /// Delivery is fire-and-forget; a full or closed channel drops
    /// the event for that client.
    async fn dispatch(&self, broadcasts: Vec<Broadcast>) {
        for broadcast in broadcasts {
            match broadcast.scope {
                Scope::Room(code) => {
                    let targets: Vec<ClientSender> = self
                        .state
                        .room_clients
                        .get(&code)
                        .map(|entry| entry.iter().map(|(_, tx)| tx.clone()).collect())
                        .unwrap_or_default();
                    for tx in targets {
                        if tx.try_send(broadcast.event.clone()).is_err() {
                            counter!(keys::BROADCAST_DROPPED).increment(1);
                            warn!(room = code, "dropping broadcast to unreachable client");
                        }
                    }
                },
                Scope::Lobby => {
                    let targets: Vec<ClientSender> = self
                        .state
                        .lobby_clients
                        .iter()
                        .map(|entry| entry.value().clone())
                        .collect();
                    for tx in targets {
                        let _ = tx.try_send(broadcast.event.clone());
                    }
                },
            }
        }
    }
}

/// Translate a failed operation into the caller-facing error payload
/// without collapsing the rejection reason.
pub fn error_payload(err: &AppError) -> ServerToClient {
    ServerToClient::Error {
        code: err.error_code().to_string(),
        message: err.sanitized_message(),
    }
}
