// ================
// crates/common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between the Wordrush client and server.
//! This module defines the WebSocket protocol messages and supporting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Room codes are 5-digit integers drawn from 10000..=99999.
pub type RoomCode = u32;

/// Role a connection holds inside a room
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Counts against room capacity and may submit guesses
    Player,
    /// Unbounded, watch-only
    Spectator,
}

/// Verified identity claims attached to every invocation.
///
/// These arrive from the identity collaborator already verified; the
/// coordinator trusts them over any client-supplied argument carrying
/// the same name. Token issuance and verification live outside this
/// repository.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub is_admin: bool,
    /// Room the token was scoped to, if any
    pub room_code: Option<RoomCode>,
}

/// Messages sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "msgType")]
pub enum ClientToServer {
    /// Bind this connection to a verified identity
    /// # Fields
    /// * `claims` - Verified identity claims for the session
    OpenSession { claims: Claims },
    /// Create a new room; the server draws the 5-digit code
    /// # Fields
    /// * `capacity` - Max concurrent players (server default if absent)
    /// * `is_private` - Whether joins must present a password
    /// * `password` - Room password, required when `is_private`
    CreateRoom {
        capacity: Option<u32>,
        is_private: bool,
        password: Option<String>,
    },
    /// Join an existing room
    /// # Fields
    /// * `room_code` - Code of the room to join
    /// * `password` - Room password for private rooms
    /// * `role` - Join as player or spectator
    JoinRoom {
        room_code: RoomCode,
        password: Option<String>,
        role: Role,
    },
    /// Leave a room (also sent implicitly on disconnect)
    LeaveRoom { room_code: RoomCode },
    /// Start the game (owner only)
    StartGame { room_code: RoomCode },
    /// Submit a word for the active round
    SubmitGuess { room_code: RoomCode, word: String },
    /// Close the room (owner only)
    CloseRoom { room_code: RoomCode },
    /// Request the lobby listing of open rooms
    ListRooms,
}

impl ClientToServer {
    /// Stable method name used for rate-limit keys and metrics labels.
    pub fn method_name(&self) -> &'static str {
        match self {
            ClientToServer::OpenSession { .. } => "open_session",
            ClientToServer::CreateRoom { .. } => "create_room",
            ClientToServer::JoinRoom { .. } => "join_room",
            ClientToServer::LeaveRoom { .. } => "leave_room",
            ClientToServer::StartGame { .. } => "start_game",
            ClientToServer::SubmitGuess { .. } => "submit_guess",
            ClientToServer::CloseRoom { .. } => "close_room",
            ClientToServer::ListRooms => "list_rooms",
        }
    }

    /// Room segment of the rate-limit key, `"-"` when the call is not
    /// room-scoped.
    pub fn room_segment(&self) -> String {
        match self {
            ClientToServer::JoinRoom { room_code, .. }
            | ClientToServer::LeaveRoom { room_code }
            | ClientToServer::StartGame { room_code }
            | ClientToServer::SubmitGuess { room_code, .. }
            | ClientToServer::CloseRoom { room_code } => room_code.to_string(),
            _ => "-".to_string(),
        }
    }
}

/// Messages sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "msgType")]
pub enum ServerToClient {
    /// Session bound; carries the server-assigned connection id
    SessionOpened { connection_id: String },
    /// Room created by this caller
    RoomCreated { room: RoomSummary },
    /// This caller joined a room
    RoomJoined {
        room_code: RoomCode,
        users: Vec<UserView>,
    },
    /// Another user joined the room
    UserJoined {
        room_code: RoomCode,
        user: UserView,
        users: Vec<UserView>,
    },
    /// A user left the room
    UserLeft {
        room_code: RoomCode,
        user_id: String,
        users: Vec<UserView>,
    },
    /// Ownership moved to a new user after the owner disconnected
    OwnerChanged {
        room_code: RoomCode,
        owner_user_id: String,
        owner_username: String,
    },
    /// The room is closed; terminal
    RoomClosed { room_code: RoomCode },
    /// Game started; first round payload
    GameStarted {
        room_code: RoomCode,
        round: RoundView,
    },
    /// A new round began
    RoundStarted {
        room_code: RoomCode,
        round: RoundView,
    },
    /// A guess was accepted and scored
    GuessAccepted {
        room_code: RoomCode,
        user_id: String,
        word: String,
        points: u32,
        total_score: u32,
    },
    /// Ten rounds done; final scoreboard
    GameCompleted {
        room_code: RoomCode,
        scores: Vec<UserView>,
    },
    /// Lobby listing of open rooms
    RoomList { rooms: Vec<RoomSummary> },
    /// A room's lobby card changed (membership, game state)
    LobbyRoomUpdated { room: RoomSummary },
    /// The request was rejected; `code` is stable for assertions
    Error { code: String, message: String },
    /// The payload could not be decoded
    MalformedMessage { err_msg: String },
}

/// One entry per distinct user in a room, annotated with live score.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserView {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub connection_id: String,
    pub score: u32,
}

/// Outward lobby card for one room.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub code: RoomCode,
    pub player_count: usize,
    pub spectator_count: usize,
    pub capacity: u32,
    pub is_private: bool,
    pub game_started: bool,
    pub game_completed: bool,
    pub is_closed: bool,
}

/// Active round as shown to clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RoundView {
    pub round_number: u32,
    /// Sorted for a stable wire representation
    pub consonants: Vec<char>,
    pub started_at: DateTime<Utc>,
}
