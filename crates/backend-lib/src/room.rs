// ============================
// crates/backend-lib/src/room.rs
// ============================
//! Room state model: the data structures, invariants and validation
//! predicates. Mutation lives in the coordinator; everything here is
//! construction and read-only checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use wordrush_common::{Role, RoomCode};

/// Storage key of a room document in the shared store.
pub fn room_key(code: RoomCode) -> String {
    format!("room:{code}")
}

/// Ephemeral binding of a transport identifier to a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub connected_at: DateTime<Utc>,
}

/// One cycle of consonant-constrained word submission.
///
/// `words_used_this_game` spans rounds: a word submitted in round 1
/// stays burned for the whole game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Round {
    pub round_number: u32,
    /// BTreeSet keeps the serialized document deterministic
    pub consonants: BTreeSet<char>,
    pub started_at: Option<DateTime<Utc>>,
    pub words_used_this_game: BTreeSet<String>,
}

/// The unit of coordination. The authoritative copy lives in the
/// shared store as a JSON document under `room:{code}`; local caches
/// are advisory and refreshed before membership-dependent writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub code: RoomCode,
    pub created_at: DateTime<Utc>,
    pub expires_after: DateTime<Utc>,
    /// Max concurrent player-role connections; spectators unbounded
    pub capacity: u32,
    pub owner_connection_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub is_private: bool,
    pub password: Option<String>,
    pub is_closed: bool,
    /// connection id -> who holds it. Invariant: at most one live
    /// connection per distinct user id.
    pub connections: HashMap<String, ConnectionInfo>,
    pub round: Round,
    /// user id -> cumulative score this game
    pub scores: HashMap<String, u32>,
    pub game_started: bool,
    pub game_completed: bool,
}

impl Room {
    pub fn new(
        code: RoomCode,
        capacity: u32,
        is_private: bool,
        password: Option<String>,
        ttl: chrono::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            code,
            created_at: now,
            expires_after: now + ttl,
            capacity,
            owner_connection_id: None,
            owner_user_id: None,
            is_private,
            password,
            is_closed: false,
            connections: HashMap::new(),
            round: Round::default(),
            scores: HashMap::new(),
            game_started: false,
            game_completed: false,
        }
    }

    /// Live connections holding the player role.
    pub fn live_player_count(&self) -> usize {
        self.connections
            .values()
            .filter(|c| c.role == Role::Player)
            .count()
    }

    /// Whether a join with `role` would exceed capacity. Spectators
    /// never fill a room.
    pub fn is_full(&self, role: Role) -> bool {
        match role {
            Role::Player => self.live_player_count() >= self.capacity as usize,
            Role::Spectator => false,
        }
    }

    /// Trimmed, case-sensitive comparison against the stored password.
    /// Rooms without a password accept anything.
    pub fn is_password_valid(&self, candidate: Option<&str>) -> bool {
        if !self.is_private {
            return true;
        }
        match &self.password {
            None => true,
            Some(stored) => candidate.map(str::trim) == Some(stored.as_str()),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_after
    }

    /// A room with no connections or past its expiry is reclaimable
    /// by the cache sweep.
    pub fn is_reclaimable(&self, now: DateTime<Utc>) -> bool {
        self.connections.is_empty() || self.is_expired(now)
    }

    /// Deterministic owner-failover successor: the remaining player
    /// with the lexicographically smallest connection id. Map
    /// iteration order differs across instances, so the tie-break is
    /// what keeps failover reproducible.
    pub fn failover_candidate(&self) -> Option<(&str, &ConnectionInfo)> {
        self.connections
            .iter()
            .filter(|(_, info)| info.role == Role::Player)
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(id, info)| (id.as_str(), info))
    }

    /// Connection ids held by `user_id` other than `keep`. These are
    /// the stale entries the dedup rule purges on a fresh join.
    pub fn stale_connections_of(&self, user_id: &str, keep: &str) -> Vec<String> {
        self.connections
            .iter()
            .filter(|(id, info)| info.user_id == user_id && id.as_str() != keep)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn score_of(&self, user_id: &str) -> u32 {
        self.scores.get(user_id).copied().unwrap_or(0)
    }
}
