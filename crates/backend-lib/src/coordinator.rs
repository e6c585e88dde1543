// ============================
// crates/backend-lib/src/coordinator.rs
// ============================
//! Room Coordination Engine
//!
//! The only component permitted to mutate a room's authoritative
//! state. Every server instance holds one coordinator; the shared
//! store is the only synchronization primitive between instances.
//!
//! # Consistency discipline
//! Every coordination write is a read-modify-write cycle:
//! refresh from the store, mutate, persist the whole room document.
//! Cycles from different instances are not atomic against each other;
//! the last writer wins at room-document granularity. The
//! dedup-by-user-id and idempotent-join rules bound the damage of
//! lost membership updates. Concurrent `submit_guess` calls for the
//! same room on two instances can both read before either writes, so
//! a true double-award is possible under adversarial timing; fixing
//! it would need a conditional write (compare-and-swap) the store is
//! not assumed to provide.
//!
//! # Store outages
//! Reads degrade to "not found". Writes still apply to the local
//! cache and surface a warning rather than silently dropping
//! membership or ownership changes.

use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::RoomError;
use crate::metrics as keys;
use crate::room::{room_key, ConnectionInfo, Room};
use crate::store::SharedStore;
use crate::words::{Lexicon, VOWELS};
use wordrush_common::{Role, RoomCode};

/// Initial connection supplied at room creation, when the creating
/// client is already attached. Server-issued rooms pass `None` and
/// start with an empty connection set.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub connection_id: String,
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

/// What `remove_connection` did, for the broadcast adapter.
#[derive(Debug, Clone)]
pub struct RemovalOutcome {
    pub room: Room,
    pub removed: Option<ConnectionInfo>,
    /// `(user_id, username)` of the promoted owner, if failover ran
    pub owner_changed: Option<(String, String)>,
    /// The room transitioned to closed because no player remained
    pub closed: bool,
}

/// An accepted guess, for the broadcast adapter.
#[derive(Debug, Clone)]
pub struct GuessOutcome {
    pub room: Room,
    pub word: String,
    pub points: u32,
    pub total_score: u32,
    /// Ten rounds reached; no further round was started
    pub completed: bool,
}

/// Coordinates room state across server instances through the shared
/// store, with an advisory per-instance cache. Injected where needed;
/// never a process-wide static.
pub struct RoomCoordinator {
    store: Arc<dyn SharedStore>,
    cache: Arc<DashMap<RoomCode, Room>>,
    words: Arc<dyn Lexicon>,
    settings: Settings,
}

impl RoomCoordinator {
    pub fn new(store: Arc<dyn SharedStore>, words: Arc<dyn Lexicon>, settings: Settings) -> Self {
        Self {
            store,
            cache: Arc::new(DashMap::new()),
            words,
            settings,
        }
    }

    fn room_ttl(&self) -> Duration {
        Duration::from_secs(self.settings.room_ttl_secs)
    }

    /// Pragmatic wait for cross-instance convergence after a
    /// game-state persist. Not a guarantee.
    async fn propagation_wait(&self) {
        let delay = self.settings.propagation_delay_ms;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// Read the room document from the store. Outages degrade to
    /// absent: the store is the sole source of truth here, so there
    /// is no fallback.
    async fn fetch(&self, code: RoomCode) -> Option<Room> {
        let bytes = match self.store.get(&room_key(code)).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                counter!(keys::STORE_UNAVAILABLE).increment(1);
                warn!(room = code, error = %e, "store read failed, treating room as absent");
                return None;
            },
        };
        match serde_json::from_slice::<Room>(&bytes) {
            Ok(room) => Some(room),
            Err(e) => {
                warn!(room = code, error = %e, "undecodable room document");
                None
            },
        }
    }

    /// Persist an updated room. The local cache is updated first so a
    /// store outage never silently drops a membership or ownership
    /// change on this instance.
    async fn persist(&self, room: &Room) {
        self.cache.insert(room.code, room.clone());
        let bytes = match serde_json::to_vec(room) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(room = room.code, error = %e, "room document failed to serialize");
                return;
            },
        };
        if let Err(e) = self.store.put(&room_key(room.code), bytes, self.room_ttl()).await {
            counter!(keys::STORE_UNAVAILABLE).increment(1);
            warn!(
                room = room.code,
                error = %e,
                "store write failed, change applied to local cache only"
            );
        }
    }

    /// Primary read path: local cache first, store on miss.
    pub async fn get_room(&self, code: RoomCode) -> Option<Room> {
        if let Some(room) = self.cache.get(&code) {
            return Some(room.clone());
        }
        let room = self.fetch(code).await?;
        self.cache.insert(code, room.clone());
        Some(room)
    }

    /// Invalidate the cache entry and re-read from the store.
    /// Required before any write whose correctness depends on the
    /// latest cross-instance membership. A store outage falls back to
    /// the cached copy so local mutations keep applying; only a
    /// confirmed absence drops the entry.
    pub async fn refresh_room(&self, code: RoomCode) -> Option<Room> {
        match self.store.get(&room_key(code)).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Room>(&bytes) {
                Ok(room) => {
                    self.cache.insert(code, room.clone());
                    Some(room)
                },
                Err(e) => {
                    warn!(room = code, error = %e, "undecodable room document");
                    self.cache.remove(&code);
                    None
                },
            },
            Ok(None) => {
                self.cache.remove(&code);
                None
            },
            Err(e) => {
                counter!(keys::STORE_UNAVAILABLE).increment(1);
                warn!(room = code, error = %e, "store read failed, serving cached copy");
                self.cache.get(&code).map(|room| room.clone())
            },
        }
    }

    /// Create a room under `code`. Callers draw codes from a small
    /// integer range and are expected to retry with a new draw on
    /// `DuplicateCode`.
    pub async fn create_room(
        &self,
        code: RoomCode,
        owner: Option<NewConnection>,
        capacity: Option<u32>,
        is_private: bool,
        password: Option<String>,
    ) -> Result<Room, RoomError> {
        if let Some(existing) = self.fetch(code).await {
            if !existing.is_closed && !existing.is_expired(Utc::now()) {
                return Err(RoomError::DuplicateCode);
            }
        }

        let capacity = capacity.unwrap_or(self.settings.default_capacity);
        let ttl = chrono::Duration::seconds(self.settings.room_ttl_secs as i64);
        let mut room = Room::new(code, capacity, is_private, password, ttl);

        if let Some(owner) = owner {
            room.connections.insert(
                owner.connection_id.clone(),
                ConnectionInfo {
                    user_id: owner.user_id.clone(),
                    username: owner.username,
                    role: owner.role,
                    connected_at: Utc::now(),
                },
            );
            room.owner_connection_id = Some(owner.connection_id);
            room.owner_user_id = Some(owner.user_id);
        }

        self.persist(&room).await;
        counter!(keys::ROOM_CREATED).increment(1);
        info!(room = code, private = is_private, "room created");
        Ok(room)
    }

    /// Join (or re-join) a room. Always begins with a refresh so the
    /// capacity and password checks run against the latest
    /// cross-instance membership.
    pub async fn try_add_connection(
        &self,
        code: RoomCode,
        connection_id: &str,
        user_id: &str,
        username: &str,
        password: Option<&str>,
        role: Role,
    ) -> Result<Room, RoomError> {
        let mut room = self.refresh_room(code).await.ok_or(RoomError::RoomNotFound)?;

        if room.is_closed {
            return Err(RoomError::RoomClosed);
        }
        if !room.is_password_valid(password) {
            return Err(RoomError::BadPassword);
        }

        // Capacity counts players of *other* users: this user's own
        // connections are about to be purged by the dedup rule, so a
        // reconnect into a full room must not bounce off its own
        // stale entry.
        if role == Role::Player {
            let other_players = room
                .connections
                .values()
                .filter(|c| c.role == Role::Player && c.user_id != user_id)
                .count();
            if other_players >= room.capacity as usize {
                return Err(RoomError::RoomFull);
            }
        }

        // Idempotent join: same connection id, identical attributes.
        if let Some(existing) = room.connections.get(connection_id) {
            if existing.user_id == user_id && existing.username == username && existing.role == role
            {
                debug!(room = code, connection = connection_id, "idempotent re-join");
                return Ok(room);
            }
        }

        // Dedup-by-user-id: clients reconnect with a new transport
        // identifier after network blips; purge the old ones.
        for stale in room.stale_connections_of(user_id, connection_id) {
            debug!(room = code, connection = %stale, user = user_id, "purging stale connection");
            room.connections.remove(&stale);
        }
        if room.owner_user_id.as_deref() == Some(user_id) {
            // The owner reconnected; the owner handle follows them.
            room.owner_connection_id = Some(connection_id.to_string());
        }

        room.connections.insert(
            connection_id.to_string(),
            ConnectionInfo {
                user_id: user_id.to_string(),
                username: username.to_string(),
                role,
                connected_at: Utc::now(),
            },
        );

        // An ownerless room adopts its first successful joiner.
        if room.owner_user_id.is_none() {
            room.owner_connection_id = Some(connection_id.to_string());
            room.owner_user_id = Some(user_id.to_string());
        }

        self.persist(&room).await;
        counter!(keys::ROOM_JOINED).increment(1);
        info!(room = code, user = user_id, ?role, "connection joined");
        Ok(room)
    }

    /// Remove a connection. Never fails: removing an absent
    /// connection (or from an absent room) is a no-op. Runs owner
    /// failover when the removed connection held the owner handle.
    pub async fn remove_connection(
        &self,
        code: RoomCode,
        connection_id: &str,
    ) -> Option<RemovalOutcome> {
        let mut room = self.refresh_room(code).await?;

        let removed = room.connections.remove(connection_id);
        if removed.is_none() {
            return Some(RemovalOutcome {
                room,
                removed: None,
                owner_changed: None,
                closed: false,
            });
        }

        let mut owner_changed = None;
        let mut closed = false;
        if room.owner_connection_id.as_deref() == Some(connection_id) {
            (owner_changed, closed) = self.handle_owner_disconnect(&mut room);
        }

        self.persist(&room).await;
        if closed {
            self.schedule_cache_eviction(code);
        }
        Some(RemovalOutcome {
            room,
            removed,
            owner_changed,
            closed,
        })
    }

    /// Owner failover: promote the remaining player with the
    /// lexicographically smallest connection id; with no player left,
    /// close the room. Returns `(promoted, closed)`.
    fn handle_owner_disconnect(&self, room: &mut Room) -> (Option<(String, String)>, bool) {
        let successor = room
            .failover_candidate()
            .map(|(id, info)| (id.to_string(), info.user_id.clone(), info.username.clone()));
        match successor {
            Some((conn_id, user_id, username)) => {
                room.owner_connection_id = Some(conn_id);
                room.owner_user_id = Some(user_id.clone());
                counter!(keys::OWNER_FAILOVER).increment(1);
                info!(room = room.code, owner = %user_id, "owner failover");
                (Some((user_id, username)), false)
            },
            None => {
                room.is_closed = true;
                room.owner_connection_id = None;
                room.owner_user_id = None;
                counter!(keys::ROOM_CLOSED).increment(1);
                info!(room = room.code, "no player remains, room closed");
                (None, true)
            },
        }
    }

    /// Deferred local-cache eviction after close, absorbing races
    /// with late-arriving joins on other instances.
    fn schedule_cache_eviction(&self, code: RoomCode) {
        let grace = Duration::from_secs(self.settings.failover_grace_secs);
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if cache
                .get(&code)
                .map(|room| room.is_closed && room.connections.is_empty())
                .unwrap_or(false)
            {
                cache.remove(&code);
            }
        });
    }

    /// Start the game: round 1 with a fresh consonant draw. Owner
    /// only.
    pub async fn start_game(&self, code: RoomCode, caller_user_id: &str) -> Result<Room, RoomError> {
        let mut room = self.refresh_room(code).await.ok_or(RoomError::RoomNotFound)?;
        if room.is_closed {
            return Err(RoomError::RoomClosed);
        }
        if room.owner_user_id.as_deref() != Some(caller_user_id) {
            return Err(RoomError::NotOwner);
        }

        room.game_started = true;
        room.game_completed = false;
        room.round.round_number = 1;
        room.round.consonants = self.words.draw_consonants(self.settings.consonants_per_round);
        room.round.started_at = Some(Utc::now());
        room.round.words_used_this_game.clear();
        room.scores.clear();

        self.persist(&room).await;
        self.propagation_wait().await;
        info!(room = code, "game started");
        Ok(room)
    }

    /// Advance to the next round with a fresh consonant draw.
    pub async fn advance_round(&self, code: RoomCode) -> Result<Room, RoomError> {
        let mut room = self.refresh_room(code).await.ok_or(RoomError::RoomNotFound)?;
        if room.is_closed {
            return Err(RoomError::RoomClosed);
        }
        Self::next_round(&mut room, self.words.as_ref(), self.settings.consonants_per_round);
        self.persist(&room).await;
        self.propagation_wait().await;
        Ok(room)
    }

    fn next_round(room: &mut Room, words: &dyn Lexicon, consonants: usize) {
        room.round.round_number += 1;
        room.round.consonants = words.draw_consonants(consonants);
        room.round.started_at = Some(Utc::now());
    }

    /// Close the room. Owner only; terminal.
    pub async fn close_room(&self, code: RoomCode, caller_user_id: &str) -> Result<Room, RoomError> {
        let mut room = self.refresh_room(code).await.ok_or(RoomError::RoomNotFound)?;
        if room.is_closed {
            return Err(RoomError::RoomClosed);
        }
        if room.owner_user_id.as_deref() != Some(caller_user_id) {
            return Err(RoomError::NotOwner);
        }
        room.is_closed = true;
        self.persist(&room).await;
        counter!(keys::ROOM_CLOSED).increment(1);
        info!(room = code, "room closed by owner");
        self.schedule_cache_eviction(code);
        Ok(room)
    }

    /// The per-guess transition.
    ///
    /// The duplicate check runs first, before the consonant and
    /// dictionary checks, so rejection reasons never leak information
    /// inconsistently between repeated submissions of the same word.
    pub async fn submit_guess(
        &self,
        code: RoomCode,
        caller_user_id: &str,
        word: &str,
    ) -> Result<GuessOutcome, RoomError> {
        let mut room = self.refresh_room(code).await.ok_or(RoomError::RoomNotFound)?;
        if room.is_closed {
            return Err(RoomError::RoomClosed);
        }
        if !room.game_started || room.game_completed {
            counter!(keys::GUESS_REJECTED).increment(1);
            return Err(RoomError::GameNotActive);
        }
        if room.round.consonants.is_empty() {
            counter!(keys::GUESS_REJECTED).increment(1);
            return Err(RoomError::NoActiveRound);
        }

        let normalized = word.trim().to_lowercase();

        if room.round.words_used_this_game.contains(&normalized) {
            counter!(keys::GUESS_REJECTED).increment(1);
            return Err(RoomError::AlreadySubmitted);
        }

        // Consonant-class letters must come from the active set;
        // vowels are always permitted.
        let disallowed = normalized
            .chars()
            .any(|c| c.is_alphabetic() && !VOWELS.contains(&c) && !room.round.consonants.contains(&c));
        if disallowed {
            counter!(keys::GUESS_REJECTED).increment(1);
            return Err(RoomError::DisallowedLetters);
        }

        if !self.words.exists(&normalized) {
            counter!(keys::GUESS_REJECTED).increment(1);
            return Err(RoomError::WordUnknown);
        }

        let points = normalized.chars().count() as u32;
        let total_score = {
            let entry = room.scores.entry(caller_user_id.to_string()).or_insert(0);
            *entry += points;
            *entry
        };
        room.round.words_used_this_game.insert(normalized.clone());

        let completed = room.round.round_number >= self.settings.rounds_per_game;
        if completed {
            room.game_completed = true;
            info!(room = code, "game completed");
        } else {
            Self::next_round(&mut room, self.words.as_ref(), self.settings.consonants_per_round);
        }

        self.persist(&room).await;
        self.propagation_wait().await;
        counter!(keys::GUESS_ACCEPTED).increment(1);
        debug!(room = code, user = caller_user_id, word = %normalized, points, "guess accepted");

        Ok(GuessOutcome {
            room,
            word: normalized,
            points,
            total_score,
            completed,
        })
    }

    /// Lobby listing built from this instance's cache of open rooms.
    pub fn cached_rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .cache
            .iter()
            .filter(|entry| !entry.is_closed)
            .map(|entry| entry.value().clone())
            .collect();
        rooms.sort_by_key(|r| r.code);
        rooms
    }

    /// Evict reclaimable rooms from the local cache. The store copy
    /// expires on its own TTL; this only bounds cache growth.
    pub fn sweep(&self) {
        let now = Utc::now();
        let before = self.cache.len();
        self.cache
            .retain(|_, room| !(room.is_closed || room.is_reclaimable(now)));
        let evicted = before - self.cache.len();
        if evicted > 0 {
            debug!(evicted, "cache sweep");
        }
    }

    /// Availability probe for the health route.
    pub async fn ping_store(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}

/// Spawn the periodic cache sweep for a coordinator.
pub fn spawn_sweeper(coordinator: Arc<RoomCoordinator>) {
    let interval = Duration::from_secs(coordinator.settings.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            coordinator.sweep();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::words::FileLexicon;

    fn setup() -> (RoomCoordinator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let words = Arc::new(FileLexicon::from_words(["bad", "cab", "dig", "fog"]));
        let coordinator = RoomCoordinator::new(
            Arc::clone(&store) as Arc<dyn SharedStore>,
            words,
            Settings::for_tests(),
        );
        (coordinator, store)
    }

    fn owner(conn: &str, user: &str) -> NewConnection {
        NewConnection {
            connection_id: conn.to_string(),
            user_id: user.to_string(),
            username: user.to_string(),
            role: Role::Player,
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_code() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(54321, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();

        let err = coordinator
            .create_room(54321, None, None, false, None)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::DuplicateCode);
    }

    #[tokio::test]
    async fn test_server_issued_room_starts_empty_and_ownerless() {
        let (coordinator, _store) = setup();
        let room = coordinator
            .create_room(10000, None, Some(4), false, None)
            .await
            .unwrap();
        assert!(room.connections.is_empty());
        assert!(room.owner_user_id.is_none());
        assert_eq!(room.capacity, 4);

        // First successful joiner becomes owner
        let room = coordinator
            .try_add_connection(10000, "c1", "alice", "alice", None, Role::Player)
            .await
            .unwrap();
        assert_eq!(room.owner_user_id.as_deref(), Some("alice"));
        assert_eq!(room.owner_connection_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_get_room_populates_cache_from_store() {
        let (coordinator, store) = setup();
        coordinator
            .create_room(20000, None, None, false, None)
            .await
            .unwrap();

        // A second coordinator on the same store simulates another
        // server instance with a cold cache.
        let other = RoomCoordinator::new(
            Arc::clone(&store) as Arc<dyn SharedStore>,
            Arc::new(FileLexicon::from_words(["bad"])),
            Settings::for_tests(),
        );
        assert!(other.get_room(20000).await.is_some());
        assert!(other.get_room(99999).await.is_none());
    }

    #[tokio::test]
    async fn test_get_room_degrades_to_not_found_on_outage() {
        let (coordinator, store) = setup();
        coordinator
            .create_room(20001, None, None, false, None)
            .await
            .unwrap();

        let other = RoomCoordinator::new(
            Arc::clone(&store) as Arc<dyn SharedStore>,
            Arc::new(FileLexicon::from_words(["bad"])),
            Settings::for_tests(),
        );
        store.set_available(false);
        assert!(other.get_room(20001).await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_sees_other_instance_writes() {
        let (a, store) = setup();
        let b = RoomCoordinator::new(
            Arc::clone(&store) as Arc<dyn SharedStore>,
            Arc::new(FileLexicon::from_words(["bad"])),
            Settings::for_tests(),
        );

        a.create_room(30000, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();
        // b caches the one-member room
        assert_eq!(b.get_room(30000).await.unwrap().connections.len(), 1);

        // a adds bob behind b's back
        a.try_add_connection(30000, "c2", "bob", "bob", None, Role::Player)
            .await
            .unwrap();

        // b's cache is stale until refreshed
        assert_eq!(b.get_room(30000).await.unwrap().connections.len(), 1);
        assert_eq!(b.refresh_room(30000).await.unwrap().connections.len(), 2);
    }

    #[tokio::test]
    async fn test_dedup_purges_stale_connections_on_reconnect() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(40000, Some(owner("c-old", "alice")), Some(2), false, None)
            .await
            .unwrap();
        coordinator
            .try_add_connection(40000, "c-bob", "bob", "bob", None, Role::Player)
            .await
            .unwrap();

        // Full room, but alice reconnecting must not bounce off her
        // own stale entry.
        let room = coordinator
            .try_add_connection(40000, "c-new", "alice", "alice", None, Role::Player)
            .await
            .unwrap();

        assert!(!room.connections.contains_key("c-old"));
        assert!(room.connections.contains_key("c-new"));
        let alices = room
            .connections
            .values()
            .filter(|c| c.user_id == "alice")
            .count();
        assert_eq!(alices, 1);
        // The owner handle followed the reconnect
        assert_eq!(room.owner_connection_id.as_deref(), Some("c-new"));
    }

    #[tokio::test]
    async fn test_idempotent_rejoin_is_noop() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(40001, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();

        let before = coordinator.get_room(40001).await.unwrap();
        let after = coordinator
            .try_add_connection(40001, "c1", "alice", "alice", None, Role::Player)
            .await
            .unwrap();
        assert_eq!(before.connections, after.connections);
        assert_eq!(before.owner_connection_id, after.owner_connection_id);
    }

    #[tokio::test]
    async fn test_join_rejections() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(
                50000,
                Some(owner("c1", "alice")),
                Some(1),
                true,
                Some("secret".to_string()),
            )
            .await
            .unwrap();

        let err = coordinator
            .try_add_connection(50000, "c2", "bob", "bob", Some("Secret"), Role::Player)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::BadPassword);

        // Untrimmed but otherwise exact password passes the gate,
        // then capacity rejects the second player.
        let err = coordinator
            .try_add_connection(50000, "c2", "bob", "bob", Some(" secret "), Role::Player)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::RoomFull);

        // Spectators always fit
        let room = coordinator
            .try_add_connection(50000, "c3", "carol", "carol", Some(" secret "), Role::Spectator)
            .await
            .unwrap();
        assert_eq!(room.connections.len(), 2);

        let err = coordinator
            .try_add_connection(99998, "c4", "dave", "dave", None, Role::Player)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::RoomNotFound);
    }

    #[tokio::test]
    async fn test_owner_disconnect_promotes_deterministic_successor() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(60000, Some(owner("m-owner", "alice")), None, false, None)
            .await
            .unwrap();
        coordinator
            .try_add_connection(60000, "z-conn", "bob", "bob", None, Role::Player)
            .await
            .unwrap();
        coordinator
            .try_add_connection(60000, "a-conn", "carol", "carol", None, Role::Player)
            .await
            .unwrap();
        coordinator
            .try_add_connection(60000, "0-conn", "dave", "dave", None, Role::Spectator)
            .await
            .unwrap();

        let outcome = coordinator.remove_connection(60000, "m-owner").await.unwrap();
        // Smallest player connection id wins; the spectator's
        // lexicographically-smaller id does not.
        assert_eq!(
            outcome.owner_changed,
            Some(("carol".to_string(), "carol".to_string()))
        );
        assert!(!outcome.closed);
        assert_eq!(outcome.room.owner_connection_id.as_deref(), Some("a-conn"));
    }

    #[tokio::test]
    async fn test_owner_disconnect_with_no_players_closes_room() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(60001, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();
        coordinator
            .try_add_connection(60001, "c2", "bob", "bob", None, Role::Spectator)
            .await
            .unwrap();

        let outcome = coordinator.remove_connection(60001, "c1").await.unwrap();
        assert!(outcome.closed);
        assert!(outcome.room.is_closed);
        assert!(outcome.owner_changed.is_none());

        // Closed is terminal
        let err = coordinator
            .try_add_connection(60001, "c3", "carol", "carol", None, Role::Player)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::RoomClosed);
    }

    #[tokio::test]
    async fn test_remove_absent_connection_is_noop() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(60002, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();

        let outcome = coordinator.remove_connection(60002, "ghost").await.unwrap();
        assert!(outcome.removed.is_none());
        assert_eq!(outcome.room.connections.len(), 1);

        assert!(coordinator.remove_connection(99997, "ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_start_game_owner_gate_and_round_one() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(70000, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();
        coordinator
            .try_add_connection(70000, "c2", "bob", "bob", None, Role::Player)
            .await
            .unwrap();

        let err = coordinator.start_game(70000, "bob").await.unwrap_err();
        assert_eq!(err, RoomError::NotOwner);

        let room = coordinator.start_game(70000, "alice").await.unwrap();
        assert!(room.game_started);
        assert!(!room.game_completed);
        assert_eq!(room.round.round_number, 1);
        assert_eq!(room.round.consonants.len(), 5);
        assert!(room.round.started_at.is_some());
    }

    #[tokio::test]
    async fn test_guess_rejections_in_order() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(70001, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();

        let err = coordinator.submit_guess(70001, "alice", "bad").await.unwrap_err();
        assert_eq!(err, RoomError::GameNotActive);

        coordinator.start_game(70001, "alice").await.unwrap();

        // A started game whose consonant set somehow drained has no
        // active round.
        force_consonants(&coordinator, 70001, &[]).await;
        let err = coordinator.submit_guess(70001, "alice", "bad").await.unwrap_err();
        assert_eq!(err, RoomError::NoActiveRound);

        force_consonants(&coordinator, 70001, &['b', 'c', 'd', 'f', 'g']).await;

        let err = coordinator.submit_guess(70001, "alice", "zap").await.unwrap_err();
        assert_eq!(err, RoomError::DisallowedLetters);

        // All letters allowed but not a dictionary word
        let err = coordinator.submit_guess(70001, "alice", "bcd").await.unwrap_err();
        assert_eq!(err, RoomError::WordUnknown);
    }

    #[tokio::test]
    async fn test_duplicate_check_runs_before_letter_checks() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(70002, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();
        coordinator.start_game(70002, "alice").await.unwrap();
        force_consonants(&coordinator, 70002, &['b', 'c', 'd', 'f', 'g']).await;

        coordinator.submit_guess(70002, "alice", "bad").await.unwrap();

        // Round 2 has a different consonant draw; the duplicate
        // rejection must win over DisallowedLetters regardless.
        force_consonants(&coordinator, 70002, &['j', 'k', 'l', 'm', 'n']).await;
        let err = coordinator
            .submit_guess(70002, "alice", "  BAD ")
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::AlreadySubmitted);
    }

    #[tokio::test]
    async fn test_accepted_guess_scores_and_advances() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(70003, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();
        coordinator.start_game(70003, "alice").await.unwrap();
        force_consonants(&coordinator, 70003, &['b', 'c', 'd', 'f', 'g']).await;

        let outcome = coordinator.submit_guess(70003, "alice", "bad").await.unwrap();
        assert_eq!(outcome.points, 3);
        assert_eq!(outcome.total_score, 3);
        assert!(!outcome.completed);
        assert_eq!(outcome.room.round.round_number, 2);
        assert!(outcome.room.round.words_used_this_game.contains("bad"));
    }

    #[tokio::test]
    async fn test_tenth_round_completes_game() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(70004, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();
        coordinator.start_game(70004, "alice").await.unwrap();

        // Jump to the final round
        let mut room = coordinator.get_room(70004).await.unwrap();
        room.round.round_number = 10;
        room.round.consonants = ['b', 'c', 'd', 'f', 'g'].into_iter().collect();
        coordinator.persist(&room).await;

        let outcome = coordinator.submit_guess(70004, "alice", "fog").await.unwrap();
        assert!(outcome.completed);
        assert!(outcome.room.game_completed);
        assert_eq!(outcome.room.round.round_number, 10);

        let err = coordinator.submit_guess(70004, "alice", "dig").await.unwrap_err();
        assert_eq!(err, RoomError::GameNotActive);
    }

    #[tokio::test]
    async fn test_advance_round_redraws_and_increments() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(70005, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();
        coordinator.start_game(70005, "alice").await.unwrap();

        let room = coordinator.advance_round(70005).await.unwrap();
        assert_eq!(room.round.round_number, 2);
        assert_eq!(room.round.consonants.len(), 5);
    }

    #[tokio::test]
    async fn test_close_room_owner_gate() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(80000, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();
        coordinator
            .try_add_connection(80000, "c2", "bob", "bob", None, Role::Player)
            .await
            .unwrap();

        let err = coordinator.close_room(80000, "bob").await.unwrap_err();
        assert_eq!(err, RoomError::NotOwner);

        let room = coordinator.close_room(80000, "alice").await.unwrap();
        assert!(room.is_closed);

        let err = coordinator.close_room(80000, "alice").await.unwrap_err();
        assert_eq!(err, RoomError::RoomClosed);
    }

    #[tokio::test]
    async fn test_write_applies_locally_when_store_down() {
        let (coordinator, store) = setup();
        coordinator
            .create_room(90000, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();

        store.set_available(false);
        // Join still lands in the local cache with a warning
        let room = coordinator
            .try_add_connection(90000, "c2", "bob", "bob", None, Role::Player)
            .await
            .unwrap();
        assert_eq!(room.connections.len(), 2);
        assert_eq!(
            coordinator.get_room(90000).await.unwrap().connections.len(),
            2
        );
    }

    #[tokio::test]
    async fn test_sweep_evicts_reclaimable_rooms() {
        let (coordinator, _store) = setup();
        coordinator
            .create_room(91000, None, None, false, None)
            .await
            .unwrap();
        coordinator
            .create_room(91001, Some(owner("c1", "alice")), None, false, None)
            .await
            .unwrap();

        coordinator.sweep();
        // Empty room evicted from the cache, occupied one kept
        assert_eq!(coordinator.cached_rooms().len(), 1);
        assert_eq!(coordinator.cached_rooms()[0].code, 91001);
        // The store copy survives the cache sweep
        assert!(coordinator.get_room(91000).await.is_some());
    }

    /// Pin the active consonant set so letter checks are
    /// deterministic.
    async fn force_consonants(coordinator: &RoomCoordinator, code: RoomCode, set: &[char]) {
        let mut room = coordinator.get_room(code).await.unwrap();
        room.round.consonants = set.iter().copied().collect();
        coordinator.persist(&room).await;
    }
}
