// ============================
// crates/backend-lib/src/presence.rs
// ============================
//! Presence & broadcast adapter: stateless projections from room
//! snapshots plus the dispatch lists each mutation should trigger.
//! The transport layer consumes the lists for fan-out; nothing here
//! sends anything.

use crate::coordinator::{GuessOutcome, RemovalOutcome};
use crate::room::Room;
use wordrush_common::{RoomCode, RoomSummary, RoundView, ServerToClient, UserView};

/// Fan-out target of one outward event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Room(RoomCode),
    Lobby,
}

/// One outward event payload and where it goes.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub scope: Scope,
    pub event: ServerToClient,
}

impl Broadcast {
    fn room(code: RoomCode, event: ServerToClient) -> Self {
        Self {
            scope: Scope::Room(code),
            event,
        }
    }

    fn lobby(event: ServerToClient) -> Self {
        Self {
            scope: Scope::Lobby,
            event,
        }
    }
}

/// Deduplicated, ordered user list: one entry per distinct user id,
/// preferring the most recently seen connection (connection-id
/// tie-break), annotated with live score, sorted by user id. The
/// output is deterministic regardless of map iteration order.
pub fn user_views(room: &Room) -> Vec<UserView> {
    let mut by_user: Vec<(&String, &crate::room::ConnectionInfo)> = Vec::new();
    for (conn_id, info) in &room.connections {
        match by_user.iter_mut().find(|(_, kept)| kept.user_id == info.user_id) {
            Some(slot) => {
                let (kept_id, kept) = *slot;
                let newer = (info.connected_at, conn_id) > (kept.connected_at, kept_id);
                if newer {
                    *slot = (conn_id, info);
                }
            },
            None => by_user.push((conn_id, info)),
        }
    }

    let mut views: Vec<UserView> = by_user
        .into_iter()
        .map(|(conn_id, info)| UserView {
            user_id: info.user_id.clone(),
            username: info.username.clone(),
            role: info.role,
            connection_id: conn_id.clone(),
            score: room.score_of(&info.user_id),
        })
        .collect();
    views.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    views
}

/// Outward lobby card for one room.
pub fn room_summary(room: &Room) -> RoomSummary {
    let player_count = room.live_player_count();
    RoomSummary {
        code: room.code,
        player_count,
        spectator_count: room.connections.len() - player_count,
        capacity: room.capacity,
        is_private: room.is_private,
        game_started: room.game_started,
        game_completed: room.game_completed,
        is_closed: room.is_closed,
    }
}

/// Active-round projection; `None` before the first draw.
pub fn round_view(room: &Room) -> Option<RoundView> {
    let started_at = room.round.started_at?;
    Some(RoundView {
        round_number: room.round.round_number,
        consonants: room.round.consonants.iter().copied().collect(),
        started_at,
    })
}

/// Events after a successful join.
pub fn after_join(room: &Room, joined_user_id: &str) -> Vec<Broadcast> {
    let users = user_views(room);
    let mut out = Vec::new();
    if let Some(user) = users.iter().find(|u| u.user_id == joined_user_id) {
        out.push(Broadcast::room(
            room.code,
            ServerToClient::UserJoined {
                room_code: room.code,
                user: user.clone(),
                users: users.clone(),
            },
        ));
    }
    out.push(Broadcast::lobby(ServerToClient::LobbyRoomUpdated {
        room: room_summary(room),
    }));
    out
}

/// Events after a connection removal: the leave itself, then owner
/// failover or room closure when they happened.
pub fn after_leave(outcome: &RemovalOutcome) -> Vec<Broadcast> {
    let room = &outcome.room;
    let mut out = Vec::new();

    let removed = match &outcome.removed {
        Some(removed) => removed,
        // Removing an absent connection mutated nothing
        None => return out,
    };

    out.push(Broadcast::room(
        room.code,
        ServerToClient::UserLeft {
            room_code: room.code,
            user_id: removed.user_id.clone(),
            users: user_views(room),
        },
    ));
    if let Some((owner_user_id, owner_username)) = &outcome.owner_changed {
        out.push(Broadcast::room(
            room.code,
            ServerToClient::OwnerChanged {
                room_code: room.code,
                owner_user_id: owner_user_id.clone(),
                owner_username: owner_username.clone(),
            },
        ));
    }
    if outcome.closed {
        out.push(Broadcast::room(
            room.code,
            ServerToClient::RoomClosed { room_code: room.code },
        ));
    }
    out.push(Broadcast::lobby(ServerToClient::LobbyRoomUpdated {
        room: room_summary(room),
    }));
    out
}

/// Events after the owner started the game.
pub fn after_game_started(room: &Room) -> Vec<Broadcast> {
    let mut out = Vec::new();
    if let Some(round) = round_view(room) {
        out.push(Broadcast::room(
            room.code,
            ServerToClient::GameStarted {
                room_code: room.code,
                round,
            },
        ));
    }
    out.push(Broadcast::lobby(ServerToClient::LobbyRoomUpdated {
        room: room_summary(room),
    }));
    out
}

/// Events after an accepted guess: the score update, then either the
/// next round or the final scoreboard.
pub fn after_guess(outcome: &GuessOutcome, caller_user_id: &str) -> Vec<Broadcast> {
    let room = &outcome.room;
    let mut out = vec![Broadcast::room(
        room.code,
        ServerToClient::GuessAccepted {
            room_code: room.code,
            user_id: caller_user_id.to_string(),
            word: outcome.word.clone(),
            points: outcome.points,
            total_score: outcome.total_score,
        },
    )];
    if outcome.completed {
        out.push(Broadcast::room(
            room.code,
            ServerToClient::GameCompleted {
                room_code: room.code,
                scores: user_views(room),
            },
        ));
        out.push(Broadcast::lobby(ServerToClient::LobbyRoomUpdated {
            room: room_summary(room),
        }));
    } else if let Some(round) = round_view(room) {
        out.push(Broadcast::room(
            room.code,
            ServerToClient::RoundStarted {
                room_code: room.code,
                round,
            },
        ));
    }
    out
}

/// Events after an explicit owner close.
pub fn after_close(room: &Room) -> Vec<Broadcast> {
    vec![
        Broadcast::room(room.code, ServerToClient::RoomClosed { room_code: room.code }),
        Broadcast::lobby(ServerToClient::LobbyRoomUpdated {
            room: room_summary(room),
        }),
    ]
}
