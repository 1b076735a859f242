//! Who is online, and in which rooms, right now.
//!
//! Room membership is keyed by session id so several devices of one user
//! coexist; presence queries de-duplicate by user id when read. All state
//! sits behind a single lock, so each operation is atomic on its own. There
//! are no cross-operation transactions: a subscribe racing a disconnect for
//! the same session either lands first and is pruned by the disconnect, or
//! finds the session gone and does nothing.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use duet_types::models::UserId;

#[derive(Default)]
struct RegistryState {
    /// session_id -> user_id
    sessions: HashMap<Uuid, UserId>,
    /// room_id -> (session_id -> user_id). Never holds an empty map.
    rooms: HashMap<Uuid, HashMap<Uuid, UserId>>,
}

/// Result of registering a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connected {
    /// The user previously bound to this session id, if it was a reconnect.
    pub replaced: Option<UserId>,
    /// Rooms where the same user is already present through other sessions.
    pub rooms_with_user: Vec<Uuid>,
}

/// What a disconnect removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub user_id: UserId,
    /// Rooms this session had subscribed to.
    pub rooms: Vec<Uuid>,
    /// Rooms where the user is still present through other sessions.
    pub still_present_in: Vec<Uuid>,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a session. An existing mapping for the same id is
    /// overwritten, including in any rooms it had joined.
    pub fn connect(&self, session_id: Uuid, user_id: UserId) -> Connected {
        let mut state = self.write();

        let replaced = state.sessions.insert(session_id, user_id.clone());
        if replaced.as_ref().is_some_and(|prev| *prev != user_id) {
            for members in state.rooms.values_mut() {
                if let Some(member) = members.get_mut(&session_id) {
                    *member = user_id.clone();
                }
            }
        }

        let rooms_with_user = state
            .rooms
            .iter()
            .filter(|(_, members)| {
                members
                    .iter()
                    .any(|(sid, uid)| *sid != session_id && *uid == user_id)
            })
            .map(|(room_id, _)| *room_id)
            .collect();

        Connected {
            replaced,
            rooms_with_user,
        }
    }

    /// Add a connected session to a room. Returns the session's user, or
    /// `None` if the session never connected.
    pub fn subscribe(&self, session_id: Uuid, room_id: Uuid) -> Option<UserId> {
        let mut state = self.write();
        let user_id = state.sessions.get(&session_id)?.clone();
        state
            .rooms
            .entry(room_id)
            .or_default()
            .insert(session_id, user_id.clone());
        Some(user_id)
    }

    /// Remove a session from one room. Returns the user if the session was
    /// in it.
    pub fn unsubscribe(&self, session_id: Uuid, room_id: Uuid) -> Option<UserId> {
        let mut state = self.write();
        let members = state.rooms.get_mut(&room_id)?;
        let user_id = members.remove(&session_id)?;
        if members.is_empty() {
            state.rooms.remove(&room_id);
        }
        Some(user_id)
    }

    /// Drop a session everywhere, pruning rooms that become empty.
    pub fn disconnect(&self, session_id: Uuid) -> Option<Departure> {
        let mut state = self.write();
        let user_id = state.sessions.remove(&session_id)?;

        let mut rooms = Vec::new();
        state.rooms.retain(|room_id, members| {
            if members.remove(&session_id).is_some() {
                rooms.push(*room_id);
            }
            !members.is_empty()
        });

        let still_present_in = state
            .rooms
            .iter()
            .filter(|(_, members)| members.values().any(|uid| *uid == user_id))
            .map(|(room_id, _)| *room_id)
            .collect();

        Some(Departure {
            user_id,
            rooms,
            still_present_in,
        })
    }

    pub fn user_of(&self, session_id: Uuid) -> Option<UserId> {
        self.read().sessions.get(&session_id).cloned()
    }

    /// True if any session belongs to the user, in any room or none.
    pub fn is_user_connected(&self, user_id: &str) -> bool {
        self.read().sessions.values().any(|uid| uid == user_id)
    }

    pub fn is_user_in_room(&self, room_id: Uuid, user_id: &str) -> bool {
        self.read()
            .rooms
            .get(&room_id)
            .is_some_and(|members| members.values().any(|uid| uid == user_id))
    }

    /// Distinct users with at least one session subscribed to the room.
    pub fn connected_users(&self, room_id: Uuid) -> HashSet<UserId> {
        self.read()
            .rooms
            .get(&room_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of_session(&self, session_id: Uuid) -> Vec<Uuid> {
        self.read()
            .rooms
            .iter()
            .filter(|(_, members)| members.contains_key(&session_id))
            .map(|(room_id, _)| *room_id)
            .collect()
    }

    pub fn active_rooms(&self) -> usize {
        self.read().rooms.len()
    }
}
