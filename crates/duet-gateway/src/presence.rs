//! Session lifecycle signals: registry bookkeeping, journaling and
//! presence broadcasts.
//!
//! Signals for sessions the registry does not know (a subscribe after the
//! disconnect, a double disconnect) are logged at debug and ignored.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use duet_types::events::{Destination, ServerEvent};
use duet_types::models::{now, MessageType};

use crate::dispatcher::Transport;
use crate::error::{ChatError, Result};
use crate::journal::EventJournal;
use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct Presence {
    registry: ConnectionRegistry,
    journal: EventJournal,
    transport: Arc<dyn Transport>,
}

impl Presence {
    pub fn new(registry: ConnectionRegistry, journal: EventJournal, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            journal,
            transport,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Register a verified session. Rooms the user already occupies through
    /// another device get a connected entry.
    pub fn on_connect(&self, session_id: Uuid, user_id: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(ChatError::MissingIdentity);
        }

        let connected = self.registry.connect(session_id, user_id.to_string());
        if let Some(previous) = &connected.replaced {
            debug!("Session {} re-registered (was {})", session_id, previous);
        }
        for room_id in connected.rooms_with_user {
            self.journal.user_connected(room_id, user_id);
        }

        info!("Session {} connected as {}", session_id, user_id);
        Ok(())
    }

    /// Join a room the caller has already been authorized for.
    pub fn on_subscribe(&self, session_id: Uuid, room_id: Uuid) -> bool {
        let Some(user_id) = self.registry.subscribe(session_id, room_id) else {
            debug!("Subscribe from unknown session {} ignored", session_id);
            return false;
        };

        self.journal.user_joined(room_id, &user_id);
        self.broadcast(room_id, &user_id, MessageType::UserJoined);
        debug!("{} joined room {}", user_id, room_id);
        true
    }

    pub fn on_unsubscribe(&self, session_id: Uuid, room_id: Uuid) -> bool {
        let Some(user_id) = self.registry.unsubscribe(session_id, room_id) else {
            debug!("Unsubscribe of {} from room {} ignored", session_id, room_id);
            return false;
        };

        self.journal.user_left(room_id, &user_id);
        self.broadcast(room_id, &user_id, MessageType::UserLeft);
        debug!("{} left room {}", user_id, room_id);
        true
    }

    /// Drop the session everywhere. Rooms still holding another of the
    /// user's sessions are told the device went away.
    pub fn on_disconnect(&self, session_id: Uuid) -> bool {
        let Some(departure) = self.registry.disconnect(session_id) else {
            debug!("Disconnect of unknown session {} ignored", session_id);
            return false;
        };

        for room_id in &departure.rooms {
            self.journal.user_disconnected(*room_id, &departure.user_id);
        }
        for room_id in &departure.still_present_in {
            self.broadcast(*room_id, &departure.user_id, MessageType::UserDisconnected);
        }

        info!(
            "Session {} ({}) disconnected from {} room(s)",
            session_id,
            departure.user_id,
            departure.rooms.len()
        );
        true
    }

    fn broadcast(&self, room_id: Uuid, user_id: &str, kind: MessageType) {
        let event = ServerEvent::Presence {
            room_id,
            user_id: user_id.to_string(),
            kind,
            timestamp: now(),
        };
        if let Err(e) = self.transport.push(&Destination::Room(room_id), &event) {
            warn!("Presence update for room {} not delivered: {}", room_id, e);
        }
    }
}
