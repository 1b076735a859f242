//! Room lookup, creation and the read side of a room: status, history,
//! room lists and unread counts.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use duet_db::pagination::{page_messages, page_rooms, HistoryRequest, PageLimits};
use duet_db::ChatStore;
use duet_types::api::{Page, RoomStatusResponse, RoomSummary};
use duet_types::cursor::Cursor;
use duet_types::models::{ChatRoom, Message};

use crate::error::{ChatError, Result};
use crate::journal::EventJournal;
use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct Rooms {
    store: Arc<dyn ChatStore>,
    registry: ConnectionRegistry,
    journal: EventJournal,
    limits: PageLimits,
}

impl Rooms {
    pub fn new(
        store: Arc<dyn ChatStore>,
        registry: ConnectionRegistry,
        journal: EventJournal,
        limits: PageLimits,
    ) -> Self {
        Self {
            store,
            registry,
            journal,
            limits,
        }
    }

    /// The room for the unordered pair, created on first use.
    pub fn create_or_get(&self, requester_id: &str, other_id: &str) -> Result<(ChatRoom, bool)> {
        if requester_id.trim().is_empty() {
            return Err(ChatError::MissingIdentity);
        }
        if other_id.trim().is_empty() {
            return Err(ChatError::InvalidInput("participant_id is blank".into()));
        }

        let (room, created) = self.store.upsert_room(requester_id, other_id)?;
        if created {
            info!("Room {} created by {}", room.id, requester_id);
            self.journal
                .room_created(room.id, requester_id, &room.participant_a, &room.participant_b);
        }
        Ok((room, created))
    }

    /// The room, if it exists and `user_id` is one of its participants.
    pub fn authorize(&self, room_id: Uuid, user_id: &str) -> Result<ChatRoom> {
        let room = self
            .store
            .find_room(room_id)?
            .ok_or(ChatError::RoomNotFound(room_id))?;
        if !room.has_participant(user_id) {
            return Err(ChatError::NotParticipant {
                room_id,
                user_id: user_id.to_string(),
            });
        }
        Ok(room)
    }

    pub fn status(&self, room_id: Uuid, user_id: &str) -> Result<RoomStatusResponse> {
        self.authorize(room_id, user_id)?;

        let mut connected_users: Vec<_> = self.registry.connected_users(room_id).into_iter().collect();
        connected_users.sort();
        let is_user_connected = connected_users.iter().any(|u| u == user_id);

        Ok(RoomStatusResponse {
            room_id,
            connected_users,
            total_participants: 2,
            is_user_connected,
        })
    }

    pub fn history(&self, room_id: Uuid, user_id: &str, request: &HistoryRequest) -> Result<Page<Message>> {
        self.authorize(room_id, user_id)?;
        Ok(page_messages(self.store.as_ref(), room_id, request, &self.limits)?)
    }

    /// The caller's rooms, most recent activity first, with unread counts.
    pub fn list(&self, user_id: &str, cursor: Option<Cursor>, size: Option<usize>) -> Result<Page<RoomSummary>> {
        let page = page_rooms(self.store.as_ref(), user_id, cursor, size, &self.limits)?;
        let unread = self.store.unread_counts(user_id)?;

        Ok(page.map(|room| RoomSummary {
            room_id: room.id,
            counterpart_id: room.counterpart(user_id).unwrap_or(user_id).to_string(),
            unread_count: unread.get(&room.id).copied().unwrap_or(0),
            last_message_content: room.last_message_content,
            last_message_time: room.last_message_time,
        }))
    }

    pub fn unread_counts(&self, user_id: &str) -> Result<HashMap<Uuid, u64>> {
        Ok(self.store.unread_counts(user_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{entries_of, seeded_room};
    use duet_types::models::MessageType;

    fn rooms_over(store: Arc<duet_db::Database>, registry: ConnectionRegistry) -> Rooms {
        Rooms::new(
            store.clone(),
            registry,
            EventJournal::new(store),
            PageLimits::default(),
        )
    }

    #[test]
    fn create_is_idempotent_in_either_order() {
        let (store, _) = seeded_room();
        let rooms = rooms_over(store.clone(), ConnectionRegistry::new());

        let (first, created) = rooms.create_or_get("carol", "dave").unwrap();
        assert!(created);
        let (again, created) = rooms.create_or_get("dave", "carol").unwrap();
        assert!(!created);
        assert_eq!(first.id, again.id);

        assert_eq!(entries_of(store.as_ref(), first.id, MessageType::RoomCreated).len(), 1);
        assert!(matches!(
            rooms.create_or_get("carol", ""),
            Err(ChatError::InvalidInput(_))
        ));
    }

    #[test]
    fn status_reports_presence() {
        let (store, room) = seeded_room();
        let registry = ConnectionRegistry::new();
        let rooms = rooms_over(store, registry.clone());

        let s = Uuid::new_v4();
        registry.connect(s, "bob".into());
        registry.subscribe(s, room.id);

        let status = rooms.status(room.id, "alice").unwrap();
        assert_eq!(status.connected_users, vec!["bob".to_string()]);
        assert_eq!(status.total_participants, 2);
        assert!(!status.is_user_connected);

        assert!(rooms.status(room.id, "mallory").unwrap_err().is_unauthorized());
        assert!(rooms.status(Uuid::new_v4(), "alice").unwrap_err().is_not_found());
    }

    #[test]
    fn list_carries_unread_counts() {
        let (store, room) = seeded_room();
        let rooms = rooms_over(store.clone(), ConnectionRegistry::new());
        rooms.create_or_get("bob", "carol").unwrap();

        store
            .append_message(&Message::chat(room.id, "alice", "bob", "ping"))
            .unwrap();
        store
            .update_last_message(room.id, "ping", duet_types::models::now())
            .unwrap();

        let page = rooms.list("bob", None, None).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(!page.has_next);

        let top = &page.items[0];
        assert_eq!(top.room_id, room.id);
        assert_eq!(top.counterpart_id, "alice");
        assert_eq!(top.unread_count, 1);
        assert_eq!(top.last_message_content.as_deref(), Some("ping"));
        assert_eq!(page.items[1].unread_count, 0);
    }

    #[test]
    fn history_requires_participation() {
        let (store, room) = seeded_room();
        let rooms = rooms_over(store, ConnectionRegistry::new());
        let err = rooms
            .history(room.id, "mallory", &HistoryRequest::default())
            .unwrap_err();
        assert!(err.is_unauthorized());
    }
}
