//! Lifecycle events written into the same timeline as chat content.
//!
//! Journaling is best effort: a record that cannot be encoded or stored is
//! logged and dropped, and the action that triggered it carries on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use duet_db::ChatStore;
use duet_types::models::{now, EventPayload, Message};

use crate::error::Result;

#[derive(Serialize)]
struct Encoded<'a> {
    #[serde(flatten)]
    payload: &'a EventPayload,
    timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct EventJournal {
    store: Arc<dyn ChatStore>,
}

impl EventJournal {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Append one event. Returns the stored entry, or `None` if it was dropped.
    pub fn record(
        &self,
        room_id: Uuid,
        actor_id: Option<&str>,
        counterpart_id: Option<&str>,
        payload: EventPayload,
        custom_text: Option<&str>,
    ) -> Option<Message> {
        let message_type = payload.message_type();
        match self.try_record(room_id, actor_id, counterpart_id, &payload, custom_text) {
            Ok(entry) => {
                debug!("Journaled {} in room {}", message_type, room_id);
                Some(entry)
            }
            Err(e) => {
                error!("Dropped {} event for room {}: {}", message_type, room_id, e);
                None
            }
        }
    }

    fn try_record(
        &self,
        room_id: Uuid,
        actor_id: Option<&str>,
        counterpart_id: Option<&str>,
        payload: &EventPayload,
        custom_text: Option<&str>,
    ) -> Result<Message> {
        let sent_at = now();
        let message_type = payload.message_type();
        let event_payload = serde_json::to_value(Encoded {
            payload,
            timestamp: sent_at,
        })?;

        let entry = Message {
            id: Uuid::new_v4(),
            room_id,
            sender_id: actor_id.map(str::to_string),
            receiver_id: counterpart_id.map(str::to_string),
            content: custom_text
                .map(str::to_string)
                .unwrap_or_else(|| message_type.description().to_string()),
            sent_at,
            read: false,
            message_type,
            event_payload: Some(event_payload),
        };

        self.store.append_message(&entry)?;
        Ok(entry)
    }

    // -- Convenience recorders --

    pub fn user_joined(&self, room_id: Uuid, user_id: &str) -> Option<Message> {
        let payload = EventPayload::Joined { user_id: user_id.into() };
        self.record(room_id, Some(user_id), None, payload, None)
    }

    pub fn user_left(&self, room_id: Uuid, user_id: &str) -> Option<Message> {
        let payload = EventPayload::Left { user_id: user_id.into() };
        self.record(room_id, Some(user_id), None, payload, None)
    }

    pub fn user_connected(&self, room_id: Uuid, user_id: &str) -> Option<Message> {
        let payload = EventPayload::Connected { user_id: user_id.into() };
        self.record(room_id, Some(user_id), None, payload, None)
    }

    pub fn user_disconnected(&self, room_id: Uuid, user_id: &str) -> Option<Message> {
        let payload = EventPayload::Disconnected { user_id: user_id.into() };
        self.record(room_id, Some(user_id), None, payload, None)
    }

    pub fn room_created(&self, room_id: Uuid, creator_id: &str, a: &str, b: &str) -> Option<Message> {
        let payload = EventPayload::RoomCreated {
            creator_id: creator_id.into(),
            participant_a: a.into(),
            participant_b: b.into(),
        };
        self.record(room_id, Some(creator_id), None, payload, None)
    }

    pub fn message_read(&self, room_id: Uuid, reader_id: &str, message_id: Uuid) -> Option<Message> {
        let payload = EventPayload::MessageRead {
            reader_id: reader_id.into(),
            message_id,
        };
        self.record(room_id, Some(reader_id), None, payload, None)
    }

    /// No actor: the system delivered it. The receiver is the counterpart.
    pub fn message_delivered(&self, room_id: Uuid, receiver_id: &str, message_id: Uuid) -> Option<Message> {
        let payload = EventPayload::MessageDelivered {
            receiver_id: receiver_id.into(),
            message_id,
        };
        self.record(room_id, None, Some(receiver_id), payload, None)
    }

    pub fn message_failed(
        &self,
        room_id: Uuid,
        receiver_id: &str,
        message_id: Uuid,
        reason: &str,
    ) -> Option<Message> {
        let payload = EventPayload::MessageFailed {
            receiver_id: receiver_id.into(),
            message_id,
            reason: reason.into(),
        };
        self.record(room_id, None, Some(receiver_id), payload, None)
    }

    pub fn system_notice(&self, room_id: Uuid, admin_id: &str, text: &str) -> Option<Message> {
        let payload = EventPayload::SystemNotice { admin_id: admin_id.into() };
        self.record(room_id, Some(admin_id), None, payload, Some(text))
    }

    pub fn maintenance_notice(&self, room_id: Uuid, admin_id: &str, text: &str) -> Option<Message> {
        let payload = EventPayload::MaintenanceNotice { admin_id: admin_id.into() };
        self.record(room_id, Some(admin_id), None, payload, Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seeded_room, BrokenStore};
    use duet_types::models::MessageType;

    #[test]
    fn entry_carries_tagged_payload() {
        let (store, room) = seeded_room();
        let journal = EventJournal::new(store.clone());

        let entry = journal.user_joined(room.id, "alice").unwrap();
        assert_eq!(entry.message_type, MessageType::UserJoined);
        assert_eq!(entry.sender_id.as_deref(), Some("alice"));
        assert_eq!(entry.content, MessageType::UserJoined.description());

        let payload = entry.event_payload.as_ref().unwrap();
        assert_eq!(payload["action"], "joined");
        assert_eq!(payload["user_id"], "alice");
        assert!(payload.get("timestamp").is_some());

        let stored = store.find_message(entry.id).unwrap().unwrap();
        assert_eq!(stored.event_payload, entry.event_payload);
    }

    #[test]
    fn delivered_has_no_actor() {
        let (store, room) = seeded_room();
        let journal = EventJournal::new(store);

        let message_id = Uuid::new_v4();
        let entry = journal.message_delivered(room.id, "bob", message_id).unwrap();
        assert_eq!(entry.sender_id, None);
        assert_eq!(entry.receiver_id.as_deref(), Some("bob"));
        assert_eq!(
            entry.event_payload.unwrap()["message_id"],
            serde_json::json!(message_id)
        );
    }

    #[test]
    fn notices_use_custom_text() {
        let (store, room) = seeded_room();
        let journal = EventJournal::new(store);

        let entry = journal
            .maintenance_notice(room.id, "ops", "Back in five minutes")
            .unwrap();
        assert_eq!(entry.content, "Back in five minutes");
        assert!(entry.message_type.is_system_event());
        assert!(!entry.message_type.is_user_action());
    }

    #[test]
    fn storage_failure_is_swallowed() {
        let journal = EventJournal::new(Arc::new(BrokenStore));
        assert!(journal.user_left(Uuid::new_v4(), "alice").is_none());
    }
}
