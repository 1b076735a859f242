use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use duet_db::ChatStore;
use duet_types::events::{Destination, ServerEvent, UserQueue};
use duet_types::models::{now, Message};

use crate::dispatcher::Transport;
use crate::error::{ChatError, Result};
use crate::journal::EventJournal;

/// Read state changes and the receipts they send back to senders.
#[derive(Clone)]
pub struct ReadReceipts {
    store: Arc<dyn ChatStore>,
    journal: EventJournal,
    transport: Arc<dyn Transport>,
}

impl ReadReceipts {
    pub fn new(store: Arc<dyn ChatStore>, journal: EventJournal, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            journal,
            transport,
        }
    }

    fn authorize(&self, room_id: Uuid, reader_id: &str) -> Result<()> {
        let room = self
            .store
            .find_room(room_id)?
            .ok_or(ChatError::RoomNotFound(room_id))?;
        if !room.has_participant(reader_id) {
            return Err(ChatError::NotParticipant {
                room_id,
                user_id: reader_id.to_string(),
            });
        }
        Ok(())
    }

    /// Mark everything unread addressed to the reader in this room. No
    /// receipts are sent for bulk reads.
    pub fn mark_all_read(&self, room_id: Uuid, reader_id: &str) -> Result<usize> {
        self.authorize(room_id, reader_id)?;
        let updated = self.store.mark_room_read(room_id, reader_id)?;
        debug!("{} read {} message(s) in room {}", reader_id, updated, room_id);
        Ok(updated)
    }

    /// Mark the listed messages read. Ids that are unknown, in another room,
    /// already read or addressed to someone else are skipped. Returns the
    /// messages that changed.
    pub fn mark_read(&self, room_id: Uuid, reader_id: &str, message_ids: &[Uuid]) -> Result<Vec<Message>> {
        self.authorize(room_id, reader_id)?;
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let flipped = self.store.mark_messages_read(room_id, reader_id, message_ids)?;
        let read_at = now();

        for message in &flipped {
            self.journal.message_read(room_id, reader_id, message.id);

            let Some(sender_id) = &message.sender_id else {
                continue;
            };
            let event = ServerEvent::ReadReceipt {
                message_id: message.id,
                room_id,
                reader_id: reader_id.to_string(),
                read_at,
            };
            let destination = Destination::user(sender_id.as_str(), UserQueue::ReadReceipts);
            if let Err(e) = self.transport.push(&destination, &event) {
                warn!("Read receipt for {} not delivered: {}", message.id, e);
            }
        }

        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{entries_of, seeded_room, RecordingTransport};
    use duet_types::models::MessageType;

    fn setup() -> (ReadReceipts, Arc<duet_db::Database>, Arc<RecordingTransport>, Uuid) {
        let (store, room) = seeded_room();
        let transport = RecordingTransport::reaching(1);
        let receipts = ReadReceipts::new(store.clone(), EventJournal::new(store.clone()), transport.clone());
        (receipts, store, transport, room.id)
    }

    fn chat(store: &duet_db::Database, room: Uuid, from: &str, to: &str) -> Message {
        let m = Message::chat(room, from, to, "hey");
        store.append_message(&m).unwrap();
        m
    }

    #[test]
    fn bulk_read_clears_unread_count() {
        let (receipts, store, transport, room) = setup();
        for _ in 0..3 {
            chat(&store, room, "alice", "bob");
        }
        chat(&store, room, "bob", "alice");

        assert_eq!(store.unread_counts("bob").unwrap().get(&room), Some(&3));
        assert_eq!(receipts.mark_all_read(room, "bob").unwrap(), 3);
        assert!(!store.unread_counts("bob").unwrap().contains_key(&room));
        assert_eq!(store.unread_counts("alice").unwrap().get(&room), Some(&1));
        assert!(transport.pushes().is_empty());
    }

    #[test]
    fn explicit_read_sends_receipt_to_sender() {
        let (receipts, store, transport, room) = setup();
        let mine = chat(&store, room, "alice", "bob");
        let theirs = chat(&store, room, "bob", "alice");

        let flipped = receipts
            .mark_read(room, "bob", &[mine.id, theirs.id, Uuid::new_v4()])
            .unwrap();
        assert_eq!(flipped.len(), 1);
        assert_eq!(flipped[0].id, mine.id);
        assert!(flipped[0].read);

        let sent = transport.pushed_to(&Destination::user("alice", UserQueue::ReadReceipts));
        assert!(matches!(
            &sent[..],
            [ServerEvent::ReadReceipt { message_id, reader_id, .. }] if *message_id == mine.id && reader_id == "bob"
        ));
        assert_eq!(entries_of(&*store, room, MessageType::MessageRead).len(), 1);

        // Already read: nothing changes the second time.
        assert!(receipts.mark_read(room, "bob", &[mine.id]).unwrap().is_empty());
    }

    #[test]
    fn outsiders_cannot_mark_read() {
        let (receipts, store, _, room) = setup();
        chat(&store, room, "alice", "bob");

        assert!(receipts.mark_all_read(room, "mallory").unwrap_err().is_unauthorized());
        assert!(receipts.mark_read(Uuid::new_v4(), "bob", &[]).unwrap_err().is_not_found());
    }
}
