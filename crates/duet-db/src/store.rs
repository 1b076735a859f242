//! The persistence contract the chat core is written against.
//!
//! `Database` is the production implementation. The core assumes durable,
//! linearizable single-row writes and never a transaction spanning a room
//! and a message: the two are written in sequence.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use duet_types::cursor::Cursor;
use duet_types::models::{ChatRoom, Message, MessageType};

/// A filtered, newest-first slice of one room's timeline.
#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub room_id: Uuid,
    /// Only entries strictly older than this position.
    pub before: Option<Cursor>,
    /// `None` means every type. An empty list matches nothing.
    pub types: Option<Vec<MessageType>>,
    pub limit: usize,
}

pub trait ChatStore: Send + Sync {
    /// Append one timeline entry, chat or journaled event.
    fn append_message(&self, message: &Message) -> Result<()>;

    fn find_message(&self, id: Uuid) -> Result<Option<Message>>;

    fn find_messages(&self, ids: &[Uuid]) -> Result<Vec<Message>>;

    /// Ordered by `sent_at` then `id`, both descending.
    fn query_messages(&self, query: &MessageQuery) -> Result<Vec<Message>>;

    /// Flip every unread chat message in the room addressed to `receiver_id`.
    /// Returns how many changed.
    fn mark_room_read(&self, room_id: Uuid, receiver_id: &str) -> Result<usize>;

    /// Flip the listed messages that are unread chat messages of the room
    /// addressed to `receiver_id`. Returns exactly the messages that changed,
    /// in their read state.
    fn mark_messages_read(&self, room_id: Uuid, receiver_id: &str, ids: &[Uuid]) -> Result<Vec<Message>>;

    /// Get the room for the unordered pair, creating it if needed.
    /// The flag is true when this call created it.
    fn upsert_room(&self, participant_a: &str, participant_b: &str) -> Result<(ChatRoom, bool)>;

    fn find_room(&self, id: Uuid) -> Result<Option<ChatRoom>>;

    /// Denormalized last-message fields. Never moves `last_message_time` backwards.
    fn update_last_message(&self, room_id: Uuid, content: &str, at: DateTime<Utc>) -> Result<()>;

    /// Rooms the user participates in, most recent activity first.
    ///
    /// Known limit: the order key is `last_message_time` (or `created_at`
    /// before the first message), so it changes when a message arrives.
    /// A room that becomes active behind an open cursor is not returned
    /// again by that walk; a walk restarted from `None` returns it first.
    fn rooms_for_user(&self, user_id: &str, before: Option<Cursor>, limit: usize) -> Result<Vec<ChatRoom>>;

    /// Unread chat messages addressed to `receiver_id`, grouped by room.
    /// Rooms with nothing unread are absent.
    fn unread_counts(&self, receiver_id: &str) -> Result<HashMap<Uuid, u64>>;
}
