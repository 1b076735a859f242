//! Database row types. These map directly to SQLite rows and are converted
//! into `duet-types` models at the store boundary.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use duet_types::models::{ChatRoom, Message};

pub const MESSAGE_COLUMNS: &str =
    "id, room_id, sender_id, receiver_id, content, sent_at, read, message_type, event_payload";

pub const ROOM_COLUMNS: &str =
    "id, participant_a, participant_b, last_message_content, last_message_time, created_at";

pub struct MessageRow {
    pub id: String,
    pub room_id: String,
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub content: String,
    pub sent_at: String,
    pub read: bool,
    pub message_type: String,
    pub event_payload: Option<String>,
}

pub struct RoomRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub last_message_content: Option<String>,
    pub last_message_time: Option<String>,
    pub created_at: String,
}

impl MessageRow {
    /// Reads a row selected with `MESSAGE_COLUMNS`.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            room_id: row.get(1)?,
            sender_id: row.get(2)?,
            receiver_id: row.get(3)?,
            content: row.get(4)?,
            sent_at: row.get(5)?,
            read: row.get(6)?,
            message_type: row.get(7)?,
            event_payload: row.get(8)?,
        })
    }
}

impl RoomRow {
    /// Reads a row selected with `ROOM_COLUMNS`.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            participant_a: row.get(1)?,
            participant_b: row.get(2)?,
            last_message_content: row.get(3)?,
            last_message_time: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Corrupt timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        let event_payload = match row.event_payload {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt event payload on message '{}'", row.id))?,
            ),
            None => None,
        };

        Ok(Message {
            id: row
                .id
                .parse::<Uuid>()
                .with_context(|| format!("Corrupt message id '{}'", row.id))?,
            room_id: row
                .room_id
                .parse::<Uuid>()
                .with_context(|| format!("Corrupt room_id '{}' on message '{}'", row.room_id, row.id))?,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            content: row.content,
            sent_at: parse_timestamp(&row.sent_at)?,
            read: row.read,
            message_type: row.message_type.parse()?,
            event_payload,
        })
    }
}

impl TryFrom<RoomRow> for ChatRoom {
    type Error = anyhow::Error;

    fn try_from(row: RoomRow) -> Result<Self> {
        Ok(ChatRoom {
            id: row
                .id
                .parse::<Uuid>()
                .with_context(|| format!("Corrupt room id '{}'", row.id))?,
            participant_a: row.participant_a,
            participant_b: row.participant_b,
            last_message_content: row.last_message_content,
            last_message_time: row
                .last_message_time
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
