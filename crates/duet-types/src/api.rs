use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cursor::Cursor;
use crate::models::{DeliveryOutcome, Message, UserId};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway upgrade.
/// `sub` is the verified user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub exp: usize,
}

// -- Pages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next: bool,
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            has_next: self.has_next,
            next_cursor: self.next_cursor,
        }
    }
}

// -- Rooms --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub participant_id: UserId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomResponse {
    pub room_id: Uuid,
    pub participant_a: UserId,
    pub participant_b: UserId,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: Uuid,
    pub counterpart_id: UserId,
    pub last_message_content: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomStatusResponse {
    pub room_id: Uuid,
    pub connected_users: Vec<UserId>,
    pub total_participants: u8,
    pub is_user_connected: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message: Message,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    pub message_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountsResponse {
    pub counts: HashMap<Uuid, u64>,
}
