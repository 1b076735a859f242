use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// User identity as supplied by the upstream token issuer. Opaque to the core.
pub type UserId = String;

/// Formats a timestamp as fixed-width RFC 3339 with microsecond precision.
/// Stored timestamps use this form so lexical order equals time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time truncated to the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

// -- Message types --

/// Everything that can live in a room's timeline: ordinary chat content plus
/// journaled system events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Chat,
    UserJoined,
    UserLeft,
    UserConnected,
    UserDisconnected,
    RoomCreated,
    MessageRead,
    MessageDelivered,
    MessageFailed,
    SystemNotice,
    MaintenanceNotice,
}

/// How a timeline entry is treated by history filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Chat,
    UserAction,
    ConnectionEvent,
    Notice,
}

impl MessageType {
    pub const ALL: [MessageType; 11] = [
        MessageType::Chat,
        MessageType::UserJoined,
        MessageType::UserLeft,
        MessageType::UserConnected,
        MessageType::UserDisconnected,
        MessageType::RoomCreated,
        MessageType::MessageRead,
        MessageType::MessageDelivered,
        MessageType::MessageFailed,
        MessageType::SystemNotice,
        MessageType::MaintenanceNotice,
    ];

    /// Stable code used in storage and on the wire.
    pub fn code(self) -> &'static str {
        match self {
            Self::Chat => "CHAT",
            Self::UserJoined => "USER_JOINED",
            Self::UserLeft => "USER_LEFT",
            Self::UserConnected => "USER_CONNECTED",
            Self::UserDisconnected => "USER_DISCONNECTED",
            Self::RoomCreated => "ROOM_CREATED",
            Self::MessageRead => "MESSAGE_READ",
            Self::MessageDelivered => "MESSAGE_DELIVERED",
            Self::MessageFailed => "MESSAGE_FAILED",
            Self::SystemNotice => "SYSTEM_NOTICE",
            Self::MaintenanceNotice => "MAINTENANCE_NOTICE",
        }
    }

    /// Default human-readable content for journal entries of this type.
    pub fn description(self) -> &'static str {
        match self {
            Self::Chat => "Chat message",
            Self::UserJoined => "User joined the room",
            Self::UserLeft => "User left the room",
            Self::UserConnected => "User connected",
            Self::UserDisconnected => "User disconnected",
            Self::RoomCreated => "Chat room created",
            Self::MessageRead => "Message read",
            Self::MessageDelivered => "Message delivered",
            Self::MessageFailed => "Message delivery failed",
            Self::SystemNotice => "System notice",
            Self::MaintenanceNotice => "Maintenance notice",
        }
    }

    pub fn category(self) -> EventCategory {
        match self {
            Self::Chat => EventCategory::Chat,
            Self::UserJoined | Self::UserLeft | Self::MessageRead => EventCategory::UserAction,
            Self::UserConnected | Self::UserDisconnected => EventCategory::ConnectionEvent,
            Self::RoomCreated
            | Self::MessageDelivered
            | Self::MessageFailed
            | Self::SystemNotice
            | Self::MaintenanceNotice => EventCategory::Notice,
        }
    }

    pub fn is_system_event(self) -> bool {
        self != Self::Chat
    }

    pub fn is_user_action(self) -> bool {
        self.category() == EventCategory::UserAction
    }

    pub fn is_connection_event(self) -> bool {
        self.category() == EventCategory::ConnectionEvent
    }
}

impl EventCategory {
    /// All message types that fall into this category.
    pub fn types(self) -> impl Iterator<Item = MessageType> {
        MessageType::ALL
            .into_iter()
            .filter(move |t| t.category() == self)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown message type: {0}")]
pub struct UnknownMessageType(pub String);

impl FromStr for MessageType {
    type Err = UnknownMessageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == s)
            .ok_or_else(|| UnknownMessageType(s.to_string()))
    }
}

impl FromStr for EventCategory {
    type Err = UnknownMessageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "user_action" => Ok(Self::UserAction),
            "connection_event" => Ok(Self::ConnectionEvent),
            "notice" => Ok(Self::Notice),
            other => Err(UnknownMessageType(other.to_string())),
        }
    }
}

// -- Rooms --

/// A 1:1 conversation. Identity is the unordered participant pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: Uuid,
    pub participant_a: UserId,
    pub participant_b: UserId,
    pub last_message_content: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    /// The other participant, or `None` if `user_id` is not in the room.
    /// A room a user opened with themselves returns that same user.
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.participant_a == user_id {
            Some(&self.participant_b)
        } else if self.participant_b == user_id {
            Some(&self.participant_a)
        } else {
            None
        }
    }

    /// Last activity time used to order room lists.
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message_time.unwrap_or(self.created_at)
    }
}

// -- Messages --

/// One entry of a room timeline: chat content or a journaled system event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Option<UserId>,
    pub receiver_id: Option<UserId>,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub event_payload: Option<serde_json::Value>,
}

impl Message {
    pub fn chat(room_id: Uuid, sender_id: &str, receiver_id: &str, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            sender_id: Some(sender_id.to_string()),
            receiver_id: Some(receiver_id.to_string()),
            content: content.into(),
            sent_at: now(),
            read: false,
            message_type: MessageType::Chat,
            event_payload: None,
        }
    }
}

/// Where the router left a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryOutcome {
    LiveDelivered,
    QueuedOffline,
}

impl DeliveryOutcome {
    pub fn is_delivered(self) -> bool {
        self == Self::LiveDelivered
    }
}

// -- Journal payloads --

/// Structured data attached to a journaled system event.
/// The variant determines the entry's `MessageType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EventPayload {
    Joined { user_id: UserId },
    Left { user_id: UserId },
    Connected { user_id: UserId },
    Disconnected { user_id: UserId },
    RoomCreated {
        creator_id: UserId,
        participant_a: UserId,
        participant_b: UserId,
    },
    MessageRead { reader_id: UserId, message_id: Uuid },
    MessageDelivered { receiver_id: UserId, message_id: Uuid },
    MessageFailed {
        receiver_id: UserId,
        message_id: Uuid,
        reason: String,
    },
    SystemNotice { admin_id: UserId },
    MaintenanceNotice { admin_id: UserId },
}

impl EventPayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Joined { .. } => MessageType::UserJoined,
            Self::Left { .. } => MessageType::UserLeft,
            Self::Connected { .. } => MessageType::UserConnected,
            Self::Disconnected { .. } => MessageType::UserDisconnected,
            Self::RoomCreated { .. } => MessageType::RoomCreated,
            Self::MessageRead { .. } => MessageType::MessageRead,
            Self::MessageDelivered { .. } => MessageType::MessageDelivered,
            Self::MessageFailed { .. } => MessageType::MessageFailed,
            Self::SystemNotice { .. } => MessageType::SystemNotice,
            Self::MaintenanceNotice { .. } => MessageType::MaintenanceNotice,
        }
    }
}
