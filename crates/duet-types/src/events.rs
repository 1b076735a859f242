use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{DeliveryOutcome, Message, MessageType, UserId};

const ROOM_PREFIX: &str = "/queue/messages/";
const USER_PREFIX: &str = "/user/";

/// Per-user queues. Every session of a user receives these without subscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserQueue {
    PrivateMessages,
    MessageSent,
    ReadReceipts,
}

impl UserQueue {
    pub fn name(self) -> &'static str {
        match self {
            Self::PrivateMessages => "private-messages",
            Self::MessageSent => "message-sent",
            Self::ReadReceipts => "read-receipts",
        }
    }
}

/// Where a pushed frame is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// `/queue/messages/{room_id}`: every session subscribed to the room.
    Room(Uuid),
    /// `/user/{user_id}/queue/{queue}`: every session of one user.
    User { user_id: UserId, queue: UserQueue },
}

impl Destination {
    pub fn user(user_id: impl Into<UserId>, queue: UserQueue) -> Self {
        Self::User {
            user_id: user_id.into(),
            queue,
        }
    }

    pub fn room_id(&self) -> Option<Uuid> {
        match self {
            Self::Room(id) => Some(*id),
            Self::User { .. } => None,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Room(id) => write!(f, "{ROOM_PREFIX}{id}"),
            Self::User { user_id, queue } => {
                write!(f, "{USER_PREFIX}{user_id}/queue/{}", queue.name())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid destination: {0}")]
pub struct InvalidDestination(pub String);

impl FromStr for Destination {
    type Err = InvalidDestination;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidDestination(s.to_string());

        if let Some(room) = s.strip_prefix(ROOM_PREFIX) {
            return room.parse().map(Self::Room).map_err(|_| invalid());
        }

        let rest = s.strip_prefix(USER_PREFIX).ok_or_else(invalid)?;
        let (user_id, queue) = rest.split_once("/queue/").ok_or_else(invalid)?;
        if user_id.is_empty() || user_id.contains('/') {
            return Err(invalid());
        }
        let queue = match queue {
            "private-messages" => UserQueue::PrivateMessages,
            "message-sent" => UserQueue::MessageSent,
            "read-receipts" => UserQueue::ReadReceipts,
            _ => return Err(invalid()),
        };
        Ok(Self::user(user_id, queue))
    }
}

/// Frames pushed FROM server TO client over the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// Connection registered; carries the session id assigned by the server
    Ready { session_id: Uuid, user_id: UserId },

    /// A chat message, either on the room channel or as a private notification
    MessageCreate { message: Message },

    /// Someone joined, left, connected or disconnected in a room
    Presence {
        room_id: Uuid,
        user_id: UserId,
        kind: MessageType,
        timestamp: DateTime<Utc>,
    },

    /// Acknowledgement to the sender, separate from the room broadcast
    MessageSent {
        message_id: Uuid,
        room_id: Uuid,
        sent_at: DateTime<Utc>,
        outcome: DeliveryOutcome,
        delivered: bool,
    },

    /// The receiver read one of the sender's messages
    ReadReceipt {
        message_id: Uuid,
        room_id: Uuid,
        reader_id: UserId,
        read_at: DateTime<Utc>,
    },

    /// A client command was refused
    Error { reason: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientCommand {
    /// Subscribe to a destination; room destinations register presence.
    Subscribe { destination: String },

    /// Leave a room channel without disconnecting
    Unsubscribe { destination: String },

    /// Send a chat message to the other participant of a room
    Send { room_id: Uuid, content: String },
}
