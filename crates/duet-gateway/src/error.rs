use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("room {0} not found")]
    RoomNotFound(Uuid),

    #[error("{user_id} is not a participant of room {room_id}")]
    NotParticipant { room_id: Uuid, user_id: String },

    #[error("missing identity")]
    MissingIdentity,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Journal payload could not be encoded. Never surfaced to the
    /// action that triggered the event.
    #[error("event payload encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Live push failed after the message was persisted.
    #[error("live delivery failed: {0}")]
    Delivery(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ChatError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RoomNotFound(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::NotParticipant { .. } | Self::MissingIdentity)
    }
}
