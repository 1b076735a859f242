//! Outbound chat delivery.
//!
//! Persistence is the durability boundary: once the message is stored the
//! send has succeeded, whatever happens to the live push. A failed push is
//! downgraded to `QueuedOffline` and the message waits in history.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use duet_db::ChatStore;
use duet_types::events::{Destination, ServerEvent, UserQueue};
use duet_types::models::{DeliveryOutcome, Message};

use crate::dispatcher::Transport;
use crate::error::{ChatError, Result};
use crate::journal::EventJournal;
use crate::registry::ConnectionRegistry;

/// A stored message and where it ended up.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    pub outcome: DeliveryOutcome,
}

#[derive(Clone)]
pub struct DeliveryRouter {
    store: Arc<dyn ChatStore>,
    registry: ConnectionRegistry,
    journal: EventJournal,
    transport: Arc<dyn Transport>,
}

impl DeliveryRouter {
    pub fn new(
        store: Arc<dyn ChatStore>,
        registry: ConnectionRegistry,
        journal: EventJournal,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            store,
            registry,
            journal,
            transport,
        }
    }

    /// Build and route a chat message from `sender_id` to the other
    /// participant of the room.
    pub fn send(&self, room_id: Uuid, sender_id: &str, content: &str) -> Result<Delivery> {
        if sender_id.trim().is_empty() {
            return Err(ChatError::MissingIdentity);
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::InvalidInput("message content is empty".into()));
        }

        let room = self
            .store
            .find_room(room_id)?
            .ok_or(ChatError::RoomNotFound(room_id))?;
        let receiver_id = room
            .counterpart(sender_id)
            .ok_or_else(|| ChatError::NotParticipant {
                room_id,
                user_id: sender_id.to_string(),
            })?;

        let message = Message::chat(room_id, sender_id, receiver_id, content);
        let outcome = self.route(&message)?;
        Ok(Delivery { message, outcome })
    }

    /// Persist, then deliver live if the receiver is in the room, otherwise
    /// notify them privately. Only the persist step can fail the call.
    pub fn route(&self, message: &Message) -> Result<DeliveryOutcome> {
        let (Some(sender_id), Some(receiver_id)) = (&message.sender_id, &message.receiver_id) else {
            return Err(ChatError::InvalidInput("chat message needs sender and receiver".into()));
        };
        let room_id = message.room_id;

        self.store.append_message(message)?;

        if let Err(e) = self
            .store
            .update_last_message(room_id, &message.content, message.sent_at)
        {
            warn!("Failed to update last message of room {}: {}", room_id, e);
        }

        // Snapshot: a user joining after this point gets the message from history.
        let connected = self.registry.connected_users(room_id);
        if connected.is_empty() {
            // Nobody in the room: the stored message is all there is.
            debug!("Message {} in room {}: nobody connected", message.id, room_id);
            return Ok(DeliveryOutcome::QueuedOffline);
        }

        let outcome = if connected.contains(receiver_id) {
            self.deliver_live(message, receiver_id)
        } else {
            self.notify_private(message, receiver_id);
            DeliveryOutcome::QueuedOffline
        };

        if sender_id != receiver_id {
            self.acknowledge(message, sender_id, outcome);
        }

        debug!("Message {} in room {}: {:?}", message.id, room_id, outcome);
        Ok(outcome)
    }

    fn deliver_live(&self, message: &Message, receiver_id: &str) -> DeliveryOutcome {
        let event = ServerEvent::MessageCreate {
            message: message.clone(),
        };
        let reason = match self.transport.push(&Destination::Room(message.room_id), &event) {
            Ok(n) if n > 0 => {
                self.journal
                    .message_delivered(message.room_id, receiver_id, message.id);
                return DeliveryOutcome::LiveDelivered;
            }
            Ok(_) => "no open session accepted the message".to_string(),
            Err(e) => e.to_string(),
        };

        warn!("Live delivery of {} failed: {}", message.id, reason);
        self.journal
            .message_failed(message.room_id, receiver_id, message.id, &reason);
        DeliveryOutcome::QueuedOffline
    }

    fn notify_private(&self, message: &Message, receiver_id: &str) {
        let event = ServerEvent::MessageCreate {
            message: message.clone(),
        };
        let destination = Destination::user(receiver_id, UserQueue::PrivateMessages);
        if let Err(e) = self.transport.push(&destination, &event) {
            debug!("Private notification for {} not delivered: {}", receiver_id, e);
        }
    }

    fn acknowledge(&self, message: &Message, sender_id: &str, outcome: DeliveryOutcome) {
        let event = ServerEvent::MessageSent {
            message_id: message.id,
            room_id: message.room_id,
            sent_at: message.sent_at,
            outcome,
            delivered: outcome.is_delivered(),
        };
        let destination = Destination::user(sender_id, UserQueue::MessageSent);
        if let Err(e) = self.transport.push(&destination, &event) {
            debug!("Send acknowledgement for {} not delivered: {}", sender_id, e);
        }
    }
}
