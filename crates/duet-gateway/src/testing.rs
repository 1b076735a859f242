//! Test doubles shared by the gateway's unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result as AnyResult};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use duet_db::{ChatStore, Database, MessageQuery};
use duet_types::cursor::Cursor;
use duet_types::events::{Destination, ServerEvent};
use duet_types::models::{ChatRoom, Message, MessageType};

use crate::dispatcher::Transport;
use crate::error::{ChatError, Result};

/// A fresh in-memory store with one alice/bob room.
pub fn seeded_room() -> (Arc<Database>, ChatRoom) {
    let db = Database::open_in_memory().unwrap();
    let (room, _) = db.upsert_room("alice", "bob").unwrap();
    (Arc::new(db), room)
}

/// Every entry of a room, newest first.
pub fn timeline(store: &dyn ChatStore, room_id: Uuid) -> Vec<Message> {
    store
        .query_messages(&MessageQuery {
            room_id,
            before: None,
            types: None,
            limit: 1000,
        })
        .unwrap()
}

pub fn entries_of(store: &dyn ChatStore, room_id: Uuid, kind: MessageType) -> Vec<Message> {
    timeline(store, room_id)
        .into_iter()
        .filter(|m| m.message_type == kind)
        .collect()
}

/// Records every push. `reach` is what each push reports; `fail` turns
/// every push into a delivery error.
#[derive(Default)]
pub struct RecordingTransport {
    pushes: Mutex<Vec<(Destination, ServerEvent)>>,
    reach: Mutex<usize>,
    fail: Mutex<bool>,
}

impl RecordingTransport {
    pub fn reaching(n: usize) -> Arc<Self> {
        let t = Self::default();
        *t.reach.lock().unwrap() = n;
        Arc::new(t)
    }

    pub fn failing() -> Arc<Self> {
        let t = Self::default();
        *t.fail.lock().unwrap() = true;
        Arc::new(t)
    }

    pub fn pushes(&self) -> Vec<(Destination, ServerEvent)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn pushed_to(&self, destination: &Destination) -> Vec<ServerEvent> {
        self.pushes()
            .into_iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, e)| e)
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn push(&self, destination: &Destination, event: &ServerEvent) -> Result<usize> {
        self.pushes
            .lock()
            .unwrap()
            .push((destination.clone(), event.clone()));
        if *self.fail.lock().unwrap() {
            return Err(ChatError::Delivery("socket closed".into()));
        }
        Ok(*self.reach.lock().unwrap())
    }
}

/// A store whose every call fails.
pub struct BrokenStore;

fn down<T>() -> AnyResult<T> {
    Err(anyhow!("database unavailable"))
}

impl ChatStore for BrokenStore {
    fn append_message(&self, _: &Message) -> AnyResult<()> {
        down()
    }
    fn find_message(&self, _: Uuid) -> AnyResult<Option<Message>> {
        down()
    }
    fn find_messages(&self, _: &[Uuid]) -> AnyResult<Vec<Message>> {
        down()
    }
    fn query_messages(&self, _: &MessageQuery) -> AnyResult<Vec<Message>> {
        down()
    }
    fn mark_room_read(&self, _: Uuid, _: &str) -> AnyResult<usize> {
        down()
    }
    fn mark_messages_read(&self, _: Uuid, _: &str, _: &[Uuid]) -> AnyResult<Vec<Message>> {
        down()
    }
    fn upsert_room(&self, _: &str, _: &str) -> AnyResult<(ChatRoom, bool)> {
        down()
    }
    fn find_room(&self, _: Uuid) -> AnyResult<Option<ChatRoom>> {
        down()
    }
    fn update_last_message(&self, _: Uuid, _: &str, _: DateTime<Utc>) -> AnyResult<()> {
        down()
    }
    fn rooms_for_user(&self, _: &str, _: Option<Cursor>, _: usize) -> AnyResult<Vec<ChatRoom>> {
        down()
    }
    fn unread_counts(&self, _: &str) -> AnyResult<HashMap<Uuid, u64>> {
        down()
    }
}
