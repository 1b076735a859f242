use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use duet_types::events::{Destination, ServerEvent};
use duet_types::models::UserId;

use crate::error::{ChatError, Result};

/// The one primitive the core uses to reach clients.
///
/// Delivery is at-most-once. `Ok(n)` is the number of sessions the frame was
/// handed to; zero is not an error (nobody listening).
pub trait Transport: Send + Sync {
    fn push(&self, destination: &Destination, event: &ServerEvent) -> Result<usize>;
}

/// A pre-serialized frame ready to be written to a socket.
#[derive(Debug, Clone)]
pub struct Frame {
    pub destination: Arc<str>,
    pub json: Arc<str>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    destination: &'a str,
    event: &'a ServerEvent,
}

struct SessionSink {
    user_id: UserId,
    tx: mpsc::UnboundedSender<Frame>,
    subscriptions: HashSet<Destination>,
}

/// In-process broker: tracks every attached session and fans frames out
/// by destination.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// session_id -> sink
    sessions: RwLock<HashMap<Uuid, SessionSink>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a session. Its user queues are delivered without subscribing.
    pub fn attach(&self, session_id: Uuid, user_id: UserId) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                session_id,
                SessionSink {
                    user_id,
                    tx,
                    subscriptions: HashSet::new(),
                },
            );
        rx
    }

    pub fn detach(&self, session_id: Uuid) {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session_id);
    }

    /// Subscribe a session to a room destination. User destinations are
    /// implicit: subscribing to one's own succeeds without effect, anyone
    /// else's is refused.
    pub fn subscribe(&self, session_id: Uuid, destination: Destination) -> bool {
        let mut sessions = self.inner.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let Some(sink) = sessions.get_mut(&session_id) else {
            return false;
        };
        match &destination {
            Destination::Room(_) => {
                sink.subscriptions.insert(destination);
                true
            }
            Destination::User { user_id, .. } => *user_id == sink.user_id,
        }
    }

    pub fn unsubscribe(&self, session_id: Uuid, destination: &Destination) -> bool {
        let mut sessions = self.inner.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get_mut(&session_id)
            .is_some_and(|sink| sink.subscriptions.remove(destination))
    }

    /// Send a frame to one session only, outside any destination.
    pub fn send_to_session(&self, session_id: Uuid, event: &ServerEvent) -> Result<()> {
        let frame = encode("", event)?;
        let sessions = self.inner.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let sink = sessions
            .get(&session_id)
            .ok_or_else(|| ChatError::Delivery(format!("session {} is gone", session_id)))?;
        sink.tx
            .send(frame)
            .map_err(|_| ChatError::Delivery(format!("session {} is closed", session_id)))
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Transport for Dispatcher {
    fn push(&self, destination: &Destination, event: &ServerEvent) -> Result<usize> {
        let frame = encode(&destination.to_string(), event)?;

        let sessions = self.inner.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let targets = sessions.iter().filter(|(_, sink)| match destination {
            Destination::Room(_) => sink.subscriptions.contains(destination),
            Destination::User { user_id, .. } => sink.user_id == *user_id,
        });

        let mut delivered = 0;
        let mut closed = 0;
        for (session_id, sink) in targets {
            if sink.tx.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                closed += 1;
                debug!("Session {} closed before frame for {}", session_id, destination);
            }
        }

        if delivered == 0 && closed > 0 {
            warn!("Every session for {} was closed", destination);
            return Err(ChatError::Delivery(format!("all receivers for {} closed", destination)));
        }
        Ok(delivered)
    }
}

fn encode(destination: &str, event: &ServerEvent) -> Result<Frame> {
    let json = serde_json::to_string(&Envelope { destination, event })
        .map_err(|e| ChatError::Delivery(format!("encode failed: {}", e)))?;
    Ok(Frame {
        destination: destination.into(),
        json: json.into(),
    })
}
