use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use duet_types::events::{ClientCommand, Destination, ServerEvent};
use duet_types::models::UserId;

use crate::dispatcher::Dispatcher;
use crate::error::{ChatError, Result};
use crate::hub::ChatHub;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

/// Handle a WebSocket whose identity was verified at the HTTP upgrade.
/// Registers the session, pumps frames both ways, and unregisters on exit.
pub async fn handle_connection(socket: WebSocket, hub: ChatHub, dispatcher: Dispatcher, user_id: UserId) {
    let session_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    let mut frames = dispatcher.attach(session_id, user_id.clone());

    let presence = hub.presence.clone();
    let registering = user_id.clone();
    match blocking(move || presence.on_connect(session_id, &registering)).await {
        Ok(()) => {}
        Err(e) => {
            warn!("Refusing gateway session for {}: {}", user_id, e);
            dispatcher.detach(session_id);
            return;
        }
    }

    let ready = ServerEvent::Ready {
        session_id,
        user_id: user_id.clone(),
    };
    let ready_sent = match serde_json::to_string(&ready) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to encode Ready: {}", e);
            false
        }
    };

    if ready_sent {
        let pong_received = Arc::new(AtomicBool::new(true));
        let pong_flag_send = pong_received.clone();
        let pong_flag_recv = pong_received;

        // Frames from the dispatcher -> client, with heartbeat
        let mut send_task = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;
            let mut missed_heartbeats: u8 = 0;

            loop {
                tokio::select! {
                    frame = frames.recv() => {
                        let Some(frame) = frame else { break };
                        if sender.send(Message::Text(frame.json.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    _ = heartbeat.tick() => {
                        if pong_flag_send.swap(false, Ordering::Acquire) {
                            missed_heartbeats = 0;
                        } else {
                            missed_heartbeats += 1;
                            if missed_heartbeats >= MAX_MISSED_PONGS {
                                warn!("Heartbeat timeout (missed {} pongs), dropping session {}", missed_heartbeats, session_id);
                                break;
                            }
                        }
                        if sender.send(Message::Ping(vec![].into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Commands from the client
        let hub_recv = hub.clone();
        let dispatcher_recv = dispatcher.clone();
        let user_recv = user_id.clone();
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                        Ok(cmd) => {
                            if let Err(e) =
                                handle_command(&hub_recv, &dispatcher_recv, session_id, &user_recv, cmd).await
                            {
                                debug!("Command from {} refused: {}", user_recv, e);
                                let refusal = ServerEvent::Error { reason: e.to_string() };
                                if dispatcher_recv.send_to_session(session_id, &refusal).is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(
                                "{} ({}) bad command: {} -- raw: {}",
                                user_recv,
                                session_id,
                                e,
                                text.chars().take(200).collect::<String>()
                            );
                        }
                    },
                    Message::Pong(_) => {
                        pong_flag_recv.store(true, Ordering::Release);
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }
    }

    let presence = hub.presence.clone();
    if let Err(e) = blocking(move || Ok(presence.on_disconnect(session_id))).await {
        error!("Failed to unregister session {}: {}", session_id, e);
    }
    dispatcher.detach(session_id);
    info!("{} ({}) disconnected from gateway", user_id, session_id);
}

async fn handle_command(
    hub: &ChatHub,
    dispatcher: &Dispatcher,
    session_id: Uuid,
    user_id: &str,
    cmd: ClientCommand,
) -> Result<()> {
    match cmd {
        ClientCommand::Subscribe { destination } => {
            let destination = parse_destination(&destination)?;
            let Some(room_id) = destination.room_id() else {
                // User queues are delivered without subscribing; only one's own is allowed.
                if !dispatcher.subscribe(session_id, destination) {
                    return Err(ChatError::InvalidInput("not your queue".into()));
                }
                return Ok(());
            };

            let rooms = hub.rooms.clone();
            let user = user_id.to_string();
            blocking(move || rooms.authorize(room_id, &user)).await?;

            dispatcher.subscribe(session_id, destination);
            let presence = hub.presence.clone();
            blocking(move || Ok(presence.on_subscribe(session_id, room_id))).await?;
            info!("{} ({}) subscribed to room {}", user_id, session_id, room_id);
        }

        ClientCommand::Unsubscribe { destination } => {
            let destination = parse_destination(&destination)?;
            let Some(room_id) = destination.room_id() else {
                return Ok(());
            };
            dispatcher.unsubscribe(session_id, &destination);
            let presence = hub.presence.clone();
            blocking(move || Ok(presence.on_unsubscribe(session_id, room_id))).await?;
        }

        ClientCommand::Send { room_id, content } => {
            let router = hub.router.clone();
            let sender_id = user_id.to_string();
            let delivery = blocking(move || router.send(room_id, &sender_id, &content)).await?;
            debug!("{} sent {} ({:?})", user_id, delivery.message.id, delivery.outcome);
        }
    }
    Ok(())
}

fn parse_destination(raw: &str) -> Result<Destination> {
    raw.parse()
        .map_err(|e: duet_types::events::InvalidDestination| ChatError::InvalidInput(e.to_string()))
}

/// Run registry and store work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ChatError::Storage(anyhow::anyhow!("blocking task failed: {}", e)))?
}
