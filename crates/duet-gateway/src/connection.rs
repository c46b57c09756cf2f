use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use duet_types::events::{GatewayCommand, GatewayEvent};
use duet_types::identity::counterpart;

use crate::live::{LiveQuery, Subscription};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket has to send `Identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection: Identify handshake, then stream
/// snapshots for every conversation the client subscribes to.
pub async fn handle_connection(socket: WebSocket, live: LiveQuery, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let user_id = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} connected to gateway", user_id);

    // Step 2: Send Ready event
    if send_event(&mut sender, &GatewayEvent::Ready { user_id: user_id.clone() })
        .await
        .is_err()
    {
        return;
    }

    run_connection_loop(sender, receiver, live, user_id.clone()).await;
    info!("{} disconnected from gateway", user_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    live: LiveQuery,
    user_id: String,
) {
    // Snapshots from every live query of this connection funnel through here
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    // Dropped with the loop, which unsubscribes everything
    let mut subscriptions: HashMap<String, Subscription> = HashMap::new();

    let pong_received = Arc::new(AtomicBool::new(true));
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    _ => break,
                };
                match msg {
                    Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                        Ok(cmd) => {
                            handle_command(&live, &user_id, cmd, &mut subscriptions, &event_tx);
                        }
                        Err(e) => {
                            warn!(
                                "{} bad command: {} -- raw: {}",
                                user_id,
                                e,
                                text.chars().take(200).collect::<String>()
                            );
                        }
                    },
                    Message::Pong(_) => pong_received.store(true, Ordering::Release),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = event_rx.recv() => {
                if send_event(&mut sender, &event).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if pong_received.swap(false, Ordering::Acquire) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout (missed {} pongs), dropping {}", missed_heartbeats, user_id);
                        break;
                    }
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!("{} closing {} live queries", user_id, subscriptions.len());
}

fn handle_command(
    live: &LiveQuery,
    user_id: &str,
    cmd: GatewayCommand,
    subscriptions: &mut HashMap<String, Subscription>,
    event_tx: &mpsc::UnboundedSender<GatewayEvent>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { conversation_id } => {
            // Conversations may not exist yet, so membership comes from the id
            if counterpart(&conversation_id, user_id).is_none() {
                warn!("{} refused subscription to {}", user_id, conversation_id);
                let _ = event_tx.send(GatewayEvent::Error {
                    message: format!("not a participant of {conversation_id}"),
                });
                return;
            }
            if subscriptions.contains_key(&conversation_id) {
                return;
            }

            info!("{} subscribing to {}", user_id, conversation_id);
            let tx = event_tx.clone();
            let cid = conversation_id.clone();
            let sub = live.subscribe(conversation_id.clone(), move |messages| {
                let _ = tx.send(GatewayEvent::MessagesSnapshot {
                    conversation_id: cid.clone(),
                    messages,
                });
            });
            subscriptions.insert(conversation_id, sub);
        }

        GatewayCommand::Unsubscribe { conversation_id } => {
            if subscriptions.remove(&conversation_id).is_some() {
                info!("{} unsubscribed from {}", user_id, conversation_id);
            }
        }
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|e| warn!("Failed to encode event: {}", e))?;
    sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|_| ())
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, jwt_secret: &str) -> Option<String> {
    use duet_types::api::Claims;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some(token_data.claims.sub);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}
