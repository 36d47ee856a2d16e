use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use agora_db::{Database, chat};
use agora_types::api::MessageRead;
use agora_types::events::{ChatCommand, ChatEvent};

use crate::registry::ChatRegistry;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Who is on the other end of an already-authorized socket.
#[derive(Debug, Clone)]
pub struct Participant {
    pub conversation_id: i64,
    pub user_id: i64,
    pub username: String,
}

/// Persist a message, then fan it out to the conversation's live listeners.
pub async fn post_message(
    db: &Database,
    registry: &ChatRegistry,
    conversation_id: i64,
    sender_id: i64,
    content: String,
) -> anyhow::Result<MessageRead> {
    let db = db.clone();
    let row = tokio::task::spawn_blocking(move || {
        db.unit_of_work(|conn| chat::insert_message(conn, conversation_id, sender_id, &content))
    })
    .await??;

    let message = MessageRead::from(row);
    registry
        .broadcast(
            conversation_id,
            ChatEvent::MessageCreate {
                message: message.clone(),
            },
        )
        .await;
    Ok(message)
}

/// Drive one WebSocket attached to a conversation. Authentication and the
/// participant check happen at the HTTP upgrade, before this is called.
pub async fn handle_connection(
    socket: WebSocket,
    registry: ChatRegistry,
    db: Database,
    participant: Participant,
) {
    let Participant {
        conversation_id,
        user_id,
        username,
    } = participant;
    let (mut sender, mut receiver) = socket.split();

    // Register before Ready so nothing persisted after Ready is missed
    let (listener_id, mut events_rx) = registry.add(conversation_id).await;

    let ready = ChatEvent::Ready {
        conversation_id,
        user_id,
        username: username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        registry.remove(conversation_id, listener_id).await;
        return;
    }
    info!("{} ({}) joined live chat {}", username, user_id, conversation_id);

    // Replies meant for this socket only (rejected commands)
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ChatEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                reply = reply_rx.recv() => {
                    let Some(reply) = reply else { break };
                    if send_event(&mut sender, &reply).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_registry = registry.clone();
    let recv_username = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ChatCommand>(&text) {
                    Ok(ChatCommand::SendMessage { content }) => {
                        if content.trim().is_empty() {
                            let _ = reply_tx.send(ChatEvent::Error {
                                detail: "Message content must not be empty.".into(),
                            });
                            continue;
                        }
                        if let Err(e) =
                            post_message(&db, &recv_registry, conversation_id, user_id, content).await
                        {
                            error!("Failed to store message in chat {}: {:#}", conversation_id, e);
                            let _ = reply_tx.send(ChatEvent::Error {
                                detail: "Message could not be delivered.".into(),
                            });
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_username,
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        let _ = reply_tx.send(ChatEvent::Error {
                            detail: "Unrecognized command.".into(),
                        });
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

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.remove(conversation_id, listener_id).await;
    info!("{} ({}) left live chat {}", username, user_id, conversation_id);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ChatEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode chat event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn post_message_persists_before_fan_out() {
        let db = Database::open_in_memory().unwrap();
        let conversation_id = db
            .unit_of_work(|conn| {
                let a = agora_db::users::insert(conn, "a", "a@example.com", "h")?;
                let b = agora_db::users::insert(conn, "b", "b@example.com", "h")?;
                Ok::<_, anyhow::Error>(chat::get_or_create_conversation(conn, a.id, b.id)?.id)
            })
            .unwrap();

        let registry = ChatRegistry::new();
        let (_, mut rx) = registry.add(conversation_id).await;

        let sent = post_message(&db, &registry, conversation_id, 1, "hello".into())
            .await
            .unwrap();

        let Some(ChatEvent::MessageCreate { message }) = rx.recv().await else {
            panic!("expected a MessageCreate event");
        };
        assert_eq!(message, sent);

        let stored = db
            .unit_of_work(|conn| chat::messages(conn, conversation_id))
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, sent.id);
    }
}
