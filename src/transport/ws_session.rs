use crate::game::room::Room;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

pub async fn handle_socket(socket: WebSocket, room: Arc<Room>) {
    let (mut sender, mut receiver) = socket.split();
    let session = room.add_session().await;
    let session_id = session.session_id;
    let mut outbound_rx = session.outbound_rx;

    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = outbound_rx.recv().await {
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(Ok(message)) = incoming else { break };
                match message {
                    Message::Text(text) => {
                        if !room.handle_text_message(&session_id, &text).await {
                            break;
                        }
                    }
                    Message::Binary(_) => {
                        tracing::warn!(session_id, "discarding binary frame");
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            _ = &mut send_task => break,
        }
    }

    room.remove_session(&session_id).await;
    send_task.abort();
}
