use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::{ClientEvent, ServerEvent};
use crate::gateway::{Gateway, Session};

#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(State(gateway): State<Gateway>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| {
        serve_connection(gateway, stream).await;
    })
}

/// One task per connection. Inbound events are handled strictly in arrival
/// order; outbound events drain from the connection's fanout outbox.
async fn serve_connection(gateway: Gateway, stream: WebSocket) {
    let connection_id = Uuid::now_v7();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<ServerEvent>();
    gateway.fanout.attach(connection_id, outbox_tx);

    let (mut sender, mut receiver) = stream.split();

    let write_task = tokio::spawn(async move {
        while let Some(event) = outbox_rx.recv().await {
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(json.into()).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::new(gateway.clone(), connection_id);
    tracing::debug!(%connection_id, "connection open");

    while let Some(Ok(msg)) = receiver.next().await {
        let data = match msg {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(bytes) => bytes.to_vec(),
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_slice::<ClientEvent>(&data) {
            Ok(event) => session.handle(event).await,
            Err(e) => {
                // Malformed payloads bounce back to the sender only.
                gateway.fanout.send_to_connection(
                    connection_id,
                    ServerEvent::error("validation", format!("malformed event: {e}")),
                );
            }
        }
    }

    session.leave();
    gateway.fanout.detach(connection_id);
    write_task.abort();
    tracing::debug!(%connection_id, "connection closed");
}
