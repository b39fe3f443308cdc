use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::events::{ClientEvent, ServerEvent};
use crate::fanout::RoomFanout;
use crate::presence::PresenceRegistry;
use crate::store::{now_millis, MessageDraft, MessageKind, MessageStore, HISTORY_LIMIT};

/// The three shared components every connection talks through.
#[derive(Clone)]
pub struct Gateway {
    pub store: MessageStore,
    pub presence: PresenceRegistry,
    pub fanout: RoomFanout,
}

impl Gateway {
    pub fn new(store: MessageStore, presence: PresenceRegistry, fanout: RoomFanout) -> Self {
        Self {
            store,
            presence,
            fanout,
        }
    }
}

#[derive(Debug, Clone)]
struct Joined {
    room_id: String,
    display_name: String,
}

/// Per-connection state machine: Disconnected -> Joined -> Disconnected.
/// One `Session` per live connection; the transport feeds it inbound events
/// in arrival order and calls `leave` when the connection goes away.
pub struct Session {
    connection_id: Uuid,
    gateway: Gateway,
    joined: Option<Joined>,
}

impl Session {
    pub fn new(gateway: Gateway, connection_id: Uuid) -> Self {
        Self {
            connection_id,
            gateway,
            joined: None,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Dispatch one inbound event. Failures are reported back to this
    /// connection only; other connections never observe them.
    pub async fn handle(&mut self, event: ClientEvent) {
        let result = match event {
            ClientEvent::Join {
                room_id,
                display_name,
            } => self.join(room_id, display_name).await,
            ClientEvent::SendMessage { body, kind } => self.send(body, kind).await,
            ClientEvent::Typing { is_typing } => self.typing(is_typing),
            ClientEvent::MarkSeen { message_id } => {
                self.mark_seen(message_id).await;
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::debug!(connection_id = %self.connection_id, error = %e, "event rejected");
            self.gateway
                .fanout
                .send_to_connection(self.connection_id, ServerEvent::error(e.code(), e.to_string()));
        }
    }

    async fn join(&mut self, room_id: String, display_name: String) -> ChatResult<()> {
        if room_id.is_empty() {
            return Err(ChatError::validation("roomId must not be empty"));
        }
        if display_name.is_empty() {
            return Err(ChatError::validation("displayName must not be empty"));
        }

        // Switching rooms means the old room gets a proper goodbye first.
        if self.joined.as_ref().is_some_and(|j| j.room_id != room_id) {
            self.leave();
        }

        self.gateway
            .presence
            .register(self.connection_id, &room_id, &display_name);
        self.gateway.fanout.subscribe(self.connection_id, &room_id);
        self.gateway.fanout.broadcast_to_room(
            &room_id,
            ServerEvent::UserJoined {
                display_name: display_name.clone(),
                timestamp: now_millis(),
            },
            Some(self.connection_id),
        );

        // Presence beats history: if the store is down the join still lands,
        // just with an empty replay.
        let messages = match self.gateway.store.list_by_room(&room_id, HISTORY_LIMIT).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(%room_id, error = %e, "history fetch failed, joining with empty history");
                Vec::new()
            }
        };
        let users = self.gateway.presence.list_room(&room_id);

        self.gateway.fanout.send_to_connection(
            self.connection_id,
            ServerEvent::RoomSnapshot { messages, users },
        );

        tracing::info!(connection_id = %self.connection_id, %room_id, %display_name, "joined room");
        self.joined = Some(Joined {
            room_id,
            display_name,
        });
        Ok(())
    }

    async fn send(&mut self, body: String, kind: MessageKind) -> ChatResult<()> {
        let joined = self
            .joined
            .as_ref()
            .ok_or_else(|| ChatError::validation("not in a room"))?;
        if body.is_empty() {
            return Err(ChatError::validation("body must not be empty"));
        }

        // Persist first; nobody hears about a message the store rejected.
        let message = self
            .gateway
            .store
            .append(MessageDraft {
                room_id: joined.room_id.clone(),
                sender_connection_id: Some(self.connection_id),
                sender_name: joined.display_name.clone(),
                body,
                kind,
            })
            .await?;

        // Echo to the sender too, so its client can reconcile against the
        // persisted id and timestamp.
        self.gateway
            .fanout
            .broadcast_to_room(&joined.room_id, ServerEvent::NewMessage { message }, None);
        Ok(())
    }

    fn typing(&self, is_typing: bool) -> ChatResult<()> {
        let joined = self
            .joined
            .as_ref()
            .ok_or_else(|| ChatError::validation("not in a room"))?;

        self.gateway.fanout.broadcast_to_room(
            &joined.room_id,
            ServerEvent::TypingSignal {
                display_name: is_typing.then(|| joined.display_name.clone()),
            },
            Some(self.connection_id),
        );
        Ok(())
    }

    async fn mark_seen(&self, message_id: Uuid) {
        if self.joined.is_none() {
            tracing::debug!(connection_id = %self.connection_id, "markSeen before join ignored");
            return;
        }
        if let Err(e) = self.gateway.store.mark_seen(message_id, self.connection_id).await {
            tracing::warn!(%message_id, error = %e, "mark_seen failed");
        }
    }

    /// Idempotent; a leave on an already-disconnected session is a no-op.
    pub fn leave(&mut self) {
        let Some(Joined {
            room_id,
            display_name,
        }) = self.joined.take()
        else {
            return;
        };

        self.gateway.presence.unregister(self.connection_id);
        self.gateway.fanout.unsubscribe(self.connection_id, &room_id);
        self.gateway.fanout.broadcast_to_room(
            &room_id,
            ServerEvent::UserLeft {
                display_name: display_name.clone(),
                timestamp: now_millis(),
            },
            Some(self.connection_id),
        );
        tracing::info!(connection_id = %self.connection_id, %room_id, %display_name, "left room");
    }
}
