//! Room fanout: routes events to every connection subscribed to a room.
//!
//! Each connection owns an unbounded outbox channel; delivery is a
//! non-blocking push under one lock, so two broadcasts issued in program
//! order to the same room reach every subscriber in that order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::ServerEvent;

#[derive(Default)]
struct FanoutInner {
    connections: HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>,
    rooms: HashMap<String, HashSet<Uuid>>,
}

#[derive(Clone, Default)]
pub struct RoomFanout {
    inner: Arc<Mutex<FanoutInner>>,
}

impl RoomFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbox. Must happen before `subscribe` or
    /// `send_to_connection` can reach it.
    pub fn attach(&self, connection_id: Uuid, sender: mpsc::UnboundedSender<ServerEvent>) {
        self.inner.lock().connections.insert(connection_id, sender);
    }

    /// Drop the outbox and any room memberships left behind.
    pub fn detach(&self, connection_id: Uuid) {
        let mut inner = self.inner.lock();
        inner.connections.remove(&connection_id);
        inner.rooms.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
    }

    pub fn subscribe(&self, connection_id: Uuid, room_id: &str) {
        self.inner
            .lock()
            .rooms
            .entry(room_id.to_owned())
            .or_default()
            .insert(connection_id);
    }

    pub fn unsubscribe(&self, connection_id: Uuid, room_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(members) = inner.rooms.get_mut(room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                inner.rooms.remove(room_id);
            }
        }
    }

    /// Best-effort, fire-and-forget. A dead subscriber is logged and skipped;
    /// it never stops delivery to the rest and never errors the caller.
    pub fn broadcast_to_room(&self, room_id: &str, event: ServerEvent, exclude: Option<Uuid>) {
        let inner = self.inner.lock();
        let Some(members) = inner.rooms.get(room_id) else {
            return;
        };

        for connection_id in members {
            if Some(*connection_id) == exclude {
                continue;
            }
            match inner.connections.get(connection_id) {
                Some(sender) => {
                    if sender.send(event.clone()).is_err() {
                        tracing::debug!(%connection_id, %room_id, "subscriber gone, skipping");
                    }
                }
                None => {
                    tracing::debug!(%connection_id, %room_id, "subscriber has no outbox");
                }
            }
        }
    }

    pub fn send_to_connection(&self, connection_id: Uuid, event: ServerEvent) {
        let inner = self.inner.lock();
        if let Some(sender) = inner.connections.get(&connection_id) {
            if sender.send(event).is_err() {
                tracing::debug!(%connection_id, "unicast to closed connection dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(fanout: &RoomFanout, room: &str) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = Uuid::now_v7();
        let (tx, rx) = mpsc::unbounded_channel();
        fanout.attach(id, tx);
        fanout.subscribe(id, room);
        (id, rx)
    }

    fn typing(name: &str) -> ServerEvent {
        ServerEvent::TypingSignal {
            display_name: Some(name.to_owned()),
        }
    }

    #[tokio::test]
    async fn broadcast_preserves_program_order_per_subscriber() {
        let fanout = RoomFanout::new();
        let (_, mut rx_a) = member(&fanout, "lobby");
        let (_, mut rx_b) = member(&fanout, "lobby");

        for i in 0..10 {
            fanout.broadcast_to_room("lobby", typing(&i.to_string()), None);
        }

        for rx in [&mut rx_a, &mut rx_b] {
            for i in 0..10 {
                assert_eq!(rx.recv().await.unwrap(), typing(&i.to_string()));
            }
        }
    }

    #[tokio::test]
    async fn exclude_and_dead_subscribers() {
        let fanout = RoomFanout::new();
        let (id_a, mut rx_a) = member(&fanout, "lobby");
        let (_, mut rx_b) = member(&fanout, "lobby");
        let (_, rx_dead) = member(&fanout, "lobby");
        drop(rx_dead);

        fanout.broadcast_to_room("lobby", typing("x"), Some(id_a));
        assert_eq!(rx_b.recv().await.unwrap(), typing("x"));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_scoped() {
        let fanout = RoomFanout::new();
        let (id_a, mut rx_a) = member(&fanout, "lobby");
        fanout.unsubscribe(id_a, "lobby");
        fanout.unsubscribe(id_a, "lobby");
        fanout.unsubscribe(id_a, "never-existed");

        fanout.broadcast_to_room("lobby", typing("x"), None);
        assert!(rx_a.try_recv().is_err());

        // unicast still works while attached
        fanout.send_to_connection(id_a, typing("y"));
        assert_eq!(rx_a.recv().await.unwrap(), typing("y"));

        fanout.detach(id_a);
        fanout.send_to_connection(id_a, typing("z"));
        assert!(rx_a.try_recv().is_err());
    }
}
