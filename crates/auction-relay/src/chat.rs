//! Room relay behind `/chat`. Every text frame is forwarded to all other chat
//! connections. Nothing is stored.

use {
    crate::{metrics, session::ConnectionId},
    axum::extract::ws::{Message, Utf8Bytes, WebSocket},
    futures::{SinkExt, StreamExt},
    std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    tokio::sync::broadcast,
};

const PATH: &str = "/chat";

pub struct Chat {
    room: broadcast::Sender<(ConnectionId, Utf8Bytes)>,
    next_connection: AtomicU64,
}

impl Default for Chat {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl Chat {
    const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let (room, _) = broadcast::channel(capacity);
        Self {
            room,
            next_connection: AtomicU64::new(1),
        }
    }

    pub async fn serve(self: Arc<Self>, mut socket: WebSocket) {
        let connection = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let mut room = self.room.subscribe();
        let open_connections = metrics::get().open_connections.with_label_values(&[PATH]);
        open_connections.inc();

        loop {
            tokio::select! {
                message = room.recv() => match message {
                    Ok((sender, _)) if sender == connection => {}
                    Ok((_, text)) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(%connection, skipped, "chat connection lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                frame = socket.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        // Fails only when nobody else is listening.
                        let _ = self.room.send((connection, text));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::error!(%connection, ?err, "websocket error");
                        metrics::get().socket_errors.with_label_values(&[PATH]).inc();
                        break;
                    }
                },
            }
        }

        let _ = socket.close().await;
        open_connections.dec();
    }
}
