//! Drives a single `/auction` websocket: one reader processing frames in
//! order and one writer draining the connection's outbox.

use {
    crate::{
        metrics,
        relay::{Flow, Relay},
    },
    axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket},
    futures::{SinkExt, StreamExt},
    std::sync::Arc,
    tokio::sync::mpsc,
};

const PATH: &str = "/auction";

pub async fn serve(socket: WebSocket, relay: Arc<Relay>) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut inbox) = mpsc::channel(relay.config().outbox_capacity.max(1));
    let (mut session, evicted) = relay.connect(outbox.clone());
    let connection = session.id;
    let open_connections = metrics::get().open_connections.with_label_values(&[PATH]);
    open_connections.inc();
    tracing::debug!(%connection, "connection opened");

    let writer = tokio::spawn(async move {
        while let Some(message) = inbox.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(err) = sink.send(message).await {
                tracing::debug!(%connection, ?err, "failed to write frame");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let mut too_slow = false;
    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            () = evicted.wait() => {
                too_slow = true;
                break;
            }
        };
        let text = match frame {
            None | Some(Ok(Message::Close(_))) => break,
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => match Utf8Bytes::try_from(bytes) {
                Ok(text) => text,
                Err(err) => {
                    tracing::debug!(%connection, ?err, "ignoring non utf-8 binary frame");
                    continue;
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Err(err)) => {
                tracing::error!(%connection, ?err, "websocket error");
                metrics::get().socket_errors.with_label_values(&[PATH]).inc();
                break;
            }
        };

        if let Flow::Close(reason) = relay.on_frame(&mut session, text.as_str()).await {
            metrics::get()
                .connections_closed
                .with_label_values(&[reason.as_str()])
                .inc();
            // Without room in the outbox the socket closes without a frame.
            let _ = outbox.try_send(Message::Close(Some(CloseFrame {
                code: reason.code(),
                reason: Utf8Bytes::from_static(reason.as_str()),
            })));
            break;
        }
    }

    relay.disconnect(session);
    // The writer stops once every sender of the outbox is gone.
    drop(outbox);
    if too_slow {
        tracing::info!(%connection, "closing connection that fell behind");
        metrics::get()
            .connections_closed
            .with_label_values(&["too_slow"])
            .inc();
        // The peer stopped reading, so whatever is queued gets dropped.
        writer.abort();
    }
    match writer.await {
        Err(err) if err.is_panic() => {
            tracing::error!(%connection, ?err, "connection writer panicked");
        }
        _ => (),
    }
    open_connections.dec();
    tracing::debug!(%connection, "connection closed");
}
