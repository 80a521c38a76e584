//! WebSocket streaming channel for one session

use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use seqstream_core::{PipelineEvent, SessionId};
use seqstream_pipeline::{Disconnected, EventSink};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// WebSocket handler running one analysis session per connection
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(file_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, file_id, state))
}

async fn handle_socket(socket: WebSocket, file_id: String, state: AppState) {
    let (sender, receiver) = socket.split();
    let closed = Arc::new(AtomicBool::new(false));
    let watcher = tokio::spawn(watch_client(receiver, Arc::clone(&closed)));
    let mut sink = WebSocketSink::new(sender, closed, state.close_grace);

    match file_id.parse::<SessionId>() {
        Ok(id) => {
            state.orchestrator.run(id, &mut sink).await;
        }
        Err(_) => {
            debug!(%file_id, "malformed session id");
            let _ = sink.send(PipelineEvent::error("File not found")).await;
            sink.close().await;
        }
    }

    watcher.abort();
}

/// Flag the connection as closed once the client goes away
async fn watch_client<S>(mut receiver: S, closed: Arc<AtomicBool>)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(Message::Text(text)) => tracing::trace!("Received message: {}", text),
            Ok(_) => {}
        }
    }
    closed.store(true, Ordering::SeqCst);
}

/// [`EventSink`] writing each event as one JSON text frame
pub struct WebSocketSink<T> {
    sender: T,
    closed: Arc<AtomicBool>,
    grace: Duration,
}

impl<T> WebSocketSink<T>
where
    T: Sink<Message> + Unpin + Send,
    T::Error: Display + Send,
{
    pub fn new(sender: T, closed: Arc<AtomicBool>, grace: Duration) -> Self {
        Self {
            sender,
            closed,
            grace,
        }
    }

    /// An event that cannot be encoded ends the channel like a failed write
    async fn send_encoded(
        &mut self,
        encoded: serde_json::Result<String>,
        kind: &'static str,
    ) -> Result<(), Disconnected> {
        let text = match encoded {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, kind, "failed to serialize event, closing channel");
                self.closed.store(true, Ordering::SeqCst);
                return Err(Disconnected);
            }
        };

        if let Err(e) = self.sender.send(Message::Text(text)).await {
            debug!(error = %e, kind, "send failed, client gone");
            self.closed.store(true, Ordering::SeqCst);
            return Err(Disconnected);
        }
        Ok(())
    }
}

#[async_trait]
impl<T> EventSink for WebSocketSink<T>
where
    T: Sink<Message> + Unpin + Send,
    T::Error: Display + Send,
{
    async fn send(&mut self, event: PipelineEvent) -> Result<(), Disconnected> {
        if self.is_closed() {
            return Err(Disconnected);
        }

        let encoded = serde_json::to_string(&event);
        self.send_encoded(encoded, event.kind()).await
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        if self.is_closed() {
            return;
        }

        tokio::time::sleep(self.grace).await;
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        };
        if let Err(e) = self.sender.send(Message::Close(Some(frame))).await {
            warn!(error = %e, "failed to send close frame");
        }
        let _ = self.sender.close().await;
        self.closed.store(true, Ordering::SeqCst);
    }
}
