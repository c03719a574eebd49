//! Response streaming channel.
//!
//! A [`ResponseSink`] pushes an ordered sequence of text tokens to the caller
//! and terminates the stream with exactly one [`StreamEvent::Done`]. The
//! receiving half is drained by the HTTP layer and written as SSE frames.

use serde_json::json;
use tokio::sync::mpsc;

/// Default number of buffered events between producer and consumer.
pub const DEFAULT_CAPACITY: usize = 64;

/// Sent ahead of the sentinel when a producer stops without finishing.
pub const INTERRUPTED_MESSAGE: &str =
    "⚠️ Something went wrong while answering. Please try again.";

/// A unit sent on the response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Partial response text.
    Token(String),
    /// End-of-stream sentinel. Always the last event of a request.
    Done,
}

impl StreamEvent {
    /// Render the SSE `data:` payload for this event.
    ///
    /// Tokens become `{"token": "..."}`, the sentinel becomes `[DONE]`.
    pub fn to_sse_data(&self) -> String {
        match self {
            StreamEvent::Token(token) => json!({ "token": token }).to_string(),
            StreamEvent::Done => "[DONE]".to_string(),
        }
    }
}

/// Returned when the consumer has gone away (client disconnected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("response stream closed by the client")]
pub struct StreamClosed;

/// Receiving half of a response stream.
pub type StreamReceiver = mpsc::Receiver<StreamEvent>;

/// Producing half of a response stream.
///
/// `finish` consumes the sink, so at most one sentinel can be sent
/// explicitly. If the sink is dropped without finishing (early return,
/// panic in the producing task) `Drop` sends [`INTERRUPTED_MESSAGE`] and the
/// sentinel. That path cannot wait, so it is best-effort: a full buffer or a
/// departed consumer loses them.
#[derive(Debug)]
pub struct ResponseSink {
    tx: mpsc::Sender<StreamEvent>,
    finished: bool,
}

impl ResponseSink {
    /// Create a connected sink/receiver pair.
    pub fn channel(capacity: usize) -> (ResponseSink, StreamReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            ResponseSink {
                tx,
                finished: false,
            },
            rx,
        )
    }

    /// Push one token. Fails once the consumer has disconnected.
    pub async fn send_token(&mut self, token: impl Into<String>) -> Result<(), StreamClosed> {
        self.tx
            .send(StreamEvent::Token(token.into()))
            .await
            .map_err(|_| StreamClosed)
    }

    /// Whether the consumer has disconnected.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send the terminal sentinel and close the stream.
    pub async fn finish(mut self) {
        self.finished = true;
        if self.tx.send(StreamEvent::Done).await.is_err() {
            tracing::debug!("Client disconnected before end of stream");
        }
    }

    /// Send a single complete message followed by the sentinel.
    pub async fn reply(mut self, message: impl Into<String>) {
        // A closed consumer makes the sentinel moot as well.
        if self.send_token(message).await.is_ok() {
            self.finish().await;
        } else {
            self.finished = true;
        }
    }
}

impl Drop for ResponseSink {
    fn drop(&mut self) {
        if self.finished || self.tx.is_closed() {
            return;
        }
        let interrupted = StreamEvent::Token(INTERRUPTED_MESSAGE.to_string());
        for event in [interrupted, StreamEvent::Done] {
            if let Err(e) = self.tx.try_send(event) {
                tracing::debug!(error = %e, "Could not terminate unfinished response stream");
                break;
            }
        }
    }
}

/// Drain every event from a receiver until the producer side is gone.
pub async fn collect_events(rx: &mut StreamReceiver) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}
