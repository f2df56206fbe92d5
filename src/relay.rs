//! Stream relay: upstream completion chunks in, plain-text bytes out
//!
//! A producer task reads the provider's chunk stream and pushes each
//! non-empty text delta, UTF-8 encoded, onto a bounded channel. The response
//! body ([`RelayBody`]) drains that channel. A slow caller fills the channel
//! and the producer stops pulling from upstream until there is room again.
//!
//! # Termination
//!
//! | Cause                     | Producer                       | Body                      |
//! |---------------------------|--------------------------------|---------------------------|
//! | Upstream exhausted        | drops sender                   | ends cleanly              |
//! | Upstream error            | sends `Err`, drops sender      | yields `Err`, then ends   |
//! | Deadline                  | drops upstream and sender      | yields `Err`, then ends   |
//! | Caller disconnected       | drops upstream (cancels call)  | already gone              |
//!
//! An `Err` item makes the HTTP layer abort the chunked response, so a
//! truncated reply never looks like a complete one.
//!
//! The reported [`RelayOutcome`] combines both sides: upstream may finish
//! while fragments are still queued, and the relay only counts as completed
//! once the body has handed all of them on.

use crate::provider::{ChunkStream, ProviderError};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};

/// Error item ending a relayed body early
#[derive(Error, Debug)]
pub enum RelayStreamError {
    #[error("relay aborted after {bytes_relayed} bytes: {message}")]
    Upstream { bytes_relayed: usize, message: String },

    #[error("request deadline exceeded after {bytes_relayed} bytes")]
    DeadlineExceeded { bytes_relayed: usize },
}

/// Item carried from the producer to the response body
pub type RelayItem = Result<Bytes, RelayStreamError>;

/// Per-relay settings
#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    channel_capacity: usize,
    deadline: Instant,
}

impl RelayOptions {
    /// `channel_capacity` is clamped to at least one slot
    pub fn new(channel_capacity: usize, deadline: Instant) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
            deadline,
        }
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Counters for what a relay delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Non-empty text fragments handed to the body
    pub fragments: usize,
    /// UTF-8 bytes handed to the body
    pub bytes: usize,
}

/// How a relay ended
#[derive(Debug)]
pub enum RelayOutcome {
    /// Upstream exhausted; body closed cleanly
    Completed(RelayStats),
    /// Upstream raised mid-stream
    UpstreamFailed {
        stats: RelayStats,
        error: ProviderError,
    },
    /// The request deadline fired while streaming
    DeadlineExceeded(RelayStats),
    /// The body was dropped before upstream finished
    ClientDisconnected(RelayStats),
}

impl RelayOutcome {
    pub fn stats(&self) -> RelayStats {
        match self {
            RelayOutcome::Completed(stats)
            | RelayOutcome::DeadlineExceeded(stats)
            | RelayOutcome::ClientDisconnected(stats) => *stats,
            RelayOutcome::UpstreamFailed { stats, .. } => *stats,
        }
    }
}

/// Start relaying `upstream` and return the response body stream
///
/// `on_finish` is called exactly once, after both the producer task and the
/// body have stopped. Its stats count what the body actually handed to the
/// HTTP layer, and a body cut short by the deadline always reports
/// [`RelayOutcome::DeadlineExceeded`] even if upstream had already finished.
pub fn spawn<F>(upstream: ChunkStream, options: RelayOptions, on_finish: F) -> RelayBody
where
    F: FnOnce(RelayOutcome) + Send + 'static,
{
    let (tx, rx) = mpsc::channel(options.channel_capacity());
    let deadline = options.deadline();
    let finish = Finish::new(Box::new(on_finish));

    let producer = finish.clone();
    tokio::spawn(async move {
        let outcome = pump(upstream, tx, deadline).await;
        producer.producer_done(outcome);
    });

    RelayBody::new(rx, deadline, finish)
}

/// How the response body stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyEnd {
    /// Read to the end, or to an upstream error item
    Drained,
    /// Cut short by the request deadline
    DeadlineExceeded,
    /// Dropped by the HTTP layer before the end
    Dropped,
}

type FinishCallback = Box<dyn FnOnce(RelayOutcome) + Send>;

#[derive(Default)]
struct FinishState {
    producer: Option<RelayOutcome>,
    body: Option<(BodyEnd, RelayStats)>,
    callback: Option<FinishCallback>,
}

/// Joins the producer's and the body's view of one relay
#[derive(Clone)]
struct Finish(Arc<Mutex<FinishState>>);

impl Finish {
    fn new(callback: FinishCallback) -> Self {
        Self(Arc::new(Mutex::new(FinishState {
            callback: Some(callback),
            ..FinishState::default()
        })))
    }

    fn producer_done(&self, outcome: RelayOutcome) {
        self.update(|state| state.producer = Some(outcome));
    }

    fn body_done(&self, end: BodyEnd, delivered: RelayStats) {
        self.update(|state| state.body = Some((end, delivered)));
    }

    fn update(&self, apply: impl FnOnce(&mut FinishState)) {
        let ready = {
            let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            apply(&mut state);
            match (state.producer.take(), state.body.take()) {
                (Some(producer), Some(body)) => state
                    .callback
                    .take()
                    .map(|callback| (callback, producer, body)),
                (producer, body) => {
                    state.producer = producer;
                    state.body = body;
                    None
                }
            }
        };

        // Called outside the lock
        if let Some((callback, producer, (end, delivered))) = ready {
            callback(merge_outcome(producer, end, delivered));
        }
    }
}

/// Final outcome from the producer's result and how the body ended
fn merge_outcome(producer: RelayOutcome, end: BodyEnd, delivered: RelayStats) -> RelayOutcome {
    match (end, producer) {
        (BodyEnd::DeadlineExceeded, _) | (_, RelayOutcome::DeadlineExceeded(_)) => {
            RelayOutcome::DeadlineExceeded(delivered)
        }
        (BodyEnd::Dropped, RelayOutcome::Completed(_))
        | (_, RelayOutcome::ClientDisconnected(_)) => RelayOutcome::ClientDisconnected(delivered),
        (_, RelayOutcome::Completed(_)) => RelayOutcome::Completed(delivered),
        (_, RelayOutcome::UpstreamFailed { error, .. }) => RelayOutcome::UpstreamFailed {
            stats: delivered,
            error,
        },
    }
}

/// Move text deltas from `upstream` into `tx` until a terminal state
///
/// Fragments are forwarded one at a time in arrival order. The sender is
/// dropped on return, which closes the body on every exit path.
pub async fn pump(
    mut upstream: ChunkStream,
    tx: mpsc::Sender<RelayItem>,
    deadline: Instant,
) -> RelayOutcome {
    let mut stats = RelayStats::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline) => {
                return RelayOutcome::DeadlineExceeded(stats);
            }
            _ = tx.closed() => {
                return RelayOutcome::ClientDisconnected(stats);
            }
            next = upstream.next() => next,
        };

        let chunk = match next {
            None => return RelayOutcome::Completed(stats),
            Some(Ok(chunk)) => chunk,
            Some(Err(error)) => {
                let item = Err(RelayStreamError::Upstream {
                    bytes_relayed: stats.bytes,
                    message: error.to_string(),
                });
                // Caller may already be gone; the outcome is the same.
                let _ = send(&tx, item, deadline).await;
                return RelayOutcome::UpstreamFailed { stats, error };
            }
        };

        let Some(text) = chunk.text_delta() else {
            continue;
        };

        let fragment = Bytes::copy_from_slice(text.as_bytes());
        let len = fragment.len();
        match send(&tx, Ok(fragment), deadline).await {
            Delivery::Sent => {
                stats.fragments += 1;
                stats.bytes += len;
            }
            Delivery::Disconnected => return RelayOutcome::ClientDisconnected(stats),
            Delivery::DeadlineExceeded => return RelayOutcome::DeadlineExceeded(stats),
        }
    }
}

enum Delivery {
    Sent,
    Disconnected,
    DeadlineExceeded,
}

/// Send one item, waiting for channel space but never past the deadline
async fn send(tx: &mpsc::Sender<RelayItem>, item: RelayItem, deadline: Instant) -> Delivery {
    tokio::select! {
        biased;
        _ = tokio::time::sleep_until(deadline) => Delivery::DeadlineExceeded,
        sent = tx.send(item) => match sent {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::Disconnected,
        },
    }
}

/// Response body draining the relay channel
///
/// Enforces the request deadline on the outbound side as well: once it
/// fires, queued fragments are discarded and a single
/// [`RelayStreamError::DeadlineExceeded`] item ends the body.
pub struct RelayBody {
    rx: mpsc::Receiver<RelayItem>,
    deadline: Pin<Box<Sleep>>,
    delivered: RelayStats,
    finish: Finish,
    finished: bool,
}

impl RelayBody {
    fn new(rx: mpsc::Receiver<RelayItem>, deadline: Instant, finish: Finish) -> Self {
        Self {
            rx,
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            delivered: RelayStats::default(),
            finish,
            finished: false,
        }
    }

    fn end(&mut self, end: BodyEnd) {
        self.finished = true;
        self.finish.body_done(end, self.delivered);
    }
}

impl Stream for RelayBody {
    type Item = RelayItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if this.deadline.as_mut().poll(cx).is_ready() {
            this.rx.close();
            this.end(BodyEnd::DeadlineExceeded);
            return Poll::Ready(Some(Err(RelayStreamError::DeadlineExceeded {
                bytes_relayed: this.delivered.bytes,
            })));
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(fragment))) => {
                this.delivered.fragments += 1;
                this.delivered.bytes += fragment.len();
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(error))) => {
                this.end(BodyEnd::Drained);
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                this.end(BodyEnd::Drained);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        if !self.finished {
            self.end(BodyEnd::Dropped);
        }
    }
}
