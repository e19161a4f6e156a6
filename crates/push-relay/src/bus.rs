//! Message bus seam.
//!
//! The core only needs two things from a bus: a reachability check and a
//! feed of messages for a topic. [`crate::redis_bus::RedisBus`] is the
//! production implementation.

use crate::error::RelayResult;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Longest wait between two resubscribe attempts.
pub const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(30);

/// A message received on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic the message arrived on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text; invalid UTF-8 is replaced.
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Feed of messages for one subscription. Ends when the bus closes it.
pub type MessageStream = BoxStream<'static, Message>;

/// A publish/subscribe bus the relay can read from.
pub trait MessageBus: Send + Sync + 'static {
    /// Check the bus answers at all.
    fn ping(&self) -> impl Future<Output = RelayResult<()>> + Send;

    /// Subscribe to `topic`.
    fn subscribe(&self, topic: &str) -> impl Future<Output = RelayResult<MessageStream>> + Send;
}

struct Resubscriber<F> {
    topic: String,
    feed: Option<MessageStream>,
    base_delay: Duration,
    delay: Duration,
    resubscribe: F,
}

/// Keep a topic's feed alive across bus disconnects.
///
/// Yields from `feed` until it ends, then calls `resubscribe` after
/// `retry_delay`, doubling the delay (up to [`MAX_RESUBSCRIBE_DELAY`]) while
/// attempts fail. The returned stream never ends on its own. Messages
/// published while no subscription is open are lost, as with any pub/sub
/// subscriber.
pub fn resubscribing<F, Fut>(
    topic: impl Into<String>,
    feed: MessageStream,
    retry_delay: Duration,
    resubscribe: F,
) -> MessageStream
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = RelayResult<MessageStream>> + Send + 'static,
{
    let state = Resubscriber {
        topic: topic.into(),
        feed: Some(feed),
        base_delay: retry_delay,
        delay: retry_delay,
        resubscribe,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(feed) = state.feed.as_mut() {
                if let Some(message) = feed.next().await {
                    return Some((message, state));
                }
                state.feed = None;
                warn!(
                    topic = %state.topic,
                    retry_in = ?state.delay,
                    "Subscription dropped, resubscribing"
                );
            }

            tokio::time::sleep(state.delay).await;
            match (state.resubscribe)().await {
                Ok(feed) => {
                    info!(topic = %state.topic, "Resubscribed");
                    state.feed = Some(feed);
                    state.delay = state.base_delay;
                }
                Err(e) => {
                    state.delay = (state.delay * 2).min(MAX_RESUBSCRIBE_DELAY);
                    warn!(
                        topic = %state.topic,
                        error = %e,
                        retry_in = ?state.delay,
                        "Resubscribe failed"
                    );
                }
            }
        }
    })
    .boxed()
}
