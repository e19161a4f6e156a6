//! Topic consumer: the per-topic pull loop.
//!
//! ```text
//! Idle -> Subscribed -> Receiving -> Dispatching -> Receiving -> ... -> Closed
//!                                       |
//!                                       +-- acquire slot (may wait), spawn DeliveryTask
//! ```
//!
//! Messages are pulled strictly in bus order, one at a time. Dispatch is
//! fire-and-forget, so deliveries finish in whatever order the endpoint
//! answers them. When every slot is taken the loop stops pulling until a
//! delivery finishes; that stall is the relay's only form of backpressure.

use crate::bus::MessageBus;
use crate::delivery::DeliveryTask;
use crate::error::{RelayError, RelayResult};
use crate::gate::AdmissionGate;
use futures_util::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, info_span, warn, Dispatch, Instrument};
use url::Url;

/// A topic, its concurrency limit and where its messages go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBinding {
    topic: Arc<str>,
    concurrency: i64,
    endpoint: Arc<Url>,
}

impl TopicBinding {
    /// `concurrency` must be positive.
    pub fn new(topic: impl Into<Arc<str>>, concurrency: i64, endpoint: Url) -> RelayResult<Self> {
        if concurrency <= 0 {
            return Err(RelayError::InvalidCapacity(concurrency));
        }
        Ok(Self {
            topic: topic.into(),
            concurrency,
            endpoint: Arc::new(endpoint),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn concurrency(&self) -> i64 {
        self.concurrency
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Pulls one topic and turns each message into a delivery task.
pub struct TopicConsumer<B: MessageBus> {
    binding: TopicBinding,
    bus: Arc<B>,
    client: Client,
    gate: AdmissionGate,
    dispatch: Dispatch,
}

impl<B: MessageBus> TopicConsumer<B> {
    pub fn new(
        binding: TopicBinding,
        bus: Arc<B>,
        client: Client,
        dispatch: Dispatch,
    ) -> RelayResult<Self> {
        let gate = AdmissionGate::new(binding.topic.clone(), binding.concurrency)?;
        Ok(Self {
            binding,
            bus,
            client,
            gate,
            dispatch,
        })
    }

    pub fn binding(&self) -> &TopicBinding {
        &self.binding
    }

    /// Handle on this consumer's gate, for observing in-flight deliveries.
    pub fn gate(&self) -> AdmissionGate {
        self.gate.clone()
    }

    /// Run the pull loop until the subscription feed ends.
    ///
    /// Returns `Ok(())` when the bus closes the feed and an error only if
    /// the subscription cannot be established. Deliveries still in flight
    /// keep running after this returns.
    pub async fn run(self) -> RelayResult<()> {
        let dispatch = self.dispatch.clone();
        let span = tracing::dispatcher::with_default(&dispatch, || {
            info_span!("consumer", topic = %self.binding.topic)
        });
        self.pull_loop().instrument(span).with_subscriber(dispatch).await
    }

    async fn pull_loop(self) -> RelayResult<()> {
        let topic = self.binding.topic.clone();

        let mut feed = self.bus.subscribe(&topic).await?;
        info!(
            topic = %topic,
            concurrency = self.gate.capacity(),
            endpoint = %self.binding.endpoint,
            "Subscribe channel success"
        );

        info!(topic = %topic, "Start receiving messages");
        while let Some(message) = feed.next().await {
            if self.gate.available() == 0 {
                debug!(
                    topic = %topic,
                    in_flight = self.gate.in_flight(),
                    "All delivery slots busy, pausing pull"
                );
            }

            let slot = self.gate.acquire().await?;

            let task = DeliveryTask::new(
                topic.clone(),
                self.binding.endpoint.clone(),
                self.client.clone(),
                message,
            );
            let span = info_span!("delivery", topic = %topic);
            tokio::spawn(
                task.run(slot)
                    .instrument(span)
                    .with_subscriber(self.dispatch.clone()),
            );
        }

        warn!(
            topic = %topic,
            in_flight = self.gate.in_flight(),
            "Subscription feed closed, consumer stopping"
        );
        Ok(())
    }
}
