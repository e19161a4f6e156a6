//! Relay service: owns the bus and the HTTP client, supervises consumers.

use crate::bus::MessageBus;
use crate::config::RelayConfig;
use crate::consumer::{TopicBinding, TopicConsumer};
use crate::error::{RelayError, RelayResult};
use crate::gate::AdmissionGate;
use crate::http::build_client;
use crate::redis_bus::RedisBus;
use reqwest::Client;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, info_span, warn, Dispatch, Instrument};

/// How the consumers of a finished [`RelayService::run`] ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Feeds closed by the bus.
    pub closed: usize,
    /// Consumers that never got going (subscribe failure) or panicked.
    pub failed: usize,
}

/// The relay process: one bus, one HTTP client, one consumer per topic.
pub struct RelayService<B: MessageBus> {
    bus: Arc<B>,
    client: Client,
    dispatch: Dispatch,
    consumers: Vec<TopicConsumer<B>>,
}

impl RelayService<RedisBus> {
    /// Build everything a config describes: Redis bus, HTTP client and one
    /// consumer per channel.
    ///
    /// Fails without creating any consumer if Redis does not answer PING.
    /// Every failure is logged as fatal exactly once; the caller only has
    /// to exit.
    pub async fn from_config(config: &RelayConfig, dispatch: Dispatch) -> RelayResult<Self> {
        let prepared = RedisBus::open(&config.database).and_then(|bus| {
            let client = build_client(&config.http_client)?;
            Ok((bus, client, config.bindings()?))
        });
        let (bus, client, bindings) = match prepared {
            Ok(parts) => parts,
            Err(e) => {
                log_startup_failure(&dispatch, "prepare", &e);
                return Err(e);
            }
        };

        let mut service = Self::connect(Arc::new(bus), client, dispatch).await?;
        for binding in bindings {
            if let Err(e) = service.add_binding(binding) {
                log_startup_failure(&service.dispatch, "consumers", &e);
                return Err(e);
            }
        }
        Ok(service)
    }
}

fn log_startup_failure(dispatch: &Dispatch, stage: &str, err: &RelayError) {
    tracing::dispatcher::with_default(dispatch, || {
        error!(fatal = true, stage, error = %err, "Relay startup failed");
    });
}

impl<B: MessageBus> RelayService<B> {
    /// Check the bus is reachable and take ownership of the shared handles.
    ///
    /// A failed ping is logged as fatal; the caller is expected to exit.
    pub async fn connect(bus: Arc<B>, client: Client, dispatch: Dispatch) -> RelayResult<Self> {
        let ping = async {
            match bus.ping().await {
                Ok(()) => {
                    info!("Message bus reachable");
                    Ok(())
                }
                Err(e) => {
                    error!(fatal = true, error = %e, "Failed to connect message bus");
                    Err(e)
                }
            }
        };
        ping.with_subscriber(dispatch.clone()).await?;

        Ok(Self {
            bus,
            client,
            dispatch,
            consumers: Vec::new(),
        })
    }

    /// Create a consumer bound to this service's bus and client.
    pub fn new_consumer(&self, binding: TopicBinding) -> RelayResult<TopicConsumer<B>> {
        TopicConsumer::new(
            binding,
            self.bus.clone(),
            self.client.clone(),
            self.dispatch.clone(),
        )
    }

    pub fn add_consumer(&mut self, consumer: TopicConsumer<B>) {
        self.consumers.push(consumer);
    }

    /// Create and add a consumer for `binding`, returning its gate.
    pub fn add_binding(&mut self, binding: TopicBinding) -> RelayResult<AdmissionGate> {
        let consumer = self.new_consumer(binding)?;
        let gate = consumer.gate();
        self.add_consumer(consumer);
        Ok(gate)
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Run every consumer concurrently until all of them have stopped.
    ///
    /// In normal operation consumers never stop, so neither does this; a
    /// return means the relay has nothing left to do. A consumer that fails
    /// is logged and left stopped; the others carry on.
    pub async fn run(self) -> RunSummary {
        let dispatch = self.dispatch.clone();
        let consumers = self.consumers;
        let span = tracing::dispatcher::with_default(&dispatch, || info_span!("relay"));

        async move {
            if consumers.is_empty() {
                warn!("No consumers configured, nothing to relay");
                return RunSummary::default();
            }

            info!(consumers = consumers.len(), "Starting relay");

            let mut tasks = JoinSet::new();
            for consumer in consumers {
                let topic = consumer.binding().topic().to_string();
                tasks.spawn(async move { (topic, consumer.run().await) });
            }

            let mut summary = RunSummary::default();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((topic, Ok(()))) => {
                        summary.closed += 1;
                        info!(topic = %topic, "Consumer closed");
                    }
                    Ok((topic, Err(e))) => {
                        summary.failed += 1;
                        error!(
                            topic = %topic,
                            error = %e,
                            "Consumer stopped on unrecoverable startup condition"
                        );
                    }
                    Err(e) => {
                        summary.failed += 1;
                        error!(error = %e, "Consumer task panicked");
                    }
                }
            }

            info!(
                closed = summary.closed,
                failed = summary.failed,
                "All consumers stopped"
            );
            summary
        }
        .instrument(span)
        .with_subscriber(dispatch)
        .await
    }
}
