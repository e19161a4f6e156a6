//! Redis pub/sub bus.
//!
//! PING goes over a multiplexed connection; each subscription gets its own
//! pub/sub connection, since a connection in subscribe mode cannot run
//! other commands. A subscription whose connection drops is reopened with
//! backoff, so a Redis restart pauses a topic instead of ending it.

use crate::bus::{resubscribing, Message, MessageBus, MessageStream};
use crate::config::DatabaseConfig;
use crate::error::{RelayError, RelayResult};
use futures_util::StreamExt;
use redis::Client;
use std::time::Duration;
use tracing::{debug, info};

/// How long the startup PING may take before the bus counts as unreachable.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// First wait before resubscribing a dropped channel.
pub const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Redis-backed [`MessageBus`].
pub struct RedisBus {
    client: Client,
    /// `host:port`, safe to log.
    address: String,
    ping_timeout: Duration,
    resubscribe_delay: Duration,
}

impl RedisBus {
    /// Build a bus handle from `[database]` settings. Does no I/O.
    pub fn open(config: &DatabaseConfig) -> RelayResult<Self> {
        let url = config.redis_url()?;
        let address = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => config.redis_addr.clone(),
        };
        let client = Client::open(url.as_str())?;

        Ok(Self {
            client,
            address,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
        })
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn try_ping(&self) -> RelayResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong)
    }
}

impl MessageBus for RedisBus {
    async fn ping(&self) -> RelayResult<()> {
        match tokio::time::timeout(self.ping_timeout, self.try_ping()).await {
            Ok(Ok(pong)) => {
                debug!(address = %self.address, reply = %pong, "Redis answered PING");
                Ok(())
            }
            Ok(Err(e)) => Err(RelayError::BusUnreachable(format!("{}: {e}", self.address))),
            Err(_) => Err(RelayError::BusUnreachable(format!(
                "{}: no PING reply within {:?}",
                self.address, self.ping_timeout
            ))),
        }
    }

    /// Subscribe to `topic`.
    ///
    /// The first subscription must succeed. After that, a dropped
    /// connection (Redis restart, network blip) is resubscribed in the
    /// background of the returned feed.
    async fn subscribe(&self, topic: &str) -> RelayResult<MessageStream> {
        let feed = open_feed(&self.client, topic).await?;
        info!(address = %self.address, topic = %topic, "Subscribed to Redis channel");

        let client = self.client.clone();
        let address = self.address.clone();
        let owned_topic = topic.to_string();
        Ok(resubscribing(topic, feed, self.resubscribe_delay, move || {
            let client = client.clone();
            let address = address.clone();
            let topic = owned_topic.clone();
            async move {
                let feed = open_feed(&client, &topic).await?;
                info!(address = %address, topic = %topic, "Subscribed to Redis channel");
                Ok(feed)
            }
        }))
    }
}

/// Open a pub/sub connection subscribed to `topic`.
async fn open_feed(client: &Client, topic: &str) -> RelayResult<MessageStream> {
    let subscribe_error = |e: redis::RedisError| RelayError::Subscribe {
        topic: topic.to_string(),
        reason: e.to_string(),
    };

    let mut pubsub = client.get_async_pubsub().await.map_err(subscribe_error)?;
    pubsub.subscribe(topic).await.map_err(subscribe_error)?;

    Ok(pubsub
        .into_on_message()
        .map(|msg| Message::new(msg.get_channel_name(), msg.get_payload_bytes().to_vec()))
        .boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database(addr: &str) -> DatabaseConfig {
        DatabaseConfig {
            redis_addr: addr.to_string(),
            redis_password: "hunter2".to_string(),
            redis_db: 0,
        }
    }

    #[test]
    fn test_open_does_not_leak_password_into_address() {
        let bus = RedisBus::open(&database("127.0.0.1:6379")).unwrap();
        assert_eq!(bus.address(), "127.0.0.1:6379");
        assert!(!bus.address().contains("hunter2"));
    }

    #[test]
    fn test_open_rejects_bad_address() {
        assert!(RedisBus::open(&database("http://127.0.0.1:6379")).is_err());
    }

    #[tokio::test]
    async fn test_ping_unreachable_bus() {
        // Bind and drop a listener to find a port nobody is serving.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let bus = RedisBus::open(&database(&format!("127.0.0.1:{port}")))
            .unwrap()
            .with_ping_timeout(Duration::from_secs(2));

        let err = bus.ping().await.unwrap_err();
        assert!(matches!(err, RelayError::BusUnreachable(_)), "{err}");
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    }

    #[tokio::test]
    async fn test_subscribe_unreachable_bus() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let bus = RedisBus::open(&database(&format!("127.0.0.1:{port}"))).unwrap();

        match bus.subscribe("orders").await {
            Err(RelayError::Subscribe { topic, .. }) => assert_eq!(topic, "orders"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("subscribe should fail without a server"),
        }
    }
}
