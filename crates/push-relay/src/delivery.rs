//! Delivery task: one message, one POST, one classified outcome.
//!
//! The downstream contract is a form-encoded `POST` with the payload in a
//! single `message` field, answered by a JSON envelope:
//!
//! ```json
//! {"code": 0, "message": "ok"}
//! ```
//!
//! `code == 0` means accepted. The HTTP status is recorded for logs but
//! never decides the outcome; only the body does.
//!
//! Failures are classified in the order they can happen:
//!
//! 1. transport (connect, TLS, timeout)
//! 2. unreadable body
//! 3. body is not an envelope
//! 4. envelope carries a non-zero code
//!
//! Every failure is logged and the message is dropped. There is no retry.

use crate::bus::Message;
use crate::gate::Slot;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

/// Form field carrying the payload.
pub const PAYLOAD_FIELD: &str = "message";

/// Longest body excerpt written to logs.
const BODY_PREVIEW_LIMIT: usize = 512;

/// Parsed downstream response.
///
/// Missing or `null` fields take their zero value, keys may be
/// capitalised, and a bare `null` body is an empty (successful) envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseEnvelope {
    /// Domain status; 0 is success.
    #[serde(default, alias = "Code", alias = "CODE", deserialize_with = "null_as_default")]
    pub code: i64,
    /// Human-readable explanation, mostly useful on failure.
    #[serde(
        default,
        alias = "Message",
        alias = "MESSAGE",
        deserialize_with = "null_as_default"
    )]
    pub message: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ResponseEnvelope {
    /// Decode a response body.
    pub fn from_body(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice::<Option<Self>>(body).map(Option::unwrap_or_default)
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Why a delivery did not succeed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request never produced a response.
    #[error("http post failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// A response arrived but its body could not be read.
    #[error("read response body failed (status {status}): {source}")]
    ReadBody {
        status: u16,
        #[source]
        source: reqwest::Error,
    },

    /// The body is not a response envelope.
    #[error("parse json response failed (status {status}): {source}")]
    Parse {
        status: u16,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    /// The endpoint answered with a non-zero code.
    #[error("json response tells error (code {code}): {message}")]
    Rejected { code: i64, message: String },
}

impl DeliveryError {
    /// Short, stable name for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Transport(_) => "transport",
            DeliveryError::ReadBody { .. } => "read_body",
            DeliveryError::Parse { .. } => "parse",
            DeliveryError::Rejected { .. } => "rejected",
        }
    }
}

/// POST `payload` to `endpoint` and classify the answer.
pub async fn deliver(
    client: &Client,
    endpoint: &Url,
    payload: &str,
) -> Result<ResponseEnvelope, DeliveryError> {
    let response = client
        .post(endpoint.clone())
        .form(&[(PAYLOAD_FIELD, payload)])
        .send()
        .await
        .map_err(DeliveryError::Transport)?;

    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|source| DeliveryError::ReadBody { status, source })?;

    let envelope = ResponseEnvelope::from_body(&body).map_err(|source| DeliveryError::Parse {
            status,
            body: preview(&body),
            source,
        })?;

    if !envelope.is_success() {
        return Err(DeliveryError::Rejected {
            code: envelope.code,
            message: envelope.message,
        });
    }

    Ok(envelope)
}

fn preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= BODY_PREVIEW_LIMIT {
        return text.into_owned();
    }
    let mut end = BODY_PREVIEW_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// One message on its way to its topic's endpoint.
pub struct DeliveryTask {
    topic: Arc<str>,
    endpoint: Arc<Url>,
    client: Client,
    message: Message,
}

impl DeliveryTask {
    pub fn new(topic: Arc<str>, endpoint: Arc<Url>, client: Client, message: Message) -> Self {
        Self {
            topic,
            endpoint,
            client,
            message,
        }
    }

    /// Deliver the message while holding `slot`.
    ///
    /// The slot is released when this future completes or is dropped,
    /// whatever the outcome.
    pub async fn run(self, slot: Slot) -> Result<ResponseEnvelope, DeliveryError> {
        let _slot = slot;
        let payload = self.message.payload_text();

        debug!(topic = %self.topic, payload = %payload, "Delivering message");

        let result = deliver(&self.client, &self.endpoint, &payload).await;
        match &result {
            Ok(envelope) => {
                debug!(
                    topic = %self.topic,
                    code = envelope.code,
                    "Message delivered"
                );
            }
            Err(e) => self.log_failure(e, &payload),
        }
        result
    }

    fn log_failure(&self, err: &DeliveryError, payload: &str) {
        let endpoint = self.endpoint.as_str();
        match err {
            DeliveryError::Transport(source) => {
                error!(
                    topic = %self.topic,
                    endpoint = %endpoint,
                    payload = %payload,
                    kind = err.kind(),
                    error = %source,
                    "http post failed"
                );
            }
            DeliveryError::ReadBody { status, source } => {
                error!(
                    topic = %self.topic,
                    endpoint = %endpoint,
                    payload = %payload,
                    kind = err.kind(),
                    status = status,
                    error = %source,
                    "read response body failed"
                );
            }
            DeliveryError::Parse {
                status,
                body,
                source,
            } => {
                error!(
                    topic = %self.topic,
                    endpoint = %endpoint,
                    payload = %payload,
                    kind = err.kind(),
                    status = status,
                    body = %body,
                    error = %source,
                    "parse json response failed"
                );
            }
            DeliveryError::Rejected { code, message } => {
                error!(
                    topic = %self.topic,
                    endpoint = %endpoint,
                    payload = %payload,
                    kind = err.kind(),
                    code = code,
                    reason = %message,
                    "json response tells error"
                );
            }
        }
    }
}
