//! The `bmind-transport` crate defines the broker transport layer for the
//! beacon-minder system. Drivers talk to the MQTT broker exclusively
//! through the [`Transport`] trait, which exposes the four operations the
//! driver layer needs:
//! 1. `bind` a parsed broker reference (`scheme://[user[:pass]@]host:port`),
//!    connecting with auto-reconnect and a fixed keepalive, and waiting for
//!    the broker acknowledgment with a single bounded deadline
//! 2. `publish` a payload to a topic at-least-once; a resolved publish
//!    means the request is queued for delivery, with broker
//!    acknowledgment and retry handled by the transport
//! 3. `subscribe` a handler callback to a topic; the callback is invoked
//!    from the transport's own delivery task whenever a message arrives,
//!    so it must not assume single-threaded access to shared state
//! 4. `disconnect`, idempotent, only closing a live connection
//!
//! The production implementation is [`MqttTransport`], built on
//! [`rumqttc::AsyncClient`]. Keeping the trait as the seam lets tests
//! inject a mock transport the same way the driver layer would use the
//! real one.

mod mqtt;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use mqtt::{BrokerRef, MqttTransport};

/// Callback invoked with `(topic, payload)` for every message delivered
/// on a subscribed topic
pub type TopicHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid broker reference {0}")]
    InvalidRef(String),
    #[error("Broker reference parse Error")]
    UrlParse(#[from] url::ParseError),
    #[error("Mqtt client Error")]
    Client(#[from] rumqttc::ClientError),
    #[error("Broker ack not received within {0:?}")]
    AckDeadline(Duration),
    #[error("Transport is not bound to a broker")]
    NotBound,
}

/// Seam between driver code and the broker client
#[async_trait]
pub trait Transport: Send + Sync {
    /// Parse `reference`, connect, and wait for the broker acknowledgment.
    /// The wait is a single bounded deadline; expiry is an error, not a
    /// retry.
    async fn bind(&mut self, reference: &str) -> Result<(), TransportError>;

    /// Publish `payload` on `topic` at-least-once. Resolution means the
    /// request was handed to the transport for delivery; the broker
    /// acknowledgment (and any retransmit) is the transport's business,
    /// not the caller's
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Register `handler` to be invoked from the delivery task for every
    /// message arriving on `topic`
    async fn subscribe(&self, topic: &str, handler: TopicHandler) -> Result<(), TransportError>;

    /// Idempotent; only closes if currently connected
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}
