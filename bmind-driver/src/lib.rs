//! The `bmind-driver` crate defines the driver framework for the
//! beacon-minder system: pluggable units that integrate one device class
//! with the MQTT broker and maintain a concurrently-accessed record store
//! of what the devices are reporting.
//!
//! The crate is split into the following layers:
//! 1. [`DriverCore`] owns the shared lifecycle
//!    (initialize → connect → start → stop), the named
//!    Config/Indicator/Control/Subject collections, the transport handle,
//!    and every spawned task. `stop` cancels and joins all of them, so no
//!    task survives a returned `stop`.
//! 2. [`Driver`] is the contract exposed to the hosting application.
//!    Concrete drivers hold a [`DriverCore`] value and delegate the steps
//!    they do not extend (composition, no inheritance).
//! 3. [`BeaconGatewayDriver`] integrates BLE-beacon MQTT gateways: it
//!    subscribes a batch-decode handler to the gateway status topic and
//!    feeds decoded records into the [`BeaconStore`], which a periodic
//!    sweep task evicts by age.
//!
//! Message delivery happens on the transport's own task, concurrently
//! with the heartbeat and sweep loops; the [`BeaconStore`] lock is the
//! only synchronization primitive between them.

mod attrs;
mod base;
mod beacon;
mod store;
mod task;

pub use attrs::{Config, Control, Indicator, Subject, SubjectKind};
pub use base::{
    Driver, DriverCore, DriverError, DriverState, DriverTiming, CONFIG_BROKER_URL,
};
pub use beacon::{BeaconGatewayConfig, BeaconGatewayDriver};
pub use store::{BeaconReading, BeaconStore, GATEWAY_TYPE_LABEL};
pub use task::TaskHandle;

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bmind_transport::{TopicHandler, Transport, TransportError};

    #[derive(Default)]
    pub struct MockState {
        pub bound: Option<String>,
        pub subscriptions: Vec<(String, TopicHandler)>,
        pub published: Vec<(String, Vec<u8>)>,
        pub disconnects: usize,
    }

    /// In-memory [`Transport`] standing in for the broker: records calls
    /// and hands subscribed handlers back to the test for direct delivery
    #[derive(Clone, Default)]
    pub struct MockTransport {
        pub state: Arc<Mutex<MockState>>,
    }

    impl MockTransport {
        pub fn handler_for(&self, topic: &str) -> Option<TopicHandler> {
            self.state
                .lock()
                .unwrap()
                .subscriptions
                .iter()
                .find(|(t, _)| t == topic)
                .map(|(_, h)| h.clone())
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn bind(&mut self, reference: &str) -> Result<(), TransportError> {
            self.state.lock().unwrap().bound = Some(reference.to_string());
            Ok(())
        }

        async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
            self.state
                .lock()
                .unwrap()
                .published
                .push((topic.to_string(), payload.to_vec()));
            Ok(())
        }

        async fn subscribe(&self, topic: &str, handler: TopicHandler) -> Result<(), TransportError> {
            self.state
                .lock()
                .unwrap()
                .subscriptions
                .push((topic.to_string(), handler));
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), TransportError> {
            self.state.lock().unwrap().disconnects += 1;
            Ok(())
        }
    }
}
