use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use serde_json::json;

use bmind_transport::{TopicHandler, Transport};

use crate::{
    BeaconReading, BeaconStore, Driver, DriverCore, DriverError, DriverState, DriverTiming,
    Indicator, Subject,
};

const STATUS_SUBJECT_NAME: &str = "StatusTopic";
const GATEWAY_MAC_INDICATOR: &str = "GatewayMac";

/// Construction-time parameters for a beacon gateway driver
#[derive(Debug, Clone)]
pub struct BeaconGatewayConfig {
    /// Class id shared by every driver of this device class
    pub class_id: String,
    /// Topic the gateway publishes beacon status batches on
    pub status_topic: String,
    pub timing: DriverTiming,
}

impl Default for BeaconGatewayConfig {
    fn default() -> Self {
        Self {
            class_id: "9b1c6c1e-6a05-4a0e-9e3a-5f0c7d9f4b21".to_string(),
            status_topic: "/gw/status".to_string(),
            timing: DriverTiming::default(),
        }
    }
}

/// Driver integrating BLE-beacon MQTT gateways. Subscribes a decode
/// handler to each broker-topic subject and feeds decoded records into a
/// TTL-swept [`BeaconStore`]
pub struct BeaconGatewayDriver {
    core: DriverCore,
    config: BeaconGatewayConfig,
    store: Arc<BeaconStore>,
    decode_failures: Arc<AtomicU64>,
}

impl BeaconGatewayDriver {
    pub fn new(name: &str, config: BeaconGatewayConfig, transport: Box<dyn Transport>) -> Self {
        let store = Arc::new(BeaconStore::new(config.timing.record_ttl));
        Self {
            core: DriverCore::new(name, config.timing, transport),
            config,
            store,
            decode_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared handle to this driver's record store
    pub fn store(&self) -> Arc<BeaconStore> {
        self.store.clone()
    }

    /// Count of inbound records (or whole batches) that failed to decode
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn core(&self) -> &DriverCore {
        &self.core
    }

    /// Handler run on the transport's delivery task for every inbound
    /// status batch. Decode failures are counted and logged, never
    /// propagated: a bad record must not take down delivery
    fn decode_handler(&self) -> TopicHandler {
        let id = self.core.id.clone();
        let store = self.store.clone();
        let failures = self.decode_failures.clone();
        Arc::new(move |topic, payload| {
            log::debug!("driver {id:} handled subject {topic:}");
            let (readings, failed) = decode_batch(payload);
            if failed > 0 {
                failures.fetch_add(failed, Ordering::Relaxed);
                log::warn!("driver {id:} dropped {failed:} undecodable records from {topic:}");
            }
            for reading in readings {
                store.add(reading);
            }
        })
    }

    /// Periodic eviction loop, ticking at the same period as the
    /// heartbeat and sweeping the store every tick
    fn spawn_sweep(&mut self) {
        let id = self.core.id.clone();
        let tick = self.config.timing.tick;
        let store = self.store.clone();
        self.core.spawn_task(move |cancel| async move {
            log::info!("driver {id:} sweep loop started");
            let mut timer = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::info!("driver {id:} sweep loop canceled");
                        break;
                    }
                    _ = timer.tick() => {
                        store.clean();
                    }
                }
            }
        });
    }
}

/// Decode an ordered batch of beacon records, tolerating bad entries:
/// every decodable record is returned, the rest are counted
fn decode_batch(payload: &[u8]) -> (Vec<BeaconReading>, u64) {
    let values: Vec<serde_json::Value> = match serde_json::from_slice(payload) {
        Ok(values) => values,
        Err(e) => {
            log::debug!("malformed beacon batch: {e:}");
            return (Vec::new(), 1);
        }
    };

    let mut readings = Vec::with_capacity(values.len());
    let mut failed = 0;
    for value in values {
        match serde_json::from_value::<BeaconReading>(value) {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                log::debug!("undecodable beacon record: {e:}");
                failed += 1;
            }
        }
    }
    (readings, failed)
}

#[async_trait]
impl Driver for BeaconGatewayDriver {
    async fn initialize(&mut self) -> Result<(), DriverError> {
        self.core.initialize(&self.config.class_id)?;
        self.store = Arc::new(BeaconStore::new(self.config.timing.record_ttl));
        self.core.subjects.push(Subject::mqtt_topic(
            &self.core.id,
            STATUS_SUBJECT_NAME,
            &self.config.status_topic,
        ));
        self.core
            .indicators
            .push(Indicator::new(&self.core.id, GATEWAY_MAC_INDICATOR));
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), DriverError> {
        self.core.connect().await
    }

    async fn start(&mut self) -> Result<(), DriverError> {
        if self.core.state() != DriverState::Connected {
            return Err(DriverError::InvalidState(self.core.state()));
        }

        let handler = self.decode_handler();
        let topics: Vec<String> = self.core.subjects.iter().filter_map(Subject::topic).collect();
        for topic in topics {
            self.core.transport().subscribe(&topic, handler.clone()).await?;
            log::debug!("driver {:} subscribed to topic {topic:}", self.core.id);
        }

        self.core.start()?;
        self.spawn_sweep();
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DriverError> {
        // Record the last reported gateway identity in the entity view
        // before the store stops being fed
        if let Some(mac) = self.store.gateway_mac() {
            self.core
                .set_indicator(GATEWAY_MAC_INDICATOR, mac.as_bytes())?;
        }
        self.core.stop().await
    }

    fn set_config(&mut self, name: &str, value: &[u8]) -> Result<(), DriverError> {
        self.core.set_config(name, value)
    }

    fn get_config(&self, name: &str) -> Result<Vec<u8>, DriverError> {
        self.core.get_config(name)
    }

    fn snapshot(&self) -> Result<serde_json::Value, DriverError> {
        let mut value = self.core.snapshot()?;
        value["beacons"] = self.store.snapshot()?;
        value["decodeFailures"] = json!(self.decode_failures());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Local;

    use crate::testutil::MockTransport;
    use crate::{
        BeaconGatewayConfig, BeaconGatewayDriver, Driver, DriverError, DriverTiming, SubjectKind,
        CONFIG_BROKER_URL,
    };

    fn test_config() -> BeaconGatewayConfig {
        BeaconGatewayConfig {
            class_id: "test-class".to_string(),
            status_topic: "/gw/test/status".to_string(),
            timing: DriverTiming {
                tick: Duration::from_millis(10),
                liveness_decimation: 5,
                record_ttl: Duration::from_secs(10),
            },
        }
    }

    fn driver_with_mock(config: BeaconGatewayConfig) -> (BeaconGatewayDriver, MockTransport) {
        let mock = MockTransport::default();
        let driver = BeaconGatewayDriver::new("test-gateway", config, Box::new(mock.clone()));
        (driver, mock)
    }

    async fn running_driver(
        config: BeaconGatewayConfig,
    ) -> (BeaconGatewayDriver, MockTransport) {
        let (mut driver, mock) = driver_with_mock(config);
        driver.initialize().await.expect("initialize failed");
        driver
            .set_config(CONFIG_BROKER_URL, b"mqtt://localhost:1883")
            .unwrap();
        driver.connect().await.expect("connect failed");
        driver.start().await.expect("start failed");
        (driver, mock)
    }

    fn batch(records: &[serde_json::Value]) -> Vec<u8> {
        serde_json::to_vec(records).unwrap()
    }

    fn record(kind: &str, mac: &str, battery: i32) -> serde_json::Value {
        serde_json::json!({
            "timestamp": Local::now().to_rfc3339(),
            "type": kind,
            "mac": mac,
            "rssi": -60,
            "battery": battery,
        })
    }

    #[tokio::test]
    async fn check_initialize_registers_status_subject() {
        let (mut driver, _mock) = driver_with_mock(test_config());
        driver.initialize().await.expect("initialize failed");

        let core = driver.core();
        assert_eq!(core.subjects.len(), 1);
        assert_eq!(core.subjects[0].kind, SubjectKind::MqttTopic);
        assert_eq!(
            core.subjects[0].topic().as_deref(),
            Some("/gw/test/status")
        );
        assert_eq!(core.indicators.len(), 1);
        assert_eq!(core.get_indicator("GatewayMac").unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn check_stop_records_gateway_identity_indicator() {
        let (mut driver, mock) = running_driver(test_config()).await;

        let handler = mock.handler_for("/gw/test/status").unwrap();
        handler(
            "/gw/test/status",
            &batch(&[record("Gateway", "AC:23:3F:00:25:5F", 0)]),
        );

        driver.stop().await.expect("stop failed");
        assert_eq!(
            driver.core().get_indicator("GatewayMac").unwrap(),
            b"AC:23:3F:00:25:5F".to_vec()
        );
    }

    #[tokio::test]
    async fn check_start_requires_connect_first() {
        let (mut driver, _mock) = driver_with_mock(test_config());
        driver.initialize().await.unwrap();
        assert!(matches!(
            driver.start().await,
            Err(DriverError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn check_decoded_batch_feeds_store() {
        let (driver, mock) = running_driver(test_config()).await;

        let handler = mock
            .handler_for("/gw/test/status")
            .expect("decode handler not subscribed");
        handler(
            "/gw/test/status",
            &batch(&[
                record("Gateway", "AC:23:3F:00:25:5F", 0),
                record("iBeacon", "C8:00:00:00:00:01", 80),
                record("iBeacon", "C8:00:00:00:00:02", 54),
            ]),
        );

        let store = driver.store();
        assert_eq!(store.len(), 2);
        assert_eq!(store.gateway_mac(), Some("AC:23:3F:00:25:5F".to_string()));
        assert_eq!(driver.decode_failures(), 0);
    }

    #[tokio::test]
    async fn check_partially_malformed_batch_applies_valid_records() {
        let (driver, mock) = running_driver(test_config()).await;

        let handler = mock.handler_for("/gw/test/status").unwrap();
        handler(
            "/gw/test/status",
            &batch(&[
                record("iBeacon", "C8:00:00:00:00:01", 80),
                serde_json::json!({ "type": "iBeacon", "battery": "not a number" }),
            ]),
        );

        let store = driver.store();
        assert_eq!(store.len(), 1);
        assert!(store.get("C8:00:00:00:00:01").is_some());
        assert_eq!(driver.decode_failures(), 1);
    }

    #[tokio::test]
    async fn check_garbage_payload_is_counted_not_fatal() {
        let (driver, mock) = running_driver(test_config()).await;

        let handler = mock.handler_for("/gw/test/status").unwrap();
        handler("/gw/test/status", b"not json at all");
        handler(
            "/gw/test/status",
            &batch(&[record("iBeacon", "C8:00:00:00:00:01", 80)]),
        );

        // The handler survived the garbage and kept applying records
        assert_eq!(driver.store().len(), 1);
        assert_eq!(driver.decode_failures(), 1);
    }

    #[tokio::test]
    async fn check_sweep_task_evicts_stale_records() {
        let mut config = test_config();
        config.timing.record_ttl = Duration::from_millis(30);
        let (driver, mock) = running_driver(config).await;

        let handler = mock.handler_for("/gw/test/status").unwrap();
        let stale = serde_json::json!({
            "timestamp": (Local::now() - chrono::Duration::seconds(20)).to_rfc3339(),
            "type": "iBeacon",
            "mac": "CC:DD:00:00:00:01",
            "battery": 70,
        });
        handler("/gw/test/status", &batch(&[stale]));
        assert_eq!(driver.store().len(), 1);

        // Several ticks worth of waiting; the sweep task must evict
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(driver.store().len(), 0);
    }

    #[tokio::test]
    async fn check_stop_freezes_store_mutation() {
        let mut config = test_config();
        config.timing.record_ttl = Duration::from_millis(30);
        let (mut driver, mock) = running_driver(config).await;

        let handler = mock.handler_for("/gw/test/status").unwrap();
        handler(
            "/gw/test/status",
            &batch(&[record("iBeacon", "C8:00:00:00:00:01", 80)]),
        );

        driver.stop().await.expect("stop failed");
        let frozen = driver.store().mutation_count();

        // The record in the store is stale well within this window, but
        // the sweep task is gone so nothing may touch the store
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(driver.store().mutation_count(), frozen);
    }

    #[tokio::test]
    async fn check_snapshot_nests_store_state() {
        let (driver, mock) = running_driver(test_config()).await;

        let handler = mock.handler_for("/gw/test/status").unwrap();
        handler(
            "/gw/test/status",
            &batch(&[record("iBeacon", "C8:00:00:00:00:01", 80)]),
        );

        let snapshot = driver.snapshot().expect("snapshot failed");
        assert_eq!(snapshot["classId"], "test-class");
        assert_eq!(snapshot["subjects"].as_array().map(Vec::len), Some(1));
        assert_eq!(snapshot["beacons"]["list"][0]["mac"], "C8:00:00:00:00:01");
        assert_eq!(snapshot["decodeFailures"], 0);
    }
}
