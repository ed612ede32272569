use bmind_driver::{BeaconGatewayConfig, BeaconGatewayDriver, Driver, CONFIG_BROKER_URL};
use bmind_transport::{MqttTransport, Transport};
use chrono::Local;

/// Exercises the full driver stack against a live broker (mosquitto or
/// similar on localhost, or whatever BMIND_BROKER_URL points at): one
/// driver consuming the status topic, one bare transport playing the
/// role of the gateway
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let broker_url = std::env::var("BMIND_BROKER_URL")
        .unwrap_or_else(|_| "mqtt://localhost:1883".to_string());

    log::info!("Initializing driver");
    let config = BeaconGatewayConfig::default();
    let status_topic = config.status_topic.clone();
    let mut driver =
        BeaconGatewayDriver::new("gateway-sim", config, Box::new(MqttTransport::new()));

    driver.initialize().await?;
    driver.set_config(CONFIG_BROKER_URL, broker_url.as_bytes())?;
    driver.connect().await?;
    driver.start().await?;

    log::info!("Publishing synthetic beacon batches");
    let mut publisher = MqttTransport::new();
    publisher.bind(&broker_url).await?;

    for round in 0..15u32 {
        let batch = serde_json::json!([
            {
                "timestamp": Local::now().to_rfc3339(),
                "type": "Gateway",
                "mac": "AC:23:3F:00:25:5F",
            },
            {
                "timestamp": Local::now().to_rfc3339(),
                "type": "iBeacon",
                "mac": "C8:00:00:00:00:01",
                "rssi": -55 - (round as i32 % 10),
                "battery": 80,
            },
            {
                "timestamp": Local::now().to_rfc3339(),
                "type": "iBeacon",
                "mac": "C8:00:00:00:00:02",
                "rssi": -70,
                "battery": 54,
            },
        ]);
        publisher
            .publish(&status_topic, batch.to_string().as_bytes())
            .await?;

        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
        log::info!(
            "round {round:}: store size {:} gateway {:?}",
            driver.store().len(),
            driver.store().gateway_mac()
        );
    }

    log::info!("final snapshot: {}", driver.snapshot()?);

    driver.stop().await?;
    publisher.disconnect().await?;
    Ok(())
}
