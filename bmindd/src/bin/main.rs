use bmind_driver::{BeaconGatewayConfig, BeaconGatewayDriver, Driver, CONFIG_BROKER_URL};
use bmind_transport::MqttTransport;
use bmindd::BeaconMinderResult;

use tracing_appender::rolling;
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_BROKER_URL: &str = "mqtt://localhost:1883";

#[tokio::main]
async fn main() -> BeaconMinderResult<()> {
    LogTracer::init().expect("Unable to set up log tracer");

    let log = rolling::daily("./logs", "debug");
    let (nb, _guard) = tracing_appender::non_blocking(log);

    let sub = FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(nb)
        .finish();

    tracing::subscriber::set_global_default(sub).expect("Unable to set up tracing subscriber");

    let broker_url =
        std::env::var("BMIND_BROKER_URL").unwrap_or_else(|_| DEFAULT_BROKER_URL.to_string());

    let mut driver = BeaconGatewayDriver::new(
        "beacon-gateway-1",
        BeaconGatewayConfig::default(),
        Box::new(MqttTransport::new()),
    );

    // A lifecycle error here is fatal to bring-up; no framework retry
    driver.initialize().await?;
    driver.set_config(CONFIG_BROKER_URL, broker_url.as_bytes())?;
    driver.connect().await?;
    driver.start().await?;
    log::info!("driver running against {broker_url:}");

    tokio::signal::ctrl_c().await?;
    log::info!("shutdown requested");
    driver.stop().await?;

    Ok(())
}
