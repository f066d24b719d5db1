mod reading;

use anyhow::{Context, Result};
use conveyor::broker::{BrokerEndpoint, DefaultTransportFactory, TransportFactory};
use conveyor::config::{load_config, ConveyorConfig};
use conveyor::topic;
use rand::Rng;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::reading::Reading;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conveyor_simulator=info,conveyor=info".into()),
        )
        .init();

    info!("Conveyor simulator starting...");

    let mut config = match std::env::var("CONVEYOR_CONFIG") {
        Ok(path) => load_config(&path).with_context(|| format!("Failed to load {}", path))?,
        Err(_) => ConveyorConfig::default(),
    };
    config.apply_env();

    let interval_secs: u64 = std::env::var("SIMULATOR_INTERVAL_SECS")
        .unwrap_or_else(|_| "5".to_string())
        .parse()
        .context("SIMULATOR_INTERVAL_SECS must be a whole number of seconds")?;

    let topic = topic::resolve(
        &config.asset.id,
        config.broker.topic_override.as_deref(),
        &config.broker.namespace,
    )
    .context("An asset id is required (CONVEYOR_ASSET_ID or [asset] id)")?;

    let endpoint = BrokerEndpoint::parse(&config.broker.url).context("Invalid broker URL")?;
    let policy = config.reconnect_policy().context("Invalid reconnect settings")?;

    let mut options = config.connect_options();
    options.client_id = format!("simulator-{}", rand::thread_rng().gen_range(1000..=9999));

    let mut transport = DefaultTransportFactory
        .create(&endpoint, &options)
        .context("No transport for broker")?;

    transport
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", endpoint))?;

    info!(
        broker = %endpoint,
        client_id = %options.client_id,
        topic = %topic,
        interval_secs,
        "Connected, publishing readings"
    );

    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {}
        }

        let reading = Reading::random(&mut rand::thread_rng());
        let payload = serde_json::to_vec(&reading).context("Failed to encode reading")?;

        match transport.publish(topic.as_str(), payload).await {
            Ok(()) => {
                attempt = 0;
                info!(
                    motor_status = reading.motor_status,
                    pieces = reading.number_of_pieces,
                    battery_level = reading.battery_level,
                    "Published reading"
                );
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                attempt = attempt.saturating_add(1);
                warn!(error = %e, attempt, "Publish failed, reconnecting");
                tokio::time::sleep(delay).await;
                if let Err(e) = transport.connect().await {
                    error!(error = %e, "Reconnect failed");
                }
            }
        }
    }

    transport.close().await;
    info!("Conveyor simulator stopped");

    Ok(())
}
