/**
 * ZONEWATCH KERNEL - Process entry point
 *
 * ROLE: Loads config, builds the zone monitor and wires it to MQTT: readings
 * in, events / zone status / health out, plus the periodic liveness sweep.
 *
 * SHUTDOWN: Ctrl-C flips the watch channel; every task exits and is joined.
 */

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zonewatch_kernel::clock::{Clock, SystemClock};
use zonewatch_kernel::config::load_config;
use zonewatch_kernel::health::HealthTracker;
use zonewatch_kernel::monitor::ZoneMonitor;
use zonewatch_kernel::mqtt::{self, Topics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "zonewatch_kernel=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = load_config().await;
    cfg.validate().context("configuration rejected")?;

    let monitor = Arc::new(ZoneMonitor::new(cfg.monitor_settings()));
    for (id, zone) in &cfg.zones {
        monitor.register_zone(id, &zone.name);
    }
    info!(zones = cfg.zones.len(), "zone monitor ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let topics = Topics::new(&cfg.mqtt.topic_prefix);
    let health = HealthTracker::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let outbound = mqtt::forward_outbound(&monitor);
    let (client, eventloop) = mqtt::create_mqtt_client(&cfg.mqtt);
    info!(host = %cfg.mqtt.host, port = cfg.mqtt.port, prefix = %cfg.mqtt.topic_prefix, "connecting to MQTT");

    let tasks = vec![
        mqtt::spawn_mqtt_listener(
            client.clone(),
            eventloop,
            topics.clone(),
            monitor.clone(),
            clock.clone(),
            health.clone(),
            shutdown_rx.clone(),
        ),
        mqtt::spawn_publisher(client.clone(), topics.clone(), outbound, shutdown_rx.clone()),
        ZoneMonitor::start_liveness_sweep(
            monitor.clone(),
            clock,
            cfg.monitor.sweep_interval(),
            shutdown_rx.clone(),
        ),
        health.spawn_health_publisher(
            client,
            topics.health.clone(),
            monitor,
            cfg.monitor.health_interval(),
            shutdown_rx,
        ),
    ];

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutdown requested");
    shutdown_tx.send(true).ok();

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "task ended abnormally");
        }
    }
    info!("zonewatch kernel stopped");
    Ok(())
}
