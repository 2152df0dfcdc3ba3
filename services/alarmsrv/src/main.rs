//! Smart Alarm Service (AlarmSrv)
//!
//! Listens to the alarm device over MQTT, exposes alarm control and sleep
//! rating over HTTP.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use alarm_core::{AlarmStateMachine, Broker, SleepStore, SqliteSleepStore, StatusListener};
use alarmsrv::{
    bootstrap::{self, Args},
    config::{AlarmSrvConfig, SERVICE_NAME},
    create_router, AppState, MqttBroker,
};
use common::service_bootstrap::{self as service, LogOptions, ServiceInfo};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = AlarmSrvConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let service_info = ServiceInfo::new(
        SERVICE_NAME,
        "Smart Alarm Service - Alarm Control & Sleep Rating",
        config.service.port,
    );
    service::init_logging(
        &service_info,
        &LogOptions {
            level: &config.logging.level,
            log_dir: config.logging.dir.as_deref(),
            enable_json: config.logging.json,
            no_color: args.no_color,
        },
    )?;
    if !args.no_color {
        service::print_startup_banner(&service_info);
    }

    let addr = bootstrap::bind_address(&args, &config)?;

    // Validation mode: validate and exit
    if args.validate {
        info!("Validation completed successfully");
        return Ok(());
    }

    let sqlite = Arc::new(
        SqliteSleepStore::connect(&config.database.path, config.database.max_connections)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.path))?,
    );
    info!("Database ready: {}", config.database.path);
    let store: Arc<dyn SleepStore> = sqlite.clone();

    let mqtt = Arc::new(MqttBroker::connect(
        config.mqtt.clone(),
        CancellationToken::new(),
    ));
    let broker: Arc<dyn Broker> = mqtt.clone();
    let machine = AlarmStateMachine::new(config.auto_reset());

    let token = CancellationToken::new();
    common::cancel_on_signal(token.clone());

    let status_listener = StatusListener::new(
        broker.clone(),
        &config.mqtt.topics.alarm_status,
        machine.clone(),
        store.clone(),
    )
    .with_retry(config.retry_policy());
    let listener_token = token.clone();
    let listener = tokio::spawn(async move {
        let result = status_listener.run(listener_token.clone()).await;
        if let Err(e) = &result {
            error!("FATAL: status listener stopped: {}", e);
            listener_token.cancel();
        }
        result
    });

    let app = create_router(AppState::new(broker, store, machine.clone(), &config));
    let tcp = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("AlarmSrv listening on http://{}", addr);

    let server_token = token.clone();
    axum::serve(tcp, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await?;
    info!("HTTP server drained");

    // Server may also stop on its own
    token.cancel();
    let listener_result = listener.await;
    machine.shutdown();
    mqtt.disconnect().await;
    sqlite.close().await;

    match listener_result {
        Ok(Ok(())) => {
            info!("AlarmSrv stopped");
            Ok(())
        },
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(anyhow::anyhow!("Status listener task failed: {}", e)),
    }
}
