//! Service bootstrap: wire the store, dispatcher, pipeline, transport, and
//! HTTP surface together and run until Ctrl-C.

use std::sync::Arc;

use {
    courier_channels::{ChatOutbound, inbound_channel},
    courier_config::{CourierConfig, Severity, validate},
    courier_delivery::{
        Dispatch, FallbackSink, FallbackStore, LastResortLog, SqliteFallbackStore,
        WebhookDispatcher,
    },
    courier_gateway::AppState,
    courier_pipeline::Pipeline,
    courier_routing::{Classifier, RoutingState},
    courier_telegram::TelegramClient,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

pub async fn run(config: CourierConfig) -> anyhow::Result<()> {
    check_config(&config)?;

    let store = SqliteFallbackStore::connect(&config.fallback.database_url).await?;
    let fallback = FallbackSink::new(
        Arc::new(store) as Arc<dyn FallbackStore>,
        LastResortLog::new(&config.fallback.last_resort_path),
    );
    info!(
        database_url = %config.fallback.database_url,
        last_resort = %config.fallback.last_resort_path.display(),
        "fallback store ready"
    );

    let dispatcher = WebhookDispatcher::from_config(&config.delivery)?;
    info!(
        endpoints = config.delivery.endpoints.len(),
        "workflow dispatcher ready"
    );

    let pipeline = Arc::new(Pipeline::new(
        Classifier::from_config(&config.routing),
        RoutingState::from_config(&config.routing).into_shared(),
        Arc::new(dispatcher) as Arc<dyn Dispatch>,
        fallback,
        &config.coalescing,
    ));

    let client = TelegramClient::connect(&config.telegram).await?;
    if let Some(username) = client.username()
        && !username.eq_ignore_ascii_case(config.routing.bot_handle.trim_start_matches('@'))
    {
        warn!(
            username,
            bot_handle = %config.routing.bot_handle,
            "routing.bot_handle differs from the bot's username; direct mentions use bot_handle"
        );
    }

    let cancel = CancellationToken::new();
    let (tx, rx) = inbound_channel(config.telegram.inbound_buffer);
    let polling = client.spawn_polling(tx, config.telegram.poll_timeout_secs, cancel.clone());
    let processing = tokio::spawn(Arc::clone(&pipeline).run(rx, cancel.clone()));

    let state = AppState {
        outbound: Arc::new(client.outbound()) as Arc<dyn ChatOutbound>,
        admin: pipeline.admin(),
    };
    let server = {
        let cancel = cancel.clone();
        let server_config = config.server.clone();
        tokio::spawn(async move {
            let result = courier_gateway::serve(&server_config, state, cancel.clone()).await;
            if let Err(ref e) = result {
                error!(error = %e, "http server failed");
                cancel.cancel();
            }
            result
        })
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("shutdown requested"),
            Err(e) => error!(error = %e, "failed to listen for ctrl-c, shutting down"),
        },
        () = cancel.cancelled() => {
            warn!("a component requested shutdown");
        },
    }
    cancel.cancel();

    // Intake stops before the pipeline drains.
    if let Err(e) = polling.await {
        error!(error = %e, "polling task failed");
    }
    if let Err(e) = processing.await {
        error!(error = %e, "pipeline task failed");
    }
    let flushed = pipeline.shutdown().await;
    if flushed > 0 {
        info!(flushed, "flushed pending bursts on shutdown");
    }
    server.await??;
    info!("courier stopped");
    Ok(())
}

fn check_config(config: &CourierConfig) -> anyhow::Result<()> {
    let result = validate(config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
        }
    }
    if result.has_errors() {
        anyhow::bail!("invalid configuration, see errors above");
    }
    Ok(())
}
