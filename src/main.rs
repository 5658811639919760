use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;

use ara_push_dispatch::config::Settings;
use ara_push_dispatch::dispatch::{PushProcessor, UnsubscribeProcessor};
use ara_push_dispatch::metrics::encode_metrics;
use ara_push_dispatch::notification::Notification;
use ara_push_dispatch::push::{DryRunPushService, PushServiceManager};
use ara_push_dispatch::relay::Relay;
use ara_push_dispatch::request::{handoff_channel, HandoffSender, LoggingResponder, Request};
use ara_push_dispatch::storage::{
    DeliveryTarget, MemorySubscriptionStore, PushProvider, SubscriptionStore,
};
use ara_push_dispatch::telemetry::init_tracing;

/// Push service types served by the dry-run backend
const DRY_RUN_SERVICES: [&str; 3] = ["apns", "fcm", "adm"];

/// One line of input
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Command {
    Subscribe {
        service: String,
        subscriber: String,
        provider: PushProvider,
        target: DeliveryTarget,
    },
    Push {
        service: String,
        subscribers: Vec<String>,
        #[serde(default)]
        data: BTreeMap<String, String>,
        #[serde(default)]
        sender: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_tracing(&settings.log)?;
    tracing::info!(
        max_workers = settings.dispatch.max_workers,
        max_retries = settings.dispatch.max_retries,
        "Configuration loaded"
    );

    let (handoff_tx, handoff_rx) = handoff_channel(settings.dispatch.handoff_capacity);
    let store = Arc::new(MemorySubscriptionStore::new());

    let push_services = Arc::new(PushServiceManager::new());
    for service in DRY_RUN_SERVICES {
        push_services.register(service, Arc::new(DryRunPushService));
    }

    let push = PushProcessor::new(
        settings.dispatch,
        store.clone(),
        push_services,
        handoff_tx.clone(),
    );
    let unsubscribe = UnsubscribeProcessor::new(store.clone());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let relay = Relay::new(push, unsubscribe, handoff_rx, shutdown_rx);
    let relay_handle = tokio::spawn(relay.run());

    tokio::select! {
        result = read_commands(store, handoff_tx) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to read input");
            }
            // The relay routes whatever is still queued before it stops
            tracing::info!("Input closed, shutting down");
        }
        _ = shutdown_signal() => {}
    }

    let _ = shutdown_tx.send(());
    let stats = relay_handle.await?;
    tracing::info!(
        push_requests = stats.push_requests,
        unsubscribe_requests = stats.unsubscribe_requests,
        "Shutdown complete"
    );

    if let Ok(metrics) = encode_metrics() {
        tracing::debug!(metrics = %metrics, "Final metrics");
    }

    Ok(())
}

/// Read newline-delimited JSON commands from stdin until end of input
async fn read_commands(store: Arc<MemorySubscriptionStore>, handoff: HandoffSender) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command: Command = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed command");
                continue;
            }
        };

        match command {
            Command::Subscribe {
                service,
                subscriber,
                provider,
                target,
            } => {
                if let Err(e) = store.subscribe(&service, &subscriber, provider, target).await {
                    tracing::warn!(error = %e, "Subscribe failed");
                }
            }
            Command::Push {
                service,
                subscribers,
                data,
                sender,
            } => {
                let request = Request::push(service, subscribers, Notification::new(data))
                    .with_sender_addr(sender.unwrap_or_else(|| "stdin".to_string()));
                let responder = Arc::new(LoggingResponder::new(request.id));
                handoff.send(request.with_responder(responder)).await?;
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
