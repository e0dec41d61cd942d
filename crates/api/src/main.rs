//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::{AppState, create_app, telemetry};
use fulfillment::{CarrierClient, ShiprocketClient};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{Notifier, ResendMailer};
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<S: Store + Clone + 'static>(
    config: &Config,
    store: S,
    notifier: Notifier,
    metrics_handle: PrometheusHandle,
) {
    let carrier: Arc<dyn CarrierClient> = Arc::new(ShiprocketClient::new(
        &config.shiprocket_base_url,
        &config.shiprocket_api_token,
    ));
    let state = Arc::new(AppState::new(
        store,
        carrier,
        notifier,
        config.dispatch_config(),
    ));
    let app = create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Load .env (if any) and validate configuration
    dotenvy::dotenv().ok();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };

    // 2. Initialize tracing
    telemetry::init_tracing(&config);

    // 3. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Outbound email
    let mailer = ResendMailer::new(
        &config.resend_base_url,
        &config.resend_api_key,
        &config.mail_from,
    );
    let notifier = Notifier::new(Arc::new(mailer), config.ops_alert_email.clone());
    if !notifier.has_ops_address() {
        tracing::warn!("OPS_ALERT_EMAIL not set, ops alerts will only be logged");
    }

    // 5. Pick the store and serve
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .expect("failed to connect to Postgres");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using Postgres store");
            serve(&config, store, notifier, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            serve(&config, InMemoryStore::new(), notifier, metrics_handle).await;
        }
    }
}
