//! HTTP API for the multi-vendor marketplace.
//!
//! Provides REST endpoints for serviceability lookups, carts, checkout,
//! order operations and carrier webhooks, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use fulfillment::{CarrierClient, CheckoutService, DispatchConfig, Dispatcher, ServiceabilityService};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::Notifier;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub store: S,
    pub checkout: CheckoutService<S>,
    pub serviceability: ServiceabilityService<S>,
    pub dispatcher: Dispatcher<S>,
    pub notifier: Notifier,
}

impl<S: Store + Clone> AppState<S> {
    pub fn new(
        store: S,
        carrier: Arc<dyn CarrierClient>,
        notifier: Notifier,
        dispatch: DispatchConfig,
    ) -> Self {
        Self {
            checkout: CheckoutService::new(store.clone()),
            serviceability: ServiceabilityService::new(store.clone()),
            dispatcher: Dispatcher::new(store.clone(), carrier, dispatch),
            notifier,
            store,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/serviceability", get(routes::serviceability::check::<S>))
        .route("/pincodes", put(routes::serviceability::upsert_platform::<S>))
        .route(
            "/vendors/{id}",
            put(routes::vendors::upsert::<S>).get(routes::vendors::get::<S>),
        )
        .route("/vendors/{id}/pincodes", put(routes::vendors::upsert_pincodes::<S>))
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route("/cart/items/{product_id}", patch(routes::cart::set_quantity::<S>))
        .route("/checkout", post(routes::checkout::checkout::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", post(routes::orders::set_status::<S>))
        .route("/orders/{id}/dispatch", post(routes::orders::dispatch::<S>))
        .route("/orders/{id}/shipments", get(routes::orders::shipments::<S>))
        .route(
            "/orders/{id}/shipments/{vendor_id}/reset",
            post(routes::orders::reset_shipment::<S>),
        )
        .route("/webhooks/carrier", post(routes::webhooks::carrier::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
