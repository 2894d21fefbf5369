//! HTTP API for the marketplace order engine.
//!
//! Exposes checkout, payment reconciliation, fulfillment, ledger and
//! read-model endpoints, with structured logging (tracing) and Prometheus
//! metrics. Callers identify themselves through `x-actor-*` headers.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::RetryPolicy;
use event_store::EventStore;
use marketplace::{Collaborators, Marketplace};
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{CustomerOrdersView, ProjectionProcessor, VendorLedgerView, VendorOrdersView};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/by-number/{number}", get(routes::orders::by_number::<S>))
        .route("/orders/{id}/status", post(routes::orders::update_status::<S>))
        .route(
            "/orders/{id}/items/{product_id}/status",
            post(routes::orders::update_line_status::<S>),
        )
        .route("/orders/{id}/shipment", post(routes::orders::set_shipment::<S>))
        .route("/orders/{id}/tracking", post(routes::orders::append_tracking::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/invoice", get(routes::orders::invoice::<S>))
        .route(
            "/orders/{id}/payment-proof",
            post(routes::payments::upload_proof::<S>),
        )
        .route(
            "/orders/{id}/payment/confirm",
            post(routes::payments::confirm::<S>),
        )
        .route("/orders/{id}/payment/reject", post(routes::payments::reject::<S>))
        .route("/orders/{id}/refund", post(routes::payments::refund::<S>))
        .route(
            "/payments/gateway-callback",
            post(routes::payments::gateway_callback::<S>),
        )
        .route("/orders/{id}/transactions", get(routes::ledger::list::<S>))
        .route("/orders/{id}/adjustments", post(routes::ledger::adjust::<S>))
        .route("/orders/{id}/payouts", post(routes::ledger::payout::<S>))
        .route("/customers/{id}/orders", get(routes::views::customer_orders::<S>))
        .route("/vendors/{id}/orders", get(routes::views::vendor_orders::<S>))
        .route("/vendors/{id}/ledger", get(routes::views::vendor_ledger::<S>))
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

/// Wires the services and read models to one store.
pub fn create_state<S: EventStore + Clone + 'static>(
    event_store: S,
    collaborators: Collaborators,
    retry: RetryPolicy,
) -> Arc<AppState<S>> {
    let customer_orders = CustomerOrdersView::new();
    let vendor_orders = VendorOrdersView::new();
    let vendor_ledger = VendorLedgerView::new();

    let mut processor = ProjectionProcessor::new(event_store.clone());
    processor.register(Arc::new(customer_orders.clone()));
    processor.register(Arc::new(vendor_orders.clone()));
    processor.register(Arc::new(vendor_ledger.clone()));

    Arc::new(AppState {
        market: Marketplace::new(event_store, collaborators, retry),
        processor,
        customer_orders,
        vendor_orders,
        vendor_ledger,
    })
}
