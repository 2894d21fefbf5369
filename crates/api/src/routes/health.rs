//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_store::EventStore;
use projections::ReadModel;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub read_models: Vec<ReadModelHealth>,
}

#[derive(Serialize)]
pub struct ReadModelHealth {
    pub name: &'static str,
    pub entries: usize,
}

/// GET /health: liveness plus the size of each read model.
pub async fn check<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let models: [&dyn ReadModel; 3] = [
        &state.customer_orders,
        &state.vendor_orders,
        &state.vendor_ledger,
    ];
    Json(HealthResponse {
        status: "ok",
        read_models: models
            .iter()
            .map(|model| ReadModelHealth {
                name: model.name(),
                entries: model.count(),
            })
            .collect(),
    })
}
