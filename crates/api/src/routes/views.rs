//! Read-model endpoints. Each query catches the projections up first.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::{CustomerId, VendorId};
use event_store::EventStore;
use projections::{CustomerOrderSummary, VendorLedgerSummary, VendorOrderEntry};

use super::{AppState, parse_uuid};
use crate::auth;
use crate::error::ApiError;

/// GET /customers/{id}/orders
#[tracing::instrument(skip(state, headers))]
pub async fn customer_orders<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<CustomerOrderSummary>>, ApiError> {
    let actor = auth::principal(&headers)?;
    let customer_id = CustomerId::from_uuid(parse_uuid(&id)?);
    auth::require_customer(&actor, customer_id)?;

    state.catch_up().await?;
    Ok(Json(state.customer_orders.orders_for(customer_id).await))
}

/// GET /vendors/{id}/orders
#[tracing::instrument(skip(state, headers))]
pub async fn vendor_orders<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<VendorOrderEntry>>, ApiError> {
    let actor = auth::principal(&headers)?;
    let vendor_id = VendorId::from_uuid(parse_uuid(&id)?);
    auth::require_vendor(&actor, vendor_id)?;

    state.catch_up().await?;
    Ok(Json(state.vendor_orders.inbox(vendor_id).await))
}

/// GET /vendors/{id}/ledger
#[tracing::instrument(skip(state, headers))]
pub async fn vendor_ledger<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<VendorLedgerSummary>, ApiError> {
    let actor = auth::principal(&headers)?;
    let vendor_id = VendorId::from_uuid(parse_uuid(&id)?);
    auth::require_vendor(&actor, vendor_id)?;

    state.catch_up().await?;
    Ok(Json(state.vendor_ledger.summary(vendor_id).await))
}
