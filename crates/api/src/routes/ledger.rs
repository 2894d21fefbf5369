//! Ledger rows per order, adjustments and vendor payouts.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{Money, VendorId};
use domain::{TransactionId, TransactionRecordedData};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_aggregate_id};
use crate::auth;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct AdjustmentRequest {
    /// The `TXN...` id of the row being corrected.
    pub transaction_id: String,
    pub amount_cents: i64,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct PayoutRequest {
    pub vendor_id: VendorId,
}

#[derive(Serialize)]
pub struct PayoutResponse {
    /// False when the payout had already been recorded.
    pub created: bool,
    pub transaction: TransactionRecordedData,
}

/// GET /orders/{id}/transactions
#[tracing::instrument(skip(state, headers))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<TransactionRecordedData>>, ApiError> {
    let actor = auth::principal(&headers)?;
    let rows = state
        .market
        .transactions(&actor, parse_aggregate_id(&id)?)
        .await?;
    Ok(Json(rows))
}

/// POST /orders/{id}/adjustments
#[tracing::instrument(skip(state, headers, req))]
pub async fn adjust<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AdjustmentRequest>,
) -> Result<(StatusCode, Json<TransactionRecordedData>), ApiError> {
    let actor = auth::principal(&headers)?;
    let original = TransactionId::parse(&req.transaction_id).ok_or_else(|| {
        ApiError::BadRequest(format!("Invalid transaction id: {}", req.transaction_id))
    })?;
    let row = state
        .market
        .ledger
        .record_adjustment(
            &actor,
            parse_aggregate_id(&id)?,
            &original,
            Money::from_minor(req.amount_cents),
            &req.reason,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// POST /orders/{id}/payouts
#[tracing::instrument(skip(state, headers, req))]
pub async fn payout<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<PayoutRequest>,
) -> Result<(StatusCode, Json<PayoutResponse>), ApiError> {
    let actor = auth::principal(&headers)?;
    let recorded = state
        .market
        .ledger
        .record_payout(&actor, parse_aggregate_id(&id)?, req.vendor_id)
        .await?;
    let status = if recorded.is_new() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(PayoutResponse {
            created: recorded.is_new(),
            transaction: recorded.into_entry(),
        }),
    ))
}
