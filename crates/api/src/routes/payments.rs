//! Payment proof, confirmation, gateway callback and refund endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::{AggregateId, Money};
use domain::{GatewayOutcome, TransactionRecordedData};
use event_store::EventStore;
use marketplace::PaymentOutcome;
use serde::{Deserialize, Serialize};

use super::{AppState, OrderResponse, parse_aggregate_id};
use crate::auth;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ProofRequest {
    pub storage_ref: String,
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct RefundRequest {
    pub amount_cents: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body posted by the payment gateway.
#[derive(Deserialize)]
pub struct GatewayCallback {
    pub order_id: AggregateId,
    pub reference: String,
    pub success: bool,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub order: OrderResponse,
    pub transaction: Option<TransactionRecordedData>,
}

impl From<PaymentOutcome> for PaymentResponse {
    fn from(outcome: PaymentOutcome) -> Self {
        Self {
            order: OrderResponse::from(&outcome.order),
            transaction: outcome.transaction,
        }
    }
}

/// POST /orders/{id}/payment-proof
#[tracing::instrument(skip(state, headers, req))]
pub async fn upload_proof<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ProofRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = auth::principal(&headers)?;
    let order = state
        .market
        .payments
        .upload_proof(&actor, parse_aggregate_id(&id)?, &req.storage_ref)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/payment/confirm
#[tracing::instrument(skip(state, headers))]
pub async fn confirm<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let actor = auth::principal(&headers)?;
    let outcome = state
        .market
        .payments
        .confirm_payment(&actor, parse_aggregate_id(&id)?)
        .await?;
    Ok(Json(outcome.into()))
}

/// POST /orders/{id}/payment/reject
#[tracing::instrument(skip(state, headers, req))]
pub async fn reject<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = auth::principal(&headers)?;
    let order = state
        .market
        .payments
        .reject_payment(&actor, parse_aggregate_id(&id)?, &req.reason)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/refund
#[tracing::instrument(skip(state, headers, req))]
pub async fn refund<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let actor = auth::principal(&headers)?;
    let outcome = state
        .market
        .payments
        .refund(
            &actor,
            parse_aggregate_id(&id)?,
            Money::from_minor(req.amount_cents),
            req.reason,
        )
        .await?;
    Ok(Json(outcome.into()))
}

/// POST /payments/gateway-callback
///
/// Gateway identity is established upstream, so no actor headers are read.
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id, reference = %req.reference))]
pub async fn gateway_callback<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<GatewayCallback>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let outcome = if req.success {
        GatewayOutcome::Succeeded
    } else {
        GatewayOutcome::Failed {
            reason: req
                .failure_reason
                .unwrap_or_else(|| "declined by gateway".to_string()),
        }
    };
    let result = state
        .market
        .payments
        .record_gateway_result(req.order_id, &req.reference, outcome)
        .await?;
    Ok(Json(result.into()))
}
