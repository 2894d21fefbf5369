//! Order creation, reads, fulfillment and cancellation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::ProductId;
use domain::OrderStatus;
use event_store::EventStore;
use marketplace::{CheckoutRequest, Invoice, LocationUpdate};
use serde::Deserialize;

use super::{AppState, OrderResponse, parse_aggregate_id};
use crate::auth;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct ShipmentRequest {
    pub tracking_number: String,
    pub carrier: String,
    #[serde(default)]
    pub estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct TrackingRequest {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

// -- Handlers --

/// POST /orders
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let actor = auth::principal(&headers)?;
    let order = state.market.checkout.create(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state, headers))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = auth::principal(&headers)?;
    let order = state.market.order(&actor, parse_aggregate_id(&id)?).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/by-number/{number}
#[tracing::instrument(skip(state, headers))]
pub async fn by_number<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(number): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = auth::principal(&headers)?;
    let order = state.market.order_by_number(&actor, &number).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/status
#[tracing::instrument(skip(state, headers, req))]
pub async fn update_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = auth::principal(&headers)?;
    let order = state
        .market
        .fulfillment
        .update_status(&actor, parse_aggregate_id(&id)?, req.status)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/items/{product_id}/status
#[tracing::instrument(skip(state, headers, req))]
pub async fn update_line_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path((id, product_id)): Path<(String, String)>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = auth::principal(&headers)?;
    let order = state
        .market
        .fulfillment
        .update_line_status(
            &actor,
            parse_aggregate_id(&id)?,
            &ProductId::new(product_id),
            req.status,
        )
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/shipment
#[tracing::instrument(skip(state, headers, req))]
pub async fn set_shipment<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ShipmentRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = auth::principal(&headers)?;
    let order = state
        .market
        .fulfillment
        .set_shipment_details(
            &actor,
            parse_aggregate_id(&id)?,
            &req.tracking_number,
            &req.carrier,
            req.estimated_delivery,
        )
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/tracking
#[tracing::instrument(skip(state, headers, req))]
pub async fn append_tracking<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<TrackingRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = auth::principal(&headers)?;
    let update = LocationUpdate {
        lat: req.lat,
        lon: req.lon,
        address: req.address,
        description: req.description,
    };
    let order = state
        .market
        .fulfillment
        .append_location(&actor, parse_aggregate_id(&id)?, update)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, headers, req))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = auth::principal(&headers)?;
    let order = state
        .market
        .checkout
        .cancel(&actor, parse_aggregate_id(&id)?, &req.reason)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/{id}/invoice
#[tracing::instrument(skip(state, headers))]
pub async fn invoice<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, ApiError> {
    let actor = auth::principal(&headers)?;
    let invoice = state
        .market
        .invoice(&actor, parse_aggregate_id(&id)?)
        .await?;
    Ok(Json(invoice))
}
