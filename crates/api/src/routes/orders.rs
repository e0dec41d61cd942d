//! Order lookups, operator status changes and carrier dispatch.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{OrderId, VendorId};
use domain::{Order, OrderStatus, Shipment};
use fulfillment::DispatchReport;
use notifications::Notification;
use serde::{Deserialize, Serialize};
use store::Store;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub owner: String,
    pub contact_email: String,
    pub status: OrderStatus,
    pub payment_method: &'static str,
    pub items: Vec<OrderItemResponse>,
    pub total_paise: i64,
    pub vendor_count: usize,
    pub shipping_pincode: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub sku: String,
    pub vendor_id: VendorId,
    pub quantity: u32,
    pub unit_price_paise: i64,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            owner: order.owner().to_string(),
            contact_email: order.contact_email().to_string(),
            status: order.status(),
            payment_method: order.payment_method().as_str(),
            items: order
                .items()
                .iter()
                .map(|item| OrderItemResponse {
                    id: item.id.to_string(),
                    product_id: item.product_id.to_string(),
                    product_name: item.product_name.clone(),
                    sku: item.sku.clone(),
                    vendor_id: item.vendor_id,
                    quantity: item.quantity,
                    unit_price_paise: item.unit_price.paise(),
                })
                .collect(),
            total_paise: order.total_amount().paise(),
            vendor_count: order.vendor_ids().len(),
            shipping_pincode: order.shipping_address().pincode.to_string(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
            delivered_at: order.delivered_at(),
        }
    }
}

async fn load_order<S: Store>(state: &AppState<S>, order_id: OrderId) -> Result<Order, ApiError> {
    state
        .store
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))
}

// -- Handlers --

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = load_order(&state, order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/status — operator transition. Moving an order to
/// `Delivered` emails the customer.
#[tracing::instrument(skip(state, req), fields(status = %req.status))]
pub async fn set_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let next: OrderStatus = req.status.parse().map_err(ApiError::BadRequest)?;

    let mut order = load_order(&state, order_id).await?;
    let from = order.status();
    order.transition_to(next, Utc::now())?;
    state.store.update_order(&order).await?;
    tracing::info!(%from, to = %next, "order status changed by operator");

    if next == OrderStatus::Delivered {
        state
            .notifier
            .notify_detached(Notification::OrderDelivered(order.clone()));
    }

    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/dispatch — sends every pending vendor group to the
/// carrier. Safe to repeat; groups already accepted are not resent.
#[tracing::instrument(skip(state))]
pub async fn dispatch<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DispatchReport>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let report = state.dispatcher.dispatch_order(order_id).await?;

    if report.has_new_attention() {
        state
            .notifier
            .notify_detached(Notification::DispatchRejected(report.clone()));
    }

    Ok(Json(report))
}

/// GET /orders/{id}/shipments
#[tracing::instrument(skip(state))]
pub async fn shipments<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Shipment>>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    load_order(&state, order_id).await?;
    Ok(Json(state.store.get_shipments(order_id).await?))
}

/// POST /orders/{id}/shipments/{vendor_id}/reset
#[tracing::instrument(skip(state))]
pub async fn reset_shipment<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, vendor_id)): Path<(String, String)>,
) -> Result<Json<Shipment>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let vendor_id: VendorId = parse_id(&vendor_id, "vendor id")?;
    let shipment = state.dispatcher.reset_shipment(order_id, vendor_id).await?;
    Ok(Json(shipment))
}
