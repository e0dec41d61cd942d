//! Carrier tracking webhook.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::{DispatchState, OrderStatus};
use notifications::Notification;
use serde::{Deserialize, Serialize};
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct TrackingPayload {
    #[serde(alias = "awb_code")]
    pub awb: String,
    pub current_status: String,
}

#[derive(Serialize)]
pub struct TrackingResponse {
    pub order_id: String,
    pub vendor_id: String,
    pub shipment_state: DispatchState,
    pub carrier_status: Option<String>,
    /// Present when the update moved the order to a new status.
    pub order_status: Option<OrderStatus>,
}

/// POST /webhooks/carrier
#[tracing::instrument(skip(state, payload), fields(awb = %payload.awb, status = %payload.current_status))]
pub async fn carrier<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(payload): Json<TrackingPayload>,
) -> Result<Json<TrackingResponse>, ApiError> {
    if payload.awb.trim().is_empty() {
        return Err(ApiError::BadRequest("awb is required".to_string()));
    }

    let update = match state
        .dispatcher
        .record_tracking(payload.awb.trim(), &payload.current_status)
        .await
    {
        Ok(update) => update,
        Err(e) => {
            metrics::counter!("carrier_webhooks_total", "outcome" => "rejected").increment(1);
            return Err(e.into());
        }
    };
    metrics::counter!("carrier_webhooks_total", "outcome" => "applied").increment(1);

    let order_status = update.order.as_ref().map(|order| order.status());
    if let Some(order) = update.order.filter(|o| o.status() == OrderStatus::Delivered) {
        state
            .notifier
            .notify_detached(Notification::OrderDelivered(order));
    }

    Ok(Json(TrackingResponse {
        order_id: update.shipment.order_id.to_string(),
        vendor_id: update.shipment.vendor_id.to_string(),
        shipment_state: update.shipment.state,
        carrier_status: update.shipment.carrier_status,
        order_status,
    }))
}
