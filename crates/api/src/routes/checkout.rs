//! Checkout: cart to order.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::{PaymentMethod, ShippingAddress};
use fulfillment::CheckoutRequest;
use notifications::Notification;
use serde::Deserialize;
use store::Store;

use super::OwnerParams;
use super::orders::OrderResponse;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    #[serde(flatten)]
    pub owner: OwnerParams,
    pub shipping_address: ShippingAddress,
    /// `Prepaid` or `COD`.
    pub payment_method: String,
    pub contact_email: Option<String>,
}

/// POST /checkout — checks serviceability, places the order, empties the cart
/// and sends the confirmation email in the background.
#[tracing::instrument(skip(state, body))]
pub async fn checkout<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let owner = body.owner.owner()?;
    let payment_method: PaymentMethod = body
        .payment_method
        .parse()
        .map_err(ApiError::BadRequest)?;

    let order = state
        .checkout
        .checkout(CheckoutRequest {
            owner,
            shipping_address: body.shipping_address,
            payment_method,
            contact_email: body.contact_email.filter(|e| !e.trim().is_empty()),
        })
        .await?;

    state
        .notifier
        .notify_detached(Notification::OrderConfirmation(order.clone()));

    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}
