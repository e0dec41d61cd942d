//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::InvalidPincode;
use domain::{CartError, OrderError};
use fulfillment::{FulfillmentError, UnserviceableVendor};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Invalid state transition or lost write race.
    Conflict(String),
    /// Checkout refused because some vendors cannot deliver.
    Unserviceable {
        message: String,
        vendors: Vec<UnserviceableVendor>,
    },
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg })),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, serde_json::json!({ "error": msg })),
            ApiError::Unserviceable { message, vendors } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({ "error": message, "vendors": vendors }),
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": msg }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        match err {
            FulfillmentError::OrderNotFound(_)
            | FulfillmentError::ShipmentNotFound { .. }
            | FulfillmentError::UnknownAwb(_) => ApiError::NotFound(err.to_string()),
            FulfillmentError::NotDispatchable { .. } | FulfillmentError::ResetNotAllowed { .. } => {
                ApiError::Conflict(err.to_string())
            }
            FulfillmentError::EmptyCart => ApiError::BadRequest(err.to_string()),
            FulfillmentError::Unserviceable { ref vendors, .. } => ApiError::Unserviceable {
                message: err.to_string(),
                vendors: vendors.clone(),
            },
            FulfillmentError::Cart(e) => e.into(),
            FulfillmentError::Order(e) => e.into(),
            FulfillmentError::Store(e) => e.into(),
        }
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ItemNotFound(_) => ApiError::NotFound(err.to_string()),
            CartError::Order(e) => e.into(),
            CartError::Empty
            | CartError::InvalidQuantity(_)
            | CartError::QuantityTooLarge { .. }
            | CartError::InvalidPrice { .. }
            | CartError::PriceTooLarge { .. }
            | CartError::MissingContactEmail => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidStateTransition { .. } => ApiError::Conflict(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::ConcurrencyConflict { .. } | StoreError::DuplicateOrder(_) => {
                ApiError::Conflict(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<InvalidPincode> for ApiError {
    fn from(err: InvalidPincode) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
