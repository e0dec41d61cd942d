//! Cart endpoints for registered users and guest sessions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::{Money, VendorId};
use domain::{Cart, CartItem, ProductId};
use serde::{Deserialize, Serialize};
use store::Store;

use super::{OwnerParams, parse_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    #[serde(flatten)]
    pub owner: OwnerParams,
    pub product_id: String,
    pub product_name: String,
    pub sku: Option<String>,
    pub vendor_id: String,
    pub unit_price_paise: i64,
    pub quantity: u32,
    pub weight_grams: Option<u32>,
    /// Stored on the cart for checkout and reminders.
    pub contact_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    #[serde(flatten)]
    pub owner: OwnerParams,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub owner: String,
    pub items: Vec<CartItemResponse>,
    pub subtotal_paise: i64,
    pub total_quantity: u32,
    pub vendor_count: usize,
    pub contact_email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub vendor_id: VendorId,
    pub quantity: u32,
    pub unit_price_paise: i64,
    pub total_paise: i64,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        Self {
            owner: cart.owner().to_string(),
            items: cart
                .items()
                .iter()
                .map(|item| CartItemResponse {
                    product_id: item.product_id.to_string(),
                    product_name: item.product_name.clone(),
                    vendor_id: item.vendor_id,
                    quantity: item.quantity,
                    unit_price_paise: item.unit_price.paise(),
                    total_paise: item.total_price().paise(),
                })
                .collect(),
            subtotal_paise: cart.subtotal().paise(),
            total_quantity: cart.total_quantity(),
            vendor_count: cart.vendor_ids().len(),
            contact_email: cart.contact_email().map(str::to_string),
            updated_at: cart.updated_at(),
        }
    }
}

// -- Handlers --

/// GET /cart — the owner's cart, empty if they never added anything.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<OwnerParams>,
) -> Result<Json<CartResponse>, ApiError> {
    let owner = params.owner()?;
    let cart = state
        .store
        .get_cart(&owner)
        .await?
        .unwrap_or_else(|| Cart::new(owner, Utc::now()));
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /cart/items — add an item; an existing line for the product is merged.
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id))]
pub async fn add_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let owner = req.owner.owner()?;
    let vendor_id: VendorId = parse_id(&req.vendor_id, "vendor_id")?;
    let now = Utc::now();

    let mut cart = state
        .store
        .get_cart(&owner)
        .await?
        .unwrap_or_else(|| Cart::new(owner, now));

    let mut item = CartItem::new(
        req.product_id,
        req.product_name,
        vendor_id,
        Money::from_paise(req.unit_price_paise),
        req.quantity,
    );
    item.sku = req.sku;
    item.weight_grams = req.weight_grams;

    cart.add_item(item, now)?;
    if let Some(email) = req.contact_email.filter(|e| !e.trim().is_empty()) {
        cart.set_contact_email(email, now);
    }
    state.store.save_cart(&cart).await?;

    Ok(Json(CartResponse::from(&cart)))
}

/// PATCH /cart/items/{product_id} — set a line's quantity; 0 removes it.
#[tracing::instrument(skip(state, req))]
pub async fn set_quantity<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<String>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let owner = req.owner.owner()?;
    let mut cart = state
        .store
        .get_cart(&owner)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No cart for {owner}")))?;

    cart.set_quantity(&ProductId::new(product_id), req.quantity, Utc::now())?;
    state.store.save_cart(&cart).await?;

    Ok(Json(CartResponse::from(&cart)))
}
