//! Vendor profiles and per-vendor pincode lists.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use common::{Money, Pincode, VendorId};
use domain::{VendorPincode, VendorProfile};
use serde::{Deserialize, Serialize};
use store::Store;

use super::parse_id;
use super::serviceability::UpsertResponse;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct VendorRequest {
    pub business_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub pickup_location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VendorPincodeRequest {
    pub pincode: String,
    #[serde(default)]
    pub area: String,
    pub cod_available: bool,
    pub max_order_value_paise: Option<i64>,
}

#[derive(Serialize)]
pub struct VendorResponse {
    #[serde(flatten)]
    pub profile: VendorProfile,
    /// Pickup fields that must be filled in before the vendor can ship.
    pub missing_pickup_fields: Vec<&'static str>,
}

impl From<VendorProfile> for VendorResponse {
    fn from(profile: VendorProfile) -> Self {
        Self {
            missing_pickup_fields: profile.missing_pickup_fields(),
            profile,
        }
    }
}

/// PUT /vendors/{id} — create or replace a vendor profile.
#[tracing::instrument(skip(state, req))]
pub async fn upsert<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<VendorRequest>,
) -> Result<Json<VendorResponse>, ApiError> {
    let vendor_id: VendorId = parse_id(&id, "vendor id")?;
    if req.business_name.trim().is_empty() || req.email.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "business_name and email are required".to_string(),
        ));
    }
    let pincode = req.pincode.as_deref().map(Pincode::parse).transpose()?;

    let now = Utc::now();
    let created_at = state
        .store
        .get_vendor(vendor_id)
        .await?
        .map_or(now, |existing| existing.created_at);

    let profile = VendorProfile {
        id: vendor_id,
        business_name: req.business_name,
        email: req.email,
        phone: req.phone,
        address: req.address,
        city: req.city,
        state: req.state,
        pincode,
        pickup_location: req.pickup_location,
        created_at,
        updated_at: now,
    };
    state.store.save_vendor(&profile).await?;

    let response = VendorResponse::from(profile);
    if !response.missing_pickup_fields.is_empty() {
        tracing::warn!(
            %vendor_id,
            missing = ?response.missing_pickup_fields,
            "vendor saved without a complete pickup address"
        );
    }
    Ok(Json(response))
}

/// GET /vendors/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<VendorResponse>, ApiError> {
    let vendor_id: VendorId = parse_id(&id, "vendor id")?;
    let profile = state
        .store
        .get_vendor(vendor_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Vendor {id} not found")))?;
    Ok(Json(profile.into()))
}

/// PUT /vendors/{id}/pincodes — bulk upsert of a vendor's delivery list.
#[tracing::instrument(skip(state, records), fields(records = records.len()))]
pub async fn upsert_pincodes<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(records): Json<Vec<VendorPincodeRequest>>,
) -> Result<Json<UpsertResponse>, ApiError> {
    let vendor_id: VendorId = parse_id(&id, "vendor id")?;
    if state.store.get_vendor(vendor_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Vendor {id} not found")));
    }

    let records = records
        .into_iter()
        .map(|r| -> Result<VendorPincode, ApiError> {
            Ok(VendorPincode {
                vendor_id,
                pincode: Pincode::parse(&r.pincode)?,
                area: r.area,
                cod_available: r.cod_available,
                max_order_value: r.max_order_value_paise.map(Money::from_paise),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let upserted = state.store.upsert_vendor_pincodes(&records).await?;
    Ok(Json(UpsertResponse { upserted }))
}
