//! Pincode serviceability lookups and the platform pincode list.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use common::{Money, Pincode, VendorId};
use domain::{PlatformPincode, ServiceabilityQuery, ServiceabilityVerdict};
use serde::{Deserialize, Serialize};
use store::Store;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ServiceabilityParams {
    pub pincode: String,
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub cod: bool,
    pub order_value_paise: Option<i64>,
}

#[derive(Serialize)]
pub struct UpsertResponse {
    pub upserted: usize,
}

/// GET /serviceability — can the platform (and optionally a vendor) deliver here?
#[tracing::instrument(skip(state))]
pub async fn check<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ServiceabilityParams>,
) -> Result<Json<ServiceabilityVerdict>, ApiError> {
    let mut query = ServiceabilityQuery::new(Pincode::parse(&params.pincode)?);
    if let Some(vendor_id) = params.vendor_id.as_deref() {
        query = query.for_vendor(parse_id::<VendorId>(vendor_id, "vendor_id")?);
    }
    if params.cod {
        query = query.with_cod(params.order_value_paise.map(Money::from_paise));
    }

    Ok(Json(state.serviceability.check(&query).await?))
}

/// PUT /pincodes — bulk upsert of the platform pincode list.
#[tracing::instrument(skip(state, records), fields(records = records.len()))]
pub async fn upsert_platform<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(records): Json<Vec<PlatformPincode>>,
) -> Result<Json<UpsertResponse>, ApiError> {
    let upserted = state.store.upsert_platform_pincodes(&records).await?;
    tracing::info!(upserted, "platform pincodes upserted");
    Ok(Json(UpsertResponse { upserted }))
}
