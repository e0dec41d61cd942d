//! Vendor profiles and their carrier pickup identity.

use chrono::{DateTime, Utc};
use common::{Pincode, VendorId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a vendor cannot be used for shipping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VendorError {
    #[error("Vendor {0} has no profile")]
    NotFound(VendorId),

    #[error("Vendor {vendor_id} pickup address is incomplete: missing {}", missing.join(", "))]
    IncompleteAddress {
        vendor_id: VendorId,
        missing: Vec<&'static str>,
    },
}

/// A seller on the marketplace.
///
/// Address fields are optional because vendors onboard before completing
/// their warehouse details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProfile {
    pub id: VendorId,
    pub business_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub pincode: Option<Pincode>,
    /// Name of the pickup location registered with the carrier.
    #[serde(default)]
    pub pickup_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Complete warehouse address used once per vendor group when creating a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupAddress {
    pub vendor_id: VendorId,
    pub location_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: Pincode,
    pub country: String,
}

impl VendorProfile {
    pub fn new(business_name: impl Into<String>, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: VendorId::new(),
            business_name: business_name.into(),
            email: email.into(),
            phone: None,
            address: None,
            city: None,
            state: None,
            pincode: None,
            pickup_location: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the mandatory pickup fields that are absent or blank.
    pub fn missing_pickup_fields(&self) -> Vec<&'static str> {
        fn blank(value: &Option<String>) -> bool {
            value.as_deref().is_none_or(|v| v.trim().is_empty())
        }

        let mut missing = Vec::new();
        if blank(&self.phone) {
            missing.push("phone");
        }
        if blank(&self.address) {
            missing.push("address");
        }
        if blank(&self.city) {
            missing.push("city");
        }
        if blank(&self.state) {
            missing.push("state");
        }
        if self.pincode.is_none() {
            missing.push("zip");
        }
        missing
    }

    /// Builds the carrier pickup address, or reports which fields are missing.
    pub fn pickup_address(&self) -> Result<PickupAddress, VendorError> {
        let missing = self.missing_pickup_fields();
        if !missing.is_empty() {
            return Err(VendorError::IncompleteAddress {
                vendor_id: self.id,
                missing,
            });
        }

        let field = |value: &Option<String>| value.as_deref().unwrap_or_default().trim().to_string();
        let location_name = self
            .pickup_location
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("vendor-{}", self.id.short()));

        Ok(PickupAddress {
            vendor_id: self.id,
            location_name,
            contact_name: self.business_name.clone(),
            email: self.email.clone(),
            phone: field(&self.phone),
            address: field(&self.address),
            city: field(&self.city),
            state: field(&self.state),
            pincode: self.pincode.clone().ok_or(VendorError::IncompleteAddress {
                vendor_id: self.id,
                missing: vec!["zip"],
            })?,
            country: "India".to_string(),
        })
    }
}
