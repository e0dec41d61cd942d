//! Pincode serviceability rules.
//!
//! Two independent allow-lists decide whether an order can ship to a postal
//! code: the platform list (what the carrier network reaches) and each
//! vendor's own list. The platform list is the ceiling; a vendor list can only
//! narrow it.

use common::{Money, Pincode, VendorId};
use serde::{Deserialize, Serialize};

/// A postal area the carrier network reaches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformPincode {
    pub pincode: Pincode,
    /// Post office or locality; several areas can share one pincode.
    pub area: String,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub courier: Option<String>,
    pub cod_available: bool,
    #[serde(default)]
    pub zone: Option<String>,
}

/// A postal area a vendor agrees to ship to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorPincode {
    pub vendor_id: VendorId,
    pub pincode: Pincode,
    #[serde(default)]
    pub area: String,
    pub cod_available: bool,
    /// Highest order value the vendor accepts cash on delivery for.
    #[serde(default)]
    pub max_order_value: Option<Money>,
}

/// "Can this order ship to `pincode`?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceabilityQuery {
    pub pincode: Pincode,
    pub vendor_id: Option<VendorId>,
    pub cod: bool,
    pub order_value: Option<Money>,
}

impl ServiceabilityQuery {
    pub fn new(pincode: Pincode) -> Self {
        Self {
            pincode,
            vendor_id: None,
            cod: false,
            order_value: None,
        }
    }

    pub fn for_vendor(mut self, vendor_id: VendorId) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    pub fn with_cod(mut self, order_value: Option<Money>) -> Self {
        self.cod = true;
        self.order_value = order_value;
        self
    }
}

/// Why a query was not satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceabilityIssue {
    /// The carrier network does not reach the pincode.
    NotOnPlatform,
    /// The vendor does not ship to the pincode.
    OutsideVendorArea,
    /// Cash on delivery is not offered at the pincode.
    CodUnavailable,
    /// Cash on delivery is offered, but not for an order this large.
    CodLimitExceeded,
}

impl ServiceabilityIssue {
    pub fn describe(&self) -> &'static str {
        match self {
            ServiceabilityIssue::NotOnPlatform => "pincode is not serviceable",
            ServiceabilityIssue::OutsideVendorArea => "vendor does not deliver to this pincode",
            ServiceabilityIssue::CodUnavailable => "cash on delivery is not available",
            ServiceabilityIssue::CodLimitExceeded => "order value exceeds the cash on delivery limit",
        }
    }
}

/// Result of a serviceability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceabilityVerdict {
    pub pincode: Pincode,
    pub vendor_id: Option<VendorId>,
    pub serviceable: bool,
    pub cod_available: bool,
    pub zone: Option<String>,
    pub courier: Option<String>,
    pub issue: Option<ServiceabilityIssue>,
}

impl ServiceabilityVerdict {
    /// True when the pincode is serviceable and, if COD was asked for, COD is available.
    pub fn is_satisfied(&self) -> bool {
        self.issue.is_none()
    }
}

/// Evaluates a query against the platform records and the vendor's records
/// for the queried pincode.
///
/// Records for other pincodes are ignored, so callers may pass whole lists.
pub fn check_serviceability(
    platform: &[PlatformPincode],
    vendor: &[VendorPincode],
    query: &ServiceabilityQuery,
) -> ServiceabilityVerdict {
    let platform: Vec<&PlatformPincode> = platform
        .iter()
        .filter(|record| record.pincode == query.pincode)
        .collect();
    let vendor: Vec<&VendorPincode> = vendor
        .iter()
        .filter(|record| record.pincode == query.pincode)
        .filter(|record| query.vendor_id.is_none_or(|id| record.vendor_id == id))
        .collect();

    let on_platform = !platform.is_empty();
    let in_vendor_area = query.vendor_id.is_none() || !vendor.is_empty();
    let serviceable = on_platform && in_vendor_area;

    let platform_cod = platform.iter().any(|record| record.cod_available);
    let (vendor_cod, vendor_cod_within_limit) = if query.vendor_id.is_none() {
        (true, true)
    } else {
        let offers = vendor.iter().any(|record| record.cod_available);
        let within_limit = vendor.iter().any(|record| {
            record.cod_available
                && match (record.max_order_value, query.order_value) {
                    (Some(max), Some(value)) => value <= max,
                    _ => true,
                }
        });
        (offers, within_limit)
    };
    let cod_available = serviceable && platform_cod && vendor_cod && vendor_cod_within_limit;

    let issue = if !on_platform {
        Some(ServiceabilityIssue::NotOnPlatform)
    } else if !in_vendor_area {
        Some(ServiceabilityIssue::OutsideVendorArea)
    } else if query.cod && !(platform_cod && vendor_cod) {
        Some(ServiceabilityIssue::CodUnavailable)
    } else if query.cod && !vendor_cod_within_limit {
        Some(ServiceabilityIssue::CodLimitExceeded)
    } else {
        None
    };

    let first = platform.first();
    ServiceabilityVerdict {
        pincode: query.pincode.clone(),
        vendor_id: query.vendor_id,
        serviceable,
        cod_available,
        zone: first.and_then(|record| record.zone.clone()),
        courier: first.and_then(|record| record.courier.clone()),
        issue,
    }
}
