//! Carrier integration: one shipment per vendor group.

mod memory;
mod shiprocket;

use std::time::Duration;

use async_trait::async_trait;
use domain::{CarrierRef, ShipmentRequest};
use thiserror::Error;

use crate::retry::Transient;

pub use memory::InMemoryCarrier;
pub use shiprocket::{CreateOrderPayload, ShiprocketClient};

/// What the carrier returned for a created shipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierOrder {
    pub carrier_order_id: String,
    pub shipment_id: String,
    pub status: String,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
}

impl CarrierOrder {
    pub fn carrier_ref(&self) -> CarrierRef {
        CarrierRef {
            carrier_order_id: self.carrier_order_id.clone(),
            shipment_id: self.shipment_id.clone(),
            awb_code: self.awb_code.clone(),
            courier_name: self.courier_name.clone(),
        }
    }
}

/// Errors returned by a carrier.
///
/// `Timeout`, `Transport` and `Unavailable` are transient. The rest mean the
/// carrier will keep refusing this shipment until someone fixes it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CarrierError {
    #[error("carrier call timed out after {0:?}")]
    Timeout(Duration),

    #[error("carrier transport error: {0}")]
    Transport(String),

    /// Rate limited or a server-side error.
    #[error("carrier unavailable (status {status}): {body}")]
    Unavailable { status: u16, body: String },

    /// Validation failure: bad address, unserviceable pincode, duplicate order id.
    #[error("carrier rejected the shipment (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("carrier refused the credentials (status {status})")]
    Unauthorized { status: u16 },

    #[error("invalid carrier response: {0}")]
    InvalidResponse(String),
}

impl CarrierError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CarrierError::Timeout(_) | CarrierError::Transport(_) | CarrierError::Unavailable { .. }
        )
    }

    /// Maps an HTTP error status onto the taxonomy.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => CarrierError::Unauthorized { status },
            429 | 500..=599 => CarrierError::Unavailable { status, body },
            _ => CarrierError::Rejected {
                status,
                message: body,
            },
        }
    }
}

impl Transient for CarrierError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

/// A shipping carrier that can create one shipment per request.
#[async_trait]
pub trait CarrierClient: Send + Sync {
    /// Carrier name for logs and metrics labels.
    fn name(&self) -> &str;

    /// Creates the carrier order for one vendor group.
    async fn create_order(&self, request: &ShipmentRequest) -> Result<CarrierOrder, CarrierError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            CarrierError::from_status(422, "bad pincode".into()),
            CarrierError::Rejected { status: 422, .. }
        ));
        assert!(matches!(
            CarrierError::from_status(404, String::new()),
            CarrierError::Rejected { .. }
        ));
        assert!(matches!(
            CarrierError::from_status(401, String::new()),
            CarrierError::Unauthorized { status: 401 }
        ));
        assert!(CarrierError::from_status(429, String::new()).is_retryable());
        assert!(CarrierError::from_status(503, String::new()).is_retryable());
        assert!(!CarrierError::from_status(400, String::new()).is_retryable());
    }

    #[test]
    fn test_transient_errors() {
        assert!(CarrierError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(CarrierError::Transport("reset".into()).is_retryable());
        assert!(!CarrierError::InvalidResponse("no id".into()).is_retryable());
    }
}
