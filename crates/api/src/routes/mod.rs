//! Route handlers, one module per resource.

pub mod cart;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod serviceability;
pub mod vendors;
pub mod webhooks;

use std::str::FromStr;

use domain::Owner;
use serde::Deserialize;

use crate::error::ApiError;

/// Identifies a cart owner: a registered user or a guest session.
#[derive(Debug, Default, Deserialize)]
pub struct OwnerParams {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl OwnerParams {
    pub fn owner(&self) -> Result<Owner, ApiError> {
        let user_id = self.user_id.as_deref().map(|id| parse_id(id, "user_id")).transpose()?;
        Owner::from_parts(user_id, self.session_id.clone())
            .ok_or_else(|| ApiError::BadRequest("user_id or session_id is required".to_string()))
    }
}

/// Parses a UUID-backed identifier from a path or body field.
pub(crate) fn parse_id<T>(raw: &str, field: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
