//! Pincode serviceability lookups against the stored lists.

use common::{Money, Pincode, VendorId};
use domain::{Cart, PaymentMethod, ServiceabilityQuery, ServiceabilityVerdict, check_serviceability};
use store::PincodeStore;

use crate::error::{Result, UnserviceableVendor};

/// Answers "can this ship to that pincode" from the platform and vendor lists.
#[derive(Clone)]
pub struct ServiceabilityService<S> {
    store: S,
}

impl<S: PincodeStore> ServiceabilityService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self), fields(pincode = %query.pincode))]
    pub async fn check(&self, query: &ServiceabilityQuery) -> Result<ServiceabilityVerdict> {
        let platform = self.store.platform_pincodes(&query.pincode).await?;
        let vendor = match query.vendor_id {
            Some(vendor_id) => self.store.vendor_pincodes(vendor_id, &query.pincode).await?,
            None => Vec::new(),
        };

        let verdict = check_serviceability(&platform, &vendor, query);
        tracing::debug!(
            serviceable = verdict.serviceable,
            cod_available = verdict.cod_available,
            "serviceability checked"
        );
        Ok(verdict)
    }

    /// Checks every vendor in the cart against the delivery pincode.
    ///
    /// For COD the vendor's share of the cart is the order value compared
    /// with its COD limit. Returns the vendors that cannot deliver.
    pub async fn check_cart(
        &self,
        cart: &Cart,
        pincode: &Pincode,
        payment_method: PaymentMethod,
    ) -> Result<Vec<UnserviceableVendor>> {
        let mut unserviceable = Vec::new();

        for vendor_id in cart.vendor_ids() {
            let mut query = ServiceabilityQuery::new(pincode.clone()).for_vendor(vendor_id);
            if payment_method.is_cod() {
                query = query.with_cod(Some(vendor_share(cart, vendor_id)));
            }

            let verdict = self.check(&query).await?;
            if let Some(issue) = verdict.issue {
                unserviceable.push(UnserviceableVendor {
                    vendor_id,
                    pincode: pincode.clone(),
                    issue,
                });
            }
        }

        Ok(unserviceable)
    }
}

fn vendor_share(cart: &Cart, vendor_id: VendorId) -> Money {
    cart.items()
        .iter()
        .filter(|item| item.vendor_id == vendor_id)
        .map(|item| item.total_price())
        .sum()
}
