//! Cart to order conversion.

use chrono::Utc;
use domain::{Order, Owner, PaymentMethod, ShippingAddress};
use store::{CartStore, OrderStore, PincodeStore};

use crate::error::{FulfillmentError, Result};
use crate::serviceability::ServiceabilityService;

/// Everything a customer submits at checkout besides the cart itself.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub owner: Owner,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    /// Overrides the email stored on the cart.
    pub contact_email: Option<String>,
}

/// Places orders from carts.
#[derive(Clone)]
pub struct CheckoutService<S> {
    store: S,
    serviceability: ServiceabilityService<S>,
}

impl<S> CheckoutService<S>
where
    S: CartStore + OrderStore + PincodeStore + Clone,
{
    pub fn new(store: S) -> Self {
        Self {
            serviceability: ServiceabilityService::new(store.clone()),
            store,
        }
    }

    /// Checks serviceability for every vendor in the owner's cart, places
    /// the order and empties the cart.
    ///
    /// Nothing is written unless every vendor can deliver.
    #[tracing::instrument(skip(self, request), fields(owner = %request.owner))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<Order> {
        let mut cart = self
            .store
            .get_cart(&request.owner)
            .await?
            .filter(|cart| !cart.is_empty())
            .ok_or(FulfillmentError::EmptyCart)?;

        let pincode = request.shipping_address.pincode.clone();
        let unserviceable = self
            .serviceability
            .check_cart(&cart, &pincode, request.payment_method)
            .await?;
        if !unserviceable.is_empty() {
            tracing::info!(
                %pincode,
                vendors = unserviceable.len(),
                "checkout refused, vendors cannot deliver"
            );
            metrics::counter!("checkouts_total", "outcome" => "unserviceable").increment(1);
            return Err(FulfillmentError::Unserviceable {
                pincode,
                vendors: unserviceable,
            });
        }

        let order = cart.checkout(
            request.shipping_address,
            request.payment_method,
            request.contact_email,
            Utc::now(),
        )?;

        if let Err(e) = self.store.place_order(&order, &cart).await {
            metrics::counter!("checkouts_total", "outcome" => "error").increment(1);
            return Err(e.into());
        }

        metrics::counter!("checkouts_total", "outcome" => "placed").increment(1);
        tracing::info!(
            order_id = %order.id(),
            vendors = order.vendor_ids().len(),
            total = %order.total_amount(),
            "order placed"
        );
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, Pincode, UserId, VendorId};
    use domain::{Cart, CartError, CartItem, OrderStatus, PlatformPincode, VendorPincode};
    use store::InMemoryStore;

    fn address(code: &str) -> ShippingAddress {
        ShippingAddress {
            name: "Gurpreet".to_string(),
            phone: "9888800000".to_string(),
            address_line1: "12 Mall Road".to_string(),
            address_line2: None,
            city: "Amritsar".to_string(),
            state: "Punjab".to_string(),
            pincode: Pincode::parse(code).unwrap(),
            country: "India".to_string(),
        }
    }

    async fn setup(vendor: VendorId) -> (InMemoryStore, Owner) {
        let store = InMemoryStore::new();
        let pin = Pincode::parse("143001").unwrap();
        store
            .upsert_platform_pincodes(&[PlatformPincode {
                pincode: pin.clone(),
                area: "Amritsar GPO".to_string(),
                district: None,
                state: None,
                courier: None,
                cod_available: false,
                zone: None,
            }])
            .await
            .unwrap();
        store
            .upsert_vendor_pincodes(&[VendorPincode {
                vendor_id: vendor,
                pincode: pin,
                area: String::new(),
                cod_available: false,
                max_order_value: None,
            }])
            .await
            .unwrap();

        let owner = Owner::User(UserId::new());
        let mut cart = Cart::new(owner.clone(), Utc::now());
        cart.add_item(CartItem::new("P", "Phulkari", vendor, Money::from_rupees(1500), 1), Utc::now())
            .unwrap();
        cart.set_contact_email("gurpreet@example.com", Utc::now());
        store.save_cart(&cart).await.unwrap();
        (store, owner)
    }

    fn request(owner: &Owner, code: &str, payment_method: PaymentMethod) -> CheckoutRequest {
        CheckoutRequest {
            owner: owner.clone(),
            shipping_address: address(code),
            payment_method,
            contact_email: None,
        }
    }

    #[tokio::test]
    async fn test_checkout_places_order_and_clears_cart() {
        let vendor = VendorId::new();
        let (store, owner) = setup(vendor).await;
        let service = CheckoutService::new(store.clone());

        let order = service
            .checkout(request(&owner, "143001", PaymentMethod::Prepaid))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total_amount(), Money::from_rupees(1500));
        assert_eq!(order.contact_email(), "gurpreet@example.com");
        assert!(store.get_order(order.id()).await.unwrap().is_some());
        assert!(store.get_cart(&owner).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unserviceable_pincode_writes_nothing() {
        let vendor = VendorId::new();
        let (store, owner) = setup(vendor).await;
        let service = CheckoutService::new(store.clone());

        let result = service
            .checkout(request(&owner, "110001", PaymentMethod::Prepaid))
            .await;

        match result {
            Err(FulfillmentError::Unserviceable { vendors, .. }) => {
                assert_eq!(vendors.len(), 1);
                assert_eq!(vendors[0].vendor_id, vendor);
            }
            other => panic!("expected Unserviceable, got {other:?}"),
        }
        assert_eq!(store.order_count().await, 0);
        assert!(!store.get_cart(&owner).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cart_and_places_nothing() {
        let vendor = VendorId::new();
        let (store, owner) = setup(vendor).await;
        let service = CheckoutService::new(store.clone());

        store.fail_cart_writes().await;
        let result = service
            .checkout(request(&owner, "143001", PaymentMethod::Prepaid))
            .await;
        assert!(matches!(result, Err(FulfillmentError::Store(_))));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.get_cart(&owner).await.unwrap().unwrap().total_quantity(), 1);

        // Resubmitting after the outage places exactly one order.
        store.clear_failures().await;
        service
            .checkout(request(&owner, "143001", PaymentMethod::Prepaid))
            .await
            .unwrap();
        assert_eq!(store.order_count().await, 1);
        assert!(store.get_cart(&owner).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cod_refused_where_not_offered() {
        let vendor = VendorId::new();
        let (store, owner) = setup(vendor).await;
        let service = CheckoutService::new(store);

        let result = service
            .checkout(request(&owner, "143001", PaymentMethod::Cod))
            .await;
        assert!(matches!(result, Err(FulfillmentError::Unserviceable { .. })));
    }

    #[tokio::test]
    async fn test_empty_or_missing_cart() {
        let store = InMemoryStore::new();
        let service = CheckoutService::new(store.clone());
        let owner = Owner::Session("nobody".to_string());

        let result = service
            .checkout(request(&owner, "143001", PaymentMethod::Prepaid))
            .await;
        assert!(matches!(result, Err(FulfillmentError::EmptyCart)));

        store.save_cart(&Cart::new(owner.clone(), Utc::now())).await.unwrap();
        let result = service
            .checkout(request(&owner, "143001", PaymentMethod::Prepaid))
            .await;
        assert!(matches!(result, Err(FulfillmentError::EmptyCart)));
    }

    #[tokio::test]
    async fn test_missing_contact_email() {
        let vendor = VendorId::new();
        let (store, _) = setup(vendor).await;
        let owner = Owner::Session("guest".to_string());
        let mut cart = Cart::new(owner.clone(), Utc::now());
        cart.add_item(CartItem::new("P", "Phulkari", vendor, Money::from_rupees(10), 1), Utc::now())
            .unwrap();
        store.save_cart(&cart).await.unwrap();

        let result = CheckoutService::new(store)
            .checkout(request(&owner, "143001", PaymentMethod::Prepaid))
            .await;
        assert!(matches!(
            result,
            Err(FulfillmentError::Cart(CartError::MissingContactEmail))
        ));
    }
}
