//! Shiprocket order-create client.

use async_trait::async_trait;
use domain::ShipmentRequest;
use serde::Serialize;
use serde_json::Value;

use super::{CarrierClient, CarrierError, CarrierOrder};

const CREATE_ORDER_PATH: &str = "/v1/external/orders/create/adhoc";

// Parcel dimensions in cm; vendors do not record them per product.
const DEFAULT_LENGTH_CM: f64 = 10.0;
const DEFAULT_BREADTH_CM: f64 = 10.0;
const DEFAULT_HEIGHT_CM: f64 = 10.0;

/// Shiprocket REST client.
#[derive(Debug, Clone)]
pub struct ShiprocketClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl ShiprocketClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://apiv2.shiprocket.in";

    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_token)
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
        }
    }

    /// Builds the order-create body for one vendor group.
    pub fn payload(request: &ShipmentRequest) -> CreateOrderPayload {
        let delivery = &request.delivery;
        let pickup = &request.pickup;
        let weight_kg = f64::from(request.group.total_weight_grams()) / 1000.0;

        CreateOrderPayload {
            order_id: request.channel_order_id.clone(),
            order_date: request.order_date.format("%Y-%m-%d %H:%M").to_string(),
            pickup_location: pickup.location_name.clone(),
            comment: format!("Marketplace order {}", request.order_id),
            billing_customer_name: delivery.name.clone(),
            billing_last_name: String::new(),
            billing_address: delivery.address_line1.clone(),
            billing_address_2: delivery.address_line2.clone().unwrap_or_default(),
            billing_city: delivery.city.clone(),
            billing_pincode: delivery.pincode.to_string(),
            billing_state: delivery.state.clone(),
            billing_country: delivery.country.clone(),
            billing_email: request.contact_email.clone(),
            billing_phone: delivery.phone.clone(),
            shipping_is_billing: true,
            order_items: request
                .group
                .items
                .iter()
                .map(|item| OrderItemPayload {
                    name: item.product_name.clone(),
                    sku: item.sku.clone(),
                    units: item.quantity,
                    selling_price: item.unit_price.as_rupees(),
                    discount: 0.0,
                    tax: 0.0,
                })
                .collect(),
            payment_method: request.payment_method.as_str().to_string(),
            shipping_charges: 0.0,
            total_discount: 0.0,
            sub_total: request.sub_total().as_rupees(),
            length: DEFAULT_LENGTH_CM,
            breadth: DEFAULT_BREADTH_CM,
            height: DEFAULT_HEIGHT_CM,
            weight: weight_kg,
            vendor_details: VendorDetailsPayload {
                email: pickup.email.clone(),
                phone: pickup.phone.clone(),
                name: pickup.contact_name.clone(),
                address: pickup.address.clone(),
                address_2: String::new(),
                city: pickup.city.clone(),
                state: pickup.state.clone(),
                country: pickup.country.clone(),
                pin_code: pickup.pincode.to_string(),
                pickup_location: pickup.location_name.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderPayload {
    pub order_id: String,
    pub order_date: String,
    pub pickup_location: String,
    pub comment: String,
    pub billing_customer_name: String,
    pub billing_last_name: String,
    pub billing_address: String,
    pub billing_address_2: String,
    pub billing_city: String,
    pub billing_pincode: String,
    pub billing_state: String,
    pub billing_country: String,
    pub billing_email: String,
    pub billing_phone: String,
    pub shipping_is_billing: bool,
    pub order_items: Vec<OrderItemPayload>,
    pub payment_method: String,
    pub shipping_charges: f64,
    pub total_discount: f64,
    pub sub_total: f64,
    pub length: f64,
    pub breadth: f64,
    pub height: f64,
    pub weight: f64,
    pub vendor_details: VendorDetailsPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemPayload {
    pub name: String,
    pub sku: String,
    pub units: u32,
    pub selling_price: f64,
    pub discount: f64,
    pub tax: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VendorDetailsPayload {
    pub email: String,
    pub phone: String,
    pub name: String,
    pub address: String,
    pub address_2: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub pin_code: String,
    pub pickup_location: String,
}

/// Reads an id that Shiprocket may send as a number or a string.
fn id_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn text_field(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_response(body: &str) -> Result<CarrierOrder, CarrierError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| CarrierError::InvalidResponse(format!("{e}; body={body}")))?;

    let carrier_order_id = id_field(&json, "order_id")
        .ok_or_else(|| CarrierError::InvalidResponse(format!("missing order_id; body={body}")))?;
    let shipment_id = id_field(&json, "shipment_id")
        .ok_or_else(|| CarrierError::InvalidResponse(format!("missing shipment_id; body={body}")))?;

    Ok(CarrierOrder {
        carrier_order_id,
        shipment_id,
        status: text_field(&json, "status").unwrap_or_else(|| "NEW".to_string()),
        awb_code: id_field(&json, "awb_code"),
        courier_name: text_field(&json, "courier_name"),
    })
}

#[async_trait]
impl CarrierClient for ShiprocketClient {
    fn name(&self) -> &str {
        "shiprocket"
    }

    #[tracing::instrument(
        skip(self, request),
        fields(order_id = %request.order_id, vendor_id = %request.vendor_id())
    )]
    async fn create_order(&self, request: &ShipmentRequest) -> Result<CarrierOrder, CarrierError> {
        let payload = Self::payload(request);

        let resp = self
            .http
            .post(format!("{}{CREATE_ORDER_PATH}", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CarrierError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| CarrierError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), %body, "Shiprocket refused order");
            return Err(CarrierError::from_status(status.as_u16(), body));
        }

        let order = parse_response(&body)?;
        tracing::info!(
            carrier_order_id = %order.carrier_order_id,
            shipment_id = %order.shipment_id,
            "Shiprocket order created"
        );
        Ok(order)
    }
}
