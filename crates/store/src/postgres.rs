use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderItemId, Pincode, UserId, VendorId};
use domain::{
    Cart, CarrierRef, DispatchState, Order, OrderItem, OrderParts, OrderStatus, Owner,
    PaymentMethod, PlatformPincode, ProductId, Shipment, ShippingAddress, VendorPincode,
    VendorProfile,
};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderQuery, Result, StoreError,
    store::{CartStore, OrderStore, PincodeStore, ShipmentStore, VendorStore},
};

const ORDER_COLUMNS: &str = "id, user_id, session_id, contact_email, status, payment_method, \
     shipping_address, total_amount_paise, created_at, updated_at, delivered_at, \
     review_requested_at, sla_alerted_at";

const SHIPMENT_COLUMNS: &str = "order_id, vendor_id, state, item_ids, sub_total_paise, \
     carrier_order_id, carrier_shipment_id, awb_code, courier_name, carrier_status, last_error, \
     attempts, version, created_at, updated_at, dispatched_at, delivered_at";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects with a small pool and returns the store.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, product_name, sku, vendor_id, quantity,
                   unit_price_paise, weight_grams
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = row.try_get("order_id")?;
            items.entry(order_id).or_default().push(Self::row_to_item(&row)?);
        }
        Ok(items)
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.try_get("id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            product_name: row.try_get("product_name")?,
            sku: row.try_get("sku")?,
            vendor_id: VendorId::from_uuid(row.try_get("vendor_id")?),
            quantity: to_u32(row.try_get("quantity")?, "quantity")?,
            unit_price: Money::from_paise(row.try_get("unit_price_paise")?),
            weight_grams: to_u32(row.try_get("weight_grams")?, "weight_grams")?,
        })
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let user_id: Option<Uuid> = row.try_get("user_id")?;
        let session_id: Option<String> = row.try_get("session_id")?;
        let id = OrderId::from_uuid(row.try_get("id")?);
        let owner = Owner::from_parts(user_id.map(UserId::from_uuid), session_id)
            .ok_or_else(|| StoreError::Corrupt(format!("order {id} has no owner")))?;
        let address: serde_json::Value = row.try_get("shipping_address")?;
        let shipping_address: ShippingAddress = serde_json::from_value(address)?;

        Ok(Order::from_parts(OrderParts {
            id,
            owner,
            contact_email: row.try_get("contact_email")?,
            status: row
                .try_get::<String, _>("status")?
                .parse::<OrderStatus>()
                .map_err(StoreError::Corrupt)?,
            items,
            shipping_address,
            payment_method: row
                .try_get::<String, _>("payment_method")?
                .parse::<PaymentMethod>()
                .map_err(StoreError::Corrupt)?,
            total_amount: Money::from_paise(row.try_get("total_amount_paise")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            delivered_at: row.try_get("delivered_at")?,
            review_requested_at: row.try_get("review_requested_at")?,
            sla_alerted_at: row.try_get("sla_alerted_at")?,
        }))
    }

    async fn rows_to_orders(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.load_items(&ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| Self::row_to_order(row, items.remove(&id).unwrap_or_default()))
            .collect()
    }

    fn row_to_cart(row: &PgRow) -> Result<Cart> {
        let owner: serde_json::Value = row.try_get("owner")?;
        let items: serde_json::Value = row.try_get("items")?;
        Ok(Cart::restore(
            serde_json::from_value(owner)?,
            serde_json::from_value(items)?,
            row.try_get("contact_email")?,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
            row.try_get("abandoned_notified_at")?,
        ))
    }

    fn row_to_vendor(row: &PgRow) -> Result<VendorProfile> {
        Ok(VendorProfile {
            id: VendorId::from_uuid(row.try_get("id")?),
            business_name: row.try_get("business_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            pincode: row
                .try_get::<Option<String>, _>("pincode")?
                .map(|p| parse_pincode(&p))
                .transpose()?,
            pickup_location: row.try_get("pickup_location")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_shipment(row: &PgRow) -> Result<Shipment> {
        let carrier_order_id: Option<String> = row.try_get("carrier_order_id")?;
        let carrier = match carrier_order_id {
            Some(carrier_order_id) => Some(CarrierRef {
                carrier_order_id,
                shipment_id: row
                    .try_get::<Option<String>, _>("carrier_shipment_id")?
                    .unwrap_or_default(),
                awb_code: row.try_get("awb_code")?,
                courier_name: row.try_get("courier_name")?,
            }),
            None => None,
        };
        let item_ids: Vec<Uuid> = row.try_get("item_ids")?;

        Ok(Shipment {
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            vendor_id: VendorId::from_uuid(row.try_get("vendor_id")?),
            state: row
                .try_get::<String, _>("state")?
                .parse::<DispatchState>()
                .map_err(StoreError::Corrupt)?,
            item_ids: item_ids.into_iter().map(OrderItemId::from_uuid).collect(),
            sub_total: Money::from_paise(row.try_get("sub_total_paise")?),
            carrier,
            carrier_status: row.try_get("carrier_status")?,
            last_error: row.try_get("last_error")?,
            attempts: to_u32(row.try_get("attempts")?, "attempts")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            dispatched_at: row.try_get("dispatched_at")?,
            delivered_at: row.try_get("delivered_at")?,
        })
    }

    async fn stored_shipment_version(&self, order_id: OrderId, vendor_id: VendorId) -> Result<i64> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM shipments WHERE order_id = $1 AND vendor_id = $2",
        )
        .bind(order_id.as_uuid())
        .bind(vendor_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(version.unwrap_or(0))
    }

    async fn insert_order_rows(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<()> {
        let address = serde_json::to_value(order.shipping_address())?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, session_id, contact_email, status, payment_method,
                                shipping_address, total_amount_paise, created_at, updated_at,
                                delivered_at, review_requested_at, sla_alerted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.owner().user_id().map(|id| id.as_uuid()))
        .bind(order.owner().session_id())
        .bind(order.contact_email())
        .bind(order.status().as_str())
        .bind(order.payment_method().as_str())
        .bind(address)
        .bind(order.total_amount().paise())
        .bind(order.created_at())
        .bind(order.updated_at())
        .bind(order.delivered_at())
        .bind(order.review_requested_at())
        .bind(order.sla_alerted_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return StoreError::DuplicateOrder(order.id());
            }
            StoreError::Database(e)
        })?;

        Self::insert_items(tx, order).await
    }

    async fn upsert_cart(conn: &mut PgConnection, cart: &Cart) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO carts (owner_key, owner, items, item_count, contact_email, created_at,
                               updated_at, abandoned_notified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (owner_key) DO UPDATE SET
                items = EXCLUDED.items,
                item_count = EXCLUDED.item_count,
                contact_email = EXCLUDED.contact_email,
                updated_at = EXCLUDED.updated_at,
                abandoned_notified_at = EXCLUDED.abandoned_notified_at
            "#,
        )
        .bind(cart.owner().to_string())
        .bind(serde_json::to_value(cart.owner())?)
        .bind(serde_json::to_value(cart.items())?)
        .bind(cart.items().len() as i32)
        .bind(cart.contact_email())
        .bind(cart.created_at())
        .bind(cart.updated_at())
        .bind(cart.abandoned_notified_at())
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn insert_items(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<()> {
        for (position, item) in order.items().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, product_id, product_name, sku,
                                         vendor_id, quantity, unit_price_paise, weight_grams)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(order.id().as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_str())
            .bind(&item.product_name)
            .bind(&item.sku)
            .bind(item.vendor_id.as_uuid())
            .bind(item.quantity as i32)
            .bind(item.unit_price.paise())
            .bind(item.weight_grams as i32)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

fn parse_pincode(raw: &str) -> Result<Pincode> {
    Pincode::parse(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_order_rows(&mut tx, order).await?;
        tx.commit().await?;

        tracing::debug!(order_id = %order.id(), items = order.items().len(), "Order inserted");
        Ok(())
    }

    async fn place_order(&self, order: &Order, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_order_rows(&mut tx, order).await?;
        Self::upsert_cart(&mut tx, cart).await?;
        tx.commit().await?;

        tracing::debug!(order_id = %order.id(), owner = %cart.owner(), "Order placed from cart");
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> =
            sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(self.rows_to_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = $3, delivered_at = $4,
                review_requested_at = $5, sla_alerted_at = $6
            WHERE id = $1
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.updated_at())
        .bind(order.delivered_at())
        .bind(order.review_requested_at())
        .bind(order.sla_alerted_at())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order.id()));
        }
        Ok(())
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        if query.statuses.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ANY(${param_count})"));
        }
        if query.created_before.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at < ${param_count}"));
        }
        if query.delivered_from.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND delivered_at >= ${param_count}"));
        }
        if query.delivered_before.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND delivered_at < ${param_count}"));
        }
        if query.without_review_request {
            sql.push_str(" AND review_requested_at IS NULL");
        }
        if query.without_sla_alert {
            sql.push_str(" AND sla_alerted_at IS NULL");
        }

        sql.push_str(" ORDER BY created_at ASC, id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(statuses) = query.statuses {
            let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
            sqlx_query = sqlx_query.bind(statuses);
        }
        if let Some(before) = query.created_before {
            sqlx_query = sqlx_query.bind(before);
        }
        if let Some(from) = query.delivered_from {
            sqlx_query = sqlx_query.bind(from);
        }
        if let Some(before) = query.delivered_before {
            sqlx_query = sqlx_query.bind(before);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        self.rows_to_orders(rows).await
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn get_cart(&self, owner: &Owner) -> Result<Option<Cart>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT owner, items, contact_email, created_at, updated_at, abandoned_notified_at
            FROM carts
            WHERE owner_key = $1
            "#,
        )
        .bind(owner.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_cart).transpose()
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_cart(&mut conn, cart).await
    }

    async fn idle_carts(&self, idle_since: DateTime<Utc>, limit: Option<usize>) -> Result<Vec<Cart>> {
        let rows = sqlx::query(
            r#"
            SELECT owner, items, contact_email, created_at, updated_at, abandoned_notified_at
            FROM carts
            WHERE item_count > 0
              AND contact_email IS NOT NULL
              AND abandoned_notified_at IS NULL
              AND updated_at <= $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(idle_since)
        .bind(limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_cart).collect()
    }
}

#[async_trait]
impl VendorStore for PostgresStore {
    async fn save_vendor(&self, vendor: &VendorProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vendors (id, business_name, email, phone, address, city, state, pincode,
                                 pickup_location, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                business_name = EXCLUDED.business_name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                address = EXCLUDED.address,
                city = EXCLUDED.city,
                state = EXCLUDED.state,
                pincode = EXCLUDED.pincode,
                pickup_location = EXCLUDED.pickup_location,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(vendor.id.as_uuid())
        .bind(&vendor.business_name)
        .bind(&vendor.email)
        .bind(&vendor.phone)
        .bind(&vendor.address)
        .bind(&vendor.city)
        .bind(&vendor.state)
        .bind(vendor.pincode.as_ref().map(|p| p.as_str()))
        .bind(&vendor.pickup_location)
        .bind(vendor.created_at)
        .bind(vendor.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_vendor(&self, id: VendorId) -> Result<Option<VendorProfile>> {
        let row: Option<PgRow> = sqlx::query("SELECT * FROM vendors WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_vendor).transpose()
    }

    async fn get_vendors(&self, ids: &[VendorId]) -> Result<HashMap<VendorId, VendorProfile>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query("SELECT * FROM vendors WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Self::row_to_vendor(row).map(|v| (v.id, v)))
            .collect()
    }
}

#[async_trait]
impl PincodeStore for PostgresStore {
    async fn upsert_platform_pincodes(&self, records: &[PlatformPincode]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO platform_pincodes (pincode, area, district, state, courier,
                                               cod_available, zone)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT ON CONSTRAINT unique_platform_pincode_area DO UPDATE SET
                    district = EXCLUDED.district,
                    state = EXCLUDED.state,
                    courier = EXCLUDED.courier,
                    cod_available = EXCLUDED.cod_available,
                    zone = EXCLUDED.zone
                "#,
            )
            .bind(record.pincode.as_str())
            .bind(&record.area)
            .bind(&record.district)
            .bind(&record.state)
            .bind(&record.courier)
            .bind(record.cod_available)
            .bind(&record.zone)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    async fn upsert_vendor_pincodes(&self, records: &[VendorPincode]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO vendor_pincodes (vendor_id, pincode, area, cod_available,
                                             max_order_value_paise)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT ON CONSTRAINT unique_vendor_pincode_area DO UPDATE SET
                    cod_available = EXCLUDED.cod_available,
                    max_order_value_paise = EXCLUDED.max_order_value_paise
                "#,
            )
            .bind(record.vendor_id.as_uuid())
            .bind(record.pincode.as_str())
            .bind(&record.area)
            .bind(record.cod_available)
            .bind(record.max_order_value.map(|m| m.paise()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    async fn platform_pincodes(&self, pincode: &Pincode) -> Result<Vec<PlatformPincode>> {
        let rows = sqlx::query(
            r#"
            SELECT pincode, area, district, state, courier, cod_available, zone
            FROM platform_pincodes
            WHERE pincode = $1
            ORDER BY area ASC
            "#,
        )
        .bind(pincode.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<PlatformPincode> {
                Ok(PlatformPincode {
                    pincode: parse_pincode(&row.try_get::<String, _>("pincode")?)?,
                    area: row.try_get("area")?,
                    district: row.try_get("district")?,
                    state: row.try_get("state")?,
                    courier: row.try_get("courier")?,
                    cod_available: row.try_get("cod_available")?,
                    zone: row.try_get("zone")?,
                })
            })
            .collect()
    }

    async fn vendor_pincodes(&self, vendor_id: VendorId, pincode: &Pincode) -> Result<Vec<VendorPincode>> {
        let rows = sqlx::query(
            r#"
            SELECT vendor_id, pincode, area, cod_available, max_order_value_paise
            FROM vendor_pincodes
            WHERE vendor_id = $1 AND pincode = $2
            ORDER BY area ASC
            "#,
        )
        .bind(vendor_id.as_uuid())
        .bind(pincode.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<VendorPincode> {
                Ok(VendorPincode {
                    vendor_id: VendorId::from_uuid(row.try_get("vendor_id")?),
                    pincode: parse_pincode(&row.try_get::<String, _>("pincode")?)?,
                    area: row.try_get("area")?,
                    cod_available: row.try_get("cod_available")?,
                    max_order_value: row
                        .try_get::<Option<i64>, _>("max_order_value_paise")?
                        .map(Money::from_paise),
                })
            })
            .collect()
    }
}

#[async_trait]
impl ShipmentStore for PostgresStore {
    async fn get_shipments(&self, order_id: OrderId) -> Result<Vec<Shipment>> {
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE order_id = $1 ORDER BY created_at ASC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_shipment).collect()
    }

    async fn get_shipment(&self, order_id: OrderId, vendor_id: VendorId) -> Result<Option<Shipment>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE order_id = $1 AND vendor_id = $2"
        ))
        .bind(order_id.as_uuid())
        .bind(vendor_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_shipment).transpose()
    }

    async fn save_shipment(&self, shipment: &Shipment) -> Result<i64> {
        let expected = shipment.version;
        let next = expected + 1;
        let item_ids: Vec<Uuid> = shipment.item_ids.iter().map(|id| id.as_uuid()).collect();
        let carrier = shipment.carrier.as_ref();

        let result = if expected == 0 {
            sqlx::query(
                r#"
                INSERT INTO shipments (order_id, vendor_id, state, item_ids, sub_total_paise,
                                       carrier_order_id, carrier_shipment_id, awb_code,
                                       courier_name, carrier_status, last_error, attempts,
                                       version, created_at, updated_at, dispatched_at,
                                       delivered_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                ON CONFLICT (order_id, vendor_id) DO NOTHING
                "#,
            )
            .bind(shipment.order_id.as_uuid())
            .bind(shipment.vendor_id.as_uuid())
            .bind(shipment.state.as_str())
            .bind(item_ids)
            .bind(shipment.sub_total.paise())
            .bind(carrier.map(|c| c.carrier_order_id.as_str()))
            .bind(carrier.map(|c| c.shipment_id.as_str()))
            .bind(carrier.and_then(|c| c.awb_code.as_deref()))
            .bind(carrier.and_then(|c| c.courier_name.as_deref()))
            .bind(&shipment.carrier_status)
            .bind(&shipment.last_error)
            .bind(shipment.attempts as i32)
            .bind(next)
            .bind(shipment.created_at)
            .bind(shipment.updated_at)
            .bind(shipment.dispatched_at)
            .bind(shipment.delivered_at)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE shipments
                SET state = $3, item_ids = $4, sub_total_paise = $5, carrier_order_id = $6,
                    carrier_shipment_id = $7, awb_code = $8, courier_name = $9,
                    carrier_status = $10, last_error = $11, attempts = $12, version = $13,
                    updated_at = $14, dispatched_at = $15, delivered_at = $16
                WHERE order_id = $1 AND vendor_id = $2 AND version = $17
                "#,
            )
            .bind(shipment.order_id.as_uuid())
            .bind(shipment.vendor_id.as_uuid())
            .bind(shipment.state.as_str())
            .bind(item_ids)
            .bind(shipment.sub_total.paise())
            .bind(carrier.map(|c| c.carrier_order_id.as_str()))
            .bind(carrier.map(|c| c.shipment_id.as_str()))
            .bind(carrier.and_then(|c| c.awb_code.as_deref()))
            .bind(carrier.and_then(|c| c.courier_name.as_deref()))
            .bind(&shipment.carrier_status)
            .bind(&shipment.last_error)
            .bind(shipment.attempts as i32)
            .bind(next)
            .bind(shipment.updated_at)
            .bind(shipment.dispatched_at)
            .bind(shipment.delivered_at)
            .bind(expected)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            let actual = self
                .stored_shipment_version(shipment.order_id, shipment.vendor_id)
                .await?;
            return Err(StoreError::ConcurrencyConflict {
                order_id: shipment.order_id,
                vendor_id: shipment.vendor_id,
                expected,
                actual,
            });
        }
        Ok(next)
    }

    async fn find_shipment_by_awb(&self, awb_code: &str) -> Result<Option<Shipment>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE awb_code = $1"
        ))
        .bind(awb_code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_shipment).transpose()
    }

    async fn shipments_in_states(
        &self,
        states: &[DispatchState],
        limit: Option<usize>,
    ) -> Result<Vec<Shipment>> {
        let states: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE state = ANY($1) \
             ORDER BY updated_at ASC LIMIT $2"
        ))
        .bind(states)
        .bind(limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_shipment).collect()
    }

    async fn dispatch_backlog(&self, states: &[DispatchState], limit: Option<usize>) -> Result<Vec<OrderId>> {
        let states: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
        let statuses: Vec<&str> = OrderStatus::ALL
            .iter()
            .filter(|status| status.can_dispatch())
            .map(|status| status.as_str())
            .collect();

        let rows = sqlx::query(
            r#"
            SELECT s.order_id, MIN(s.updated_at) AS oldest
            FROM shipments s
            JOIN orders o ON o.id = s.order_id
            WHERE s.state = ANY($1) AND o.status = ANY($2)
            GROUP BY s.order_id
            ORDER BY oldest ASC, s.order_id
            LIMIT $3
            "#,
        )
        .bind(states)
        .bind(statuses)
        .bind(limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok(OrderId::from_uuid(row.try_get("order_id")?)))
            .collect()
    }
}
