use std::collections::HashMap;

use async_trait::async_trait;
use common::{
    CatalogItemId, CustomerId, Money, NotificationId, NotificationKind, OrderCode, OrderId,
    OrderStatus, SubscriptionId,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions, postgres::PgRow};

use crate::{
    CatalogItem, ContactInfo, NewNotification, NewOrder, NewOrderItem, NewRestockSubscription,
    Notification, OrderDetails, OrderItemRecord, OrderRecord, RestockSubscription, Result,
    StoreError,
    store::{Store, UnitOfWork},
};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool against `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        tracing::info!("Running database migrations");
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Adds a catalog item, standing in for the catalog collaborator.
    pub async fn seed_catalog_item(&self, name: &str, stock: i32) -> Result<CatalogItem> {
        let row = sqlx::query(
            "INSERT INTO catalog_items (name, stock) VALUES ($1, $2) RETURNING id, name, stock",
        )
        .bind(name)
        .bind(stock)
        .fetch_one(&self.pool)
        .await?;
        row_to_catalog_item(row)
    }

    async fn attach_items(&self, orders: Vec<OrderRecord>) -> Result<Vec<OrderDetails>> {
        let ids: Vec<i64> = orders.iter().map(|o| o.id.as_i64()).collect();
        let rows = sqlx::query(
            r#"
            SELECT oi.order_id, oi.item_id, c.name AS item_name, oi.quantity, oi.unit_price_cents
            FROM order_items oi
            LEFT JOIN catalog_items c ON c.id = oi.item_id
            WHERE oi.order_id = ANY($1)
            ORDER BY oi.id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderItemRecord>> = HashMap::new();
        for row in rows {
            let item = row_to_order_item(row)?;
            by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| OrderDetails {
                items: by_order.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect())
    }
}

fn quantity_param(quantity: u32) -> Option<i32> {
    i32::try_from(quantity).ok()
}

fn row_to_catalog_item(row: PgRow) -> Result<CatalogItem> {
    Ok(CatalogItem {
        id: CatalogItemId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        stock: row.try_get("stock")?,
    })
}

fn row_to_order(row: PgRow) -> Result<OrderRecord> {
    let status: String = row.try_get("status")?;
    Ok(OrderRecord {
        id: OrderId::new(row.try_get("id")?),
        code: OrderCode::new(row.try_get::<String, _>("external_code")?),
        customer_id: CustomerId::new(row.try_get("customer_id")?),
        total: Money::from_cents(row.try_get("total_amount_cents")?),
        status: status.parse()?,
        payment_method: row.try_get("payment_method")?,
        contact: ContactInfo {
            full_name: row.try_get("shipping_full_name")?,
            email: row.try_get("shipping_email")?,
            phone: row.try_get("shipping_phone")?,
            address: row.try_get("shipping_address")?,
            city: row.try_get("shipping_city")?,
            postal_code: row.try_get("shipping_postal_code")?,
        },
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_order_item(row: PgRow) -> Result<OrderItemRecord> {
    let quantity: i32 = row.try_get("quantity")?;
    Ok(OrderItemRecord {
        order_id: OrderId::new(row.try_get("order_id")?),
        item_id: CatalogItemId::new(row.try_get("item_id")?),
        item_name: row.try_get("item_name")?,
        quantity: u32::try_from(quantity)
            .map_err(|_| StoreError::Decode(format!("negative quantity {quantity}")))?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

fn row_to_notification(row: PgRow) -> Result<Notification> {
    let kind: String = row.try_get("kind")?;
    let priority: String = row.try_get("priority")?;
    Ok(Notification {
        id: NotificationId::new(row.try_get("id")?),
        kind: kind.parse()?,
        item_id: CatalogItemId::new(row.try_get("item_id")?),
        message: row.try_get("message")?,
        priority: priority.parse()?,
        read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_subscription(row: PgRow) -> Result<RestockSubscription> {
    Ok(RestockSubscription {
        id: SubscriptionId::new(row.try_get("id")?),
        customer_id: CustomerId::new(row.try_get("customer_id")?),
        item_id: CatalogItemId::new(row.try_get("item_id")?),
        email: row.try_get("email")?,
        notified: row.try_get("notified")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn get_catalog_item(&self, item_id: CatalogItemId) -> Result<Option<CatalogItem>> {
        sqlx::query("SELECT id, name, stock FROM catalog_items WHERE id = $1")
            .bind(item_id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_catalog_item)
            .transpose()
    }

    async fn find_catalog_items(&self, item_ids: &[CatalogItemId]) -> Result<Vec<CatalogItem>> {
        let ids: Vec<i64> = item_ids.iter().map(|id| id.as_i64()).collect();
        let rows =
            sqlx::query("SELECT id, name, stock FROM catalog_items WHERE id = ANY($1) ORDER BY id")
                .bind(&ids)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(row_to_catalog_item).collect()
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        sqlx::query(
            r#"
            SELECT id, external_code, customer_id, total_amount_cents, status, payment_method,
                   shipping_full_name, shipping_email, shipping_phone, shipping_address,
                   shipping_city, shipping_postal_code, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_order)
        .transpose()
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT oi.order_id, oi.item_id, c.name AS item_name, oi.quantity, oi.unit_price_cents
            FROM order_items oi
            LEFT JOIN catalog_items c ON c.id = oi.item_id
            WHERE oi.order_id = $1
            ORDER BY oi.id ASC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_order_item).collect()
    }

    async fn list_orders_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<OrderDetails>> {
        let rows = sqlx::query(
            r#"
            SELECT id, external_code, customer_id, total_amount_cents, status, payment_method,
                   shipping_full_name, shipping_email, shipping_phone, shipping_address,
                   shipping_city, shipping_postal_code, created_at
            FROM orders
            WHERE customer_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(customer_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        let orders = rows
            .into_iter()
            .map(row_to_order)
            .collect::<Result<Vec<_>>>()?;
        self.attach_items(orders).await
    }

    async fn list_orders(&self) -> Result<Vec<OrderDetails>> {
        let rows = sqlx::query(
            r#"
            SELECT id, external_code, customer_id, total_amount_cents, status, payment_method,
                   shipping_full_name, shipping_email, shipping_phone, shipping_address,
                   shipping_city, shipping_postal_code, created_at
            FROM orders
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let orders = rows
            .into_iter()
            .map(row_to_order)
            .collect::<Result<Vec<_>>>()?;
        self.attach_items(orders).await
    }

    async fn find_unread_notification(
        &self,
        kind: NotificationKind,
        item_id: CatalogItemId,
    ) -> Result<Option<Notification>> {
        sqlx::query(
            r#"
            SELECT id, kind, item_id, message, priority, is_read, created_at
            FROM notifications
            WHERE kind = $1 AND item_id = $2 AND NOT is_read
            "#,
        )
        .bind(kind.as_str())
        .bind(item_id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_notification)
        .transpose()
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Option<Notification>> {
        // The partial unique index allows one unread row per (kind, item_id)
        let row = sqlx::query(
            r#"
            INSERT INTO notifications (kind, item_id, message, priority)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, item_id) WHERE NOT is_read DO NOTHING
            RETURNING id, kind, item_id, message, priority, is_read, created_at
            "#,
        )
        .bind(notification.kind.as_str())
        .bind(notification.item_id.as_i64())
        .bind(&notification.message)
        .bind(notification.priority.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if row.is_none() {
            tracing::debug!(
                kind = %notification.kind,
                item_id = %notification.item_id,
                "Unread notification already exists"
            );
        }
        row.map(row_to_notification).transpose()
    }

    async fn list_notifications(&self, unread_only: bool) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, item_id, message, priority, is_read, created_at
            FROM notifications
            WHERE NOT ($1 AND is_read)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_notification).collect()
    }

    async fn mark_notification_read(&self, notification_id: NotificationId) -> Result<bool> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(notification_id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_all_notifications_read(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE NOT is_read")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, notification_id: NotificationId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(notification_id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_unread_notifications(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE NOT is_read")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn upsert_restock_subscription(
        &self,
        subscription: NewRestockSubscription,
    ) -> Result<RestockSubscription> {
        let row = sqlx::query(
            r#"
            INSERT INTO restock_subscriptions (customer_id, item_id, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (customer_id, item_id) DO UPDATE SET
                email = EXCLUDED.email,
                notified = FALSE
            RETURNING id, customer_id, item_id, email, notified, created_at
            "#,
        )
        .bind(subscription.customer_id.as_i64())
        .bind(subscription.item_id.as_i64())
        .bind(&subscription.email)
        .fetch_one(&self.pool)
        .await?;
        row_to_subscription(row)
    }

    async fn pending_restock_subscriptions(
        &self,
        item_id: CatalogItemId,
    ) -> Result<Vec<RestockSubscription>> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, item_id, email, notified, created_at
            FROM restock_subscriptions
            WHERE item_id = $1 AND NOT notified
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(item_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_subscription).collect()
    }

    async fn mark_subscriptions_notified(
        &self,
        subscription_ids: &[SubscriptionId],
    ) -> Result<u64> {
        let ids: Vec<i64> = subscription_ids.iter().map(|id| id.as_i64()).collect();
        let result = sqlx::query(
            "UPDATE restock_subscriptions SET notified = TRUE WHERE id = ANY($1) AND NOT notified",
        )
        .bind(&ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_restock_subscriptions(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<RestockSubscription>> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, item_id, email, notified, created_at
            FROM restock_subscriptions
            WHERE customer_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(customer_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_subscription).collect()
    }

    async fn delete_restock_subscription(
        &self,
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
    ) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM restock_subscriptions WHERE id = $1 AND customer_id = $2")
                .bind(subscription_id.as_i64())
                .bind(customer_id.as_i64())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}

/// A unit of work backed by a database transaction.
///
/// Dropping the transaction without committing rolls it back.
struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO orders (external_code, customer_id, total_amount_cents, status, payment_method,
                                shipping_full_name, shipping_email, shipping_phone, shipping_address,
                                shipping_city, shipping_postal_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, external_code, customer_id, total_amount_cents, status, payment_method,
                      shipping_full_name, shipping_email, shipping_phone, shipping_address,
                      shipping_city, shipping_postal_code, created_at
            "#,
        )
        .bind(order.code.as_str())
        .bind(order.customer_id.as_i64())
        .bind(order.total.cents())
        .bind(OrderStatus::Pending.as_str())
        .bind(&order.payment_method)
        .bind(&order.contact.full_name)
        .bind(&order.contact.email)
        .bind(&order.contact.phone)
        .bind(&order.contact.address)
        .bind(&order.contact.city)
        .bind(&order.contact.postal_code)
        .fetch_one(&mut *self.tx)
        .await?;
        row_to_order(row)
    }

    async fn insert_order_items(
        &mut self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<()> {
        for item in items {
            let quantity = quantity_param(item.quantity).ok_or_else(|| {
                StoreError::Decode(format!("quantity {} out of range", item.quantity))
            })?;

            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, item_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(order_id.as_i64())
            .bind(item.item_id.as_i64())
            .bind(quantity)
            .bind(item.unit_price.cents())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("order_items_item_id_fkey")
                {
                    return StoreError::ItemNotFound(item.item_id);
                }
                StoreError::Database(e)
            })?;
        }
        Ok(())
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        sqlx::query(
            r#"
            SELECT id, external_code, customer_id, total_amount_cents, status, payment_method,
                   shipping_full_name, shipping_email, shipping_phone, shipping_address,
                   shipping_city, shipping_postal_code, created_at
            FROM orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_order)
        .transpose()
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT oi.order_id, oi.item_id, c.name AS item_name, oi.quantity, oi.unit_price_cents
            FROM order_items oi
            LEFT JOIN catalog_items c ON c.id = oi.item_id
            WHERE oi.order_id = $1
            ORDER BY oi.id ASC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(row_to_order_item).collect()
    }

    async fn compare_and_set_status(
        &mut self,
        order_id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE orders SET status = $3 WHERE id = $1 AND status = $2")
            .bind(order_id.as_i64())
            .bind(expected.as_str())
            .bind(next.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn decrement_stock(
        &mut self,
        item_id: CatalogItemId,
        quantity: u32,
    ) -> Result<Option<i32>> {
        // No i32 stock can cover a quantity beyond i32::MAX
        let Some(quantity) = quantity_param(quantity) else {
            return Ok(None);
        };

        let stock: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE catalog_items
            SET stock = stock - $2
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(item_id.as_i64())
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(stock)
    }

    async fn restore_stock(&mut self, item_id: CatalogItemId, quantity: u32) -> Result<i32> {
        let quantity = quantity_param(quantity)
            .ok_or_else(|| StoreError::Decode(format!("quantity {quantity} out of range")))?;

        let stock: Option<i32> = sqlx::query_scalar(
            "UPDATE catalog_items SET stock = stock + $2 WHERE id = $1 RETURNING stock",
        )
        .bind(item_id.as_i64())
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await?;
        stock.ok_or(StoreError::ItemNotFound(item_id))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgUnitOfWork { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
