//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and truncate its tables
//! before each test, so they run serially.
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use common::{CustomerId, Money, NotificationKind, OrderCode, OrderStatus, Priority};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    ContactInfo, NewNotification, NewOrder, NewOrderItem, NewRestockSubscription, PostgresStore,
    Store, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_storefront_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_items, orders, notifications, restock_subscriptions, catalog_items \
         RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn new_order(customer: i64, total_cents: i64) -> NewOrder {
    NewOrder {
        code: OrderCode::generate(),
        customer_id: CustomerId::new(customer),
        total: Money::from_cents(total_cents),
        payment_method: "card".to_string(),
        contact: ContactInfo {
            full_name: Some("Ada Lovelace".to_string()),
            city: Some("London".to_string()),
            ..ContactInfo::default()
        },
    }
}

#[tokio::test]
#[serial]
async fn committed_order_round_trips_with_items() {
    let store = get_test_store().await;
    let lamp = store.seed_catalog_item("Lamp", 10).await.unwrap();

    let mut uow = store.begin().await.unwrap();
    let order = uow.insert_order(new_order(7, 2_500)).await.unwrap();
    uow.insert_order_items(
        order.id,
        &[NewOrderItem {
            item_id: lamp.id,
            quantity: 2,
            unit_price: Money::from_cents(1_250),
        }],
    )
    .await
    .unwrap();
    assert_eq!(uow.decrement_stock(lamp.id, 2).await.unwrap(), Some(8));
    uow.commit().await.unwrap();

    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.total, Money::from_cents(2_500));
    assert_eq!(stored.contact.city.as_deref(), Some("London"));

    let items = store.get_order_items(order.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item_name.as_deref(), Some("Lamp"));
    assert_eq!(items[0].line_total(), Money::from_cents(2_500));

    let mine = store
        .list_orders_for_customer(CustomerId::new(7))
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].items.len(), 1);
    assert_eq!(
        store.get_catalog_item(lamp.id).await.unwrap().unwrap().stock,
        8
    );
}

#[tokio::test]
#[serial]
async fn rolled_back_unit_leaves_no_rows() {
    let store = get_test_store().await;
    let lamp = store.seed_catalog_item("Lamp", 3).await.unwrap();

    let mut uow = store.begin().await.unwrap();
    let order = uow.insert_order(new_order(1, 100)).await.unwrap();
    uow.decrement_stock(lamp.id, 3).await.unwrap();
    uow.rollback().await.unwrap();

    assert!(store.get_order(order.id).await.unwrap().is_none());
    assert_eq!(
        store.get_catalog_item(lamp.id).await.unwrap().unwrap().stock,
        3
    );
}

#[tokio::test]
#[serial]
async fn decrement_refuses_more_than_on_hand() {
    let store = get_test_store().await;
    let lamp = store.seed_catalog_item("Lamp", 2).await.unwrap();

    let mut uow = store.begin().await.unwrap();
    assert_eq!(uow.decrement_stock(lamp.id, 3).await.unwrap(), None);
    assert_eq!(uow.decrement_stock(lamp.id, 2).await.unwrap(), Some(0));
    assert_eq!(uow.decrement_stock(lamp.id, 1).await.unwrap(), None);
    uow.commit().await.unwrap();

    assert_eq!(
        store.get_catalog_item(lamp.id).await.unwrap().unwrap().stock,
        0
    );
}

#[tokio::test]
#[serial]
async fn concurrent_units_cannot_oversell() {
    let store = get_test_store().await;
    let lamp = store.seed_catalog_item("Lamp", 1).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut uow = store.begin().await.unwrap();
            let taken = uow.decrement_stock(lamp.id, 1).await.unwrap();
            if taken.is_some() {
                uow.commit().await.unwrap();
            } else {
                uow.rollback().await.unwrap();
            }
            taken.is_some()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(
        store.get_catalog_item(lamp.id).await.unwrap().unwrap().stock,
        0
    );
}

#[tokio::test]
#[serial]
async fn unknown_item_line_maps_to_item_not_found() {
    let store = get_test_store().await;

    let mut uow = store.begin().await.unwrap();
    let order = uow.insert_order(new_order(1, 100)).await.unwrap();
    let missing = common::CatalogItemId::new(999);
    let result = uow
        .insert_order_items(
            order.id,
            &[NewOrderItem {
                item_id: missing,
                quantity: 1,
                unit_price: Money::from_cents(100),
            }],
        )
        .await;
    assert!(matches!(result, Err(StoreError::ItemNotFound(id)) if id == missing));

    let mut uow = store.begin().await.unwrap();
    assert!(matches!(
        uow.restore_stock(missing, 1).await,
        Err(StoreError::ItemNotFound(_))
    ));
}

#[tokio::test]
#[serial]
async fn status_compare_and_set_applies_once() {
    let store = get_test_store().await;

    let mut uow = store.begin().await.unwrap();
    let order = uow.insert_order(new_order(1, 100)).await.unwrap();
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    let locked = uow.lock_order(order.id).await.unwrap().unwrap();
    assert_eq!(locked.status, OrderStatus::Pending);
    assert!(
        uow.compare_and_set_status(
            order.id,
            OrderStatus::Pending,
            OrderStatus::PendingCancellation
        )
        .await
        .unwrap()
    );
    assert!(
        !uow.compare_and_set_status(order.id, OrderStatus::Pending, OrderStatus::Shipped)
            .await
            .unwrap()
    );
    uow.commit().await.unwrap();

    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::PendingCancellation);
}

#[tokio::test]
#[serial]
async fn unread_notification_blocks_duplicates_until_read() {
    let store = get_test_store().await;
    let lamp = store.seed_catalog_item("Lamp", 0).await.unwrap();

    let alert = || NewNotification {
        kind: NotificationKind::OutOfStock,
        item_id: lamp.id,
        message: "Lamp is out of stock".to_string(),
        priority: Priority::High,
    };

    let first = store.insert_notification(alert()).await.unwrap().unwrap();
    assert!(!first.read);
    assert!(store.insert_notification(alert()).await.unwrap().is_none());
    assert_eq!(store.count_unread_notifications().await.unwrap(), 1);

    assert!(store.mark_notification_read(first.id).await.unwrap());
    assert!(store.insert_notification(alert()).await.unwrap().is_some());

    assert_eq!(store.list_notifications(false).await.unwrap().len(), 2);
    assert_eq!(store.list_notifications(true).await.unwrap().len(), 1);
    assert_eq!(store.mark_all_notifications_read().await.unwrap(), 1);
    assert!(store.delete_notification(first.id).await.unwrap());
    assert!(!store.delete_notification(first.id).await.unwrap());
}

#[tokio::test]
#[serial]
async fn resubscribe_rearms_notified_subscription() {
    let store = get_test_store().await;
    let lamp = store.seed_catalog_item("Lamp", 0).await.unwrap();
    let customer = CustomerId::new(3);

    let sub = store
        .upsert_restock_subscription(NewRestockSubscription {
            customer_id: customer,
            item_id: lamp.id,
            email: "old@example.com".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(store.mark_subscriptions_notified(&[sub.id]).await.unwrap(), 1);
    assert!(
        store
            .pending_restock_subscriptions(lamp.id)
            .await
            .unwrap()
            .is_empty()
    );

    let again = store
        .upsert_restock_subscription(NewRestockSubscription {
            customer_id: customer,
            item_id: lamp.id,
            email: "new@example.com".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(again.id, sub.id);
    assert!(!again.notified);
    assert_eq!(again.email, "new@example.com");

    assert!(
        !store
            .delete_restock_subscription(sub.id, CustomerId::new(4))
            .await
            .unwrap()
    );
    assert!(
        store
            .delete_restock_subscription(sub.id, customer)
            .await
            .unwrap()
    );
}
