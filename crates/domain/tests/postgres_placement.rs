//! Order placement against PostgreSQL.
//!
//! Uses one shared container and truncates its tables before each test, so
//! the tests run serially.
//!
//! ```bash
//! cargo test -p domain --test postgres_placement
//! ```

use std::sync::Arc;

use common::{CustomerId, Money};
use domain::{OrderConfig, OrderService, PlaceOrder};
use notifications::{DispatcherConfig, LogTransport, NotificationDispatcher};
use serial_test::serial;
use sqlx::PgPool;
use store::{PostgresStore, Store};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

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

async fn get_test_service() -> (Arc<OrderService<PostgresStore>>, Arc<PostgresStore>) {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
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

    let store = Arc::new(PostgresStore::new(pool));
    let dispatcher = NotificationDispatcher::new(
        Arc::clone(&store),
        Arc::new(LogTransport),
        DispatcherConfig::default(),
    );
    let service = OrderService::new(Arc::clone(&store), dispatcher, OrderConfig::default());
    (Arc::new(service), store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn opposite_line_orders_do_not_deadlock() {
    let (service, store) = get_test_service().await;
    let lamp = store.seed_catalog_item("Lamp", 1_000).await.unwrap().id;
    let mug = store.seed_catalog_item("Mug", 1_000).await.unwrap().id;

    let mut handles = Vec::new();
    for worker in 0..8_i64 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                let (first, second) = if worker % 2 == 0 {
                    (lamp, mug)
                } else {
                    (mug, lamp)
                };
                let cmd = PlaceOrder::new(CustomerId::new(worker), "card")
                    .with_line(first, 1, Money::from_cents(500))
                    .with_line(second, 1, Money::from_cents(300));
                service.place_order(cmd).await?;
            }
            Ok::<_, domain::OrderError>(())
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stock = |id| {
        let store = Arc::clone(&store);
        async move { store.get_catalog_item(id).await.unwrap().unwrap().stock }
    };
    assert_eq!(stock(lamp).await, 920);
    assert_eq!(stock(mug).await, 920);
    assert_eq!(service.list_orders().await.unwrap().len(), 80);
}

#[tokio::test]
#[serial]
async fn over_long_fields_fail_validation_before_writing() {
    let (service, store) = get_test_service().await;
    let lamp = store.seed_catalog_item("Lamp", 10).await.unwrap();

    let cmd = PlaceOrder::new(CustomerId::new(1), "x".repeat(100)).with_line(
        lamp.id,
        1,
        Money::from_cents(500),
    );
    let err = service.place_order(cmd).await.unwrap_err();

    assert_eq!(err.kind(), domain::ErrorKind::Validation);
    assert!(service.list_orders().await.unwrap().is_empty());
    assert_eq!(store.get_catalog_item(lamp.id).await.unwrap().unwrap().stock, 10);
}
