//! Database fixtures for rowplan integration tests.
//!
//! A [`TestDb`] is a freshly migrated database of its own with helpers to
//! seed catalog plants and rows. All fixtures in a test binary share one
//! PostgreSQL server: the one at `ROWPLAN_TEST_PG_URL` when set, otherwise a
//! container started on first use.

use std::future::Future;

use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use rowplan_db::config::DbConfig;
use rowplan_db::models::{Plant, Row};
use rowplan_db::pool;
use rowplan_db::queries::{plants, rows};

struct Server {
    url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static SERVER: OnceCell<Server> = OnceCell::const_new();

async fn server_url() -> &'static str {
    let server = SERVER
        .get_or_init(|| async {
            if let Ok(url) = std::env::var("ROWPLAN_TEST_PG_URL") {
                return Server {
                    url,
                    _container: None,
                };
            }
            let container = Postgres::default()
                .with_tag("18")
                .start()
                .await
                .expect("failed to start PostgreSQL container");
            let host = container.get_host().await.expect("container host");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("container port");
            Server {
                url: format!("postgresql://postgres:postgres@{host}:{port}"),
                _container: Some(container),
            }
        })
        .await;
    &server.url
}

/// A migrated database owned by one test.
///
/// Cloning shares the pool. Call [`TestDb::drop`] (or use [`with_test_db`])
/// to remove the database afterwards.
#[derive(Clone)]
pub struct TestDb {
    pub pool: PgPool,
    config: DbConfig,
}

impl TestDb {
    /// Create and migrate a uniquely named database on the shared server.
    pub async fn create() -> Self {
        let name = format!("rowplan_test_{}", Uuid::new_v4().simple());
        let config = DbConfig::on_server(server_url().await, &name)
            .unwrap_or_else(|e| panic!("bad test database name {name}: {e}"));

        pool::create_database_if_missing(&config)
            .await
            .unwrap_or_else(|e| panic!("failed to create {name}: {e:#}"));
        let pool = pool::create_pool(&config)
            .await
            .unwrap_or_else(|e| panic!("failed to connect to {name}: {e:#}"));
        pool::run_migrations(&pool)
            .await
            .expect("migrations should succeed");

        Self { pool, config }
    }

    /// Connection URL, e.g. for `rowplan --database-url`.
    pub fn url(&self) -> String {
        self.config.url()
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Add a catalog plant with no image.
    pub async fn seed_plant(&self, name: &str, spacing: i32, quantity: i32) -> Plant {
        plants::insert_plant(&self.pool, name, spacing, quantity, None)
            .await
            .unwrap_or_else(|e| panic!("failed to seed plant {name}: {e:#}"))
    }

    /// Add an empty row named `test-row`.
    pub async fn seed_row(&self, length: i32, row_ends: i32) -> Row {
        rows::insert_row(&self.pool, "test-row", length, row_ends)
            .await
            .unwrap_or_else(|e| panic!("failed to seed row {length}/{row_ends}: {e:#}"))
    }

    /// Close the pool and drop the database.
    pub async fn drop(self) {
        self.pool.close().await;
        if let Err(e) = pool::drop_database(&self.config).await {
            eprintln!("leaking test database {}: {e:#}", self.config.name());
        }
    }
}

/// Run `test` against a fresh [`TestDb`] and drop it afterwards.
///
/// A panicking test leaks its database; it goes away with the container.
pub async fn with_test_db<F, Fut>(test: F)
where
    F: FnOnce(TestDb) -> Fut,
    Fut: Future<Output = ()>,
{
    let db = TestDb::create().await;
    test(db.clone()).await;
    db.drop().await;
}
