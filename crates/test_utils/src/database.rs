//! PostgreSQL testcontainers
//!
//! Starts a throwaway server, applies the embedded migrations and opens a pool
//! through the same path the API server uses. Tests that use it need a Docker
//! daemon and are marked `#[ignore]` in the suites.

use std::time::Duration;

use infra_db::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const IMAGE_TAG: &str = "16-alpine";
const CREDENTIALS: (&str, &str) = ("coop", "coop");
const DATABASE: &str = "coop_test";

/// Concurrency tests hold one connection per contending task
const POOL_SIZE: u32 = 16;

/// A migrated PostgreSQL container; dropping it stops the container
pub struct TestDatabase {
    _container: ContainerAsync<Postgres>,
    url: String,
    pool: DatabasePool,
}

impl TestDatabase {
    pub async fn start() -> Result<Self, BoxError> {
        let (user, password) = CREDENTIALS;
        let container = Postgres::default()
            .with_user(user)
            .with_password(password)
            .with_db_name(DATABASE)
            .with_tag(IMAGE_TAG)
            .start()
            .await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432).await?;
        let url = connection_url(&host.to_string(), port);

        let pool = create_pool(
            DatabaseConfig::new(&url)
                .max_connections(POOL_SIZE)
                .acquire_timeout(Duration::from_secs(30)),
        )
        .await?;
        run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            url,
            pool,
        })
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Starts a database owned by a single test
pub async fn create_isolated_test_database() -> Result<TestDatabase, BoxError> {
    TestDatabase::start().await
}

fn connection_url(host: &str, port: u16) -> String {
    let (user, password) = CREDENTIALS;
    format!("postgres://{user}:{password}@{host}:{port}/{DATABASE}")
}
