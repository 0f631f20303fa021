//! HTTP API Layer
//!
//! JSON boundary over the savings ledger and the loan underwriting service,
//! built on Axum.
//!
//! # Architecture
//!
//! - **Handlers**: one module per resource, thin wrappers over the services
//! - **DTOs**: validated request bodies and derived-figure responses
//! - **Error Handling**: domain error codes carried through to the body
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState, config::AppConfig};
//!
//! let config = AppConfig::load()?;
//! let state = AppState::from_config(&config).await?;
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod dto;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use core_kernel::{Clock, HealthCheckable, SystemClock};
use domain_loan::{InMemoryLoanRepository, LoanRepository, LoanUnderwritingService};
use domain_savings::{InMemoryLedgerRepository, LedgerRepository, LedgerStore};
use infra_db::{DatabaseConfig, DatabaseError, PostgresLedgerRepository, PostgresLoanRepository};

use crate::config::{AppConfig, StorageBackend};
use crate::handlers::{accounts, health, loans, members, transactions};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerStore>,
    pub loans: Arc<LoanUnderwritingService>,
    pub clock: Arc<dyn Clock>,
    /// Storage adapters polled by the readiness probe
    pub probes: Vec<Arc<dyn HealthCheckable>>,
}

impl AppState {
    /// Wires both services over the given adapters
    pub fn new(
        ledger_repository: Arc<dyn LedgerRepository>,
        loan_repository: Arc<dyn LoanRepository>,
        probes: Vec<Arc<dyn HealthCheckable>>,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger = Arc::new(LedgerStore::new(
            ledger_repository,
            config.ledger.clone(),
            clock.clone(),
        ));
        let loans = Arc::new(LoanUnderwritingService::new(
            loan_repository,
            ledger.clone(),
            config.loan.clone(),
            config.exposure.clone(),
            clock.clone(),
        ));
        Self {
            ledger,
            loans,
            clock,
            probes,
        }
    }

    /// In-memory adapters driven by `clock`
    pub fn in_memory(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let ledger_repository = Arc::new(InMemoryLedgerRepository::new());
        let loan_repository = Arc::new(InMemoryLoanRepository::new());
        let probes: Vec<Arc<dyn HealthCheckable>> =
            vec![ledger_repository.clone(), loan_repository.clone()];
        Self::new(ledger_repository, loan_repository, probes, config, clock)
    }

    /// PostgreSQL adapters over an already-migrated pool
    pub fn postgres(pool: infra_db::DatabasePool, config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let ledger_repository = Arc::new(PostgresLedgerRepository::new(pool.clone()));
        let loan_repository = Arc::new(PostgresLoanRepository::new(pool));
        let probes: Vec<Arc<dyn HealthCheckable>> =
            vec![ledger_repository.clone(), loan_repository.clone()];
        Self::new(ledger_repository, loan_repository, probes, config, clock)
    }

    /// Builds the configured backend on the system clock, migrating the
    /// database first when it is PostgreSQL
    pub async fn from_config(config: &AppConfig) -> Result<Self, DatabaseError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        match config.storage {
            StorageBackend::Memory => {
                info!("Using in-memory storage");
                Ok(Self::in_memory(config, clock))
            }
            StorageBackend::Postgres => {
                let pool = infra_db::create_pool(
                    DatabaseConfig::new(&config.database_url).max_connections(config.max_connections),
                )
                .await?;
                infra_db::run_migrations(&pool).await?;
                Ok(Self::postgres(pool, config, clock))
            }
        }
    }
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let account_routes = Router::new()
        .route("/", post(accounts::open_account))
        .route("/:id", get(accounts::get_account))
        .route("/:id/close", post(accounts::close_account))
        .route("/:id/status", put(accounts::set_status))
        .route(
            "/:id/transactions",
            get(accounts::list_transactions).post(accounts::post_transaction),
        )
        .route("/:id/statement", get(accounts::statement))
        .route("/:id/interest", post(accounts::post_interest));

    let transaction_routes = Router::new()
        .route("/:id", get(transactions::get_transaction))
        .route("/:id/reverse", post(transactions::reverse))
        .route("/:id/status", put(transactions::set_status));

    let loan_routes = Router::new()
        .route("/", post(loans::submit))
        .route("/:id", get(loans::get_loan))
        .route(
            "/:id/guarantors",
            get(loans::list_guarantors).post(loans::add_guarantor),
        )
        .route("/:id/approve", post(loans::approve))
        .route("/:id/reject", post(loans::reject))
        .route("/:id/cancel", post(loans::cancel))
        .route("/:id/disburse", post(loans::disburse))
        .route(
            "/:id/repayments",
            get(loans::list_repayments).post(loans::record_repayment),
        )
        .route("/:id/default", post(loans::mark_defaulted))
        .route("/:id/schedule", get(loans::schedule));

    let api_routes = Router::new()
        .nest("/accounts", account_routes)
        .route("/transfers", post(transactions::transfer))
        .nest("/transactions", transaction_routes)
        .nest("/loans", loan_routes)
        .route(
            "/members/:id/guarantee-capacity",
            get(members::guarantee_capacity),
        );

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
