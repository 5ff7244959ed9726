//! storyboard-billing server binary.
//!
//! Loads configuration, connects storage (PostgreSQL when a database URL is
//! set, in-memory otherwise), starts the retention sweeper and serves the
//! billing router until SIGINT or SIGTERM.

use std::sync::Arc;

use axum::http::HeaderValue;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use storyboard_billing::adapters::http::{billing_router, BillingAppState, WebhookVerifiers};
use storyboard_billing::adapters::memory::{
    InMemoryCreditTransactionRepository, InMemoryUserRepository, InMemoryWebhookEventRepository,
};
use storyboard_billing::adapters::postgres::{
    PostgresCreditTransactionRepository, PostgresUserRepository, PostgresWebhookEventRepository,
};
use storyboard_billing::application::{RetentionSweeperConfig, WebhookRetentionSweeper};
use storyboard_billing::config::{AppConfig, DatabaseConfig};
use storyboard_billing::ports::{
    CreditTransactionRepository, UserRepository, WebhookEventRepository,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

struct Stores {
    users: Arc<dyn UserRepository>,
    transactions: Arc<dyn CreditTransactionRepository>,
    webhook_events: Arc<dyn WebhookEventRepository>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    let stores = connect_stores(&config.database).await?;
    let catalog = Arc::new(config.billing.plan_catalog());
    let verifiers = WebhookVerifiers {
        billing: config.billing.billing_verifier()?.map(Arc::new),
        auth: config.billing.auth_verifier()?.map(Arc::new),
    };
    if verifiers.billing.is_none() {
        tracing::warn!("billing.webhook_secret is not set; billing webhooks will be rejected");
    }
    if verifiers.auth.is_none() {
        tracing::warn!("billing.auth_webhook_secret is not set; identity webhooks will be rejected");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_handle = config.billing.sweep_interval().map(|interval| {
        let sweeper = WebhookRetentionSweeper::new(
            stores.webhook_events.clone(),
            RetentionSweeperConfig::default()
                .with_interval(interval)
                .with_retention_days(config.billing.webhook_retention_days),
        );
        tokio::spawn(async move { sweeper.run(shutdown_rx).await })
    });

    let state = BillingAppState::new(
        stores.users,
        stores.transactions,
        stores.webhook_events,
        catalog,
        verifiers,
        config.billing.welcome_bonus_credits,
    );

    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let app = billing_router()
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(CorsLayer::new().allow_origin(origins))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "storyboard-billing listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Retention sweeper task failed");
        }
    }

    tracing::info!("storyboard-billing stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.is_production() {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

async fn connect_stores(database: &DatabaseConfig) -> Result<Stores, BoxError> {
    let Some(url) = database.url() else {
        tracing::warn!("No database URL configured; using in-memory stores");
        return Ok(Stores {
            users: Arc::new(InMemoryUserRepository::new()),
            transactions: Arc::new(InMemoryCreditTransactionRepository::new()),
            webhook_events: Arc::new(InMemoryWebhookEventRepository::new()),
        });
    };

    let pool = PgPoolOptions::new()
        .min_connections(database.min_connections)
        .max_connections(database.max_connections)
        .acquire_timeout(database.acquire_timeout())
        .idle_timeout(database.idle_timeout())
        .max_lifetime(database.max_lifetime())
        .connect(url)
        .await?;
    tracing::info!("Connected to PostgreSQL");

    if database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    Ok(Stores {
        users: Arc::new(PostgresUserRepository::new(pool.clone())),
        transactions: Arc::new(PostgresCreditTransactionRepository::new(pool.clone())),
        webhook_events: Arc::new(PostgresWebhookEventRepository::new(pool)),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received ctrl+c"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
