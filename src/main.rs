// src/main.rs

use std::net::SocketAddr;
use std::time::Duration;

use dotenvy::dotenv;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use prep_backend::config::Config;
use prep_backend::error::AppError;
use prep_backend::models::user::ROLE_ADMIN;
use prep_backend::routes::create_router;
use prep_backend::state::AppState;
use prep_backend::utils::hash::hash_password;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let config = Config::from_env();

    // Log to stdout and to a daily-rolling file. The guard must stay
    // alive for the life of the process or buffered lines are dropped.
    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.rust_log))
        .with(fmt::layer().with_writer(std::io::stdout).with_target(false))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    let pool = connect_with_retry(&config.database_url).await;
    tracing::info!("Database connected");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied");

    if let Err(e) = seed_admin_user(&pool, &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = create_router(AppState::new(pool, config));

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Connects to Postgres, waiting for the database to come up. Gives up
/// after five attempts.
async fn connect_with_retry(database_url: &str) -> PgPool {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
        {
            Ok(pool) => return pool,
            Err(e) if attempt >= 5 => panic!("Failed to connect to database: {}", e),
            Err(_) => {
                tracing::warn!("Database not ready, retrying in 2s (attempt {})", attempt);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// Creates the admin account named by `ADMIN_USERNAME`/`ADMIN_PASSWORD`
/// unless it already exists. Skipped when either variable is unset.
async fn seed_admin_user(pool: &PgPool, config: &Config) -> Result<(), AppError> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    if exists.is_some() {
        return Ok(());
    }

    sqlx::query("INSERT INTO users (username, password, role) VALUES ($1, $2, $3)")
        .bind(username)
        .bind(hash_password(password)?)
        .bind(ROLE_ADMIN)
        .execute(pool)
        .await?;

    tracing::info!("Seeded admin user '{}'", username);
    Ok(())
}
