use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub mod store;

use crate::error::StoreError;
pub use store::SqliteContentStore;

/// Initialize the SQLite database connection pool and run migrations
pub async fn init_db(db_path: impl AsRef<Path>) -> Result<SqlitePool, StoreError> {
    let db_path = db_path.as_ref();
    let db_path_str = db_path.to_string_lossy();

    // Ensure the database file exists or create it
    if !db_path.exists() {
        info!("Database file not found at {}, creating...", db_path_str);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::File::create(db_path)?;
    }

    connect(&format!("sqlite:{}", db_path_str), 5).await
}

/// Connect to `db_url` and bring the schema up to date.
///
/// `sqlite::memory:` gives every connection its own database, so callers using
/// it should pass `max_connections = 1`.
pub async fn connect(db_url: &str, max_connections: u32) -> Result<SqlitePool, StoreError> {
    info!("Connecting to database at {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}
