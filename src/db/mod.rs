//! Storage layer: sqlite-backed repositories for the map store and the
//! replay log.

pub mod map;
pub mod replay;

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::errors::ServerError;

/// Opens a sqlite pool. With no URL configured an in-memory database is
/// used; the pool is kept at one connection so the in-memory case stays a
/// single database and file-backed writes stay serialized.
pub async fn connect(url: Option<&str>) -> Result<SqlitePool, ServerError> {
    let url = url.unwrap_or("sqlite::memory:");
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| ServerError::Database(e.to_string()))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}
