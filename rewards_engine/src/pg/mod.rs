//! # PostgreSQL database methods
//!
//! This module contains "low-level" PostgreSQL interactions.
//!
//! All these interactions are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut PgConnection` argument. Callers can obtain a connection from a pool, or create an atomic transaction as the
//! need arises and call through to the functions without any other changes.
//!
//! [`PgDatabase`] wraps a connection pool and implements the trait seams in [`crate::traits`] on top of these
//! functions.

use log::info;
use sqlx::{postgres::PgPoolOptions, Error as SqlxError, PgPool};

mod db;

pub mod orders;
pub mod users;
pub mod withdrawals;

pub use db::PgDatabase;

pub async fn new_pool(url: &str, max_connections: u32) -> Result<PgPool, SqlxError> {
    let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
    info!("📝️ Database connection pool created ({max_connections} connections max)");
    Ok(pool)
}
