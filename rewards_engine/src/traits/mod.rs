//! Trait seams between the storage backend and the rest of the system.
//!
//! The API facades and the HTTP layer are written against these traits rather than against [`crate::PgDatabase`]
//! directly, so that endpoint tests can substitute mocks.

use rwd_common::Points;
use thiserror::Error;

use crate::db_types::{Balance, Order, OrderInsert, OrderStatusType, User, Withdrawal};

//--------------------------------------       Errors         --------------------------------------------------------

#[derive(Debug, Error)]
pub enum AuthApiError {
    #[error("Login '{0}' is already taken")]
    LoginTaken(String),
    #[error("Invalid login or password")]
    InvalidCredentials,
    #[error("Could not hash the password. {0}")]
    PasswordHash(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum OrderApiError {
    #[error("Order {0} not found")]
    OrderNotFound(i64),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum WithdrawalError {
    #[error("The balance does not cover the requested withdrawal")]
    InsufficientFunds,
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

//--------------------------------------        Seams         --------------------------------------------------------

/// User storage behaviour needed by registration and login.
#[allow(async_fn_in_trait)]
pub trait AuthManagement {
    /// Stores a new user with the given (already hashed) password. Fails with [`AuthApiError::LoginTaken`] when the
    /// login exists.
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User, AuthApiError>;

    async fn fetch_user_by_login(&self, login: &str) -> Result<Option<User>, AuthApiError>;
}

/// Order storage behaviour: uploads, listings, and the status updates performed by the processing pipeline.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Idempotent order upload. The caller is expected to have validated the number already.
    async fn insert_order(&self, user_id: i64, number: &str) -> Result<OrderInsert, OrderApiError>;

    /// All orders for the user, oldest first.
    async fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, OrderApiError>;

    /// Overwrites the status and accrual for one order and bumps its `updated_at`.
    ///
    /// Fails with [`OrderApiError::OrderNotFound`] when no row matches; the pipeline treats that as a logic bug.
    async fn update_order_progress(
        &self,
        order_id: i64,
        status: OrderStatusType,
        accrual: Points,
    ) -> Result<(), OrderApiError>;

    /// One page of orders still in `NEW` status, oldest first. Used by the startup backfill scan.
    async fn fetch_new_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>, OrderApiError>;
}

/// Balance and withdrawal behaviour.
#[allow(async_fn_in_trait)]
pub trait BalanceManagement {
    async fn balance_for_user(&self, user_id: i64) -> Result<Balance, WithdrawalError>;

    /// Deducts `sum` from the user's balance by recording a withdrawal against `order_number`.
    ///
    /// The funds check and the insert happen in a single transaction, so concurrent withdrawals cannot overdraw.
    async fn withdraw(&self, user_id: i64, order_number: &str, sum: Points) -> Result<Withdrawal, WithdrawalError>;

    /// All withdrawals for the user, oldest first.
    async fn withdrawals_for_user(&self, user_id: i64) -> Result<Vec<Withdrawal>, WithdrawalError>;
}
