use log::debug;
use rwd_common::Points;
use sqlx::PgPool;

use crate::{
    db_types::{Balance, Order, OrderInsert, OrderStatusType, User, Withdrawal},
    pg::{new_pool, orders, users, withdrawals},
    traits::{AuthApiError, AuthManagement, BalanceManagement, OrderApiError, OrderManagement, WithdrawalError},
};

/// Handle to the PostgreSQL backend. Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct PgDatabase {
    url: String,
    pool: PgPool,
}

impl PgDatabase {
    /// Connects to the database and brings the schema up to date.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("📝️ Migrations are up to date");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl AuthManagement for PgDatabase {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        users::insert_user(login, password_hash, &mut conn).await
    }

    async fn fetch_user_by_login(&self, login: &str) -> Result<Option<User>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(users::fetch_user_by_login(login, &mut conn).await?)
    }
}

impl OrderManagement for PgDatabase {
    async fn insert_order(&self, user_id: i64, number: &str) -> Result<OrderInsert, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(user_id, number, &mut conn).await
    }

    async fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::orders_for_user(user_id, &mut conn).await?)
    }

    async fn update_order_progress(
        &self,
        order_id: i64,
        status: OrderStatusType,
        accrual: Points,
    ) -> Result<(), OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_order_progress(order_id, status, accrual, &mut conn).await
    }

    async fn fetch_new_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_new_orders(limit, offset, &mut conn).await?)
    }
}

impl BalanceManagement for PgDatabase {
    async fn balance_for_user(&self, user_id: i64) -> Result<Balance, WithdrawalError> {
        let mut conn = self.pool.acquire().await?;
        Ok(withdrawals::balance_for_user(user_id, &mut conn).await?)
    }

    async fn withdraw(&self, user_id: i64, order_number: &str, sum: Points) -> Result<Withdrawal, WithdrawalError> {
        let mut tx = self.pool.begin().await?;
        let withdrawal = withdrawals::withdraw(user_id, order_number, sum, &mut tx).await?;
        tx.commit().await?;
        Ok(withdrawal)
    }

    async fn withdrawals_for_user(&self, user_id: i64) -> Result<Vec<Withdrawal>, WithdrawalError> {
        let mut conn = self.pool.acquire().await?;
        Ok(withdrawals::withdrawals_for_user(user_id, &mut conn).await?)
    }
}
