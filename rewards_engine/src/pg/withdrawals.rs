use log::debug;
use rwd_common::Points;
use sqlx::PgConnection;

use crate::{
    db_types::{Balance, Withdrawal},
    traits::WithdrawalError,
};

/// The user's spendable balance and lifetime withdrawn total.
///
/// The balance is derived on demand: accruals of `PROCESSED` orders minus recorded withdrawals. There is no
/// materialized balance column to drift out of sync.
pub async fn balance_for_user(user_id: i64, conn: &mut PgConnection) -> Result<Balance, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT
                (COALESCE((SELECT SUM(accrual) FROM orders WHERE user_id = $1 AND status = 'PROCESSED'), 0)
               - COALESCE((SELECT SUM(sum) FROM withdrawals WHERE user_id = $1), 0))::BIGINT AS current,
                COALESCE((SELECT SUM(sum) FROM withdrawals WHERE user_id = $1), 0)::BIGINT AS withdrawn
        "#,
    )
    .bind(user_id)
    .fetch_one(conn)
    .await
}

/// Records a withdrawal after re-checking the balance.
///
/// Call this inside a transaction. The user row is locked first so that concurrent withdrawals for the same user
/// serialize and cannot overdraw between the balance check and the insert.
pub async fn withdraw(
    user_id: i64,
    order_number: &str,
    sum: Points,
    conn: &mut PgConnection,
) -> Result<Withdrawal, WithdrawalError> {
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE").bind(user_id).execute(&mut *conn).await?;
    let balance = balance_for_user(user_id, &mut *conn).await?;
    if balance.current < sum {
        return Err(WithdrawalError::InsufficientFunds);
    }
    let withdrawal: Withdrawal = sqlx::query_as(
        r#"
            INSERT INTO withdrawals (user_id, order_number, sum)
            VALUES ($1, $2, $3)
            RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(order_number)
    .bind(sum)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Withdrawal of {} points recorded against order {}", withdrawal.sum, withdrawal.order_number);
    Ok(withdrawal)
}

/// All withdrawals for the user, oldest first.
pub async fn withdrawals_for_user(user_id: i64, conn: &mut PgConnection) -> Result<Vec<Withdrawal>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM withdrawals WHERE user_id = $1 ORDER BY processed_at ASC")
        .bind(user_id)
        .fetch_all(conn)
        .await
}
