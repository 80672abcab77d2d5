use log::{debug, trace};
use rwd_common::Points;
use sqlx::PgConnection;

use crate::{
    db_types::{Order, OrderInsert, OrderStatusType},
    traits::OrderApiError,
};

/// Idempotent order upload.
///
/// A `NEW` row insert fires the `new_orders` notification trigger, which is what hands the order to the processing
/// pipeline. Re-uploads resolve to [`OrderInsert::AlreadyUploaded`] or [`OrderInsert::UploadedByAnother`] depending
/// on who owns the existing row.
pub async fn insert_order(user_id: i64, number: &str, conn: &mut PgConnection) -> Result<OrderInsert, OrderApiError> {
    if let Some(existing) = fetch_order_by_number(number, &mut *conn).await? {
        return Ok(classify_existing(user_id, &existing));
    }
    let inserted = sqlx::query_as::<_, Order>(
        r#"
            INSERT INTO orders (user_id, number)
            VALUES ($1, $2)
            RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(number)
    .fetch_one(&mut *conn)
    .await;
    match inserted {
        Ok(order) => {
            debug!("📝️ Order [{}] inserted with id {}", order.number, order.id);
            Ok(OrderInsert::Created(order))
        },
        // Lost a race with a concurrent upload of the same number; classify against the winner.
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            match fetch_order_by_number(number, conn).await? {
                Some(existing) => Ok(classify_existing(user_id, &existing)),
                None => Err(sqlx::Error::RowNotFound.into()),
            }
        },
        Err(e) => Err(e.into()),
    }
}

fn classify_existing(user_id: i64, existing: &Order) -> OrderInsert {
    if existing.user_id == user_id {
        OrderInsert::AlreadyUploaded
    } else {
        OrderInsert::UploadedByAnother
    }
}

pub async fn fetch_order_by_number(number: &str, conn: &mut PgConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE number = $1").bind(number).fetch_optional(conn).await
}

/// All orders for the user, oldest first.
pub async fn orders_for_user(user_id: i64, conn: &mut PgConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE user_id = $1 ORDER BY uploaded_at ASC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    trace!("📝️ Fetched {} orders for user {user_id}", orders.len());
    Ok(orders)
}

/// Overwrites status and accrual for one order. Zero affected rows means the job referred to an absent row.
pub async fn update_order_progress(
    order_id: i64,
    status: OrderStatusType,
    accrual: Points,
    conn: &mut PgConnection,
) -> Result<(), OrderApiError> {
    let result = sqlx::query("UPDATE orders SET status = $1, accrual = $2, updated_at = NOW() WHERE id = $3")
        .bind(status)
        .bind(accrual)
        .bind(order_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(OrderApiError::OrderNotFound(order_id));
    }
    Ok(())
}

/// One page of orders still waiting for their first accrual poll, oldest first.
pub async fn fetch_new_orders(limit: i64, offset: i64, conn: &mut PgConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM orders
            WHERE status = 'NEW'
            ORDER BY uploaded_at ASC
            LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await
}
