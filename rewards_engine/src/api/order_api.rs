use log::debug;

use crate::{
    db_types::{Order, OrderInsert},
    traits::{OrderApiError, OrderManagement},
};

/// Order upload and listing on top of an [`OrderManagement`] backend.
#[derive(Clone)]
pub struct OrderApi<B> {
    db: B,
}

impl<B: OrderManagement> OrderApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Uploads an order number for the user. Number validation (digits, Luhn) is the caller's responsibility;
    /// ownership conflicts are resolved here via the returned [`OrderInsert`].
    pub async fn submit_order(&self, user_id: i64, number: &str) -> Result<OrderInsert, OrderApiError> {
        debug!("🛒️ Order upload of number {number} for user {user_id}");
        self.db.insert_order(user_id, number).await
    }

    pub async fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, OrderApiError> {
        self.db.orders_for_user(user_id).await
    }
}
