use log::debug;
use rwd_common::Points;

use crate::{
    db_types::{Balance, Withdrawal},
    traits::{BalanceManagement, WithdrawalError},
};

/// Balance queries and withdrawals on top of a [`BalanceManagement`] backend.
#[derive(Clone)]
pub struct BalanceApi<B> {
    db: B,
}

impl<B: BalanceManagement> BalanceApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn balance(&self, user_id: i64) -> Result<Balance, WithdrawalError> {
        self.db.balance_for_user(user_id).await
    }

    pub async fn withdraw(&self, user_id: i64, order_number: &str, sum: Points) -> Result<Withdrawal, WithdrawalError> {
        debug!("🛒️ Withdrawal of {sum} points against order {order_number} for user {user_id}");
        self.db.withdraw(user_id, order_number, sum).await
    }

    pub async fn withdrawals(&self, user_id: i64) -> Result<Vec<Withdrawal>, WithdrawalError> {
        self.db.withdrawals_for_user(user_id).await
    }
}
