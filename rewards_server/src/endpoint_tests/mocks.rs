use mockall::mock;
use rewards_engine::{
    db_types::{Balance, Order, OrderInsert, OrderStatusType, User, Withdrawal},
    traits::{AuthApiError, AuthManagement, BalanceManagement, OrderApiError, OrderManagement, WithdrawalError},
};
use rwd_common::Points;

mock! {
    pub Db {}

    impl AuthManagement for Db {
        async fn create_user(&self, login: &str, password_hash: &str) -> Result<User, AuthApiError>;
        async fn fetch_user_by_login(&self, login: &str) -> Result<Option<User>, AuthApiError>;
    }

    impl OrderManagement for Db {
        async fn insert_order(&self, user_id: i64, number: &str) -> Result<OrderInsert, OrderApiError>;
        async fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, OrderApiError>;
        async fn update_order_progress(
            &self,
            order_id: i64,
            status: OrderStatusType,
            accrual: Points,
        ) -> Result<(), OrderApiError>;
        async fn fetch_new_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>, OrderApiError>;
    }

    impl BalanceManagement for Db {
        async fn balance_for_user(&self, user_id: i64) -> Result<Balance, WithdrawalError>;
        async fn withdraw(&self, user_id: i64, order_number: &str, sum: Points) -> Result<Withdrawal, WithdrawalError>;
        async fn withdrawals_for_user(&self, user_id: i64) -> Result<Vec<Withdrawal>, WithdrawalError>;
    }
}
