use actix_web::web::{self, ServiceConfig};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use chrono::Utc;
use rewards_engine::{
    db_types::{Order, OrderStatusType, User, Withdrawal},
    AuthApi, BalanceApi, OrderApi,
};
use rwd_common::Points;

use crate::{
    auth::TokenIssuer,
    config::JwtSecret,
    endpoint_tests::mocks::MockDb,
    routes::{api_scope, health},
};

// Creates a test `TokenIssuer`. DO NOT re-use this key anywhere.
pub fn test_issuer() -> TokenIssuer {
    TokenIssuer::new(&JwtSecret::new("endpoint-test signing key, 0123456789abcdef"))
}

/// One mock per API facade. Tests set expectations only on the backend their route actually touches.
#[derive(Default)]
pub struct TestBackends {
    pub auth: MockDb,
    pub orders: MockDb,
    pub balance: MockDb,
}

pub fn configure_app(backends: TestBackends, issuer: TokenIssuer) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(AuthApi::new(backends.auth)))
            .app_data(web::Data::new(OrderApi::new(backends.orders)))
            .app_data(web::Data::new(BalanceApi::new(backends.balance)))
            .app_data(web::Data::new(issuer))
            .service(health)
            .service(api_scope::<MockDb>());
    }
}

pub fn user(id: i64, login: &str) -> User {
    User { id, login: login.to_string(), password_hash: "unused".to_string(), created_at: Utc::now() }
}

pub fn user_with_password(id: i64, login: &str, password: &str) -> User {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt).unwrap().to_string();
    User { id, login: login.to_string(), password_hash: hash, created_at: Utc::now() }
}

pub fn order(id: i64, user_id: i64, number: &str, status: OrderStatusType, accrual_hundredths: i64) -> Order {
    Order {
        id,
        user_id,
        number: number.to_string(),
        status,
        accrual: Points::from(accrual_hundredths),
        uploaded_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn withdrawal(id: i64, user_id: i64, order_number: &str, sum_hundredths: i64) -> Withdrawal {
    Withdrawal {
        id,
        user_id,
        order_number: order_number.to_string(),
        sum: Points::from(sum_hundredths),
        processed_at: Utc::now(),
    }
}

pub fn bearer(issuer: &TokenIssuer, user: &User) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", issuer.issue_token(user).unwrap()))
}
