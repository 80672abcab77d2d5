use log::debug;
use sqlx::PgConnection;

use crate::{db_types::User, traits::AuthApiError};

/// Stores a new user. The caller hashes the password; this function never sees plaintext.
pub async fn insert_user(login: &str, password_hash: &str, conn: &mut PgConnection) -> Result<User, AuthApiError> {
    let result = sqlx::query_as::<_, User>(
        r#"
            INSERT INTO users (login, password_hash)
            VALUES ($1, $2)
            RETURNING id, login, password_hash, created_at
        "#,
    )
    .bind(login)
    .bind(password_hash)
    .fetch_one(conn)
    .await;
    match result {
        Ok(user) => {
            debug!("📝️ User '{}' created with id {}", user.login, user.id);
            Ok(user)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AuthApiError::LoginTaken(login.to_string())),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_user_by_login(login: &str, conn: &mut PgConnection) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT id, login, password_hash, created_at FROM users WHERE login = $1")
        .bind(login)
        .fetch_optional(conn)
        .await
}
