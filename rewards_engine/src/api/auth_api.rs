use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use log::debug;

use crate::{
    db_types::User,
    traits::{AuthApiError, AuthManagement},
};

/// User registration and login on top of an [`AuthManagement`] backend.
///
/// Passwords are hashed with salted argon2 here; the backend only ever sees hashes.
#[derive(Clone)]
pub struct AuthApi<B> {
    db: B,
}

impl<B: AuthManagement> AuthApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn register(&self, login: &str, password: &str) -> Result<User, AuthApiError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthApiError::PasswordHash(e.to_string()))?
            .to_string();
        let user = self.db.create_user(login, &hash).await?;
        debug!("🔐️ Registered user '{}' with id {}", user.login, user.id);
        Ok(user)
    }

    pub async fn login(&self, login: &str, password: &str) -> Result<User, AuthApiError> {
        let Some(user) = self.db.fetch_user_by_login(login).await? else {
            debug!("🔐️ Login attempt for unknown login '{login}'");
            return Err(AuthApiError::InvalidCredentials);
        };
        let parsed = PasswordHash::new(&user.password_hash).map_err(|e| AuthApiError::PasswordHash(e.to_string()))?;
        if Argon2::default().verify_password(password.as_bytes(), &parsed).is_err() {
            debug!("🔐️ Password mismatch for login '{login}'");
            return Err(AuthApiError::InvalidCredentials);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use chrono::Utc;

    use super::*;

    /// In-memory user store, enough to exercise the hashing and verification paths.
    #[derive(Clone, Default)]
    struct MemoryUsers {
        users: Arc<Mutex<HashMap<String, User>>>,
    }

    impl AuthManagement for MemoryUsers {
        async fn create_user(&self, login: &str, password_hash: &str) -> Result<User, AuthApiError> {
            let mut users = self.users.lock().unwrap();
            if users.contains_key(login) {
                return Err(AuthApiError::LoginTaken(login.to_string()));
            }
            let user = User {
                id: users.len() as i64 + 1,
                login: login.to_string(),
                password_hash: password_hash.to_string(),
                created_at: Utc::now(),
            };
            users.insert(login.to_string(), user.clone());
            Ok(user)
        }

        async fn fetch_user_by_login(&self, login: &str) -> Result<Option<User>, AuthApiError> {
            Ok(self.users.lock().unwrap().get(login).cloned())
        }
    }

    #[tokio::test]
    async fn register_then_login_round_trip() {
        let api = AuthApi::new(MemoryUsers::default());
        let user = api.register("alice", "correct horse").await.unwrap();
        assert_eq!(user.login, "alice");
        assert_ne!(user.password_hash, "correct horse");

        let logged_in = api.login("alice", "correct horse").await.unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn login_rejects_wrong_password_and_unknown_user() {
        let api = AuthApi::new(MemoryUsers::default());
        api.register("bob", "s3cret").await.unwrap();

        assert!(matches!(api.login("bob", "not-the-password").await, Err(AuthApiError::InvalidCredentials)));
        assert!(matches!(api.login("carol", "s3cret").await, Err(AuthApiError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let api = AuthApi::new(MemoryUsers::default());
        api.register("dave", "pw").await.unwrap();
        assert!(matches!(api.register("dave", "pw").await, Err(AuthApiError::LoginTaken(_))));
    }
}
