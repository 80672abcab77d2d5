use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use rewards_engine::db_types::User;
use serde::{Deserialize, Serialize};

use crate::{config::JwtSecret, errors::ServerError};

pub const AUTH_COOKIE: &str = "auth_token";
const TOKEN_VALIDITY_HOURS: i64 = 24;

/// Claims carried by an access token. Extractable in any handler; extraction fails with 401 when the request
/// carries no valid token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The user id.
    pub sub: i64,
    pub login: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 access tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &JwtSecret) -> Self {
        let bytes = secret.as_bytes();
        Self { encoding: EncodingKey::from_secret(bytes), decoding: DecodingKey::from_secret(bytes) }
    }

    /// Issue a new access token for the given user. Callers must have authenticated the user already.
    pub fn issue_token(&self, user: &User) -> Result<String, ServerError> {
        self.issue_token_with_validity(user, Duration::hours(TOKEN_VALIDITY_HOURS))
    }

    fn issue_token_with_validity(&self, user: &User, validity: Duration) -> Result<String, ServerError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user.id,
            login: user.login.clone(),
            iat: now.timestamp(),
            exp: (now + validity).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| ServerError::InvalidAuthToken(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<JwtClaims, ServerError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        decode::<JwtClaims>(token, &self.decoding, &validation).map(|data| data.claims).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => ServerError::InvalidAuthToken("token has expired".to_string()),
                _ => ServerError::InvalidAuthToken(e.to_string()),
            }
        })
    }
}

impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(claims_from_request(req))
    }
}

/// Pulls the access token from the `Authorization: Bearer` header, falling back to the auth cookie.
fn claims_from_request(req: &HttpRequest) -> Result<JwtClaims, ServerError> {
    let Some(issuer) = req.app_data::<web::Data<TokenIssuer>>() else {
        return Err(ServerError::BackendError("Token issuer is not configured".to_string()));
    };
    let header_token = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string());
    let cookie_token = req.cookie(AUTH_COOKIE).map(|c| c.value().to_string());
    let Some(token) = header_token.or(cookie_token) else {
        debug!("💻️ Request to an authenticated endpoint without a token");
        return Err(ServerError::Unauthorized);
    };
    issuer.verify(&token)
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&JwtSecret::new("a test signing key that is long enough"))
    }

    fn user() -> User {
        User { id: 42, login: "alice".to_string(), password_hash: "irrelevant".to_string(), created_at: Utc::now() }
    }

    #[test]
    fn issued_tokens_verify() {
        let issuer = issuer();
        let token = issuer.issue_token(&user()).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.login, "alice");
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issuer = issuer();
        let token = issuer.issue_token_with_validity(&user(), Duration::hours(-1)).unwrap();
        let err = issuer.verify(&token).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn tokens_from_another_key_are_rejected() {
        let other = TokenIssuer::new(&JwtSecret::new("a completely different signing key!!"));
        let token = other.issue_token(&user()).unwrap();
        assert!(issuer().verify(&token).is_err());
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert!(issuer().verify("not-a-jwt").is_err());
    }
}
