use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request. {0}")]
    InvalidRequestBody(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Could not validate auth token. {0}")]
    InvalidAuthToken(String),
    #[error("The balance does not cover this withdrawal")]
    InsufficientFunds,
    #[error("Login is already taken")]
    LoginTaken,
    #[error("Order number was uploaded by another user")]
    OrderConflict,
    #[error("Invalid order number format")]
    InvalidOrderNumber,
    #[error("Could not initialize the server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Backend error. {0}")]
    BackendError(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::InvalidAuthToken(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            Self::LoginTaken | Self::OrderConflict => StatusCode::CONFLICT,
            Self::InvalidOrderNumber => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).insert_header(ContentType::plaintext()).body(self.to_string())
    }
}
