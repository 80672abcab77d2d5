//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Handlers are generic over the engine trait seams so that the endpoint tests can run against mocks; actix's
//! attribute macros cannot express that, so the authenticated routes are registered by [`api_scope`] instead.

use actix_web::{
    cookie::Cookie,
    get,
    http::header,
    web,
    HttpMessage, HttpRequest, HttpResponse, Responder, Scope,
};
use log::{debug, trace};
use rewards_engine::{
    db_types::{OrderInsert, User},
    traits::{AuthApiError, AuthManagement, BalanceManagement, OrderManagement, WithdrawalError},
    AuthApi, BalanceApi, OrderApi,
};
use rwd_common::luhn_valid;

use crate::{
    auth::{JwtClaims, TokenIssuer, AUTH_COOKIE},
    data_objects::{AuthResponse, Credentials, WithdrawRequest},
    errors::ServerError,
};

/// Registers the `/api/user` routes for a backend `B`.
pub fn api_scope<B>() -> Scope
where B: AuthManagement + OrderManagement + BalanceManagement + 'static {
    web::scope("/api/user")
        .route("/register", web::post().to(register::<B>))
        .route("/login", web::post().to(login::<B>))
        .route("/orders", web::post().to(upload_order::<B>))
        .route("/orders", web::get().to(list_orders::<B>))
        .route("/balance", web::get().to(balance::<B>))
        .route("/balance/withdraw", web::post().to(withdraw::<B>))
        .route("/withdrawals", web::get().to(list_withdrawals::<B>))
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Auth  ----------------------------------------------------

/// Route handler for the register endpoint
///
/// Creates the user and immediately establishes a session: the access token is returned both as an
/// `Authorization: Bearer` header and as an http-only cookie, so curl users and browsers are equally happy.
pub async fn register<B: AuthManagement>(
    body: web::Json<Credentials>,
    api: web::Data<AuthApi<B>>,
    issuer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    let Credentials { login, password } = body.into_inner();
    validate_credentials(&login, &password)?;
    debug!("💻️ POST register for login '{login}'");
    let user = api.register(&login, &password).await.map_err(|e| match e {
        AuthApiError::LoginTaken(_) => ServerError::LoginTaken,
        e => {
            debug!("💻️ Could not register user. {e}");
            ServerError::BackendError(e.to_string())
        },
    })?;
    session_response(&user, "User successfully registered", &issuer)
}

/// Route handler for the login endpoint
pub async fn login<B: AuthManagement>(
    body: web::Json<Credentials>,
    api: web::Data<AuthApi<B>>,
    issuer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    let Credentials { login, password } = body.into_inner();
    validate_credentials(&login, &password)?;
    debug!("💻️ POST login for login '{login}'");
    let user = api.login(&login, &password).await.map_err(|e| match e {
        AuthApiError::InvalidCredentials => ServerError::Unauthorized,
        e => {
            debug!("💻️ Could not log user in. {e}");
            ServerError::BackendError(e.to_string())
        },
    })?;
    session_response(&user, "Successfully logged in", &issuer)
}

fn validate_credentials(login: &str, password: &str) -> Result<(), ServerError> {
    if login.is_empty() || password.is_empty() {
        return Err(ServerError::InvalidRequestBody("Login and password are required".to_string()));
    }
    Ok(())
}

fn session_response(user: &User, message: &str, issuer: &TokenIssuer) -> Result<HttpResponse, ServerError> {
    let token = issuer.issue_token(user)?;
    let cookie = Cookie::build(AUTH_COOKIE, token.clone()).http_only(true).path("/").finish();
    Ok(HttpResponse::Ok()
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .cookie(cookie)
        .json(AuthResponse { message: message.to_string(), user_id: user.id, login: user.login.clone() }))
}

//----------------------------------------------   Orders  ----------------------------------------------------

/// Route handler for the order upload endpoint
///
/// The body is the bare order number as `text/plain`. Dispositions: 202 accepted, 200 already uploaded by this
/// user, 409 uploaded by someone else, 422 bad checksum, 400 anything else.
pub async fn upload_order<B: OrderManagement>(
    req: HttpRequest,
    body: web::Bytes,
    claims: JwtClaims,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    if req.content_type() != "text/plain" {
        return Err(ServerError::InvalidRequestBody("Content-Type must be text/plain".to_string()));
    }
    let number = String::from_utf8(body.to_vec())
        .map_err(|_| ServerError::InvalidRequestBody("Order number must be valid UTF-8".to_string()))?;
    let number = number.trim();
    if number.is_empty() {
        return Err(ServerError::InvalidRequestBody("Order number is required".to_string()));
    }
    if !luhn_valid(number) {
        return Err(ServerError::InvalidOrderNumber);
    }
    debug!("💻️ POST order {number} for user {}", claims.sub);
    let outcome = api.submit_order(claims.sub, number).await.map_err(|e| {
        debug!("💻️ Could not upload order. {e}");
        ServerError::BackendError(e.to_string())
    })?;
    match outcome {
        OrderInsert::Created(_) => Ok(HttpResponse::Accepted().body("Order accepted for processing")),
        OrderInsert::AlreadyUploaded => Ok(HttpResponse::Ok().body("Order was already uploaded")),
        OrderInsert::UploadedByAnother => Err(ServerError::OrderConflict),
    }
}

/// Route handler for the order listing endpoint. Returns 204 when the user has no orders yet.
pub async fn list_orders<B: OrderManagement>(
    claims: JwtClaims,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET orders for user {}", claims.sub);
    let orders = api.orders_for_user(claims.sub).await.map_err(|e| {
        debug!("💻️ Could not fetch orders. {e}");
        ServerError::BackendError(e.to_string())
    })?;
    if orders.is_empty() {
        return Ok(HttpResponse::NoContent().finish());
    }
    Ok(HttpResponse::Ok().json(orders))
}

//----------------------------------------------   Balance  ----------------------------------------------------

/// Route handler for the balance endpoint
pub async fn balance<B: BalanceManagement>(
    claims: JwtClaims,
    api: web::Data<BalanceApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET balance for user {}", claims.sub);
    let balance = api.balance(claims.sub).await.map_err(|e| {
        debug!("💻️ Could not fetch balance. {e}");
        ServerError::BackendError(e.to_string())
    })?;
    Ok(HttpResponse::Ok().json(balance))
}

/// Route handler for the withdrawal endpoint
///
/// Dispositions: 200 done, 402 not enough points, 422 bad order number.
pub async fn withdraw<B: BalanceManagement>(
    claims: JwtClaims,
    body: web::Json<WithdrawRequest>,
    api: web::Data<BalanceApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let WithdrawRequest { order, sum } = body.into_inner();
    if !luhn_valid(&order) {
        return Err(ServerError::InvalidOrderNumber);
    }
    if sum.is_negative() || sum.is_zero() {
        return Err(ServerError::InvalidRequestBody("Withdrawal sum must be positive".to_string()));
    }
    debug!("💻️ POST withdraw {sum} against order {order} for user {}", claims.sub);
    let withdrawal = api.withdraw(claims.sub, &order, sum).await.map_err(|e| match e {
        WithdrawalError::InsufficientFunds => ServerError::InsufficientFunds,
        e => {
            debug!("💻️ Could not withdraw. {e}");
            ServerError::BackendError(e.to_string())
        },
    })?;
    Ok(HttpResponse::Ok().json(withdrawal))
}

/// Route handler for the withdrawal listing endpoint. Returns 204 when the user has not withdrawn anything yet.
pub async fn list_withdrawals<B: BalanceManagement>(
    claims: JwtClaims,
    api: web::Data<BalanceApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET withdrawals for user {}", claims.sub);
    let withdrawals = api.withdrawals(claims.sub).await.map_err(|e| {
        debug!("💻️ Could not fetch withdrawals. {e}");
        ServerError::BackendError(e.to_string())
    })?;
    if withdrawals.is_empty() {
        return Ok(HttpResponse::NoContent().finish());
    }
    Ok(HttpResponse::Ok().json(withdrawals))
}
