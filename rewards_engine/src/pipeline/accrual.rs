use std::time::Duration;

use log::{debug, error, warn};
use reqwest::{Client, StatusCode};
use rwd_common::Points;
use serde::Deserialize;

use crate::db_types::OrderStatusType;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// What the accrual service had to say about one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualOutcome {
    /// Authoritative state from the service. `accrual` is zero when the response carried none.
    Update { status: OrderStatusType, accrual: Points },
    /// The service has no record of this order yet.
    NotRegistered,
    /// The service asked for backoff (HTTP 429).
    RateLimited { retry_after_secs: u64 },
    /// 5xx, transport failure or an undecodable body. Retry eligible.
    Transient(String),
    /// Any other unexpected response.
    Permanent(String),
}

#[derive(Debug, Deserialize)]
struct AccrualResponse {
    #[allow(dead_code)]
    order: String,
    status: OrderStatusType,
    #[serde(default)]
    accrual: Option<Points>,
}

/// Client for the external accrual service.
///
/// [`AccrualClient::poll`] is total: every failure mode maps onto an [`AccrualOutcome`] variant. Retry policy lives
/// in the worker pool, not here.
#[derive(Clone)]
pub struct AccrualClient {
    base: String,
    client: Client,
}

impl AccrualClient {
    pub fn new(base: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { base: base.into(), client })
    }

    /// Builds the per-order URL. The scheme default is applied on every call, not at construction, so that a
    /// configuration reload cannot leave a stale normalization behind.
    fn order_url(&self, number: &str) -> String {
        let base = self.base.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{base}/api/orders/{number}")
        } else {
            format!("http://{base}/api/orders/{number}")
        }
    }

    pub async fn poll(&self, number: &str) -> AccrualOutcome {
        let url = self.order_url(number);
        debug!("💱️ Querying accrual service: {url}");
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return AccrualOutcome::Transient(format!("accrual request to {url} failed: {e}")),
        };
        let status = response.status();
        let retry_after =
            response.headers().get("Retry-After").and_then(|v| v.to_str().ok()).map(|v| v.to_string());
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return AccrualOutcome::Transient(format!("could not read accrual response body: {e}")),
        };
        let outcome = classify(status, retry_after.as_deref(), &body);
        match &outcome {
            AccrualOutcome::NotRegistered => warn!("💱️ Order {number} not registered in accrual system"),
            AccrualOutcome::RateLimited { retry_after_secs } => {
                warn!("💱️ Accrual rate limit exceeded, service asks for {retry_after_secs}s of backoff");
            },
            AccrualOutcome::Permanent(e) => error!("💱️ Unexpected accrual response for order {number}: {e}"),
            _ => {},
        }
        outcome
    }
}

/// Maps an HTTP response onto an outcome. Pulled out of [`AccrualClient::poll`] so the dispositions can be tested
/// without a live service.
fn classify(status: StatusCode, retry_after: Option<&str>, body: &str) -> AccrualOutcome {
    match status {
        StatusCode::OK => match serde_json::from_str::<AccrualResponse>(body) {
            Ok(response) => AccrualOutcome::Update {
                status: response.status,
                accrual: response.accrual.unwrap_or(Points::ZERO),
            },
            Err(e) => AccrualOutcome::Transient(format!("could not decode accrual response: {e}")),
        },
        StatusCode::NO_CONTENT => AccrualOutcome::NotRegistered,
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_secs =
                retry_after.and_then(|v| v.trim().parse().ok()).unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            AccrualOutcome::RateLimited { retry_after_secs }
        },
        StatusCode::INTERNAL_SERVER_ERROR => AccrualOutcome::Transient("accrual service internal error".to_string()),
        other => AccrualOutcome::Permanent(format!("unexpected status code: {}", other.as_u16())),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ok_response_with_accrual_becomes_update() {
        let body = r#"{"order": "79927398713", "status": "PROCESSED", "accrual": 42.5}"#;
        let outcome = classify(StatusCode::OK, None, body);
        assert_eq!(
            outcome,
            AccrualOutcome::Update { status: OrderStatusType::Processed, accrual: Points::from(4_250) }
        );
    }

    #[test]
    fn missing_accrual_defaults_to_zero() {
        let body = r#"{"order": "42", "status": "REGISTERED"}"#;
        let outcome = classify(StatusCode::OK, None, body);
        assert_eq!(outcome, AccrualOutcome::Update { status: OrderStatusType::Registered, accrual: Points::ZERO });
    }

    #[test]
    fn undecodable_body_is_transient() {
        assert!(matches!(classify(StatusCode::OK, None, "{"), AccrualOutcome::Transient(_)));
    }

    #[test]
    fn no_content_means_not_registered() {
        assert_eq!(classify(StatusCode::NO_CONTENT, None, ""), AccrualOutcome::NotRegistered);
    }

    #[test]
    fn rate_limit_parses_retry_after() {
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS, Some("2"), ""),
            AccrualOutcome::RateLimited { retry_after_secs: 2 }
        );
    }

    #[test]
    fn rate_limit_defaults_to_sixty_seconds() {
        for header in [None, Some("soon"), Some("")] {
            assert_eq!(
                classify(StatusCode::TOO_MANY_REQUESTS, header, ""),
                AccrualOutcome::RateLimited { retry_after_secs: 60 }
            );
        }
    }

    #[test]
    fn server_error_is_transient_and_the_rest_permanent() {
        assert!(matches!(classify(StatusCode::INTERNAL_SERVER_ERROR, None, ""), AccrualOutcome::Transient(_)));
        assert!(matches!(classify(StatusCode::NOT_FOUND, None, ""), AccrualOutcome::Permanent(_)));
        assert!(matches!(classify(StatusCode::BAD_GATEWAY, None, ""), AccrualOutcome::Permanent(_)));
    }

    #[test]
    fn scheme_is_prepended_when_missing() {
        let client = AccrualClient::new("localhost:8082").unwrap();
        assert_eq!(client.order_url("42"), "http://localhost:8082/api/orders/42");
        let client = AccrualClient::new("https://accrual.example.com/").unwrap();
        assert_eq!(client.order_url("42"), "https://accrual.example.com/api/orders/42");
    }
}
