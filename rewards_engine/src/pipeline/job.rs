use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db_types::{Order, OrderStatusType};

/// One order in flight through the worker pool.
///
/// Jobs are produced by the notification listener (decoded straight from the `new_orders` payload) and by the
/// backfill scan. They are never persisted: a job lost to a crash is rediscovered by the next startup scan, because
/// its order row is still `NEW`.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub order_id: i64,
    pub user_id: i64,
    pub number: String,
    pub status: OrderStatusType,
    /// When this job entered the pipeline. Diagnostics only.
    #[serde(skip, default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Retry counter maintained by the worker pool.
    #[serde(skip)]
    pub attempt: u32,
}

impl Job {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id,
            number: order.number.clone(),
            status: order.status,
            created_at: Utc::now(),
            attempt: 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_the_notification_payload() {
        let payload = r#"{"order_id": 7, "user_id": 3, "number": "79927398713", "status": "NEW"}"#;
        let job: Job = serde_json::from_str(payload).unwrap();
        assert_eq!(job.order_id, 7);
        assert_eq!(job.user_id, 3);
        assert_eq!(job.number, "79927398713");
        assert_eq!(job.status, OrderStatusType::New);
        assert_eq!(job.attempt, 0);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(serde_json::from_str::<Job>(r#"{"order_id": "seven"}"#).is_err());
        assert!(serde_json::from_str::<Job>("not json").is_err());
    }
}
