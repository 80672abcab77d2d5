use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use rwd_common::Points;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------   OrderStatusType     -------------------------------------------------------
/// The lifecycle status of an uploaded order.
///
/// `Processed` and `Invalid` are terminal: once an order reaches either, the pipeline performs no further updates.
/// The wire representation (JSON and database) is the upper-case name, e.g. `"PROCESSING"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(type_name = "order_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatusType {
    /// The order has been uploaded and not yet seen by the accrual service.
    New,
    /// The accrual service has registered the order but not started computing a reward.
    Registered,
    /// The accrual service is computing the reward.
    Processing,
    /// The reward has been computed and credited. Terminal.
    Processed,
    /// The order was rejected by the accrual service. Terminal.
    Invalid,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Processed | OrderStatusType::Invalid)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::New => write!(f, "NEW"),
            OrderStatusType::Registered => write!(f, "REGISTERED"),
            OrderStatusType::Processing => write!(f, "PROCESSING"),
            OrderStatusType::Processed => write!(f, "PROCESSED"),
            OrderStatusType::Invalid => write!(f, "INVALID"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for OrderStatusType {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "REGISTERED" => Ok(Self::Registered),
            "PROCESSING" => Ok(Self::Processing),
            "PROCESSED" => Ok(Self::Processed),
            "INVALID" => Ok(Self::Invalid),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

//--------------------------------------        User          --------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------        Order         --------------------------------------------------------
/// An uploaded order as stored in the `orders` table.
///
/// The JSON representation matches the public API: internal identifiers are not exposed, and a zero accrual is
/// omitted entirely.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub user_id: i64,
    pub number: String,
    pub status: OrderStatusType,
    #[serde(skip_serializing_if = "Points::is_zero")]
    pub accrual: Points,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}

/// Outcome of an order upload. The number column is unique, so a repeated upload resolves to one of the
/// "already there" variants rather than an error.
#[derive(Debug, Clone)]
pub enum OrderInsert {
    Created(Order),
    AlreadyUploaded,
    UploadedByAnother,
}

//--------------------------------------       Balance        --------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Balance {
    pub current: Points,
    pub withdrawn: Points,
}

//--------------------------------------      Withdrawal      --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Withdrawal {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub user_id: i64,
    #[serde(rename = "order")]
    pub order_number: String,
    pub sum: Points,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_strings() {
        for status in [
            OrderStatusType::New,
            OrderStatusType::Registered,
            OrderStatusType::Processing,
            OrderStatusType::Processed,
            OrderStatusType::Invalid,
        ] {
            assert_eq!(status.to_string().parse::<OrderStatusType>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
            assert_eq!(serde_json::from_str::<OrderStatusType>(&json).unwrap(), status);
        }
        assert!("COMPLETED".parse::<OrderStatusType>().is_err());
    }

    #[test]
    fn only_processed_and_invalid_are_terminal() {
        assert!(OrderStatusType::Processed.is_terminal());
        assert!(OrderStatusType::Invalid.is_terminal());
        assert!(!OrderStatusType::New.is_terminal());
        assert!(!OrderStatusType::Registered.is_terminal());
        assert!(!OrderStatusType::Processing.is_terminal());
    }

    #[test]
    fn zero_accrual_is_omitted_from_order_json() {
        let order = Order {
            id: 1,
            user_id: 2,
            number: "79927398713".to_string(),
            status: OrderStatusType::Invalid,
            accrual: Points::ZERO,
            uploaded_at: "2024-06-01T10:00:00Z".parse().unwrap(),
            updated_at: "2024-06-01T10:00:00Z".parse().unwrap(),
        };
        let json = serde_json::to_value(&order).unwrap();
        assert!(json.get("accrual").is_none());
        assert_eq!(json["number"], "79927398713");
        assert_eq!(json["status"], "INVALID");
    }
}
