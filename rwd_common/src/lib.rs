mod luhn;
mod points;

pub use luhn::{is_digits_only, luhn_valid};
pub use points::{Points, PointsConversionError};
