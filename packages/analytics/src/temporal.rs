//! Epoch-millisecond to calendar month conversion.

use chrono::{DateTime, Datelike as _};
use hab_effort_models::YearMonth;

use crate::AnalyticsError;

/// Converts milliseconds since 1970-01-01T00:00:00Z to the UTC calendar
/// year and month.
///
/// # Errors
///
/// Returns [`AnalyticsError::Timestamp`] if `millis` is outside the range
/// `chrono` can represent.
pub fn year_month(millis: i64) -> Result<YearMonth, AnalyticsError> {
    let dt = DateTime::from_timestamp_millis(millis).ok_or(AnalyticsError::Timestamp { millis })?;
    Ok(YearMonth {
        year: dt.year(),
        month: dt.month(),
    })
}
