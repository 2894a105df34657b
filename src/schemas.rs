use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

/// `1`, `true`, `yes` and `on` count as set.
pub fn flag_enabled(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|value| value.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("{field} must be a YYYY-MM-DD date.")))
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ReminderTriggerQuery {
    pub secret: Option<String>,
    pub force: Option<String>,
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 16))]
    pub reminder_type: Option<String>,
    #[validate(range(min = 1))]
    pub tenant_id: Option<i64>,
    #[validate(range(min = 1))]
    pub rent_unit_id: Option<i64>,
    #[validate(length(equal = 10))]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RollupQuery {
    pub secret: Option<String>,
    #[validate(length(equal = 10))]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RentUnitPath {
    pub rent_unit_id: i64,
}

/// Query carried by tracking links. Every field is optional so that a
/// mangled link still gets a response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackingQuery {
    pub tenant_id: Option<i64>,
    pub rent_unit_id: Option<i64>,
    pub statement_id: Option<String>,
    pub sig: Option<String>,
    pub to: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{flag_enabled, parse_date, validate_input, ReminderTriggerQuery};
    use crate::error::AppError;

    #[test]
    fn flags_accept_common_truthy_values() {
        for raw in ["1", "true", "TRUE", " yes ", "on"] {
            assert!(flag_enabled(Some(raw)), "{raw}");
        }
        for raw in ["0", "false", "", "maybe"] {
            assert!(!flag_enabled(Some(raw)), "{raw}");
        }
        assert!(!flag_enabled(None));
    }

    #[test]
    fn dates_must_be_iso() {
        assert!(parse_date("date", "2024-02-29").is_ok());
        assert!(matches!(parse_date("date", "2023-02-29"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_date("date", "02/29/2024"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn trigger_query_rejects_non_positive_ids() {
        let query = ReminderTriggerQuery {
            tenant_id: Some(0),
            ..ReminderTriggerQuery::default()
        };
        assert!(matches!(
            validate_input(&query),
            Err(AppError::UnprocessableEntity(_))
        ));

        let query = ReminderTriggerQuery {
            tenant_id: Some(5),
            date: Some("2024-02-27".to_string()),
            ..ReminderTriggerQuery::default()
        };
        assert!(validate_input(&query).is_ok());
    }
}
