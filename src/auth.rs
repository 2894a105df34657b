use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Gate for scheduler-facing endpoints.
///
/// The secret may arrive in the `x-cron-secret` header or, for cron services
/// that can only issue plain GETs, a `secret` query parameter.
pub fn require_cron_secret(
    state: &AppState,
    headers: &HeaderMap,
    query_secret: Option<&str>,
) -> AppResult<()> {
    let provided = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .or(query_secret)
        .map(str::trim)
        .unwrap_or_default();

    validate_cron_secret(
        state.config.is_production(),
        state.config.reminder_cron_secret.as_deref(),
        provided,
    )
}

fn validate_cron_secret(
    is_production: bool,
    expected_secret: Option<&str>,
    provided_secret: &str,
) -> AppResult<()> {
    let expected = expected_secret.map(str::trim).unwrap_or_default();

    if is_production && expected.is_empty() {
        return Err(AppError::Dependency(
            "REMINDER_CRON_SECRET must be set in production to trigger reminders.".to_string(),
        ));
    }

    if !expected.is_empty() && !secrets_match(provided_secret, expected) {
        return Err(AppError::Unauthorized(
            "Invalid or missing cron secret.".to_string(),
        ));
    }

    Ok(())
}

// Fixed-length digests keep the comparison independent of the prefix match.
fn secrets_match(provided: &str, expected: &str) -> bool {
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}
