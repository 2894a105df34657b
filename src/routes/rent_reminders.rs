use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};

use crate::{
    auth::require_cron_secret,
    error::{AppError, AppResult},
    schemas::{flag_enabled, parse_date, validate_input, ReminderTriggerQuery},
    services::rent_reminders::{run_exclusive, ReminderRunRequest, ReminderRunSummary, ReminderType},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/internal/rent-reminders",
        axum::routing::get(trigger_rent_reminders).post(trigger_rent_reminders),
    )
}

/// Cron entry point. GET and POST behave the same so plain HTTP schedulers
/// can call it.
async fn trigger_rent_reminders(
    State(state): State<AppState>,
    Query(query): Query<ReminderTriggerQuery>,
    headers: HeaderMap,
) -> AppResult<Json<ReminderRunSummary>> {
    require_cron_secret(&state, &headers, query.secret.as_deref())?;
    validate_input(&query)?;

    let request = run_request(&state, &query)?;
    let summary = run_exclusive(&state, &request).await?;
    Ok(Json(summary))
}

fn run_request(state: &AppState, query: &ReminderTriggerQuery) -> AppResult<ReminderRunRequest> {
    let today = match query.date.as_deref() {
        Some(raw) if state.config.date_override_allowed() => parse_date("date", raw)?,
        Some(_) => {
            return Err(AppError::BadRequest(
                "The date override is disabled in production.".to_string(),
            ))
        }
        None => state.config.local_today(),
    };

    let forced = if flag_enabled(query.force.as_deref()) {
        let reminder_type = query
            .reminder_type
            .as_deref()
            .ok_or_else(|| {
                AppError::BadRequest("force=1 requires type=<due-7|due-3|due-1|late-fee>.".to_string())
            })?
            .parse::<ReminderType>()?;
        Some(reminder_type)
    } else {
        None
    };

    Ok(ReminderRunRequest {
        today,
        forced,
        tenant_id: query.tenant_id,
        rent_unit_id: query.rent_unit_id,
    })
}
