use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;

use crate::{
    auth::require_cron_secret,
    error::{AppError, AppResult},
    repository::rent_ledger::RentUnitRecord,
    schemas::{parse_date, validate_input, RentUnitPath, RollupQuery},
    services::{
        rent_rollup::{compute_rollup, RollupSnapshot},
        tracking::statement_id,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/rent-units/{rent_unit_id}/rollup",
        axum::routing::get(get_rent_unit_rollup),
    )
}

#[derive(Debug, Serialize)]
struct RollupResponse {
    rent_unit: RentUnitRecord,
    as_of: chrono::NaiveDate,
    statement_id: String,
    days_until_due: i64,
    is_current: bool,
    #[serde(flatten)]
    rollup: RollupSnapshot,
}

async fn get_rent_unit_rollup(
    State(state): State<AppState>,
    Path(path): Path<RentUnitPath>,
    Query(query): Query<RollupQuery>,
    headers: HeaderMap,
) -> AppResult<Json<RollupResponse>> {
    require_cron_secret(&state, &headers, query.secret.as_deref())?;
    validate_input(&query)?;

    let today = match query.date.as_deref() {
        Some(raw) if state.config.date_override_allowed() => parse_date("date", raw)?,
        Some(_) => {
            return Err(AppError::BadRequest(
                "The date override is disabled in production.".to_string(),
            ))
        }
        None => state.config.local_today(),
    };

    let store = state.ledger_store()?;
    let unit = store
        .get_rent_unit(path.rent_unit_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Rent unit not found.".to_string()))?;
    let payments = store.list_payments(unit.id).await?;

    let rollup = compute_rollup(
        &unit.terms(state.config.reminder_timezone),
        &payments,
        today,
        &state.config.late_fee_policy,
    );

    Ok(Json(RollupResponse {
        statement_id: statement_id(unit.id, rollup.month_key),
        days_until_due: rollup.days_until_due(today),
        is_current: rollup.is_current(),
        as_of: today,
        rent_unit: unit,
        rollup,
    }))
}
