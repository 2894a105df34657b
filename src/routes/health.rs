use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_ok = if let Some(pool) = &state.db_pool {
        // Bounded so the probe answers even when the first connect hangs.
        match tokio::time::timeout(
            Duration::from_secs(3),
            sqlx::query("SELECT 1").fetch_one(pool),
        )
        .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Health check DB query failed");
                false
            }
            Err(_) => {
                tracing::error!("Health check DB query timed out (3s)");
                false
            }
        }
    } else {
        true
    };

    let status = if db_ok { "ok" } else { "degraded" };
    Json(json!({
        "status": status,
        "now": Utc::now().to_rfc3339(),
        "db": db_ok,
        "today": state.config.local_today(),
        "timezone": state.config.reminder_timezone.name(),
        "reminders": {
            "delivery_configured": state.reminder_delivery.is_some(),
            "scheduler_enabled": state.config.reminder_scheduler_enabled,
            "run_in_progress": state.reminder_run_lock.try_lock().is_err(),
        }
    }))
}
