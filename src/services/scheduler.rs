use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Timelike, Utc};
use tokio::time::sleep;

use crate::{
    error::AppError,
    services::rent_reminders::{run_exclusive, ReminderRunRequest},
    state::AppState,
};

const TICK: Duration = Duration::from_secs(15);

/// In-process stand-in for an external cron: runs the reminder pass once per
/// local calendar day, at or after `REMINDER_DAILY_HOUR`.
///
/// Each pass runs in its own `tokio::spawn` so a panic never takes the loop
/// down with it.
pub async fn run_background_scheduler(state: AppState) {
    if let Err(error) = state.reminder_engine() {
        tracing::warn!(%error, "Scheduler: reminder engine unavailable, exiting");
        return;
    }

    tracing::info!(
        hour = state.config.reminder_daily_hour,
        timezone = state.config.reminder_timezone.name(),
        "Background reminder scheduler started"
    );

    let mut last_daily_run: Option<NaiveDate> = None;

    loop {
        sleep(TICK).await;

        let now_local = Utc::now()
            .with_timezone(&state.config.reminder_timezone)
            .naive_local();
        if !daily_run_due(now_local, last_daily_run, state.config.reminder_daily_hour) {
            continue;
        }

        let today = now_local.date();
        last_daily_run = Some(today);
        tracing::info!("Scheduler: running rent reminders for {today}");

        let st = state.clone();
        tokio::spawn(async move {
            match run_exclusive(&st, &ReminderRunRequest::scheduled(today)).await {
                Ok(summary) => tracing::info!(
                    sent = summary.sent,
                    failed = summary.failed,
                    duplicates = summary.skipped_duplicates,
                    "Scheduler: rent reminder run completed"
                ),
                Err(AppError::Conflict(_)) => {
                    tracing::info!("Scheduler: reminder run already in progress, skipping")
                }
                Err(error) => tracing::error!(%error, "Scheduler: rent reminder run failed"),
            }
        });
    }
}

fn daily_run_due(now_local: NaiveDateTime, last_run: Option<NaiveDate>, hour: u32) -> bool {
    last_run != Some(now_local.date()) && now_local.hour() >= hour
}
