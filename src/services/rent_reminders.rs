use std::{fmt, str::FromStr, sync::Arc};

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, AppResult},
    repository::rent_ledger::{
        ActivityLogEntry, PropertyRecord, ReminderLogEntry, ReminderTarget, RentLedgerStore,
        RentUnitRecord, TargetFilter, TenantRecord,
    },
    services::{
        billing_calendar::MonthKey,
        late_fees::{round_cents, LateFeePolicy},
        reminder_delivery::ReminderDelivery,
        rent_rollup::{compute_rollup, RollupSnapshot},
        tracking::{statement_id, ReminderLinks, TrackingLinks, TrackingToken},
    },
    state::AppState,
};

pub const REMINDER_SENT_EVENT: &str = "reminder_sent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderType {
    #[serde(rename = "due-7")]
    Due7,
    #[serde(rename = "due-3")]
    Due3,
    #[serde(rename = "due-1")]
    Due1,
    #[serde(rename = "late-fee")]
    LateFee,
}

impl ReminderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Due7 => "due-7",
            Self::Due3 => "due-3",
            Self::Due1 => "due-1",
            Self::LateFee => "late-fee",
        }
    }

    /// Pre-due milestone firing `days_until` days before the due date.
    pub fn for_days_until(days_until: i64) -> Option<Self> {
        match days_until {
            7 => Some(Self::Due7),
            3 => Some(Self::Due3),
            1 => Some(Self::Due1),
            _ => None,
        }
    }
}

impl fmt::Display for ReminderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderType {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "due-7" => Ok(Self::Due7),
            "due-3" => Ok(Self::Due3),
            "due-1" => Ok(Self::Due1),
            "late-fee" => Ok(Self::LateFee),
            other => Err(AppError::BadRequest(format!(
                "Unknown reminder type '{other}'. Expected due-7, due-3, due-1 or late-fee."
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    LateFee,
    Upcoming,
    Overdue,
}

impl ReminderStatus {
    fn derive(reminder_type: ReminderType, days_until: i64) -> Self {
        if reminder_type == ReminderType::LateFee {
            Self::LateFee
        } else if days_until >= 0 {
            Self::Upcoming
        } else {
            Self::Overdue
        }
    }
}

/// Reminder types that fire today for a unit whose earliest unpaid due date
/// is `days_until` days away (negative when past due).
/// The late-fee alert fires only on days the fee steps up.
pub fn reminders_due(days_until: i64, rent: f64, policy: &LateFeePolicy) -> Vec<ReminderType> {
    let mut due = Vec::new();
    if let Some(milestone) = ReminderType::for_days_until(days_until) {
        due.push(milestone);
    }
    if days_until < 0 && policy.fee_increased(-days_until, rent) {
        due.push(ReminderType::LateFee);
    }
    due
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantContact {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedRef {
    pub id: i64,
    pub name: String,
}

/// Body POSTed to the notification webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderPayload {
    pub event: &'static str,
    pub reminder_type: ReminderType,
    pub status: ReminderStatus,
    pub tenant: TenantContact,
    pub rent_unit: NamedRef,
    pub property: Option<NamedRef>,
    pub statement_id: String,
    pub billing_period: MonthKey,
    pub billing_period_label: String,
    pub due_date: NaiveDate,
    pub days_until: i64,
    pub rent: f64,
    pub late_fee: f64,
    pub total_due: f64,
    pub forced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<ReminderLinks>,
}

#[derive(Debug, Clone)]
pub struct ReminderRunRequest {
    pub today: NaiveDate,
    /// Manual send: exactly this type, no de-duplication, nothing logged.
    pub forced: Option<ReminderType>,
    pub tenant_id: Option<i64>,
    pub rent_unit_id: Option<i64>,
}

impl ReminderRunRequest {
    pub fn scheduled(today: NaiveDate) -> Self {
        Self {
            today,
            forced: None,
            tenant_id: None,
            rent_unit_id: None,
        }
    }
}

/// Result of one reminder pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReminderRunSummary {
    pub date: NaiveDate,
    pub forced: bool,
    pub tenants_evaluated: u32,
    pub sent: u32,
    pub skipped_duplicates: u32,
    pub failed: u32,
    pub errors: u32,
}

#[derive(Debug, Default)]
struct TargetOutcome {
    sent: u32,
    skipped_duplicates: u32,
    failed: u32,
    errors: u32,
}

impl ReminderRunSummary {
    fn absorb(&mut self, outcome: TargetOutcome) {
        self.tenants_evaluated += 1;
        self.sent += outcome.sent;
        self.skipped_duplicates += outcome.skipped_duplicates;
        self.failed += outcome.failed;
        self.errors += outcome.errors;
    }
}

#[derive(Clone)]
pub struct ReminderEngine {
    store: Arc<dyn RentLedgerStore>,
    delivery: Arc<dyn ReminderDelivery>,
    policy: LateFeePolicy,
    links: Option<TrackingLinks>,
    concurrency: usize,
    timezone: Tz,
}

impl ReminderEngine {
    pub fn new(
        store: Arc<dyn RentLedgerStore>,
        delivery: Arc<dyn ReminderDelivery>,
        policy: LateFeePolicy,
    ) -> Self {
        Self {
            store,
            delivery,
            policy,
            links: None,
            concurrency: 1,
            timezone: Tz::UTC,
        }
    }

    pub fn with_links(mut self, links: Option<TrackingLinks>) -> Self {
        self.links = links;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Evaluate every eligible tenant and deliver the reminders due today.
    ///
    /// A failure for one tenant is logged and counted; it never aborts the
    /// rest of the pass.
    pub async fn run(&self, request: &ReminderRunRequest) -> AppResult<ReminderRunSummary> {
        if request.forced.is_some() && request.tenant_id.is_none() && request.rent_unit_id.is_none()
        {
            return Err(AppError::BadRequest(
                "Forced reminders require tenant_id or rent_unit_id.".to_string(),
            ));
        }

        let filter = TargetFilter {
            tenant_id: request.tenant_id,
            rent_unit_id: request.rent_unit_id,
            include_disabled: request.forced.is_some(),
        };
        let targets = self.store.list_reminder_targets(&filter).await?;

        let mut summary = ReminderRunSummary {
            date: request.today,
            forced: request.forced.is_some(),
            ..ReminderRunSummary::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for target in targets {
            let engine = self.clone();
            let request = request.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return TargetOutcome {
                        errors: 1,
                        ..TargetOutcome::default()
                    };
                };
                engine.process_target(target, &request).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.absorb(outcome),
                Err(error) => {
                    warn!(%error, "Reminder task aborted");
                    summary.errors += 1;
                }
            }
        }

        info!(
            date = %summary.date,
            forced = summary.forced,
            tenants = summary.tenants_evaluated,
            sent = summary.sent,
            duplicates = summary.skipped_duplicates,
            failed = summary.failed,
            errors = summary.errors,
            "Rent reminder run completed"
        );

        Ok(summary)
    }

    async fn process_target(
        &self,
        target: ReminderTarget,
        request: &ReminderRunRequest,
    ) -> TargetOutcome {
        let mut outcome = TargetOutcome::default();
        let ReminderTarget {
            tenant,
            unit,
            property,
        } = target;

        let payments = match self.store.list_payments(unit.id).await {
            Ok(payments) => payments,
            Err(error) => {
                warn!(tenant_id = tenant.id, rent_unit_id = unit.id, %error, "Failed to load payments");
                outcome.errors += 1;
                return outcome;
            }
        };

        let snapshot = compute_rollup(
            &unit.terms(self.timezone),
            &payments,
            request.today,
            &self.policy,
        );
        let days_until = snapshot.days_until_due(request.today);
        let reminder_types = match request.forced {
            Some(forced) => vec![forced],
            None => reminders_due(days_until, unit.rent, &self.policy),
        };

        for reminder_type in reminder_types {
            let entry = ReminderLogEntry {
                tenant_id: tenant.id,
                reminder_type,
                due_date: snapshot.due_date,
                reminder_date: request.today,
                late_fee: snapshot.late_fee,
            };

            if request.forced.is_none() {
                match self.store.claim_reminder(&entry).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(
                            tenant_id = tenant.id,
                            reminder_type = %reminder_type,
                            due_date = %snapshot.due_date,
                            "Reminder already sent today"
                        );
                        outcome.skipped_duplicates += 1;
                        continue;
                    }
                    Err(error) => {
                        warn!(tenant_id = tenant.id, %error, "Failed to claim reminder cell");
                        outcome.errors += 1;
                        continue;
                    }
                }
            }

            let payload = self.build_payload(
                &tenant,
                &unit,
                property.as_ref(),
                &snapshot,
                reminder_type,
                days_until,
                request.forced.is_some(),
            );

            match self.delivery.deliver(&payload).await {
                Ok(()) => {
                    outcome.sent += 1;
                    info!(
                        tenant_id = tenant.id,
                        rent_unit_id = unit.id,
                        reminder_type = %reminder_type,
                        due_date = %snapshot.due_date,
                        forced = payload.forced,
                        "Rent reminder sent"
                    );
                    if request.forced.is_none() {
                        self.record_sent(&payload).await;
                    }
                }
                Err(error) => {
                    warn!(
                        tenant_id = tenant.id,
                        reminder_type = %reminder_type,
                        %error,
                        "Rent reminder delivery failed"
                    );
                    outcome.failed += 1;
                    if request.forced.is_none() {
                        if let Err(error) = self.store.release_reminder(&entry).await {
                            warn!(tenant_id = tenant.id, %error, "Failed to release reminder claim");
                        }
                    }
                }
            }
        }

        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn build_payload(
        &self,
        tenant: &TenantRecord,
        unit: &RentUnitRecord,
        property: Option<&PropertyRecord>,
        snapshot: &RollupSnapshot,
        reminder_type: ReminderType,
        days_until: i64,
        forced: bool,
    ) -> ReminderPayload {
        let statement_id = statement_id(unit.id, snapshot.month_key);
        let links = self.links.as_ref().and_then(|links| {
            links.for_token(&TrackingToken {
                tenant_id: tenant.id,
                rent_unit_id: unit.id,
                statement_id: statement_id.clone(),
            })
        });

        ReminderPayload {
            event: "rent_reminder",
            reminder_type,
            status: ReminderStatus::derive(reminder_type, days_until),
            tenant: TenantContact {
                id: tenant.id,
                name: tenant.full_name.clone(),
                email: tenant.email.clone(),
                phone: tenant.phone.clone(),
            },
            rent_unit: NamedRef {
                id: unit.id,
                name: unit.name.clone(),
            },
            property: property.map(|property| NamedRef {
                id: property.id,
                name: property.name.clone(),
            }),
            statement_id,
            billing_period: snapshot.month_key,
            billing_period_label: snapshot.month_key.label(),
            due_date: snapshot.due_date,
            days_until,
            rent: round_cents(unit.rent),
            late_fee: snapshot.late_fee,
            total_due: snapshot.total_due,
            forced,
            links,
        }
    }

    async fn record_sent(&self, payload: &ReminderPayload) {
        let entry = ActivityLogEntry {
            tenant_id: Some(payload.tenant.id),
            rent_unit_id: Some(payload.rent_unit.id),
            statement_id: Some(payload.statement_id.clone()),
            event_type: REMINDER_SENT_EVENT.to_string(),
            metadata: json!({
                "reminder_type": payload.reminder_type,
                "status": payload.status,
                "due_date": payload.due_date,
                "days_until": payload.days_until,
                "late_fee": payload.late_fee,
                "total_due": payload.total_due,
            }),
        };
        if let Err(error) = self.store.append_activity(&entry).await {
            warn!(tenant_id = payload.tenant.id, %error, "Failed to write reminder activity");
        }
    }
}

/// Run a reminder pass unless one is already in flight in this process.
pub async fn run_exclusive(
    state: &AppState,
    request: &ReminderRunRequest,
) -> AppResult<ReminderRunSummary> {
    let Ok(_guard) = Arc::clone(&state.reminder_run_lock).try_lock_owned() else {
        return Err(AppError::Conflict(
            "A reminder run is already in progress.".to_string(),
        ));
    };
    let engine = state.reminder_engine()?;
    engine.run(request).await
}
