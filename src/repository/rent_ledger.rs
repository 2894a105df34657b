use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    error::{AppError, AppResult},
    services::{
        billing_calendar::DueMonthDay,
        rent_reminders::ReminderType,
        rent_rollup::{PaymentRecord, RentTerms},
    },
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentUnitRecord {
    pub id: i64,
    pub property_id: Option<i64>,
    pub name: String,
    pub rent: f64,
    pub initial_due_month_day: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RentUnitRecord {
    pub fn due_pattern(&self) -> DueMonthDay {
        DueMonthDay::parse_or_default(self.initial_due_month_day.as_deref())
    }

    /// Billing terms with the creation instant read in `timezone`.
    pub fn terms(&self, timezone: Tz) -> RentTerms {
        RentTerms {
            rent: self.rent,
            due_pattern: self.due_pattern(),
            created_at: self.created_at.with_timezone(&timezone).naive_local(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyRecord {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantRecord {
    pub id: i64,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub reminders_enabled: bool,
}

/// A tenant together with the unit it rents, ready for a reminder pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderTarget {
    pub tenant: TenantRecord,
    pub unit: RentUnitRecord,
    pub property: Option<PropertyRecord>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TargetFilter {
    pub tenant_id: Option<i64>,
    pub rent_unit_id: Option<i64>,
    /// Include tenants that opted out of reminders (manual sends only).
    pub include_disabled: bool,
}

/// One reminder cell. `(tenant_id, reminder_type, due_date, reminder_date)`
/// is unique in storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderLogEntry {
    pub tenant_id: i64,
    pub reminder_type: ReminderType,
    pub due_date: NaiveDate,
    pub reminder_date: NaiveDate,
    pub late_fee: f64,
}

impl ReminderLogEntry {
    pub fn same_cell(&self, other: &Self) -> bool {
        self.tenant_id == other.tenant_id
            && self.reminder_type == other.reminder_type
            && self.due_date == other.due_date
            && self.reminder_date == other.reminder_date
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityLogEntry {
    pub tenant_id: Option<i64>,
    pub rent_unit_id: Option<i64>,
    pub statement_id: Option<String>,
    pub event_type: String,
    pub metadata: Value,
}

#[async_trait]
pub trait RentLedgerStore: Send + Sync {
    async fn list_reminder_targets(&self, filter: &TargetFilter)
        -> AppResult<Vec<ReminderTarget>>;

    async fn get_rent_unit(&self, rent_unit_id: i64) -> AppResult<Option<RentUnitRecord>>;

    async fn list_payments(&self, rent_unit_id: i64) -> AppResult<Vec<PaymentRecord>>;

    /// Atomically claim a reminder cell. `false` means it was already sent.
    async fn claim_reminder(&self, entry: &ReminderLogEntry) -> AppResult<bool>;

    /// Drop a claim whose delivery failed so the cell stays eligible.
    async fn release_reminder(&self, entry: &ReminderLogEntry) -> AppResult<()>;

    async fn append_activity(&self, entry: &ActivityLogEntry) -> AppResult<()>;
}

#[derive(Clone)]
pub struct PgRentLedgerStore {
    pool: PgPool,
}

impl PgRentLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const UNIT_COLUMNS: &str = "u.id AS unit_id,
       u.property_id,
       u.name AS unit_name,
       u.rent::float8 AS rent,
       u.initial_due_month_day,
       u.created_at AS unit_created_at";

#[async_trait]
impl RentLedgerStore for PgRentLedgerStore {
    async fn list_reminder_targets(
        &self,
        filter: &TargetFilter,
    ) -> AppResult<Vec<ReminderTarget>> {
        let sql = format!(
            "SELECT t.id AS tenant_id,
                    t.full_name,
                    t.email,
                    t.phone,
                    t.reminders_enabled,
                    {UNIT_COLUMNS},
                    p.name AS property_name
             FROM tenants t
             JOIN rent_units u ON u.id = t.rent_unit_id
             LEFT JOIN properties p ON p.id = u.property_id
             WHERE ($1::bigint IS NULL OR t.id = $1)
               AND ($2::bigint IS NULL OR u.id = $2)
               AND ($3 OR t.reminders_enabled)
             ORDER BY t.id"
        );

        let rows = sqlx::query(&sql)
            .bind(filter.tenant_id)
            .bind(filter.rent_unit_id)
            .bind(filter.include_disabled)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        rows.iter().map(read_target).collect()
    }

    async fn get_rent_unit(&self, rent_unit_id: i64) -> AppResult<Option<RentUnitRecord>> {
        let sql = format!("SELECT {UNIT_COLUMNS} FROM rent_units u WHERE u.id = $1");
        let row = sqlx::query(&sql)
            .bind(rent_unit_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        row.as_ref().map(read_unit).transpose()
    }

    async fn list_payments(&self, rent_unit_id: i64) -> AppResult<Vec<PaymentRecord>> {
        let rows = sqlx::query_as::<_, (NaiveDate, f64)>(
            "SELECT date, amount::float8
             FROM payments
             WHERE rent_unit_id = $1
             ORDER BY date, id",
        )
        .bind(rent_unit_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows
            .into_iter()
            .map(|(date, amount)| PaymentRecord { date, amount })
            .collect())
    }

    async fn claim_reminder(&self, entry: &ReminderLogEntry) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO reminder_logs (tenant_id, reminder_type, due_date, reminder_date, late_fee)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT ON CONSTRAINT reminder_logs_cell_key DO NOTHING",
        )
        .bind(entry.tenant_id)
        .bind(entry.reminder_type.as_str())
        .bind(entry.due_date)
        .bind(entry.reminder_date)
        .bind(entry.late_fee)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_reminder(&self, entry: &ReminderLogEntry) -> AppResult<()> {
        sqlx::query(
            "DELETE FROM reminder_logs
             WHERE tenant_id = $1 AND reminder_type = $2 AND due_date = $3 AND reminder_date = $4",
        )
        .bind(entry.tenant_id)
        .bind(entry.reminder_type.as_str())
        .bind(entry.due_date)
        .bind(entry.reminder_date)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn append_activity(&self, entry: &ActivityLogEntry) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO activity_logs (tenant_id, rent_unit_id, statement_id, event_type, metadata)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.tenant_id)
        .bind(entry.rent_unit_id)
        .bind(entry.statement_id.as_deref())
        .bind(&entry.event_type)
        .bind(&entry.metadata)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }
}

fn read_unit(row: &PgRow) -> AppResult<RentUnitRecord> {
    Ok(RentUnitRecord {
        id: row.try_get("unit_id").map_err(map_db_error)?,
        property_id: row.try_get("property_id").map_err(map_db_error)?,
        name: row
            .try_get::<Option<String>, _>("unit_name")
            .map_err(map_db_error)?
            .unwrap_or_default(),
        rent: row.try_get("rent").map_err(map_db_error)?,
        initial_due_month_day: row
            .try_get("initial_due_month_day")
            .map_err(map_db_error)?,
        created_at: row.try_get("unit_created_at").map_err(map_db_error)?,
    })
}

fn read_target(row: &PgRow) -> AppResult<ReminderTarget> {
    let unit = read_unit(row)?;
    let property = match (
        unit.property_id,
        row.try_get::<Option<String>, _>("property_name")
            .map_err(map_db_error)?,
    ) {
        (Some(id), Some(name)) => Some(PropertyRecord { id, name }),
        _ => None,
    };

    Ok(ReminderTarget {
        tenant: TenantRecord {
            id: row.try_get("tenant_id").map_err(map_db_error)?,
            full_name: row
                .try_get::<Option<String>, _>("full_name")
                .map_err(map_db_error)?
                .unwrap_or_default(),
            email: row.try_get("email").map_err(map_db_error)?,
            phone: row.try_get("phone").map_err(map_db_error)?,
            reminders_enabled: row.try_get("reminders_enabled").map_err(map_db_error)?,
        },
        unit,
        property,
    })
}

fn map_db_error(error: sqlx::Error) -> AppError {
    tracing::error!(db_error = %error, "Database query failed");
    AppError::Dependency("Database operation failed.".to_string())
}
