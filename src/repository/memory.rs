//! In-process ledger store used by tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    error::{AppError, AppResult},
    repository::rent_ledger::{
        ActivityLogEntry, ReminderLogEntry, ReminderTarget, RentLedgerStore, RentUnitRecord,
        TargetFilter,
    },
    services::rent_rollup::PaymentRecord,
};

#[derive(Default)]
pub struct MemoryLedgerStore {
    targets: Mutex<Vec<ReminderTarget>>,
    payments: Mutex<HashMap<i64, Vec<PaymentRecord>>>,
    reminders: Mutex<Vec<ReminderLogEntry>>,
    activity: Mutex<Vec<ActivityLogEntry>>,
    failing_payment_units: Mutex<Vec<i64>>,
}

impl MemoryLedgerStore {
    pub fn with_target(self, target: ReminderTarget) -> Self {
        lock(&self.targets).push(target);
        self
    }

    pub fn with_payment(self, rent_unit_id: i64, payment: PaymentRecord) -> Self {
        lock(&self.payments)
            .entry(rent_unit_id)
            .or_default()
            .push(payment);
        self
    }

    pub fn with_reminder(self, entry: ReminderLogEntry) -> Self {
        lock(&self.reminders).push(entry);
        self
    }

    /// Make payment lookups for `rent_unit_id` fail.
    pub fn with_failing_payments(self, rent_unit_id: i64) -> Self {
        lock(&self.failing_payment_units).push(rent_unit_id);
        self
    }

    pub fn reminders(&self) -> Vec<ReminderLogEntry> {
        lock(&self.reminders).clone()
    }

    pub fn activity(&self) -> Vec<ActivityLogEntry> {
        lock(&self.activity).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RentLedgerStore for MemoryLedgerStore {
    async fn list_reminder_targets(
        &self,
        filter: &TargetFilter,
    ) -> AppResult<Vec<ReminderTarget>> {
        let mut targets = lock(&self.targets)
            .iter()
            .filter(|target| filter.tenant_id.map_or(true, |id| id == target.tenant.id))
            .filter(|target| filter.rent_unit_id.map_or(true, |id| id == target.unit.id))
            .filter(|target| filter.include_disabled || target.tenant.reminders_enabled)
            .cloned()
            .collect::<Vec<_>>();
        targets.sort_by_key(|target| target.tenant.id);
        Ok(targets)
    }

    async fn get_rent_unit(&self, rent_unit_id: i64) -> AppResult<Option<RentUnitRecord>> {
        Ok(lock(&self.targets)
            .iter()
            .find(|target| target.unit.id == rent_unit_id)
            .map(|target| target.unit.clone()))
    }

    async fn list_payments(&self, rent_unit_id: i64) -> AppResult<Vec<PaymentRecord>> {
        if lock(&self.failing_payment_units).contains(&rent_unit_id) {
            return Err(AppError::Dependency("Database operation failed.".to_string()));
        }
        Ok(lock(&self.payments)
            .get(&rent_unit_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn claim_reminder(&self, entry: &ReminderLogEntry) -> AppResult<bool> {
        let mut reminders = lock(&self.reminders);
        if reminders.iter().any(|existing| existing.same_cell(entry)) {
            return Ok(false);
        }
        reminders.push(entry.clone());
        Ok(true)
    }

    async fn release_reminder(&self, entry: &ReminderLogEntry) -> AppResult<()> {
        lock(&self.reminders).retain(|existing| !existing.same_cell(entry));
        Ok(())
    }

    async fn append_activity(&self, entry: &ActivityLogEntry) -> AppResult<()> {
        lock(&self.activity).push(entry.clone());
        Ok(())
    }
}
