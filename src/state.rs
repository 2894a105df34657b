use std::{sync::Arc, time::Duration};

use reqwest::Client;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::Mutex;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    repository::rent_ledger::{PgRentLedgerStore, RentLedgerStore},
    services::{
        reminder_delivery::{ReminderDelivery, WebhookDelivery},
        rent_reminders::ReminderEngine,
        tracking::TrackingLinks,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub ledger_store: Option<Arc<dyn RentLedgerStore>>,
    pub reminder_delivery: Option<Arc<dyn ReminderDelivery>>,
    /// Held for the duration of a reminder run.
    pub reminder_run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let http_client = Client::builder()
            .user_agent(format!("{}/reminders", config.app_name))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        let db_pool = match config.database_url.as_deref() {
            Some(url) => Some(
                PgPoolOptions::new()
                    .max_connections(config.db_pool_max_connections)
                    .min_connections(config.db_pool_min_connections)
                    .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
                    .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
                    .connect_lazy(url)?,
            ),
            None => {
                tracing::warn!("DATABASE_URL is not set; ledger endpoints will return 502");
                None
            }
        };

        let ledger_store = db_pool
            .clone()
            .map(|pool| Arc::new(PgRentLedgerStore::new(pool)) as Arc<dyn RentLedgerStore>);

        let reminder_delivery = match config.reminder_webhook_url.as_deref() {
            Some(url) => Some(Arc::new(WebhookDelivery::new(
                http_client,
                url,
                Duration::from_secs(config.reminder_webhook_timeout_seconds),
            )) as Arc<dyn ReminderDelivery>),
            None => {
                tracing::warn!("REMINDER_WEBHOOK_URL is not set; reminder runs are disabled");
                None
            }
        };

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            ledger_store,
            reminder_delivery,
            reminder_run_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn ledger_store(&self) -> AppResult<Arc<dyn RentLedgerStore>> {
        self.ledger_store.clone().ok_or_else(|| {
            AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
        })
    }

    pub fn tracking_links(&self) -> Option<TrackingLinks> {
        self.config.tracking_secret().map(|secret| {
            TrackingLinks::new(
                secret,
                &self.config.tracking_base_url(),
                &self.config.app_public_url,
            )
        })
    }

    pub fn reminder_engine(&self) -> AppResult<ReminderEngine> {
        let store = self.ledger_store()?;
        let delivery = self.reminder_delivery.clone().ok_or_else(|| {
            AppError::Dependency(
                "Reminder delivery is not configured. Set REMINDER_WEBHOOK_URL.".to_string(),
            )
        })?;

        Ok(
            ReminderEngine::new(store, delivery, self.config.late_fee_policy)
                .with_links(self.tracking_links())
                .with_concurrency(self.config.reminder_delivery_concurrency)
                .with_timezone(self.config.reminder_timezone),
        )
    }
}

#[cfg(test)]
impl AppState {
    pub fn for_tests(
        config: AppConfig,
        ledger_store: Option<Arc<dyn RentLedgerStore>>,
        reminder_delivery: Option<Arc<dyn ReminderDelivery>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db_pool: None,
            ledger_store,
            reminder_delivery,
            reminder_run_lock: Arc::new(Mutex::new(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::AppState;
    use crate::{config::AppConfig, error::AppError, repository::memory::MemoryLedgerStore};

    #[test]
    fn missing_dependencies_surface_as_bad_gateway() {
        let state = AppState::for_tests(AppConfig::for_tests(), None, None);
        assert!(matches!(state.ledger_store(), Err(AppError::Dependency(_))));
        assert!(matches!(state.reminder_engine(), Err(AppError::Dependency(_))));

        let with_store = AppState::for_tests(
            AppConfig::for_tests(),
            Some(Arc::new(MemoryLedgerStore::default())),
            None,
        );
        assert!(with_store.ledger_store().is_ok());
        assert!(matches!(with_store.reminder_engine(), Err(AppError::Dependency(_))));
    }

    #[test]
    fn webhook_url_enables_delivery() {
        let state = AppState::build(AppConfig::for_tests()).expect("state builds");
        assert!(state.db_pool.is_none());
        assert!(state.reminder_delivery.is_none());

        let config = AppConfig {
            reminder_webhook_url: Some("https://hooks.example.com/rent".to_string()),
            ..AppConfig::for_tests()
        };
        let state = AppState::build(config).expect("state builds");
        assert!(state.reminder_delivery.is_some());
    }

    #[test]
    fn tracking_links_need_a_secret() {
        let state = AppState::for_tests(AppConfig::for_tests(), None, None);
        assert!(state.tracking_links().is_none());

        let config = AppConfig {
            reminder_cron_secret: Some("cron".to_string()),
            ..AppConfig::for_tests()
        };
        assert!(AppState::for_tests(config, None, None).tracking_links().is_some());
    }
}
