use std::env;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

use crate::services::late_fees::LateFeePolicy;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    pub app_public_url: String,
    pub api_public_url: String,
    pub reminder_webhook_url: Option<String>,
    pub reminder_webhook_timeout_seconds: u64,
    pub reminder_cron_secret: Option<String>,
    pub reminder_tracking_secret: Option<String>,
    pub reminder_scheduler_enabled: bool,
    pub reminder_daily_hour: u32,
    pub reminder_timezone: Tz,
    pub reminder_delivery_concurrency: usize,
    pub late_fee_policy: LateFeePolicy,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = LateFeePolicy::default();
        Self {
            app_name: env_or("APP_NAME", "Rent Ledger API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/v1")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: env_parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            app_public_url: trim_trailing_slash(&env_or("APP_PUBLIC_URL", "http://localhost:3000")),
            api_public_url: trim_trailing_slash(&env_or("API_PUBLIC_URL", "http://localhost:8000")),
            reminder_webhook_url: env_opt("REMINDER_WEBHOOK_URL"),
            reminder_webhook_timeout_seconds: env_parse_or("REMINDER_WEBHOOK_TIMEOUT_SECONDS", 10),
            reminder_cron_secret: env_opt("REMINDER_CRON_SECRET"),
            reminder_tracking_secret: env_opt("REMINDER_TRACKING_SECRET"),
            reminder_scheduler_enabled: env_parse_bool_or("REMINDER_SCHEDULER_ENABLED", false),
            reminder_daily_hour: env_parse_or("REMINDER_DAILY_HOUR", 8).min(23),
            reminder_timezone: parse_timezone(env_opt("REMINDER_TIMEZONE").as_deref()),
            reminder_delivery_concurrency: env_parse_or("REMINDER_DELIVERY_CONCURRENCY", 1usize)
                .clamp(1, 32),
            late_fee_policy: LateFeePolicy {
                initial_fee: env_parse_or("LATE_FEE_INITIAL", defaults.initial_fee),
                initial_after_days: env_parse_or(
                    "LATE_FEE_INITIAL_AFTER_DAYS",
                    defaults.initial_after_days,
                ),
                daily_fee: env_parse_or("LATE_FEE_DAILY", defaults.daily_fee),
                daily_after_days: env_parse_or(
                    "LATE_FEE_DAILY_AFTER_DAYS",
                    defaults.daily_after_days,
                ),
                max_daily_days: env_parse_or("LATE_FEE_MAX_DAILY_DAYS", defaults.max_daily_days),
                cap_ratio: env_parse_or("LATE_FEE_CAP_RATIO", defaults.cap_ratio),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    /// Replaying a run for an arbitrary date is a debugging aid only.
    pub fn date_override_allowed(&self) -> bool {
        !self.is_production()
    }

    /// Calendar date in the reminder timezone.
    pub fn local_today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.reminder_timezone).date_naive()
    }

    /// Base URL tracking links point at, e.g. `https://api.example.com/v1`.
    pub fn tracking_base_url(&self) -> String {
        format!("{}{}", self.api_public_url, self.api_prefix)
    }

    /// Secret used to sign tracking links; falls back to the cron secret.
    pub fn tracking_secret(&self) -> Option<&str> {
        self.reminder_tracking_secret
            .as_deref()
            .or(self.reminder_cron_secret.as_deref())
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => true,
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => false,
        Some(_) => default,
        None => default,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn parse_timezone(raw: Option<&str>) -> Tz {
    match raw {
        Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(timezone = name, "Unknown REMINDER_TIMEZONE, falling back to UTC");
            Tz::UTC
        }),
        None => Tz::UTC,
    }
}

fn trim_trailing_slash(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
impl AppConfig {
    /// Configuration used by tests: no database, no webhook, no secrets.
    pub fn for_tests() -> Self {
        Self {
            app_name: "Rent Ledger API".to_string(),
            environment: "test".to_string(),
            api_prefix: "/v1".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["http://localhost:3000".to_string()],
            rate_limit_per_second: 10,
            rate_limit_burst_size: 100,
            database_url: None,
            db_pool_max_connections: 1,
            db_pool_min_connections: 0,
            db_pool_acquire_timeout_seconds: 1,
            db_pool_idle_timeout_seconds: 60,
            app_public_url: "https://app.example.com".to_string(),
            api_public_url: "https://api.example.com".to_string(),
            reminder_webhook_url: None,
            reminder_webhook_timeout_seconds: 5,
            reminder_cron_secret: None,
            reminder_tracking_secret: None,
            reminder_scheduler_enabled: false,
            reminder_daily_hour: 8,
            reminder_timezone: Tz::UTC,
            reminder_delivery_concurrency: 1,
            late_fee_policy: LateFeePolicy::default(),
        }
    }
}
