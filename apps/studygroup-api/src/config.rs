use std::str::FromStr;
use std::time::Duration;

/// SMTP relay settings. Absent when mail should only be logged.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
}

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    pub db_pool_size: usize,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Snowflake worker id for this instance.
    pub worker_id: u16,
    /// Seconds between reminder scans.
    pub reminder_interval_secs: u64,
    /// How far ahead of `start_at` the reminder goes out.
    pub reminder_lead_minutes: i64,
    /// Half-width of the reminder window around the lead time.
    pub reminder_window_minutes: i64,
    /// Reputation deducted for each no-show.
    pub no_show_penalty: f64,
    /// Attempts per request-path transaction on transient store errors.
    pub store_retry_attempts: u32,
    pub store_retry_base_ms: u64,
    /// Requests allowed per caller inside one rate-limit window.
    pub rate_limit_requests: u64,
    pub rate_limit_window_secs: u64,
    pub smtp: Option<SmtpConfig>,
    pub mail_from: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            db_pool_size: 20,
            port: 8080,
            worker_id: 0,
            reminder_interval_secs: 60,
            reminder_lead_minutes: 120,
            reminder_window_minutes: 1,
            no_show_penalty: 0.2,
            store_retry_attempts: 3,
            store_retry_base_ms: 50,
            rate_limit_requests: 120,
            rate_limit_window_secs: 60,
            smtp: None,
            mail_from: "Study Groups <noreply@localhost>".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let smtp = optional_var("SMTP_HOST").map(|host| SmtpConfig {
            host,
            port: parsed_var("SMTP_PORT", 587),
            username: optional_var("SMTP_USERNAME"),
            password: optional_var("SMTP_PASSWORD"),
            use_tls: parsed_var("SMTP_TLS", true),
        });

        Self {
            database_url: required_var("DATABASE_URL"),
            db_pool_size: parsed_var("DB_POOL_SIZE", defaults.db_pool_size),
            port: parsed_var("PORT", defaults.port),
            worker_id: parsed_var("WORKER_ID", defaults.worker_id),
            reminder_interval_secs: parsed_var(
                "REMINDER_INTERVAL_SECS",
                defaults.reminder_interval_secs,
            ),
            reminder_lead_minutes: parsed_var(
                "REMINDER_LEAD_MINUTES",
                defaults.reminder_lead_minutes,
            ),
            reminder_window_minutes: parsed_var(
                "REMINDER_WINDOW_MINUTES",
                defaults.reminder_window_minutes,
            ),
            no_show_penalty: parsed_var("NO_SHOW_PENALTY", defaults.no_show_penalty),
            store_retry_attempts: parsed_var("STORE_RETRY_ATTEMPTS", defaults.store_retry_attempts),
            store_retry_base_ms: parsed_var("STORE_RETRY_BASE_MS", defaults.store_retry_base_ms),
            rate_limit_requests: parsed_var("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests),
            rate_limit_window_secs: parsed_var(
                "RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            ),
            smtp,
            mail_from: optional_var("MAIL_FROM").unwrap_or(defaults.mail_from),
        }
    }

    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_secs.max(1))
    }

    pub fn retry_policy(&self) -> crate::db::RetryPolicy {
        crate::db::RetryPolicy::new(self.store_retry_attempts, self.store_retry_base_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs.max(1))
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    match optional_var(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "unparseable value, using default");
            default
        }),
        None => default,
    }
}
