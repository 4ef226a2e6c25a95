pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod models;
pub mod notify;
pub mod routes;
pub mod services;
pub mod throttle;

use std::sync::Arc;

use clock::Clock;
use config::Config;
use db::Store;
use email::Mailer;
use notify::{NotificationFanout, Notifier};
use services::reminders::ReminderDispatcher;
use studygroup_common::SnowflakeGenerator;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    /// Source of the per-user notification streams.
    pub fanout: NotificationFanout,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
    pub snowflake: Arc<SnowflakeGenerator>,
    pub reminders: Arc<ReminderDispatcher>,
}

impl AppState {
    /// Wire the collaborators together. Notifications go to `fanout`, which
    /// also feeds the SSE streams.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let fanout = NotificationFanout::new();
        let notifier: Arc<dyn Notifier> = Arc::new(fanout.clone());
        Self::with_notifier(config, store, notifier, fanout, mailer, clock)
    }

    pub fn with_notifier(
        config: Config,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        fanout: NotificationFanout,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let reminders = Arc::new(ReminderDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&mailer),
            Arc::clone(&clock),
            &config,
        ));
        Self {
            snowflake: Arc::new(SnowflakeGenerator::new(config.worker_id)),
            store,
            notifier,
            fanout,
            mailer,
            clock,
            config: Arc::new(config),
            reminders,
        }
    }
}
