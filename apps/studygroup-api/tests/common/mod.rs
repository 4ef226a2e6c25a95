#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use studygroup_api::auth::middleware::AuthUser;
use studygroup_api::clock::{Clock, ManualClock};
use studygroup_api::config::Config;
use studygroup_api::db::{MemoryStore, Store};
use studygroup_api::email::{MailError, Mailer};
use studygroup_api::models::group::GroupDetail;
use studygroup_api::models::group_member::{GroupMember, MemberStatus};
use studygroup_api::notify::{Notification, NotificationFanout, NotificationKind, Notifier};
use studygroup_api::services::groups::{self, CreateGroup};
use studygroup_api::services::{lifecycle, membership};
use studygroup_api::AppState;

/// Records every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(i64, Notification)>>,
}

impl RecordingNotifier {
    pub fn kinds_for(&self, user_id: i64) -> Vec<NotificationKind> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| *to == user_id)
            .map(|(_, n)| n.kind)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user_id: i64, notification: Notification) {
        self.sent.lock().push((user_id, notification));
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Records sent mail; can be told to fail or to take a while.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    attempts: Mutex<usize>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl RecordingMailer {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError> {
        *self.attempts.lock() += 1;
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::SendFailed("relay unavailable".to_string()));
        }
        self.sent.lock().push(SentMail {
            to: to.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub mailer: Arc<RecordingMailer>,
    pub clock: Arc<ManualClock>,
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 5, 1, 9, 0, 0).unwrap()
}

pub fn test_config() -> Config {
    Config {
        store_retry_base_ms: 0,
        ..Config::default()
    }
}

pub fn test_app() -> TestApp {
    test_app_with(test_config())
}

pub fn test_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let mailer = Arc::new(RecordingMailer::default());
    let clock = Arc::new(ManualClock::new(base_time()));

    let state = AppState::with_notifier(
        config,
        store.clone(),
        notifier.clone(),
        NotificationFanout::new(),
        mailer.clone(),
        clock.clone(),
    );

    TestApp {
        state,
        store,
        notifier,
        mailer,
        clock,
    }
}

impl TestApp {
    pub fn router(&self) -> Router {
        studygroup_api::routes::router(&self.state).with_state(self.state.clone())
    }

    /// Move the clock forward so successive joins get distinct join times.
    pub fn tick(&self) {
        self.clock.advance(chrono::Duration::seconds(1));
    }

    pub async fn member(&self, group_id: i64, user_id: i64) -> Option<GroupMember> {
        let store: &dyn Store = self.store.as_ref();
        let mut tx = store.begin().await.unwrap();
        let member = tx.find_member(group_id, user_id).await.unwrap();
        tx.rollback().await.unwrap();
        member
    }

    pub async fn user_email(&self, user_id: i64) -> Option<String> {
        let store: &dyn Store = self.store.as_ref();
        let mut tx = store.begin().await.unwrap();
        let user = tx.find_user(user_id).await.unwrap();
        tx.rollback().await.unwrap();
        user.and_then(|u| u.email)
    }

    pub async fn reminder_sent(&self, group_id: i64) -> bool {
        let store: &dyn Store = self.store.as_ref();
        let mut tx = store.begin().await.unwrap();
        let group = tx.find_group(group_id).await.unwrap().unwrap();
        tx.rollback().await.unwrap();
        group.reminder_sent
    }

    /// Create a group starting `starts_in` from now, lasting two hours.
    pub async fn create_group(
        &self,
        organizer: &AuthUser,
        capacity: i32,
        join_policy: &str,
        starts_in: chrono::Duration,
    ) -> GroupDetail {
        let start_at = self.clock.now() + starts_in;
        let input = CreateGroup {
            title: "Linear algebra night".to_string(),
            description: "Chapter 4 exercises".to_string(),
            location_name: "Main library".to_string(),
            location_address: "12 College Rd".to_string(),
            latitude: None,
            longitude: None,
            start_at,
            end_at: start_at + chrono::Duration::hours(2),
            capacity,
            join_policy: Some(join_policy.to_string()),
        };
        groups::create_group(&self.state, organizer, &input)
            .await
            .unwrap()
    }

    pub async fn join(&self, group_id: i64, user: &AuthUser) -> GroupMember {
        self.tick();
        membership::join(&self.state, user, group_id).await.unwrap()
    }

    /// Group with the organizer plus `attendees`, started, everyone checked
    /// in, and finished.
    pub async fn completed_group(&self, organizer: &AuthUser, attendees: &[&AuthUser]) -> i64 {
        let detail = self
            .create_group(organizer, 10, "auto", chrono::Duration::hours(4))
            .await;
        let group_id = detail.group.id;
        for user in attendees {
            let member = self.join(group_id, user).await;
            assert_eq!(member.status, MemberStatus::Approved);
        }
        lifecycle::start(&self.state, organizer, group_id)
            .await
            .unwrap();
        for user in attendees {
            lifecycle::check_in(&self.state, organizer, group_id, user.user_id)
                .await
                .unwrap();
        }
        lifecycle::finish_group(&self.state, organizer, group_id)
            .await
            .unwrap();
        group_id
    }
}

pub fn user(id: i64) -> AuthUser {
    AuthUser::with_email(id, format!("user{id}@example.com"))
}
