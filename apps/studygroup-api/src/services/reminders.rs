//! Pre-start reminder emails.
//!
//! A scan looks for upcoming groups whose start falls inside a narrow
//! window `lead` ahead of now, claims each one with a conditional update
//! and only then mails its members. The claim is what makes delivery
//! at-most-once across overlapping scans and across processes; the
//! in-process [`ScanState`] only stops one dispatcher from running two scan
//! bodies at the same time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use utoipa::ToSchema;

use crate::clock::Clock;
use crate::config::Config;
use crate::db::{finish, Store};
use crate::email::{Mailer, ReminderEmailContent};
use crate::error::ApiError;
use crate::models::group::Group;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
}

/// What one scan did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ScanReport {
    /// Another scan was already running; nothing was done.
    pub skipped: bool,
    pub candidates: usize,
    pub claimed: usize,
    pub sent: usize,
    /// Claims released after a failed send.
    pub reverted: usize,
    /// Claimed groups with nobody to mail; the claim is kept.
    pub no_recipients: usize,
    /// Candidates another scan claimed first, or that were cancelled or
    /// moved out of the window before their turn.
    pub already_claimed: usize,
}

/// `[now + lead - half_width, now + lead + half_width]`.
pub fn reminder_window(
    now: DateTime<Utc>,
    lead: chrono::Duration,
    half_width: chrono::Duration,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let center = now + lead;
    (center - half_width, center + half_width)
}

pub struct ReminderDispatcher {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    lead: chrono::Duration,
    half_width: chrono::Duration,
    state: Mutex<ScanState>,
}

/// Puts the dispatcher back to idle when the scan body ends, however it ends.
struct ScanGuard<'a> {
    state: &'a Mutex<ScanState>,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = ScanState::Idle;
    }
}

enum Outcome {
    AlreadyClaimed,
    Sent,
    NoRecipients,
    Reverted,
}

impl ReminderDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            lead: chrono::Duration::minutes(config.reminder_lead_minutes),
            half_width: chrono::Duration::minutes(config.reminder_window_minutes),
            state: Mutex::new(ScanState::Idle),
        }
    }

    pub fn scan_state(&self) -> ScanState {
        *self.state.lock()
    }

    fn try_enter(&self) -> Option<ScanGuard<'_>> {
        let mut state = self.state.lock();
        match *state {
            ScanState::Scanning => None,
            ScanState::Idle => {
                *state = ScanState::Scanning;
                Some(ScanGuard { state: &self.state })
            }
        }
    }

    /// Run one scan. Failures are logged and counted, never returned; the
    /// next scan is the retry.
    pub async fn run_scan(&self) -> ScanReport {
        let Some(_guard) = self.try_enter() else {
            tracing::debug!("reminder scan already running, skipping");
            return ScanReport {
                skipped: true,
                ..ScanReport::default()
            };
        };

        let mut report = ScanReport::default();
        let (from, to) = reminder_window(self.clock.now(), self.lead, self.half_width);

        let candidates = match self.candidates(from, to).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(error = %err, "reminder candidate query failed");
                return report;
            }
        };
        report.candidates = candidates.len();

        for group in &candidates {
            match self.remind(group, from, to).await {
                Ok(Outcome::AlreadyClaimed) => report.already_claimed += 1,
                Ok(Outcome::Sent) => {
                    report.claimed += 1;
                    report.sent += 1;
                }
                Ok(Outcome::NoRecipients) => {
                    report.claimed += 1;
                    report.no_recipients += 1;
                }
                Ok(Outcome::Reverted) => {
                    report.claimed += 1;
                    report.reverted += 1;
                }
                Err(err) => {
                    tracing::warn!(group_id = group.id, error = %err, "reminder failed");
                }
            }
        }

        tracing::info!(
            candidates = report.candidates,
            claimed = report.claimed,
            sent = report.sent,
            reverted = report.reverted,
            "reminder scan finished"
        );
        report
    }

    async fn candidates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Group>, ApiError> {
        let mut tx = self.store.begin().await?;
        let result = tx.reminder_candidates(from, to).await;
        finish(tx, result).await
    }

    async fn claim(
        &self,
        group_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool, ApiError> {
        let mut tx = self.store.begin().await?;
        let result = tx.claim_reminder(group_id, from, to).await;
        finish(tx, result).await
    }

    async fn release(&self, group_id: i64) -> Result<(), ApiError> {
        let mut tx = self.store.begin().await?;
        let result = tx.release_reminder(group_id).await;
        finish(tx, result).await
    }

    async fn recipients(&self, group_id: i64) -> Result<Vec<String>, ApiError> {
        let mut tx = self.store.begin().await?;
        let result = tx.seated_member_emails(group_id).await;
        finish(tx, result).await
    }

    async fn remind(
        &self,
        group: &Group,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Outcome, ApiError> {
        if !self.claim(group.id, from, to).await? {
            return Ok(Outcome::AlreadyClaimed);
        }

        // The claim is committed; every path that does not deliver must
        // release it so a later scan can try again.
        let recipients = match self.recipients(group.id).await {
            Ok(recipients) => recipients,
            Err(err) => {
                self.release_after_failure(group.id).await;
                return Err(err);
            }
        };

        let recipients = deliverable(group.id, recipients);
        if recipients.is_empty() {
            tracing::info!(group_id = group.id, "no reminder recipients, keeping claim");
            return Ok(Outcome::NoRecipients);
        }

        let content = ReminderEmailContent::new(group);
        match self
            .mailer
            .send(&recipients, &content.subject, &content.text)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    group_id = group.id,
                    recipients = recipients.len(),
                    "reminder sent"
                );
                Ok(Outcome::Sent)
            }
            Err(err) => {
                tracing::warn!(group_id = group.id, error = %err, "reminder mail failed");
                self.release_after_failure(group.id).await;
                Ok(Outcome::Reverted)
            }
        }
    }

    async fn release_after_failure(&self, group_id: i64) {
        match self.release(group_id).await {
            Ok(()) => tracing::warn!(group_id, "reminder claim reverted"),
            Err(err) => {
                tracing::error!(group_id, error = %err, "failed to revert reminder claim")
            }
        }
    }
}

/// Drops addresses the mail transport would reject, so one bad row cannot
/// hold back the whole group.
fn deliverable(group_id: i64, recipients: Vec<String>) -> Vec<String> {
    recipients
        .into_iter()
        .filter(|address| match address.parse::<lettre::Address>() {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(
                    group_id,
                    %address,
                    error = %err,
                    "skipping malformed recipient"
                );
                false
            }
        })
        .collect()
}

/// Scan every `interval`. Each tick runs on its own task so a slow mailer
/// cannot hold up the ticker; overlapping ticks are turned away by the
/// dispatcher's scan state.
pub fn spawn_reminder_loop(
    dispatcher: Arc<ReminderDispatcher>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher.run_scan().await;
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn window_is_centered_on_the_lead_time() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap();
        let (from, to) = reminder_window(
            now,
            chrono::Duration::minutes(120),
            chrono::Duration::minutes(1),
        );
        assert_eq!(from, Utc.with_ymd_and_hms(2030, 1, 1, 11, 59, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2030, 1, 1, 12, 1, 0).unwrap());
    }
}
