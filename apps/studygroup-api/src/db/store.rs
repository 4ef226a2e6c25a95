//! Transactional persistence seam.
//!
//! Backed by Postgres in production and an in-memory copy-on-begin store in
//! tests. Every request-path operation opens one [`StoreTx`], does all of its
//! reads, checks and writes through it, and hands the outcome to [`finish`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ApiError;
use crate::models::feedback::{GivenRating, UserFeedback};
use crate::models::group::Group;
use crate::models::group_member::{GroupMember, MemberStatus};
use crate::models::user::User;

/// Membership tallies for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberCounts {
    /// `approved` plus `checked_in`.
    pub approved: i64,
    pub pending: i64,
    pub waitlist: i64,
}

impl MemberCounts {
    pub fn tally<I: IntoIterator<Item = MemberStatus>>(statuses: I) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            match status {
                MemberStatus::Approved | MemberStatus::CheckedIn => counts.approved += 1,
                MemberStatus::Pending => counts.pending += 1,
                MemberStatus::Waitlist => counts.waitlist += 1,
            }
        }
        counts
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction. Dropping the handle without [`StoreTx::commit`]
    /// discards its writes.
    async fn begin<'a>(&'a self) -> Result<Box<dyn StoreTx + 'a>, ApiError>;

    /// Record one hit for `key` and return how many hits fall inside the
    /// trailing `window`, this one included. Shared by every instance that
    /// talks to the same store.
    async fn record_hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<u64, ApiError>;
}

#[async_trait]
pub trait StoreTx: Send {
    // --- groups -----------------------------------------------------------

    async fn insert_group(&mut self, group: &Group) -> Result<Group, ApiError>;
    async fn find_group(&mut self, group_id: i64) -> Result<Option<Group>, ApiError>;
    /// Like `find_group`, but holds the row until the transaction ends so
    /// membership changes on one group are serialised.
    async fn lock_group(&mut self, group_id: i64) -> Result<Option<Group>, ApiError>;
    async fn save_group(&mut self, group: &Group) -> Result<Group, ApiError>;
    /// Deletes the group's memberships, then the group.
    async fn delete_group(&mut self, group_id: i64) -> Result<(), ApiError>;

    /// Upcoming, not yet reminded groups starting inside `[from, to]`.
    async fn reminder_candidates(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Group>, ApiError>;
    /// Flip `reminder_sent` false → true, provided the group is still
    /// upcoming and starts inside `[from, to]`. `false` when any of that no
    /// longer holds, including when someone else already claimed it.
    async fn claim_reminder(
        &mut self,
        group_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool, ApiError>;
    async fn release_reminder(&mut self, group_id: i64) -> Result<(), ApiError>;

    // --- members ----------------------------------------------------------

    /// Fails with `AlreadyMember` when the (group, user) row exists.
    async fn insert_member(&mut self, member: &GroupMember) -> Result<GroupMember, ApiError>;
    async fn find_member(
        &mut self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<GroupMember>, ApiError>;
    /// Ordered by `joined_at`, then user id.
    async fn list_members(&mut self, group_id: i64) -> Result<Vec<GroupMember>, ApiError>;
    async fn save_member(&mut self, member: &GroupMember) -> Result<GroupMember, ApiError>;
    async fn delete_member(&mut self, group_id: i64, user_id: i64) -> Result<bool, ApiError>;
    async fn count_members(&mut self, group_id: i64) -> Result<MemberCounts, ApiError>;
    async fn oldest_waitlisted(&mut self, group_id: i64) -> Result<Option<GroupMember>, ApiError>;
    /// Distinct email addresses of seat-holding members.
    async fn seated_member_emails(&mut self, group_id: i64) -> Result<Vec<String>, ApiError>;

    // --- feedback ---------------------------------------------------------

    /// Fails with `DuplicateFeedback` when the (rater, target, group) row exists.
    async fn insert_feedback(&mut self, feedback: &UserFeedback) -> Result<UserFeedback, ApiError>;
    async fn feedback_exists(
        &mut self,
        rater_id: i64,
        target_id: i64,
        group_id: i64,
    ) -> Result<bool, ApiError>;
    async fn ratings_for(&mut self, target_id: i64) -> Result<Vec<i16>, ApiError>;
    async fn ratings_given(
        &mut self,
        rater_id: i64,
        group_id: i64,
    ) -> Result<Vec<GivenRating>, ApiError>;

    // --- users ------------------------------------------------------------

    /// Create the user row if missing; refresh the email when one is given.
    async fn ensure_user(
        &mut self,
        user_id: i64,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User, ApiError>;
    async fn find_user(&mut self, user_id: i64) -> Result<Option<User>, ApiError>;
    async fn lock_user(&mut self, user_id: i64) -> Result<Option<User>, ApiError>;
    async fn save_user(&mut self, user: &User) -> Result<User, ApiError>;

    // --- completion -------------------------------------------------------

    async fn commit(self: Box<Self>) -> Result<(), ApiError>;
    async fn rollback(self: Box<Self>) -> Result<(), ApiError>;
}

/// Commit on `Ok`, roll back on `Err`.
///
/// A failed rollback is logged and the original error is returned.
pub async fn finish<T>(
    tx: Box<dyn StoreTx + '_>,
    result: Result<T, ApiError>,
) -> Result<T, ApiError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
