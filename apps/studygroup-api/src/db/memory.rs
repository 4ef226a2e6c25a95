use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::db::store::{MemberCounts, Store, StoreTx};
use crate::error::{ApiError, ErrorKind};
use crate::models::feedback::{GivenRating, UserFeedback};
use crate::models::group::{Group, GroupStatus};
use crate::models::group_member::{GroupMember, MemberStatus};
use crate::models::user::User;

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    groups: BTreeMap<i64, Group>,
    /// Kept in insertion order.
    members: Vec<GroupMember>,
    feedback: Vec<UserFeedback>,
}

/// In-process store for tests and local runs.
///
/// Transactions run one at a time: `begin` takes the table lock and works
/// on a private copy, `commit` publishes the copy, rollback or drop throws
/// it away.
pub struct MemoryStore {
    tables: AsyncMutex<Tables>,
    hits: DashMap<String, Mutex<VecDeque<DateTime<Utc>>>>,
    failing_begins: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: AsyncMutex::new(Tables::default()),
            hits: DashMap::new(),
            failing_begins: AtomicU32::new(0),
        }
    }

    /// Make the next `count` calls to `begin` fail with a transient error.
    pub fn fail_next_begins(&self, count: u32) {
        self.failing_begins.store(count, Ordering::SeqCst);
    }

    /// Keys with at least one unexpired hit.
    pub fn tracked_keys(&self) -> usize {
        self.hits.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn StoreTx + 'a>, ApiError> {
        let injected = self
            .failing_begins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ApiError::unavailable("injected transient failure"));
        }

        let guard = self.tables.lock().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    async fn record_hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<u64, ApiError> {
        let window = chrono::Duration::from_std(window)
            .map_err(|_| ApiError::internal("rate limit window out of range"))?;
        let cutoff = now - window;
        let count = {
            let entry = self.hits.entry(key.to_string()).or_default();
            let mut hits = entry.lock();
            while hits.front().is_some_and(|at| *at <= cutoff) {
                hits.pop_front();
            }
            hits.push_back(now);
            hits.len() as u64
        };

        // Sweep keys that have gone quiet.
        self.hits.retain(|_, hits| {
            let mut hits = hits.lock();
            while hits.front().is_some_and(|at| *at <= cutoff) {
                hits.pop_front();
            }
            !hits.is_empty()
        });
        Ok(count)
    }
}

struct MemoryTx<'a> {
    guard: MutexGuard<'a, Tables>,
    work: Tables,
}

impl MemoryTx<'_> {
    fn member_index(&self, group_id: i64, user_id: i64) -> Option<usize> {
        self.work
            .members
            .iter()
            .position(|m| m.group_id == group_id && m.user_id == user_id)
    }

    fn members_of(&self, group_id: i64) -> Vec<GroupMember> {
        let mut members: Vec<GroupMember> = self
            .work
            .members
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| (m.joined_at, m.user_id));
        members
    }
}

fn missing(what: &str) -> ApiError {
    ApiError::not_found(format!("{what} not found"))
}

#[async_trait]
impl StoreTx for MemoryTx<'_> {
    async fn insert_group(&mut self, group: &Group) -> Result<Group, ApiError> {
        self.work.groups.insert(group.id, group.clone());
        Ok(group.clone())
    }

    async fn find_group(&mut self, group_id: i64) -> Result<Option<Group>, ApiError> {
        Ok(self.work.groups.get(&group_id).cloned())
    }

    async fn lock_group(&mut self, group_id: i64) -> Result<Option<Group>, ApiError> {
        self.find_group(group_id).await
    }

    async fn save_group(&mut self, group: &Group) -> Result<Group, ApiError> {
        let slot = self
            .work
            .groups
            .get_mut(&group.id)
            .ok_or_else(|| missing("Group"))?;
        *slot = group.clone();
        Ok(group.clone())
    }

    async fn delete_group(&mut self, group_id: i64) -> Result<(), ApiError> {
        self.work.members.retain(|m| m.group_id != group_id);
        self.work.groups.remove(&group_id);
        Ok(())
    }

    async fn reminder_candidates(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Group>, ApiError> {
        let mut due: Vec<Group> = self
            .work
            .groups
            .values()
            .filter(|g| {
                g.status == GroupStatus::Upcoming
                    && !g.reminder_sent
                    && g.start_at >= from
                    && g.start_at <= to
            })
            .cloned()
            .collect();
        due.sort_by_key(|g| (g.start_at, g.id));
        Ok(due)
    }

    async fn claim_reminder(
        &mut self,
        group_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool, ApiError> {
        match self.work.groups.get_mut(&group_id) {
            Some(group)
                if group.status == GroupStatus::Upcoming
                    && group.start_at >= from
                    && group.start_at <= to
                    && !group.reminder_sent =>
            {
                group.reminder_sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_reminder(&mut self, group_id: i64) -> Result<(), ApiError> {
        if let Some(group) = self.work.groups.get_mut(&group_id) {
            group.reminder_sent = false;
        }
        Ok(())
    }

    async fn insert_member(&mut self, member: &GroupMember) -> Result<GroupMember, ApiError> {
        if self.member_index(member.group_id, member.user_id).is_some() {
            return Err(ApiError::new(
                ErrorKind::AlreadyMember,
                "Already a member of this group",
            ));
        }
        self.work.members.push(member.clone());
        Ok(member.clone())
    }

    async fn find_member(
        &mut self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<GroupMember>, ApiError> {
        Ok(self
            .member_index(group_id, user_id)
            .map(|i| self.work.members[i].clone()))
    }

    async fn list_members(&mut self, group_id: i64) -> Result<Vec<GroupMember>, ApiError> {
        Ok(self.members_of(group_id))
    }

    async fn save_member(&mut self, member: &GroupMember) -> Result<GroupMember, ApiError> {
        let i = self
            .member_index(member.group_id, member.user_id)
            .ok_or_else(|| missing("Member"))?;
        self.work.members[i] = member.clone();
        Ok(member.clone())
    }

    async fn delete_member(&mut self, group_id: i64, user_id: i64) -> Result<bool, ApiError> {
        match self.member_index(group_id, user_id) {
            Some(i) => {
                self.work.members.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_members(&mut self, group_id: i64) -> Result<MemberCounts, ApiError> {
        Ok(MemberCounts::tally(
            self.work
                .members
                .iter()
                .filter(|m| m.group_id == group_id)
                .map(|m| m.status),
        ))
    }

    async fn oldest_waitlisted(&mut self, group_id: i64) -> Result<Option<GroupMember>, ApiError> {
        Ok(self
            .members_of(group_id)
            .into_iter()
            .find(|m| m.status == MemberStatus::Waitlist))
    }

    async fn seated_member_emails(&mut self, group_id: i64) -> Result<Vec<String>, ApiError> {
        let mut emails: Vec<String> = self
            .members_of(group_id)
            .iter()
            .filter(|m| m.status.holds_seat())
            .filter_map(|m| self.work.users.get(&m.user_id))
            .filter_map(|u| u.email.clone())
            .collect();
        emails.sort();
        emails.dedup();
        Ok(emails)
    }

    async fn insert_feedback(&mut self, feedback: &UserFeedback) -> Result<UserFeedback, ApiError> {
        if self
            .feedback_exists(feedback.rater_id, feedback.target_id, feedback.group_id)
            .await?
        {
            return Err(ApiError::new(
                ErrorKind::DuplicateFeedback,
                "Feedback already submitted",
            ));
        }
        self.work.feedback.push(feedback.clone());
        Ok(feedback.clone())
    }

    async fn feedback_exists(
        &mut self,
        rater_id: i64,
        target_id: i64,
        group_id: i64,
    ) -> Result<bool, ApiError> {
        Ok(self
            .work
            .feedback
            .iter()
            .any(|f| f.rater_id == rater_id && f.target_id == target_id && f.group_id == group_id))
    }

    async fn ratings_for(&mut self, target_id: i64) -> Result<Vec<i16>, ApiError> {
        Ok(self
            .work
            .feedback
            .iter()
            .filter(|f| f.target_id == target_id)
            .map(|f| f.rating)
            .collect())
    }

    async fn ratings_given(
        &mut self,
        rater_id: i64,
        group_id: i64,
    ) -> Result<Vec<GivenRating>, ApiError> {
        Ok(self
            .work
            .feedback
            .iter()
            .filter(|f| f.rater_id == rater_id && f.group_id == group_id)
            .map(|f| GivenRating {
                target_id: f.target_id,
                rating: f.rating,
            })
            .collect())
    }

    async fn ensure_user(
        &mut self,
        user_id: i64,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User, ApiError> {
        let user = self
            .work
            .users
            .entry(user_id)
            .or_insert_with(|| User::new(user_id, None, now));
        if let Some(email) = email {
            if user.email.as_deref() != Some(email) {
                user.email = Some(email.to_string());
                user.updated_at = now;
            }
        }
        Ok(user.clone())
    }

    async fn find_user(&mut self, user_id: i64) -> Result<Option<User>, ApiError> {
        Ok(self.work.users.get(&user_id).cloned())
    }

    async fn lock_user(&mut self, user_id: i64) -> Result<Option<User>, ApiError> {
        self.find_user(user_id).await
    }

    async fn save_user(&mut self, user: &User) -> Result<User, ApiError> {
        let slot = self
            .work
            .users
            .get_mut(&user.id)
            .ok_or_else(|| missing("User"))?;
        *slot = user.clone();
        Ok(user.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), ApiError> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ApiError> {
        Ok(())
    }
}
