//! Postgres-backed [`Store`] built on diesel-async.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError, OptionalExtension};
use diesel_async::pooled_connection::deadpool::Object;
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, TransactionManager};

use crate::db::pool::DbPool;
use crate::db::schema::{group_members, groups, rate_limit_hits, user_feedback, users};
use crate::db::store::{MemberCounts, Store, StoreTx};
use crate::error::{ApiError, ErrorKind};
use crate::models::feedback::{GivenRating, UserFeedback};
use crate::models::group::{Group, GroupStatus};
use crate::models::group_member::{GroupMember, MemberStatus};
use crate::models::user::User;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn StoreTx + 'a>, ApiError> {
        let mut conn = self.pool.get().await?;
        AnsiTransactionManager::begin_transaction(&mut *conn).await?;
        Ok(Box::new(PgTx { conn }))
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
        let mut conn = self.pool.get().await?;

        // Expired hits go for every key, not just this one, so callers that
        // never return do not leave rows behind.
        diesel_async::RunQueryDsl::execute(
            diesel::delete(rate_limit_hits::table.filter(rate_limit_hits::hit_at.le(cutoff))),
            &mut conn,
        )
        .await?;

        diesel_async::RunQueryDsl::execute(
            diesel::insert_into(rate_limit_hits::table)
                .values((rate_limit_hits::key.eq(key), rate_limit_hits::hit_at.eq(now))),
            &mut conn,
        )
        .await?;

        let count: i64 = diesel_async::RunQueryDsl::get_result(
            rate_limit_hits::table
                .filter(rate_limit_hits::key.eq(key))
                .filter(rate_limit_hits::hit_at.gt(cutoff))
                .count(),
            &mut conn,
        )
        .await?;

        Ok(count.max(0) as u64)
    }
}

/// One open transaction on a pooled connection.
///
/// A handle dropped without commit/rollback leaves its connection marked
/// as mid-transaction, which the pool discards on recycle.
struct PgTx {
    conn: Object<AsyncPgConnection>,
}

impl PgTx {
    fn conn(&mut self) -> &mut AsyncPgConnection {
        &mut self.conn
    }
}

fn is_unique_violation(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_group(&mut self, group: &Group) -> Result<Group, ApiError> {
        let row = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(groups::table)
                .values(group)
                .returning(Group::as_returning()),
            self.conn(),
        )
        .await?;
        Ok(row)
    }

    async fn find_group(&mut self, group_id: i64) -> Result<Option<Group>, ApiError> {
        let row = diesel_async::RunQueryDsl::get_result(
            groups::table.find(group_id).select(Group::as_select()),
            self.conn(),
        )
        .await
        .optional()?;
        Ok(row)
    }

    async fn lock_group(&mut self, group_id: i64) -> Result<Option<Group>, ApiError> {
        let row = diesel_async::RunQueryDsl::get_result(
            groups::table
                .find(group_id)
                .select(Group::as_select())
                .for_update(),
            self.conn(),
        )
        .await
        .optional()?;
        Ok(row)
    }

    async fn save_group(&mut self, group: &Group) -> Result<Group, ApiError> {
        let row = diesel_async::RunQueryDsl::get_result(
            diesel::update(groups::table.find(group.id))
                .set(group)
                .returning(Group::as_returning()),
            self.conn(),
        )
        .await?;
        Ok(row)
    }

    async fn delete_group(&mut self, group_id: i64) -> Result<(), ApiError> {
        diesel_async::RunQueryDsl::execute(
            diesel::delete(group_members::table.filter(group_members::group_id.eq(group_id))),
            self.conn(),
        )
        .await?;
        diesel_async::RunQueryDsl::execute(
            diesel::delete(groups::table.find(group_id)),
            self.conn(),
        )
        .await?;
        Ok(())
    }

    async fn reminder_candidates(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Group>, ApiError> {
        let rows = diesel_async::RunQueryDsl::load(
            groups::table
                .filter(groups::status.eq(GroupStatus::Upcoming))
                .filter(groups::reminder_sent.eq(false))
                .filter(groups::start_at.between(from, to))
                .order(groups::start_at.asc())
                .select(Group::as_select()),
            self.conn(),
        )
        .await?;
        Ok(rows)
    }

    async fn claim_reminder(
        &mut self,
        group_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool, ApiError> {
        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                groups::table
                    .filter(groups::id.eq(group_id))
                    .filter(groups::status.eq(GroupStatus::Upcoming))
                    .filter(groups::start_at.between(from, to))
                    .filter(groups::reminder_sent.eq(false)),
            )
            .set(groups::reminder_sent.eq(true)),
            self.conn(),
        )
        .await?;
        Ok(updated == 1)
    }

    async fn release_reminder(&mut self, group_id: i64) -> Result<(), ApiError> {
        diesel_async::RunQueryDsl::execute(
            diesel::update(groups::table.find(group_id)).set(groups::reminder_sent.eq(false)),
            self.conn(),
        )
        .await?;
        Ok(())
    }

    async fn insert_member(&mut self, member: &GroupMember) -> Result<GroupMember, ApiError> {
        let result = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(group_members::table)
                .values(member)
                .returning(GroupMember::as_returning()),
            self.conn(),
        )
        .await;

        match result {
            Ok(row) => Ok(row),
            Err(err) if is_unique_violation(&err) => Err(ApiError::new(
                ErrorKind::AlreadyMember,
                "Already a member of this group",
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_member(
        &mut self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<GroupMember>, ApiError> {
        let row = diesel_async::RunQueryDsl::get_result(
            group_members::table
                .find((group_id, user_id))
                .select(GroupMember::as_select()),
            self.conn(),
        )
        .await
        .optional()?;
        Ok(row)
    }

    async fn list_members(&mut self, group_id: i64) -> Result<Vec<GroupMember>, ApiError> {
        let rows = diesel_async::RunQueryDsl::load(
            group_members::table
                .filter(group_members::group_id.eq(group_id))
                .order((group_members::joined_at.asc(), group_members::user_id.asc()))
                .select(GroupMember::as_select()),
            self.conn(),
        )
        .await?;
        Ok(rows)
    }

    async fn save_member(&mut self, member: &GroupMember) -> Result<GroupMember, ApiError> {
        let row = diesel_async::RunQueryDsl::get_result(
            diesel::update(group_members::table.find((member.group_id, member.user_id)))
                .set(member)
                .returning(GroupMember::as_returning()),
            self.conn(),
        )
        .await?;
        Ok(row)
    }

    async fn delete_member(&mut self, group_id: i64, user_id: i64) -> Result<bool, ApiError> {
        let deleted = diesel_async::RunQueryDsl::execute(
            diesel::delete(group_members::table.find((group_id, user_id))),
            self.conn(),
        )
        .await?;
        Ok(deleted > 0)
    }

    async fn count_members(&mut self, group_id: i64) -> Result<MemberCounts, ApiError> {
        let statuses: Vec<MemberStatus> = diesel_async::RunQueryDsl::load(
            group_members::table
                .filter(group_members::group_id.eq(group_id))
                .select(group_members::status),
            self.conn(),
        )
        .await?;
        Ok(MemberCounts::tally(statuses))
    }

    async fn oldest_waitlisted(&mut self, group_id: i64) -> Result<Option<GroupMember>, ApiError> {
        let row = diesel_async::RunQueryDsl::get_result(
            group_members::table
                .filter(group_members::group_id.eq(group_id))
                .filter(group_members::status.eq(MemberStatus::Waitlist))
                .order((group_members::joined_at.asc(), group_members::user_id.asc()))
                .select(GroupMember::as_select())
                .limit(1),
            self.conn(),
        )
        .await
        .optional()?;
        Ok(row)
    }

    async fn seated_member_emails(&mut self, group_id: i64) -> Result<Vec<String>, ApiError> {
        let emails: Vec<Option<String>> = diesel_async::RunQueryDsl::load(
            group_members::table
                .inner_join(users::table)
                .filter(group_members::group_id.eq(group_id))
                .filter(
                    group_members::status
                        .eq_any(vec![MemberStatus::Approved, MemberStatus::CheckedIn]),
                )
                .select(users::email)
                .distinct(),
            self.conn(),
        )
        .await?;
        let mut emails: Vec<String> = emails.into_iter().flatten().collect();
        emails.sort();
        emails.dedup();
        Ok(emails)
    }

    async fn insert_feedback(&mut self, feedback: &UserFeedback) -> Result<UserFeedback, ApiError> {
        let result = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(user_feedback::table)
                .values(feedback)
                .returning(UserFeedback::as_returning()),
            self.conn(),
        )
        .await;

        match result {
            Ok(row) => Ok(row),
            Err(err) if is_unique_violation(&err) => Err(ApiError::new(
                ErrorKind::DuplicateFeedback,
                "Feedback already submitted",
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn feedback_exists(
        &mut self,
        rater_id: i64,
        target_id: i64,
        group_id: i64,
    ) -> Result<bool, ApiError> {
        let exists = diesel_async::RunQueryDsl::get_result(
            diesel::select(diesel::dsl::exists(
                user_feedback::table
                    .filter(user_feedback::rater_id.eq(rater_id))
                    .filter(user_feedback::target_id.eq(target_id))
                    .filter(user_feedback::group_id.eq(group_id)),
            )),
            self.conn(),
        )
        .await?;
        Ok(exists)
    }

    async fn ratings_for(&mut self, target_id: i64) -> Result<Vec<i16>, ApiError> {
        let ratings = diesel_async::RunQueryDsl::load(
            user_feedback::table
                .filter(user_feedback::target_id.eq(target_id))
                .select(user_feedback::rating),
            self.conn(),
        )
        .await?;
        Ok(ratings)
    }

    async fn ratings_given(
        &mut self,
        rater_id: i64,
        group_id: i64,
    ) -> Result<Vec<GivenRating>, ApiError> {
        let rows: Vec<(i64, i16)> = diesel_async::RunQueryDsl::load(
            user_feedback::table
                .filter(user_feedback::rater_id.eq(rater_id))
                .filter(user_feedback::group_id.eq(group_id))
                .order(user_feedback::created_at.asc())
                .select((user_feedback::target_id, user_feedback::rating)),
            self.conn(),
        )
        .await?;
        Ok(rows
            .into_iter()
            .map(|(target_id, rating)| GivenRating { target_id, rating })
            .collect())
    }

    async fn ensure_user(
        &mut self,
        user_id: i64,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User, ApiError> {
        let fresh = User::new(user_id, email.map(str::to_string), now);

        match email {
            Some(email) => {
                let row = diesel_async::RunQueryDsl::get_result(
                    diesel::insert_into(users::table)
                        .values(&fresh)
                        .on_conflict(users::id)
                        .do_update()
                        .set((users::email.eq(email), users::updated_at.eq(now)))
                        .returning(User::as_returning()),
                    self.conn(),
                )
                .await?;
                Ok(row)
            }
            None => {
                diesel_async::RunQueryDsl::execute(
                    diesel::insert_into(users::table)
                        .values(&fresh)
                        .on_conflict(users::id)
                        .do_nothing(),
                    self.conn(),
                )
                .await?;
                self.find_user(user_id)
                    .await?
                    .ok_or_else(|| ApiError::internal("User row vanished"))
            }
        }
    }

    async fn find_user(&mut self, user_id: i64) -> Result<Option<User>, ApiError> {
        let row = diesel_async::RunQueryDsl::get_result(
            users::table.find(user_id).select(User::as_select()),
            self.conn(),
        )
        .await
        .optional()?;
        Ok(row)
    }

    async fn lock_user(&mut self, user_id: i64) -> Result<Option<User>, ApiError> {
        let row = diesel_async::RunQueryDsl::get_result(
            users::table
                .find(user_id)
                .select(User::as_select())
                .for_update(),
            self.conn(),
        )
        .await
        .optional()?;
        Ok(row)
    }

    async fn save_user(&mut self, user: &User) -> Result<User, ApiError> {
        let row = diesel_async::RunQueryDsl::get_result(
            diesel::update(users::table.find(user.id))
                .set(user)
                .returning(User::as_returning()),
            self.conn(),
        )
        .await?;
        Ok(row)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), ApiError> {
        AnsiTransactionManager::commit_transaction(self.conn()).await?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), ApiError> {
        AnsiTransactionManager::rollback_transaction(self.conn()).await?;
        Ok(())
    }
}
