//! Group status transitions, attendance and no-show marking.
//!
//! ```text
//! upcoming ──start──▶ ongoing ──finish──▶ completed
//!    │  └──────────finish───────────────────▲
//!    └──cancel──▶ cancelled ◀──cancel── ongoing
//! ```

use chrono::{DateTime, Utc};

use super::{attendee_ids, find_member, lock_group, require_organizer, require_status};
use crate::auth::middleware::AuthUser;
use crate::db::{finish, with_retry, StoreTx};
use crate::error::{ApiError, ErrorKind};
use crate::models::group::{Group, GroupStatus};
use crate::models::group_member::{GroupMember, MemberStatus};
use crate::notify::{Notification, NotificationKind};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Finish,
    Cancel,
}

impl Transition {
    /// Where the transition leads from `from`, or `None` when it is illegal.
    pub fn target(self, from: GroupStatus) -> Option<GroupStatus> {
        match (self, from) {
            (Transition::Start, GroupStatus::Upcoming) => Some(GroupStatus::Ongoing),
            (Transition::Finish, GroupStatus::Upcoming | GroupStatus::Ongoing) => {
                Some(GroupStatus::Completed)
            }
            (Transition::Cancel, GroupStatus::Upcoming | GroupStatus::Ongoing) => {
                Some(GroupStatus::Cancelled)
            }
            _ => None,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Finish => "finish",
            Transition::Cancel => "cancel",
        }
    }

    /// Starting or finishing checks the organizer in.
    fn checks_in_organizer(self) -> bool {
        match self {
            Transition::Start | Transition::Finish => true,
            Transition::Cancel => false,
        }
    }

    fn notification(self, group: &Group) -> Notification {
        let (kind, title, body) = match self {
            Transition::Start => (
                NotificationKind::GroupStarted,
                "Group started",
                format!("\"{}\" has started.", group.title),
            ),
            Transition::Finish => (
                NotificationKind::GroupFinished,
                "Group finished",
                format!("\"{}\" is over. You can now rate the other attendees.", group.title),
            ),
            Transition::Cancel => (
                NotificationKind::GroupCancelled,
                "Group cancelled",
                format!("\"{}\" was cancelled by the organizer.", group.title),
            ),
        };
        Notification::for_group(kind, group.id, title, body)
    }
}

pub async fn start(state: &AppState, caller: &AuthUser, group_id: i64) -> Result<Group, ApiError> {
    transition(state, caller, group_id, Transition::Start).await
}

pub async fn finish_group(
    state: &AppState,
    caller: &AuthUser,
    group_id: i64,
) -> Result<Group, ApiError> {
    transition(state, caller, group_id, Transition::Finish).await
}

pub async fn cancel(state: &AppState, caller: &AuthUser, group_id: i64) -> Result<Group, ApiError> {
    transition(state, caller, group_id, Transition::Cancel).await
}

async fn transition(
    state: &AppState,
    caller: &AuthUser,
    group_id: i64,
    transition: Transition,
) -> Result<Group, ApiError> {
    let (group, recipients) = with_retry(state.config.retry_policy(), || async move {
        let now = state.clock.now();
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            let mut group = lock_group(tx.as_mut(), group_id).await?;
            require_organizer(&group, caller.user_id)?;
            let next = transition.target(group.status).ok_or_else(|| {
                ApiError::wrong_status(format!(
                    "Cannot {} a group that is {}",
                    transition.verb(),
                    group.status.as_str()
                ))
            })?;

            if transition.checks_in_organizer() {
                check_in_organizer(tx.as_mut(), &group, now).await?;
            }

            group.status = next;
            group.updated_at = now;
            let group = tx.save_group(&group).await?;
            let recipients = attendee_ids(tx.as_mut(), &group).await?;
            Ok((group, recipients))
        }
        .await;
        finish(tx, result).await
    })
    .await?;

    tracing::info!(group_id, status = group.status.as_str(), "group status changed");
    state
        .notifier
        .notify_many(&recipients, &transition.notification(&group));

    Ok(group)
}

async fn check_in_organizer(
    tx: &mut (dyn StoreTx + '_),
    group: &Group,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    let Some(mut organizer) = tx.find_member(group.id, group.organizer_id).await? else {
        tracing::warn!(group_id = group.id, "organizer membership missing");
        return Ok(());
    };
    if organizer.checked_in_at.is_none() {
        organizer.status = MemberStatus::CheckedIn;
        organizer.checked_in_at = Some(now);
        tx.save_member(&organizer).await?;
    }
    Ok(())
}

pub async fn check_in(
    state: &AppState,
    caller: &AuthUser,
    group_id: i64,
    member_id: i64,
) -> Result<GroupMember, ApiError> {
    let member = with_retry(state.config.retry_policy(), || async move {
        let now = state.clock.now();
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            let group = lock_group(tx.as_mut(), group_id).await?;
            require_organizer(&group, caller.user_id)?;
            require_status(&group, &[GroupStatus::Ongoing])?;

            let mut member = find_member(tx.as_mut(), group_id, member_id).await?;
            let current = member.status;
            match current {
                MemberStatus::CheckedIn => Ok(member),
                MemberStatus::Approved => {
                    member.status = MemberStatus::CheckedIn;
                    member.checked_in_at = Some(now);
                    tx.save_member(&member).await
                }
                MemberStatus::Pending | MemberStatus::Waitlist => Err(ApiError::new(
                    ErrorKind::NotEligible,
                    "Only approved members can be checked in",
                )),
            }
        }
        .await;
        finish(tx, result).await
    })
    .await?;

    tracing::info!(group_id, user_id = member_id, "member checked in");
    Ok(member)
}

pub async fn mark_no_show(
    state: &AppState,
    caller: &AuthUser,
    group_id: i64,
    member_id: i64,
) -> Result<GroupMember, ApiError> {
    let penalty = state.config.no_show_penalty;
    let (member, title, penalised) = with_retry(state.config.retry_policy(), || async move {
        let now = state.clock.now();
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            let group = lock_group(tx.as_mut(), group_id).await?;
            require_organizer(&group, caller.user_id)?;
            require_status(&group, &[GroupStatus::Completed])?;

            let mut member = find_member(tx.as_mut(), group_id, member_id).await?;
            if member.checked_in_at.is_some() {
                return Err(ApiError::new(
                    ErrorKind::CannotMarkCheckedIn,
                    "Member was checked in",
                ));
            }
            if member.status != MemberStatus::Approved {
                return Err(ApiError::new(
                    ErrorKind::NotEligible,
                    "Only approved members can be marked as no-show",
                ));
            }
            if member.no_show {
                return Ok((member, group.title, false));
            }

            member.no_show = true;
            let member = tx.save_member(&member).await?;

            tx.ensure_user(member_id, None, now).await?;
            let mut user = tx
                .lock_user(member_id)
                .await?
                .ok_or_else(|| ApiError::internal("User row missing after upsert"))?;
            user.no_show_count += 1;
            user.reputation_score = apply_no_show_penalty(user.reputation_score, penalty);
            user.updated_at = now;
            tx.save_user(&user).await?;

            Ok((member, group.title, true))
        }
        .await;
        finish(tx, result).await
    })
    .await?;

    if penalised {
        tracing::info!(group_id, user_id = member_id, "member marked as no-show");
        state.notifier.notify(
            member_id,
            Notification::for_group(
                NotificationKind::NoShowMarked,
                group_id,
                "Marked as no-show",
                format!("The organizer of \"{title}\" marked you as absent."),
            ),
        );
    }

    Ok(member)
}

/// Deduct `penalty` from a stored score without going below zero.
pub fn apply_no_show_penalty(score: f64, penalty: f64) -> f64 {
    (score - penalty).max(0.0)
}
