//! Admission, departure and waitlist promotion.

use serde::Serialize;
use utoipa::ToSchema;

use super::{find_member, lock_group, promote_waitlisted, require_organizer, require_status};
use crate::auth::middleware::AuthUser;
use crate::db::{finish, with_retry};
use crate::error::{ApiError, ErrorKind};
use crate::models::group::{GroupStatus, JoinPolicy};
use crate::models::group_member::{GroupMember, MemberRole, MemberStatus};
use crate::notify::{Notification, NotificationKind};
use crate::AppState;

/// Status a new member starts in: waitlisted when every seat is taken,
/// otherwise whatever the join policy says.
pub fn admission_status(approved: i64, capacity: i32, policy: JoinPolicy) -> MemberStatus {
    if approved >= i64::from(capacity) {
        return MemberStatus::Waitlist;
    }
    match policy {
        JoinPolicy::Auto => MemberStatus::Approved,
        JoinPolicy::Approval => MemberStatus::Pending,
    }
}

pub async fn join(
    state: &AppState,
    caller: &AuthUser,
    group_id: i64,
) -> Result<GroupMember, ApiError> {
    let (member, title, organizer_id) = with_retry(state.config.retry_policy(), || async move {
        let now = state.clock.now();
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            tx.ensure_user(caller.user_id, caller.email.as_deref(), now)
                .await?;
            let group = lock_group(tx.as_mut(), group_id).await?;
            require_status(&group, &[GroupStatus::Upcoming])?;

            if tx.find_member(group_id, caller.user_id).await?.is_some() {
                return Err(ApiError::new(
                    ErrorKind::AlreadyMember,
                    "Already a member of this group",
                ));
            }

            let counts = tx.count_members(group_id).await?;
            let status = admission_status(counts.approved, group.capacity, group.join_policy);
            let member = tx
                .insert_member(&GroupMember::new(
                    group_id,
                    caller.user_id,
                    MemberRole::Member,
                    status,
                    now,
                ))
                .await?;
            Ok((member, group.title, group.organizer_id))
        }
        .await;
        finish(tx, result).await
    })
    .await?;

    tracing::info!(
        group_id,
        user_id = caller.user_id,
        status = member.status.as_str(),
        "member joined"
    );

    if member.status == MemberStatus::Pending {
        state.notifier.notify(
            organizer_id,
            Notification::for_group(
                NotificationKind::JoinRequested,
                group_id,
                "New join request",
                format!("Someone asked to join \"{title}\"."),
            )
            .with_data("user_id", caller.user_id),
        );
    }

    Ok(member)
}

pub async fn approve(
    state: &AppState,
    caller: &AuthUser,
    group_id: i64,
    member_id: i64,
) -> Result<GroupMember, ApiError> {
    let (member, title, changed) = with_retry(state.config.retry_policy(), || async move {
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            let group = lock_group(tx.as_mut(), group_id).await?;
            require_organizer(&group, caller.user_id)?;
            require_status(&group, &[GroupStatus::Upcoming, GroupStatus::Ongoing])?;

            let mut member = find_member(tx.as_mut(), group_id, member_id).await?;
            if member.status.holds_seat() {
                return Ok((member, group.title, false));
            }

            let counts = tx.count_members(group_id).await?;
            if counts.approved >= i64::from(group.capacity) {
                return Err(ApiError::new(ErrorKind::GroupFull, "The group is full"));
            }

            member.status = MemberStatus::Approved;
            let member = tx.save_member(&member).await?;
            Ok((member, group.title, true))
        }
        .await;
        finish(tx, result).await
    })
    .await?;

    if changed {
        tracing::info!(group_id, user_id = member_id, "member approved");
        state.notifier.notify(
            member_id,
            Notification::for_group(
                NotificationKind::MembershipApproved,
                group_id,
                "You're in",
                format!("Your request to join \"{title}\" was approved."),
            ),
        );
    }

    Ok(member)
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaveOutcome {
    /// The waitlisted member who took the freed seat, if any.
    pub promoted: Option<GroupMember>,
}

pub async fn leave(
    state: &AppState,
    caller: &AuthUser,
    group_id: i64,
) -> Result<LeaveOutcome, ApiError> {
    let (promoted, title) = with_retry(state.config.retry_policy(), || async move {
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            let group = lock_group(tx.as_mut(), group_id).await?;
            let member = find_member(tx.as_mut(), group_id, caller.user_id).await?;
            if member.is_organizer() {
                return Err(ApiError::new(
                    ErrorKind::OrganizerCannotLeave,
                    "The organizer cannot leave the group",
                ));
            }
            require_status(&group, &[GroupStatus::Upcoming, GroupStatus::Ongoing])?;

            tx.delete_member(group_id, caller.user_id).await?;
            let promoted = promote_waitlisted(tx.as_mut(), &group, 1).await?;
            Ok((promoted.into_iter().next(), group.title))
        }
        .await;
        finish(tx, result).await
    })
    .await?;

    tracing::info!(
        group_id,
        user_id = caller.user_id,
        promoted = ?promoted.as_ref().map(|m| m.user_id),
        "member left"
    );

    if let Some(member) = &promoted {
        notify_promoted(state, group_id, &title, member.user_id);
    }

    Ok(LeaveOutcome { promoted })
}

pub(crate) fn notify_promoted(state: &AppState, group_id: i64, title: &str, user_id: i64) {
    state.notifier.notify(
        user_id,
        Notification::for_group(
            NotificationKind::WaitlistPromoted,
            group_id,
            "A seat opened up",
            format!("You moved off the waitlist for \"{title}\"."),
        ),
    );
}
