//! Domain operations.
//!
//! Each operation opens one store transaction, performs every check and
//! write through it, and commits through [`finish`](crate::db::finish).
//! Transient store failures re-run the whole transaction via
//! [`with_retry`](crate::db::with_retry). Notifications go out only after
//! the commit succeeded.

pub mod groups;
pub mod lifecycle;
pub mod membership;
pub mod reminders;
pub mod reputation;

use crate::db::StoreTx;
use crate::error::ApiError;
use crate::models::group::{Group, GroupStatus};
use crate::models::group_member::{GroupMember, MemberStatus};

/// Lock the group row, or `NotFound`.
pub(crate) async fn lock_group(
    tx: &mut (dyn StoreTx + '_),
    group_id: i64,
) -> Result<Group, ApiError> {
    tx.lock_group(group_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Group not found"))
}

pub(crate) async fn find_member(
    tx: &mut (dyn StoreTx + '_),
    group_id: i64,
    user_id: i64,
) -> Result<GroupMember, ApiError> {
    tx.find_member(group_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))
}

pub(crate) fn require_organizer(group: &Group, user_id: i64) -> Result<(), ApiError> {
    if group.is_organizer(user_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Only the organizer can perform this action",
        ))
    }
}

pub(crate) fn require_status(group: &Group, allowed: &[GroupStatus]) -> Result<(), ApiError> {
    if allowed.contains(&group.status) {
        Ok(())
    } else {
        Err(ApiError::wrong_status(format!(
            "Not allowed while the group is {}",
            group.status.as_str()
        )))
    }
}

/// Promote waitlisted members, oldest first, while seats are free. At most
/// `limit` promotions. Runs under the group lock, so the seat count it
/// reads cannot change underneath it.
pub(crate) async fn promote_waitlisted(
    tx: &mut (dyn StoreTx + '_),
    group: &Group,
    limit: usize,
) -> Result<Vec<GroupMember>, ApiError> {
    let mut promoted = Vec::new();
    while promoted.len() < limit {
        let counts = tx.count_members(group.id).await?;
        if counts.approved >= i64::from(group.capacity) {
            break;
        }
        let Some(mut next) = tx.oldest_waitlisted(group.id).await? else {
            break;
        };
        next.status = MemberStatus::Approved;
        promoted.push(tx.save_member(&next).await?);
    }
    Ok(promoted)
}

/// Seat-holding members other than the organizer.
pub(crate) async fn attendee_ids(
    tx: &mut (dyn StoreTx + '_),
    group: &Group,
) -> Result<Vec<i64>, ApiError> {
    Ok(tx
        .list_members(group.id)
        .await?
        .into_iter()
        .filter(|m| m.status.holds_seat() && !group.is_organizer(m.user_id))
        .map(|m| m.user_id)
        .collect())
}
