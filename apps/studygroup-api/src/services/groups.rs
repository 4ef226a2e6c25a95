//! Group CRUD, member listing and the pinned announcement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use utoipa::ToSchema;

use super::membership::notify_promoted;
use super::{attendee_ids, lock_group, promote_waitlisted, require_organizer, require_status};
use crate::auth::middleware::AuthUser;
use crate::db::{finish, with_retry};
use crate::error::{ApiError, FieldError};
use crate::models::group::{Group, GroupDetail, GroupStatus, JoinPolicy};
use crate::models::group_member::{GroupMember, MemberRole, MemberStatus};
use crate::notify::{Notification, NotificationKind};
use crate::AppState;

const MAX_TITLE_LEN: usize = 120;
const MAX_LOCATION_NAME_LEN: usize = 200;
const MAX_ADDRESS_LEN: usize = 500;
const MAX_DESCRIPTION_LEN: usize = 5000;
const MAX_CAPACITY: i32 = 1000;
const MAX_ANNOUNCEMENT_LEN: usize = 1000;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateGroup {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location_name: String,
    #[serde(default)]
    pub location_address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub capacity: i32,
    /// `auto` (default) or `approval`.
    pub join_policy: Option<String>,
}

/// Partial update. Absent fields are left alone; `null` coordinates clear
/// the pin.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateGroup {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location_name: Option<String>,
    pub location_address: Option<String>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<f64>)]
    pub latitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<f64>)]
    pub longitude: Option<Option<f64>>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub capacity: Option<i32>,
    pub join_policy: Option<String>,
}

/// Maps a present field (even `null`) to `Some`, so it differs from absent.
fn present<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

fn parse_join_policy(raw: Option<&str>, errors: &mut Vec<FieldError>) -> Option<JoinPolicy> {
    match raw {
        None => Some(JoinPolicy::Auto),
        Some(raw) => match raw.parse() {
            Ok(policy) => Some(policy),
            Err(_) => {
                errors.push(FieldError::new(
                    "join_policy",
                    "Join policy must be auto or approval",
                ));
                None
            }
        },
    }
}

/// Field checks shared by create and update. `now` is only consulted when
/// `check_future_start` is set.
pub fn validate_group(
    group: &Group,
    now: DateTime<Utc>,
    check_future_start: bool,
) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let len = |s: &str| s.chars().count();

    if group.title.is_empty() {
        errors.push(FieldError::new("title", "Title is required"));
    } else if len(&group.title) > MAX_TITLE_LEN {
        errors.push(FieldError::new(
            "title",
            "Title must be 120 characters or fewer",
        ));
    }
    if len(&group.description) > MAX_DESCRIPTION_LEN {
        errors.push(FieldError::new(
            "description",
            "Description must be 5000 characters or fewer",
        ));
    }
    if group.location_name.is_empty() {
        errors.push(FieldError::new("location_name", "Location name is required"));
    } else if len(&group.location_name) > MAX_LOCATION_NAME_LEN {
        errors.push(FieldError::new(
            "location_name",
            "Location name must be 200 characters or fewer",
        ));
    }
    if len(&group.location_address) > MAX_ADDRESS_LEN {
        errors.push(FieldError::new(
            "location_address",
            "Address must be 500 characters or fewer",
        ));
    }
    match (group.latitude, group.longitude) {
        (Some(lat), Some(lon)) => {
            if !(-90.0..=90.0).contains(&lat) {
                errors.push(FieldError::new("latitude", "Latitude must be within [-90, 90]"));
            }
            if !(-180.0..=180.0).contains(&lon) {
                errors.push(FieldError::new(
                    "longitude",
                    "Longitude must be within [-180, 180]",
                ));
            }
        }
        (None, None) => {}
        _ => errors.push(FieldError::new(
            "latitude",
            "Latitude and longitude must be given together",
        )),
    }
    if group.start_at >= group.end_at {
        errors.push(FieldError::new("end_at", "End time must be after start time"));
    }
    if check_future_start && group.start_at <= now {
        errors.push(FieldError::new("start_at", "Start time must be in the future"));
    }
    if group.capacity < 1 {
        errors.push(FieldError::new("capacity", "Capacity must be at least 1"));
    } else if group.capacity > MAX_CAPACITY {
        errors.push(FieldError::new("capacity", "Capacity must be 1000 or fewer"));
    }
    errors
}

pub async fn create_group(
    state: &AppState,
    caller: &AuthUser,
    input: &CreateGroup,
) -> Result<GroupDetail, ApiError> {
    let now = state.clock.now();
    let mut errors = Vec::new();
    let join_policy = parse_join_policy(input.join_policy.as_deref(), &mut errors);

    let group = Group {
        id: state.snowflake.generate(),
        title: input.title.trim().to_string(),
        description: input.description.trim().to_string(),
        location_name: input.location_name.trim().to_string(),
        location_address: input.location_address.trim().to_string(),
        latitude: input.latitude,
        longitude: input.longitude,
        start_at: input.start_at,
        end_at: input.end_at,
        capacity: input.capacity,
        join_policy: join_policy.unwrap_or(JoinPolicy::Auto),
        status: GroupStatus::Upcoming,
        organizer_id: caller.user_id,
        reminder_sent: false,
        announcement: None,
        announcement_at: None,
        announcement_by: None,
        created_at: now,
        updated_at: now,
    };
    errors.extend(validate_group(&group, now, true));
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let group = &group;
    let detail = with_retry(state.config.retry_policy(), || async move {
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            tx.ensure_user(caller.user_id, caller.email.as_deref(), now)
                .await?;
            let group = tx.insert_group(group).await?;
            tx.insert_member(&GroupMember::new(
                group.id,
                caller.user_id,
                MemberRole::Organizer,
                MemberStatus::Approved,
                now,
            ))
            .await?;
            let counts = tx.count_members(group.id).await?;
            Ok(GroupDetail::new(group, counts))
        }
        .await;
        finish(tx, result).await
    })
    .await?;

    tracing::info!(
        group_id = detail.group.id,
        organizer_id = caller.user_id,
        "group created"
    );
    Ok(detail)
}

pub async fn get_group(state: &AppState, group_id: i64) -> Result<GroupDetail, ApiError> {
    with_retry(state.config.retry_policy(), || async move {
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            let group = tx
                .find_group(group_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Group not found"))?;
            let counts = tx.count_members(group_id).await?;
            Ok(GroupDetail::new(group, counts))
        }
        .await;
        finish(tx, result).await
    })
    .await
}

pub async fn list_members(state: &AppState, group_id: i64) -> Result<Vec<GroupMember>, ApiError> {
    with_retry(state.config.retry_policy(), || async move {
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            if tx.find_group(group_id).await?.is_none() {
                return Err(ApiError::not_found("Group not found"));
            }
            tx.list_members(group_id).await
        }
        .await;
        finish(tx, result).await
    })
    .await
}

pub async fn update_group(
    state: &AppState,
    caller: &AuthUser,
    group_id: i64,
    input: &UpdateGroup,
) -> Result<GroupDetail, ApiError> {
    let (detail, recipients, promoted) = with_retry(state.config.retry_policy(), || async move {
        let now = state.clock.now();
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            let current = lock_group(tx.as_mut(), group_id).await?;
            require_organizer(&current, caller.user_id)?;
            require_status(&current, &[GroupStatus::Upcoming])?;

            let mut errors = Vec::new();
            let mut next = current.clone();
            if let Some(title) = &input.title {
                next.title = title.trim().to_string();
            }
            if let Some(description) = &input.description {
                next.description = description.trim().to_string();
            }
            if let Some(name) = &input.location_name {
                next.location_name = name.trim().to_string();
            }
            if let Some(address) = &input.location_address {
                next.location_address = address.trim().to_string();
            }
            if let Some(latitude) = input.latitude {
                next.latitude = latitude;
            }
            if let Some(longitude) = input.longitude {
                next.longitude = longitude;
            }
            if let Some(start_at) = input.start_at {
                next.start_at = start_at;
            }
            if let Some(end_at) = input.end_at {
                next.end_at = end_at;
            }
            if let Some(capacity) = input.capacity {
                next.capacity = capacity;
            }
            if input.join_policy.is_some() {
                if let Some(policy) = parse_join_policy(input.join_policy.as_deref(), &mut errors)
                {
                    next.join_policy = policy;
                }
            }

            let start_moved = next.start_at != current.start_at;
            errors.extend(validate_group(&next, now, start_moved));

            let counts = tx.count_members(group_id).await?;
            if next.capacity >= 1 && i64::from(next.capacity) < counts.approved {
                errors.push(FieldError::new(
                    "capacity",
                    format!(
                        "Capacity cannot drop below the {} members already approved",
                        counts.approved
                    ),
                ));
            }
            if !errors.is_empty() {
                return Err(ApiError::validation(errors));
            }

            if start_moved {
                next.reminder_sent = false;
            }
            next.updated_at = now;
            let group = tx.save_group(&next).await?;

            let promoted = if group.capacity > current.capacity {
                promote_waitlisted(tx.as_mut(), &group, usize::MAX).await?
            } else {
                Vec::new()
            };
            let recipients = attendee_ids(tx.as_mut(), &group).await?;
            let counts = tx.count_members(group_id).await?;
            Ok((GroupDetail::new(group, counts), recipients, promoted))
        }
        .await;
        finish(tx, result).await
    })
    .await?;

    let group = &detail.group;
    tracing::info!(group_id, promoted = promoted.len(), "group updated");

    let promoted_ids: Vec<i64> = promoted.iter().map(|m| m.user_id).collect();
    let others: Vec<i64> = recipients
        .into_iter()
        .filter(|id| !promoted_ids.contains(id))
        .collect();
    state.notifier.notify_many(
        &others,
        &Notification::for_group(
            NotificationKind::GroupUpdated,
            group_id,
            "Group updated",
            format!("The organizer changed the details of \"{}\".", group.title),
        ),
    );
    for user_id in promoted_ids {
        notify_promoted(state, group_id, &group.title, user_id);
    }

    Ok(detail)
}

pub async fn delete_group(
    state: &AppState,
    caller: &AuthUser,
    group_id: i64,
) -> Result<(), ApiError> {
    let (title, recipients) = with_retry(state.config.retry_policy(), || async move {
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            let group = lock_group(tx.as_mut(), group_id).await?;
            require_organizer(&group, caller.user_id)?;
            require_status(&group, &[GroupStatus::Upcoming, GroupStatus::Cancelled])?;

            let recipients = if group.status == GroupStatus::Upcoming {
                attendee_ids(tx.as_mut(), &group).await?
            } else {
                Vec::new()
            };
            tx.delete_group(group_id).await?;
            Ok((group.title, recipients))
        }
        .await;
        finish(tx, result).await
    })
    .await?;

    tracing::info!(group_id, "group deleted");
    state.notifier.notify_many(
        &recipients,
        &Notification {
            link: "/groups".to_string(),
            ..Notification::for_group(
                NotificationKind::GroupDeleted,
                group_id,
                "Group deleted",
                format!("\"{title}\" was deleted by the organizer."),
            )
        },
    );
    Ok(())
}

/// Set (or clear, with `None`) the organizer's pinned announcement.
pub async fn pin_announcement(
    state: &AppState,
    caller: &AuthUser,
    group_id: i64,
    text: Option<&str>,
) -> Result<Group, ApiError> {
    let text = text.map(str::trim);
    if let Some(text) = text {
        if text.is_empty() || text.chars().count() > MAX_ANNOUNCEMENT_LEN {
            return Err(ApiError::validation(vec![FieldError::new(
                "text",
                "Announcement must be 1 to 1000 characters",
            )]));
        }
    }

    let (group, recipients) = with_retry(state.config.retry_policy(), || async move {
        let now = state.clock.now();
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            let mut group = lock_group(tx.as_mut(), group_id).await?;
            require_organizer(&group, caller.user_id)?;
            require_status(&group, &[GroupStatus::Upcoming, GroupStatus::Ongoing])?;

            match text {
                Some(text) => {
                    group.announcement = Some(text.to_string());
                    group.announcement_at = Some(now);
                    group.announcement_by = Some(caller.user_id);
                }
                None => {
                    group.announcement = None;
                    group.announcement_at = None;
                    group.announcement_by = None;
                }
            }
            group.updated_at = now;
            let group = tx.save_group(&group).await?;
            let recipients = attendee_ids(tx.as_mut(), &group).await?;
            Ok((group, recipients))
        }
        .await;
        finish(tx, result).await
    })
    .await?;

    if let Some(text) = &group.announcement {
        tracing::info!(group_id, "announcement pinned");
        state.notifier.notify_many(
            &recipients,
            &Notification::for_group(
                NotificationKind::AnnouncementPinned,
                group_id,
                format!("Announcement for \"{}\"", group.title),
                text.clone(),
            ),
        );
    }
    Ok(group)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn draft(now: DateTime<Utc>) -> Group {
        Group {
            id: 1,
            title: "Algorithms".to_string(),
            description: String::new(),
            location_name: "Cafe".to_string(),
            location_address: String::new(),
            latitude: None,
            longitude: None,
            start_at: now + Duration::hours(3),
            end_at: now + Duration::hours(5),
            capacity: 4,
            join_policy: JoinPolicy::Auto,
            status: GroupStatus::Upcoming,
            organizer_id: 1,
            reminder_sent: false,
            announcement: None,
            announcement_at: None,
            announcement_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn fields(errors: Vec<FieldError>) -> Vec<String> {
        errors.into_iter().map(|e| e.field).collect()
    }

    #[test]
    fn valid_draft_passes() {
        let now = Utc::now();
        assert!(validate_group(&draft(now), now, true).is_empty());
    }

    #[test]
    fn reports_each_bad_field() {
        let now = Utc::now();
        let mut group = draft(now);
        group.title = String::new();
        group.end_at = group.start_at;
        group.capacity = 0;
        assert_eq!(
            fields(validate_group(&group, now, true)),
            vec!["title", "end_at", "capacity"]
        );
    }

    #[test]
    fn past_start_only_matters_when_checked() {
        let now = Utc::now();
        let mut group = draft(now);
        group.start_at = now - Duration::minutes(5);
        assert_eq!(fields(validate_group(&group, now, true)), vec!["start_at"]);
        assert!(validate_group(&group, now, false).is_empty());
    }

    #[test]
    fn coordinates_come_in_pairs() {
        let now = Utc::now();
        let mut group = draft(now);
        group.latitude = Some(10.0);
        assert_eq!(fields(validate_group(&group, now, true)), vec!["latitude"]);
        group.longitude = Some(200.0);
        assert_eq!(fields(validate_group(&group, now, true)), vec!["longitude"]);
    }

    #[test]
    fn unknown_join_policy_is_a_field_error() {
        let mut errors = Vec::new();
        assert_eq!(parse_join_policy(Some("invite"), &mut errors), None);
        assert_eq!(fields(errors), vec!["join_policy"]);
        assert_eq!(
            parse_join_policy(None, &mut Vec::new()),
            Some(JoinPolicy::Auto)
        );
    }

    #[test]
    fn null_coordinate_differs_from_absent() {
        let absent: UpdateGroup = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.latitude, None);
        let cleared: UpdateGroup = serde_json::from_str(r#"{"latitude": null}"#).unwrap();
        assert_eq!(cleared.latitude, Some(None));
    }
}
