use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::groups;
use crate::db::MemberCounts;

/// Where a group sits in its lifecycle.
///
/// `upcoming → ongoing → completed`, and `upcoming | ongoing → cancelled`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    diesel::AsExpression,
    diesel::FromSqlRow,
)]
#[diesel(sql_type = diesel::sql_types::Text)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Upcoming,
    Ongoing,
    Completed,
    Cancelled,
}

impl GroupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupStatus::Upcoming => "upcoming",
            GroupStatus::Ongoing => "ongoing",
            GroupStatus::Completed => "completed",
            GroupStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        match self {
            GroupStatus::Upcoming | GroupStatus::Ongoing => false,
            GroupStatus::Completed | GroupStatus::Cancelled => true,
        }
    }
}

impl FromStr for GroupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(GroupStatus::Upcoming),
            "ongoing" => Ok(GroupStatus::Ongoing),
            "completed" => Ok(GroupStatus::Completed),
            "cancelled" => Ok(GroupStatus::Cancelled),
            other => Err(format!("unknown group status: {other}")),
        }
    }
}

text_column_enum!(GroupStatus);

/// How join requests are admitted.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    diesel::AsExpression,
    diesel::FromSqlRow,
)]
#[diesel(sql_type = diesel::sql_types::Text)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Joiners are approved immediately while seats remain.
    Auto,
    /// Joiners wait as `pending` until the organizer approves them.
    Approval,
}

impl JoinPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            JoinPolicy::Auto => "auto",
            JoinPolicy::Approval => "approval",
        }
    }
}

impl FromStr for JoinPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(JoinPolicy::Auto),
            "approval" => Ok(JoinPolicy::Approval),
            other => Err(format!("unknown join policy: {other}")),
        }
    }
}

text_column_enum!(JoinPolicy);

#[derive(
    Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, ToSchema,
)]
#[diesel(table_name = groups)]
#[diesel(treat_none_as_null = true)]
pub struct Group {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub location_name: String,
    pub location_address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub capacity: i32,
    pub join_policy: JoinPolicy,
    pub status: GroupStatus,
    pub organizer_id: i64,
    pub reminder_sent: bool,
    pub announcement: Option<String>,
    pub announcement_at: Option<DateTime<Utc>>,
    pub announcement_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn is_organizer(&self, user_id: i64) -> bool {
        self.organizer_id == user_id
    }
}

/// Public read model: a group with its seat counts.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: Group,
    pub approved_count: i64,
    pub pending_count: i64,
    pub waitlist_count: i64,
}

impl GroupDetail {
    pub fn new(group: Group, counts: MemberCounts) -> Self {
        Self {
            group,
            approved_count: counts.approved,
            pending_count: counts.pending,
            waitlist_count: counts.waitlist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            GroupStatus::Upcoming,
            GroupStatus::Ongoing,
            GroupStatus::Completed,
            GroupStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<GroupStatus>(), Ok(status));
        }
        assert!("archived".parse::<GroupStatus>().is_err());
    }

    #[test]
    fn only_completed_and_cancelled_are_terminal() {
        assert!(!GroupStatus::Upcoming.is_terminal());
        assert!(!GroupStatus::Ongoing.is_terminal());
        assert!(GroupStatus::Completed.is_terminal());
        assert!(GroupStatus::Cancelled.is_terminal());
    }

    #[test]
    fn join_policy_rejects_unknown_values() {
        assert_eq!("approval".parse::<JoinPolicy>(), Ok(JoinPolicy::Approval));
        assert!("open".parse::<JoinPolicy>().is_err());
    }
}
