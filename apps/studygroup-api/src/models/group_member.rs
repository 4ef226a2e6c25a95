use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::group_members;

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
pub enum MemberRole {
    Organizer,
    Member,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberRole::Organizer => "organizer",
            MemberRole::Member => "member",
        }
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organizer" => Ok(MemberRole::Organizer),
            "member" => Ok(MemberRole::Member),
            other => Err(format!("unknown member role: {other}")),
        }
    }
}

text_column_enum!(MemberRole);

/// Admission state of a membership. `checked_in` is only reachable from
/// `approved` and still occupies a seat.
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
pub enum MemberStatus {
    Pending,
    Approved,
    Waitlist,
    CheckedIn,
}

impl MemberStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberStatus::Pending => "pending",
            MemberStatus::Approved => "approved",
            MemberStatus::Waitlist => "waitlist",
            MemberStatus::CheckedIn => "checked_in",
        }
    }

    /// Whether this membership counts against the group's capacity.
    pub fn holds_seat(self) -> bool {
        match self {
            MemberStatus::Approved | MemberStatus::CheckedIn => true,
            MemberStatus::Pending | MemberStatus::Waitlist => false,
        }
    }
}

impl FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MemberStatus::Pending),
            "approved" => Ok(MemberStatus::Approved),
            "waitlist" => Ok(MemberStatus::Waitlist),
            "checked_in" => Ok(MemberStatus::CheckedIn),
            other => Err(format!("unknown member status: {other}")),
        }
    }
}

text_column_enum!(MemberStatus);

#[derive(
    Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, ToSchema,
)]
#[diesel(table_name = group_members)]
#[diesel(primary_key(group_id, user_id))]
#[diesel(treat_none_as_null = true)]
pub struct GroupMember {
    pub group_id: i64,
    pub user_id: i64,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub joined_at: DateTime<Utc>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub no_show: bool,
}

impl GroupMember {
    pub fn new(
        group_id: i64,
        user_id: i64,
        role: MemberRole,
        status: MemberStatus,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            group_id,
            user_id,
            role,
            status,
            joined_at,
            checked_in_at: None,
            no_show: false,
        }
    }

    pub fn is_organizer(&self) -> bool {
        self.role == MemberRole::Organizer
    }
}
