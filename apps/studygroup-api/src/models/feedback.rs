use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::user_feedback;

/// Optional per-aspect ratings, stored as JSONB next to the overall rating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FeedbackDimensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub punctuality: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preparation: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participation: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, ToSchema)]
#[diesel(table_name = user_feedback)]
pub struct UserFeedback {
    pub id: i64,
    pub rater_id: i64,
    pub target_id: i64,
    pub group_id: i64,
    pub rating: i16,
    #[schema(value_type = FeedbackDimensions)]
    pub dimensions: serde_json::Value,
    pub tags: Vec<String>,
    pub comment: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

/// A rating the caller already gave inside one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct GivenRating {
    pub target_id: i64,
    pub rating: i16,
}
