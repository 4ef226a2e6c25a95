use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::users;

/// Local projection of an externally owned user: contact address plus the
/// reputation aggregates this service maintains.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i64,
    pub email: Option<String>,
    /// Raw mean of received ratings, minus no-show penalties.
    pub reputation_score: f64,
    pub reputation_count: i32,
    pub no_show_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: i64, email: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            email,
            reputation_score: 0.0,
            reputation_count: 0,
            no_show_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Reputation {
    pub user_id: i64,
    /// Bayesian-smoothed display score, rounded to two decimals.
    pub score: f64,
    pub count: i32,
    pub no_show_count: i32,
}
