//! Peer feedback and the smoothed trust score.

use serde::Deserialize;
use utoipa::ToSchema;

use super::require_status;
use crate::auth::middleware::AuthUser;
use crate::db::{finish, with_retry};
use crate::error::{ApiError, ErrorKind, FieldError};
use crate::models::feedback::{FeedbackDimensions, GivenRating, UserFeedback};
use crate::models::group::GroupStatus;
use crate::models::user::Reputation;
use crate::AppState;

/// Mean of the synthetic prior every score starts from.
pub const PRIOR_MEAN: f64 = 3.8;
/// How many ratings the prior is worth.
pub const PRIOR_WEIGHT: f64 = 10.0;
pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

const MAX_TAGS: usize = 10;
const MAX_TAG_LEN: usize = 32;
const MAX_COMMENT_LEN: usize = 1000;

/// Bayesian average of `count` ratings with the given `mean`, clamped to
/// the rating scale and rounded to two decimals.
pub fn display_score(mean: f64, count: i32) -> f64 {
    let count = f64::from(count.max(0));
    let blended = (PRIOR_MEAN * PRIOR_WEIGHT + mean * count) / (PRIOR_WEIGHT + count);
    let clamped = blended.clamp(0.0, f64::from(MAX_RATING));
    (clamped * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FeedbackInput {
    pub target_id: i64,
    pub rating: i16,
    #[serde(default)]
    pub dimensions: FeedbackDimensions,
    #[serde(default)]
    pub tags: Vec<String>,
    pub comment: Option<String>,
    pub is_public: Option<bool>,
}

impl FeedbackInput {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        let in_scale = |v: i16| (MIN_RATING..=MAX_RATING).contains(&v);

        if !in_scale(self.rating) {
            errors.push(FieldError::new("rating", "Rating must be between 1 and 5"));
        }
        for (field, value) in [
            ("dimensions.punctuality", self.dimensions.punctuality),
            ("dimensions.preparation", self.dimensions.preparation),
            ("dimensions.participation", self.dimensions.participation),
        ] {
            if value.is_some_and(|v| !in_scale(v)) {
                errors.push(FieldError::new(field, "Must be between 1 and 5"));
            }
        }
        if self.tags.len() > MAX_TAGS {
            errors.push(FieldError::new("tags", "At most 10 tags"));
        }
        if self
            .tags
            .iter()
            .any(|t| t.trim().is_empty() || t.chars().count() > MAX_TAG_LEN)
        {
            errors.push(FieldError::new("tags", "Tags must be 1 to 32 characters"));
        }
        if self
            .comment
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_COMMENT_LEN)
        {
            errors.push(FieldError::new(
                "comment",
                "Comment must be 1000 characters or fewer",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(errors))
        }
    }
}

pub async fn submit_feedback(
    state: &AppState,
    caller: &AuthUser,
    group_id: i64,
    input: &FeedbackInput,
) -> Result<UserFeedback, ApiError> {
    input.validate()?;
    if input.target_id == caller.user_id {
        return Err(ApiError::new(ErrorKind::SelfRating, "You cannot rate yourself"));
    }

    let dimensions = serde_json::to_value(&input.dimensions)
        .map_err(|_| ApiError::internal("Failed to encode dimensions"))?;
    let tags: Vec<String> = input.tags.iter().map(|t| t.trim().to_string()).collect();
    let comment = input
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    let id = state.snowflake.generate();
    let (dimensions, tags, comment) = (&dimensions, &tags, &comment);

    let feedback = with_retry(state.config.retry_policy(), || async move {
        let now = state.clock.now();
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            let group = tx
                .find_group(group_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Group not found"))?;
            require_status(&group, &[GroupStatus::Completed])?;

            for user_id in [caller.user_id, input.target_id] {
                let attended = tx
                    .find_member(group_id, user_id)
                    .await?
                    .is_some_and(|m| m.checked_in_at.is_some());
                if !attended {
                    return Err(ApiError::new(
                        ErrorKind::NotEligible,
                        "Both rater and target must have attended the group",
                    ));
                }
            }

            if tx
                .feedback_exists(caller.user_id, input.target_id, group_id)
                .await?
            {
                return Err(ApiError::new(
                    ErrorKind::DuplicateFeedback,
                    "Feedback already submitted",
                ));
            }

            tx.ensure_user(caller.user_id, caller.email.as_deref(), now)
                .await?;
            let feedback = tx
                .insert_feedback(&UserFeedback {
                    id,
                    rater_id: caller.user_id,
                    target_id: input.target_id,
                    group_id,
                    rating: input.rating,
                    dimensions: dimensions.clone(),
                    tags: tags.clone(),
                    comment: comment.clone(),
                    is_public: input.is_public.unwrap_or(true),
                    created_at: now,
                })
                .await?;

            tx.ensure_user(input.target_id, None, now).await?;
            let mut target = tx
                .lock_user(input.target_id)
                .await?
                .ok_or_else(|| ApiError::internal("User row missing after upsert"))?;
            let ratings = tx.ratings_for(input.target_id).await?;
            let (mean, count) = mean_and_count(&ratings);
            target.reputation_score = mean;
            target.reputation_count = count;
            target.updated_at = now;
            tx.save_user(&target).await?;

            Ok(feedback)
        }
        .await;
        finish(tx, result).await
    })
    .await?;

    tracing::info!(
        group_id,
        rater_id = caller.user_id,
        target_id = input.target_id,
        "feedback recorded"
    );
    Ok(feedback)
}

fn mean_and_count(ratings: &[i16]) -> (f64, i32) {
    if ratings.is_empty() {
        return (0.0, 0);
    }
    let sum: i64 = ratings.iter().map(|&r| i64::from(r)).sum();
    let count = ratings.len();
    (sum as f64 / count as f64, i32::try_from(count).unwrap_or(i32::MAX))
}

pub async fn get_reputation(state: &AppState, user_id: i64) -> Result<Reputation, ApiError> {
    let user = with_retry(state.config.retry_policy(), || async move {
        let mut tx = state.store.begin().await?;
        let result = tx.find_user(user_id).await;
        finish(tx, result).await
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Reputation {
        user_id,
        score: display_score(user.reputation_score, user.reputation_count),
        count: user.reputation_count,
        no_show_count: user.no_show_count,
    })
}

pub async fn get_my_feedback_for_group(
    state: &AppState,
    caller: &AuthUser,
    group_id: i64,
) -> Result<Vec<GivenRating>, ApiError> {
    with_retry(state.config.retry_policy(), || async move {
        let mut tx = state.store.begin().await?;
        let result: Result<_, ApiError> = async {
            if tx.find_group(group_id).await?.is_none() {
                return Err(ApiError::not_found("Group not found"));
            }
            tx.ratings_given(caller.user_id, group_id).await
        }
        .await;
        finish(tx, result).await
    })
    .await
}
