//! In-app notifications emitted on membership and lifecycle changes.
//!
//! Delivery is fire-and-forget: a notifier never fails its caller, and the
//! domain layer only calls it after the owning transaction committed.

pub mod fanout;

use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

pub use fanout::NotificationFanout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    JoinRequested,
    MembershipApproved,
    WaitlistPromoted,
    GroupStarted,
    GroupFinished,
    GroupCancelled,
    GroupUpdated,
    GroupDeleted,
    AnnouncementPinned,
    NoShowMarked,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: String,
    pub data: Value,
}

impl Notification {
    /// A notification pointing at one group's page.
    pub fn for_group(
        kind: NotificationKind,
        group_id: i64,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            link: format!("/groups/{group_id}"),
            data: serde_json::json!({ "group_id": group_id }),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.data {
            map.insert(key.to_string(), value.into());
        }
        self
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, user_id: i64, notification: Notification);

    fn notify_many(&self, user_ids: &[i64], notification: &Notification) {
        for &user_id in user_ids {
            self.notify(user_id, notification.clone());
        }
    }
}
