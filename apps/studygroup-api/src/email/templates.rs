use crate::models::group::Group;

/// Subject and plain-text body of the pre-start reminder.
pub struct ReminderEmailContent {
    pub subject: String,
    pub text: String,
}

impl ReminderEmailContent {
    pub fn new(group: &Group) -> Self {
        let mut text = format!(
            "Hi!\n\n\"{}\" starts at {}.\n\nWhere: {}\n",
            group.title,
            group.start_at.format("%Y-%m-%d %H:%M UTC"),
            group.location_name,
        );
        if !group.location_address.is_empty() {
            text.push_str(&format!("Address: {}\n", group.location_address));
        }
        if let Some(announcement) = &group.announcement {
            text.push_str(&format!("\nFrom the organizer: {announcement}\n"));
        }
        text.push_str("\nSee you there.\n");

        Self {
            subject: format!("Reminder: \"{}\" starts soon", group.title),
            text,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::group::{GroupStatus, JoinPolicy};

    #[test]
    fn reminder_mentions_time_and_place() {
        let start = chrono::Utc.with_ymd_and_hms(2030, 3, 4, 18, 30, 0).unwrap();
        let group = Group {
            id: 1,
            title: "Rust reading".to_string(),
            description: String::new(),
            location_name: "Library".to_string(),
            location_address: "1 Main St".to_string(),
            latitude: None,
            longitude: None,
            start_at: start,
            end_at: start + chrono::Duration::hours(2),
            capacity: 5,
            join_policy: JoinPolicy::Auto,
            status: GroupStatus::Upcoming,
            organizer_id: 1,
            reminder_sent: false,
            announcement: None,
            announcement_at: None,
            announcement_by: None,
            created_at: start,
            updated_at: start,
        };

        let content = ReminderEmailContent::new(&group);
        assert_eq!(content.subject, "Reminder: \"Rust reading\" starts soon");
        assert!(content.text.contains("2030-03-04 18:30 UTC"));
        assert!(content.text.contains("Library"));
        assert!(content.text.contains("Address: 1 Main St"));
    }
}
