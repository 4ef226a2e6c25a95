mod common;

use chrono::Duration;
use studygroup_api::error::ErrorKind;
use studygroup_api::models::group_member::{MemberRole, MemberStatus};
use studygroup_api::notify::NotificationKind;
use studygroup_api::services::{groups, lifecycle, membership};

use common::user;

#[tokio::test]
async fn creating_a_group_seats_the_organizer() {
    let app = common::test_app();
    let organizer = user(1);

    let detail = app
        .create_group(&organizer, 3, "auto", Duration::hours(5))
        .await;
    assert_eq!(detail.approved_count, 1);

    let members = groups::list_members(&app.state, detail.group.id)
        .await
        .unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, 1);
    assert_eq!(members[0].role, MemberRole::Organizer);
    assert_eq!(members[0].status, MemberStatus::Approved);
}

#[tokio::test]
async fn waitlisted_member_is_promoted_when_a_seat_frees_up() {
    let app = common::test_app();
    let organizer = user(1);
    // The organizer holds one of the two seats.
    let group_id = app
        .create_group(&organizer, 2, "auto", Duration::hours(5))
        .await
        .group
        .id;

    let a = app.join(group_id, &user(2)).await;
    let b = app.join(group_id, &user(3)).await;
    assert_eq!(a.status, MemberStatus::Approved);
    assert_eq!(b.status, MemberStatus::Waitlist);

    let outcome = membership::leave(&app.state, &user(2), group_id)
        .await
        .unwrap();
    assert_eq!(outcome.promoted.map(|m| m.user_id), Some(3));

    let detail = groups::get_group(&app.state, group_id).await.unwrap();
    assert_eq!(detail.approved_count, 2);
    assert_eq!(detail.waitlist_count, 0);
    assert_eq!(
        app.member(group_id, 3).await.unwrap().status,
        MemberStatus::Approved
    );
    assert!(app.member(group_id, 2).await.is_none());
    assert_eq!(
        app.notifier.kinds_for(3),
        vec![NotificationKind::WaitlistPromoted]
    );
}

#[tokio::test]
async fn promotion_is_first_in_first_out() {
    let app = common::test_app();
    let organizer = user(1);
    let group_id = app
        .create_group(&organizer, 2, "auto", Duration::hours(5))
        .await
        .group
        .id;

    app.join(group_id, &user(2)).await;
    // Higher user id joins first so ordering cannot come from the id.
    assert_eq!(app.join(group_id, &user(9)).await.status, MemberStatus::Waitlist);
    assert_eq!(app.join(group_id, &user(4)).await.status, MemberStatus::Waitlist);

    let outcome = membership::leave(&app.state, &user(2), group_id)
        .await
        .unwrap();
    assert_eq!(outcome.promoted.map(|m| m.user_id), Some(9));
    assert_eq!(
        app.member(group_id, 4).await.unwrap().status,
        MemberStatus::Waitlist
    );
}

#[tokio::test]
async fn one_leave_promotes_one_member() {
    let app = common::test_app();
    let organizer = user(1);
    let group_id = app
        .create_group(&organizer, 2, "auto", Duration::hours(5))
        .await
        .group
        .id;
    app.join(group_id, &user(2)).await;
    app.join(group_id, &user(3)).await;
    app.join(group_id, &user(4)).await;

    membership::leave(&app.state, &user(2), group_id)
        .await
        .unwrap();

    let detail = groups::get_group(&app.state, group_id).await.unwrap();
    assert_eq!(detail.approved_count, 2);
    assert_eq!(detail.waitlist_count, 1);
}

#[tokio::test]
async fn leaving_from_the_waitlist_promotes_nobody() {
    let app = common::test_app();
    let organizer = user(1);
    let group_id = app
        .create_group(&organizer, 2, "auto", Duration::hours(5))
        .await
        .group
        .id;
    app.join(group_id, &user(2)).await;
    app.join(group_id, &user(3)).await;
    app.join(group_id, &user(4)).await;

    let outcome = membership::leave(&app.state, &user(3), group_id)
        .await
        .unwrap();
    assert!(outcome.promoted.is_none());
    assert_eq!(
        app.member(group_id, 4).await.unwrap().status,
        MemberStatus::Waitlist
    );
}

#[tokio::test]
async fn approval_policy_creates_pending_and_notifies_organizer() {
    let app = common::test_app();
    let organizer = user(1);
    let group_id = app
        .create_group(&organizer, 5, "approval", Duration::hours(5))
        .await
        .group
        .id;

    let member = app.join(group_id, &user(2)).await;
    assert_eq!(member.status, MemberStatus::Pending);
    assert_eq!(
        app.notifier.kinds_for(1),
        vec![NotificationKind::JoinRequested]
    );

    let approved = membership::approve(&app.state, &organizer, group_id, 2)
        .await
        .unwrap();
    assert_eq!(approved.status, MemberStatus::Approved);
    assert_eq!(
        app.notifier.kinds_for(2),
        vec![NotificationKind::MembershipApproved]
    );

    // Approving again changes nothing and sends nothing.
    membership::approve(&app.state, &organizer, group_id, 2)
        .await
        .unwrap();
    assert_eq!(app.notifier.kinds_for(2).len(), 1);
}

#[tokio::test]
async fn only_the_organizer_can_approve() {
    let app = common::test_app();
    let organizer = user(1);
    let group_id = app
        .create_group(&organizer, 5, "approval", Duration::hours(5))
        .await
        .group
        .id;
    app.join(group_id, &user(2)).await;

    let err = membership::approve(&app.state, &user(2), group_id, 2)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Forbidden);
}

#[tokio::test]
async fn approve_fails_when_the_group_is_full() {
    let app = common::test_app();
    let organizer = user(1);
    let group_id = app
        .create_group(&organizer, 1, "approval", Duration::hours(5))
        .await
        .group
        .id;

    // The organizer already fills the only seat.
    let member = app.join(group_id, &user(2)).await;
    assert_eq!(member.status, MemberStatus::Waitlist);

    let err = membership::approve(&app.state, &organizer, group_id, 2)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::GroupFull);
    assert_eq!(
        app.member(group_id, 2).await.unwrap().status,
        MemberStatus::Waitlist
    );
}

#[tokio::test]
async fn joining_twice_is_rejected() {
    let app = common::test_app();
    let organizer = user(1);
    let group_id = app
        .create_group(&organizer, 5, "auto", Duration::hours(5))
        .await
        .group
        .id;
    app.join(group_id, &user(2)).await;

    let err = membership::join(&app.state, &user(2), group_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyMember);

    let err = membership::join(&app.state, &organizer, group_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyMember);
}

#[tokio::test]
async fn join_requires_an_upcoming_group() {
    let app = common::test_app();
    let organizer = user(1);
    let group_id = app
        .create_group(&organizer, 5, "auto", Duration::hours(5))
        .await
        .group
        .id;
    lifecycle::cancel(&app.state, &organizer, group_id)
        .await
        .unwrap();

    let err = membership::join(&app.state, &user(2), group_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::WrongStatus);

    let err = membership::join(&app.state, &user(2), 999)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn organizer_cannot_leave_and_strangers_are_not_found() {
    let app = common::test_app();
    let organizer = user(1);
    let group_id = app
        .create_group(&organizer, 5, "auto", Duration::hours(5))
        .await
        .group
        .id;

    let err = membership::leave(&app.state, &organizer, group_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::OrganizerCannotLeave);

    let err = membership::leave(&app.state, &user(7), group_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn capacity_holds_under_concurrent_joins() {
    let app = common::test_app();
    let organizer = user(1);
    let group_id = app
        .create_group(&organizer, 4, "auto", Duration::hours(5))
        .await
        .group
        .id;

    let joins = (2..=20).map(|id| {
        let state = app.state.clone();
        tokio::spawn(async move { membership::join(&state, &user(id), group_id).await })
    });
    for handle in joins {
        handle.await.unwrap().unwrap();
    }

    let detail = groups::get_group(&app.state, group_id).await.unwrap();
    assert_eq!(detail.approved_count, 4);
    assert_eq!(detail.waitlist_count, 16);
}

#[tokio::test]
async fn transient_store_failures_are_retried() {
    let app = common::test_app();
    let organizer = user(1);
    let group_id = app
        .create_group(&organizer, 5, "auto", Duration::hours(5))
        .await
        .group
        .id;

    app.store.fail_next_begins(2);
    let member = membership::join(&app.state, &user(2), group_id)
        .await
        .unwrap();
    assert_eq!(member.status, MemberStatus::Approved);

    // Default policy allows three attempts.
    app.store.fail_next_begins(3);
    let err = membership::join(&app.state, &user(3), group_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unavailable);
    assert!(app.member(group_id, 3).await.is_none());
}
