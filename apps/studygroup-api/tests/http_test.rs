mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::Duration;
use serde_json::{json, Value};
use studygroup_api::config::Config;

const USER_ID: &str = "x-user-id";
const USER_EMAIL: &str = "x-user-email";

// ===========================================================================
// Helpers
// ===========================================================================

fn test_server(app: &common::TestApp) -> TestServer {
    TestServer::new(app.router()).unwrap()
}

fn group_body(capacity: i32) -> Value {
    let start_at = common::base_time() + Duration::hours(6);
    json!({
        "title": "Organic chemistry review",
        "location_name": "Science hall",
        "start_at": start_at,
        "end_at": start_at + Duration::hours(2),
        "capacity": capacity,
    })
}

async fn create_group(server: &TestServer, organizer: i64) -> i64 {
    let resp = server
        .post("/api/v1/groups")
        .add_header(USER_ID, organizer.to_string())
        .add_header(USER_EMAIL, format!("user{organizer}@example.com"))
        .json(&group_body(2))
        .await;
    resp.assert_status(StatusCode::CREATED);
    resp.json::<Value>()["id"].as_i64().unwrap()
}

// ===========================================================================
// Identity and health
// ===========================================================================

#[tokio::test]
async fn health_is_open() {
    let app = common::test_app();
    let server = test_server(&app);

    let resp = server.get("/health").await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let app = common::test_app();
    let server = test_server(&app);

    let resp = server.post("/api/v1/groups").json(&group_body(2)).await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<Value>()["error"]["code"], "UNAUTHORIZED");

    let resp = server
        .post("/api/v1/groups")
        .add_header(USER_ID, "not-a-number")
        .json(&group_body(2))
        .await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
}

// ===========================================================================
// Groups and membership
// ===========================================================================

#[tokio::test]
async fn create_join_and_list_members() {
    let app = common::test_app();
    let server = test_server(&app);
    let group_id = create_group(&server, 1).await;

    let resp = server
        .post(&format!("/api/v1/groups/{group_id}/members"))
        .add_header(USER_ID, "2")
        .await;
    resp.assert_status(StatusCode::CREATED);
    assert_eq!(resp.json::<Value>()["status"], "approved");

    let resp = server
        .post(&format!("/api/v1/groups/{group_id}/members"))
        .add_header(USER_ID, "3")
        .await;
    resp.assert_status(StatusCode::CREATED);
    assert_eq!(resp.json::<Value>()["status"], "waitlist");

    let resp = server
        .post(&format!("/api/v1/groups/{group_id}/members"))
        .add_header(USER_ID, "3")
        .await;
    resp.assert_status(StatusCode::CONFLICT);
    assert_eq!(resp.json::<Value>()["error"]["code"], "ALREADY_MEMBER");

    let resp = server
        .get(&format!("/api/v1/groups/{group_id}/members"))
        .add_header(USER_ID, "9")
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    let members = body["data"].as_array().unwrap();
    assert_eq!(members.len(), 3);
    assert_eq!(members[0]["role"], "organizer");

    let resp = server
        .get(&format!("/api/v1/groups/{group_id}"))
        .add_header(USER_ID, "9")
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["approved_count"], 2);
    assert_eq!(body["waitlist_count"], 1);
    assert_eq!(body["status"], "upcoming");
}

#[tokio::test]
async fn leaving_reports_the_promoted_member() {
    let app = common::test_app();
    let server = test_server(&app);
    let group_id = create_group(&server, 1).await;
    for id in ["2", "3"] {
        server
            .post(&format!("/api/v1/groups/{group_id}/members"))
            .add_header(USER_ID, id)
            .await
            .assert_status(StatusCode::CREATED);
        app.tick();
    }

    let resp = server
        .delete(&format!("/api/v1/groups/{group_id}/members/me"))
        .add_header(USER_ID, "2")
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["promoted"]["user_id"], 3);
    assert_eq!(body["promoted"]["status"], "approved");

    let resp = server
        .delete(&format!("/api/v1/groups/{group_id}/members/me"))
        .add_header(USER_ID, "1")
        .await;
    resp.assert_status(StatusCode::CONFLICT);
    assert_eq!(
        resp.json::<Value>()["error"]["code"],
        "ORGANIZER_CANNOT_LEAVE"
    );
}

#[tokio::test]
async fn validation_errors_list_fields() {
    let app = common::test_app();
    let server = test_server(&app);

    let resp = server
        .post("/api/v1/groups")
        .add_header(USER_ID, "1")
        .json(&group_body(0))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"][0]["field"], "capacity");
}

#[tokio::test]
async fn lifecycle_and_feedback_over_http() {
    let app = common::test_app();
    let server = test_server(&app);
    let group_id = create_group(&server, 1).await;
    server
        .post(&format!("/api/v1/groups/{group_id}/members"))
        .add_header(USER_ID, "2")
        .await
        .assert_status(StatusCode::CREATED);

    let resp = server
        .post(&format!("/api/v1/groups/{group_id}/start"))
        .add_header(USER_ID, "2")
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    let resp = server
        .post(&format!("/api/v1/groups/{group_id}/start"))
        .add_header(USER_ID, "1")
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["status"], "ongoing");

    server
        .post(&format!("/api/v1/groups/{group_id}/members/2/check-in"))
        .add_header(USER_ID, "1")
        .await
        .assert_status_ok();
    server
        .post(&format!("/api/v1/groups/{group_id}/finish"))
        .add_header(USER_ID, "1")
        .await
        .assert_status_ok();

    let resp = server
        .post(&format!("/api/v1/groups/{group_id}/feedback"))
        .add_header(USER_ID, "2")
        .json(&json!({ "target_id": 1, "rating": 5, "tags": ["prepared"] }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    assert_eq!(resp.json::<Value>()["rating"], 5);

    let resp = server
        .post(&format!("/api/v1/groups/{group_id}/feedback"))
        .add_header(USER_ID, "2")
        .json(&json!({ "target_id": 1, "rating": 4 }))
        .await;
    resp.assert_status(StatusCode::CONFLICT);
    assert_eq!(resp.json::<Value>()["error"]["code"], "DUPLICATE_FEEDBACK");

    let resp = server
        .get(&format!("/api/v1/groups/{group_id}/feedback/mine"))
        .add_header(USER_ID, "2")
        .await;
    resp.assert_status_ok();
    assert_eq!(
        resp.json::<Value>()["data"],
        json!([{ "target_id": 1, "rating": 5 }])
    );

    let resp = server
        .get("/api/v1/users/1/reputation")
        .add_header(USER_ID, "2")
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["score"], 3.91);
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn announcement_can_be_set_and_cleared() {
    let app = common::test_app();
    let server = test_server(&app);
    let group_id = create_group(&server, 1).await;

    let resp = server
        .put(&format!("/api/v1/groups/{group_id}/announcement"))
        .add_header(USER_ID, "1")
        .json(&json!({ "text": "Bring a calculator" }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["announcement"], "Bring a calculator");

    let resp = server
        .put(&format!("/api/v1/groups/{group_id}/announcement"))
        .add_header(USER_ID, "1")
        .json(&json!({ "text": null }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["announcement"], Value::Null);
}

#[tokio::test]
async fn delete_returns_no_content() {
    let app = common::test_app();
    let server = test_server(&app);
    let group_id = create_group(&server, 1).await;

    server
        .delete(&format!("/api/v1/groups/{group_id}"))
        .add_header(USER_ID, "1")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get(&format!("/api/v1/groups/{group_id}"))
        .add_header(USER_ID, "1")
        .await
        .assert_status_not_found();
}

// ===========================================================================
// Throttle and internal endpoints
// ===========================================================================

#[tokio::test]
async fn callers_over_the_limit_get_429() {
    let app = common::test_app_with(Config {
        rate_limit_requests: 3,
        rate_limit_window_secs: 60,
        ..common::test_config()
    });
    let server = test_server(&app);

    for _ in 0..3 {
        server
            .get("/api/v1/groups/1")
            .add_header(USER_ID, "7")
            .await
            .assert_status_not_found();
    }
    let resp = server
        .get("/api/v1/groups/1")
        .add_header(USER_ID, "7")
        .await;
    resp.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.json::<Value>()["error"]["code"], "RATE_LIMITED");

    // Another caller has its own window.
    server
        .get("/api/v1/groups/1")
        .add_header(USER_ID, "8")
        .await
        .assert_status_not_found();

    // The window slides with the clock.
    app.clock.advance(Duration::seconds(61));
    server
        .get("/api/v1/groups/1")
        .add_header(USER_ID, "7")
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn health_is_not_throttled() {
    let app = common::test_app_with(Config {
        rate_limit_requests: 1,
        ..common::test_config()
    });
    let server = test_server(&app);

    for _ in 0..5 {
        server.get("/health").await.assert_status_ok();
    }
}

#[tokio::test]
async fn internal_scan_returns_its_report() {
    let app = common::test_app();
    let server = test_server(&app);
    app.create_group(&common::user(1), 4, "auto", Duration::minutes(120))
        .await;

    let resp = server.post("/internal/reminders/scan").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["candidates"], 1);
    assert_eq!(body["sent"], 1);
    assert_eq!(body["skipped"], false);
    assert_eq!(app.mailer.sent().len(), 1);
}

#[tokio::test]
async fn malformed_email_header_is_not_stored() {
    let app = common::test_app();
    let server = test_server(&app);
    let group_id = create_group(&server, 1).await;

    server
        .post(&format!("/api/v1/groups/{group_id}/members"))
        .add_header(USER_ID, "2")
        .add_header(USER_EMAIL, "bogus")
        .await
        .assert_status(StatusCode::CREATED);
    server
        .post(&format!("/api/v1/groups/{group_id}/members"))
        .add_header(USER_ID, "3")
        .add_header(USER_EMAIL, " user3@example.com ")
        .await
        .assert_status(StatusCode::CREATED);

    assert_eq!(app.user_email(2).await, None);
    assert_eq!(app.user_email(3).await.as_deref(), Some("user3@example.com"));

    app.clock
        .set(common::base_time() + Duration::hours(6) - Duration::minutes(120));
    let resp = server.post("/internal/reminders/scan").await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["sent"], 1);
    assert_eq!(
        app.mailer.sent()[0].to,
        vec!["user1@example.com", "user3@example.com"]
    );
}
