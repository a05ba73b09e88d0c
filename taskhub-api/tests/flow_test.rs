/// End-to-end flows against a real database
///
/// Run with a disposable database:
///
/// ```bash
/// DATABASE_URL=postgresql://localhost/taskhub_test cargo test -p taskhub-api -- --ignored
/// ```

mod common;

use axum::http::StatusCode;
use common::{TestContext, TEST_PASSWORD};
use serde_json::{json, Value};
use taskhub_shared::models::user::UserRole;

async fn create_task(ctx: &TestContext, token: &str, title: &str) -> Value {
    let (status, body) = ctx
        .json("POST", "/api/tasks", Some(token), Some(json!({ "title": title, "priority": "high" })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"].clone()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_register_login_refresh() {
    let ctx = TestContext::connected().await.unwrap();
    let username = format!("reg_{}", &uuid::Uuid::new_v4().simple().to_string()[..10]);

    let (status, body) = ctx
        .json(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": username, "email": format!("{username}@example.com"), "password": TEST_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body["data"]["user"].get("password_hash").is_none());

    let (status, body) = ctx
        .json("POST", "/api/auth/login", None, Some(json!({ "username": username, "password": TEST_PASSWORD })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let refresh = body["data"]["refresh_token"].as_str().unwrap().to_string();

    let (status, _) = ctx
        .json("POST", "/api/auth/login", None, Some(json!({ "username": username, "password": "Wr0ng!Password" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = ctx
        .json("POST", "/api/auth/refresh", None, Some(json!({ "refresh_token": refresh })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["access_token"].is_string());

    // Duplicate username
    let (status, _) = ctx
        .json(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": username, "email": "other@example.com", "password": TEST_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_timer_lifecycle() {
    let ctx = TestContext::connected().await.unwrap();
    let (_, token) = ctx.create_user(UserRole::User).await.unwrap();
    let task = create_task(&ctx, &token, "Timed work").await;
    let start = json!({ "task_id": task["id"] });

    let (status, body) = ctx.json("POST", "/api/time-tracking/start", Some(&token), Some(start.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["state"], "running");
    let entry_id = body["data"]["id"].clone();

    // Only one open timer per user
    let (status, _) = ctx.json("POST", "/api/time-tracking/start", Some(&token), Some(start)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = ctx.json("POST", "/api/time-tracking/pause", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "paused");

    let (status, _) = ctx.json("POST", "/api/time-tracking/pause", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx.json("POST", "/api/time-tracking/resume", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = ctx.json("POST", "/api/time-tracking/resume", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = ctx.json("GET", "/api/time-tracking/active", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], entry_id);

    let (status, body) = ctx.json("POST", "/api/time-tracking/stop", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "stopped");
    assert!(body["data"]["duration_seconds"].as_i64().unwrap() >= 0);

    // Nothing open any more
    let (status, _) = ctx.json("POST", "/api/time-tracking/stop", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx
        .json("POST", "/api/time-tracking/stop", Some(&token), Some(json!({ "entry_id": entry_id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = ctx.json("GET", "/api/time-tracking/active", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_null());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_stopping_someone_elses_entry_is_forbidden() {
    let ctx = TestContext::connected().await.unwrap();
    let (_, owner) = ctx.create_user(UserRole::User).await.unwrap();
    let (_, other) = ctx.create_user(UserRole::User).await.unwrap();
    let task = create_task(&ctx, &owner, "Private work").await;

    let (_, body) = ctx
        .json("POST", "/api/time-tracking/start", Some(&owner), Some(json!({ "task_id": task["id"] })))
        .await;
    let entry_id = body["data"]["id"].clone();

    let (status, _) = ctx
        .json("POST", "/api/time-tracking/stop", Some(&other), Some(json!({ "entry_id": entry_id })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .json("POST", "/api/time-tracking/stop", Some(&owner), Some(json!({ "entry_id": entry_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_manual_entries_and_running_entry_guard() {
    let ctx = TestContext::connected().await.unwrap();
    let (_, token) = ctx.create_user(UserRole::User).await.unwrap();
    let task = create_task(&ctx, &token, "Logged work").await;

    let (status, body) = ctx
        .json(
            "POST",
            "/api/time",
            Some(&token),
            Some(json!({ "task_id": task["id"], "date": "2025-03-10", "duration_seconds": 5400 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["is_manual"], true);
    assert_eq!(body["data"]["start_time"], "2025-03-10T00:00:00Z");
    let manual_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = ctx
        .json("PUT", &format!("/api/time/{manual_id}"), Some(&token), Some(json!({ "duration_seconds": 3600 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["duration_seconds"], 3600);

    let (_, body) = ctx
        .json("POST", "/api/time-tracking/start", Some(&token), Some(json!({ "task_id": task["id"] })))
        .await;
    let running_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = ctx.json("DELETE", &format!("/api/time/{running_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = ctx.json("GET", "/api/time?from=2025-03-10&to=2025-03-10", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);

    let (status, _) = ctx.json("DELETE", &format!("/api/time/{manual_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_pagination_is_clamped() {
    let ctx = TestContext::connected().await.unwrap();
    let (_, token) = ctx.create_user(UserRole::User).await.unwrap();

    let (status, body) = ctx.json("GET", "/api/tasks?per_page=1000", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["per_page"], 100);

    let (_, body) = ctx.json("GET", "/api/tasks?per_page=0&page=-3", Some(&token), None).await;
    assert_eq!(body["pagination"]["per_page"], 1);
    assert_eq!(body["pagination"]["page"], 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_global_tags_are_admin_only() {
    let ctx = TestContext::connected().await.unwrap();
    let (_, admin) = ctx.create_user(UserRole::Admin).await.unwrap();
    let (_, user) = ctx.create_user(UserRole::User).await.unwrap();
    let name = format!("release-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);

    let (status, body) = ctx
        .json("POST", "/api/tags", Some(&admin), Some(json!({ "name": name, "is_global": true })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["color"], "#6B7280");
    let tag_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = ctx
        .json("PUT", &format!("/api/tags/{tag_id}"), Some(&user), Some(json!({ "color": "#000000" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx.json("DELETE", &format!("/api/tags/{tag_id}"), Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Global tags can be put on any task the caller can edit
    let task = create_task(&ctx, &user, "Tagged").await;
    let task_id = task["id"].as_str().unwrap();
    let (status, _) = ctx
        .json("POST", &format!("/api/tasks/{task_id}/tags/{tag_id}"), Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = ctx.json("DELETE", &format!("/api/tags/{tag_id}"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_completing_a_task_stamps_completion() {
    let ctx = TestContext::connected().await.unwrap();
    let (_, token) = ctx.create_user(UserRole::User).await.unwrap();
    let task = create_task(&ctx, &token, "Finish me").await;
    let uri = format!("/api/tasks/{}", task["id"].as_str().unwrap());

    let (status, body) = ctx.json("PUT", &uri, Some(&token), Some(json!({ "status": "completed" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["progress"], 100);
    assert!(body["data"]["completed_at"].is_string());

    let (_, body) = ctx.json("PUT", &uri, Some(&token), Some(json!({ "status": "in_progress" }))).await;
    assert!(body["data"]["completed_at"].is_null());

    let (status, body) = ctx.json("GET", "/api/dashboard", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tasks"]["in_progress"], 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_deleting_a_task_removes_its_files() {
    use axum::{body::Body, http::{header, Request}};

    let ctx = TestContext::connected().await.unwrap();
    let (_, token) = ctx.create_user(UserRole::User).await.unwrap();
    let task = create_task(&ctx, &token, "With files").await;
    let task_id = task["id"].as_str().unwrap();

    let boundary = "taskhub-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\nmeeting notes\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/tasks/{task_id}/attachments"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();
    let response = ctx.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let uploaded = common::read_json(response).await;
    let url = uploaded["data"]["url"].as_str().unwrap();
    let relative = url.trim_start_matches("/uploads/");
    let path = ctx.state.config.upload.dir.join(relative);
    assert!(path.exists());

    let (status, _) = ctx.json("DELETE", &format!("/api/tasks/{task_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!path.exists());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_editing_description_keeps_stopped_interval() {
    let ctx = TestContext::connected().await.unwrap();
    let (_, token) = ctx.create_user(UserRole::User).await.unwrap();
    let task = create_task(&ctx, &token, "Paused work").await;

    let (_, body) = ctx
        .json("POST", "/api/time-tracking/start", Some(&token), Some(json!({ "task_id": task["id"] })))
        .await;
    let entry_id = body["data"]["id"].as_str().unwrap().to_string();
    ctx.json("POST", "/api/time-tracking/pause", Some(&token), None).await;
    ctx.json("POST", "/api/time-tracking/resume", Some(&token), None).await;
    let (_, stopped) = ctx.json("POST", "/api/time-tracking/stop", Some(&token), None).await;

    let (status, edited) = ctx
        .json("PUT", &format!("/api/time/{entry_id}"), Some(&token), Some(json!({ "description": "standup" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["data"]["description"], "standup");
    assert_eq!(edited["data"]["end_time"], stopped["data"]["end_time"]);
    assert_eq!(edited["data"]["paused_seconds"], stopped["data"]["paused_seconds"]);
}
