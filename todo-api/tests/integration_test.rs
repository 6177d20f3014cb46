/// End-to-end tests for the Todo API
///
/// These run the full router against PostgreSQL and are skipped when
/// `DATABASE_URL` is not set. Every test works with fresh user ids.
///
/// Covered:
/// - Task lifecycle (create, read, update, toggle, delete)
/// - Ownership isolation between users
/// - Tag creation through tasks, renaming, cleanup and deletion
/// - Listing with filters, sorting and pagination

mod common;

use axum::http::StatusCode;
use common::{unique_user, TestContext};
use serde_json::{json, Value};

macro_rules! require_db {
    () => {
        match TestContext::with_database().await {
            Some(ctx) => ctx,
            None => {
                eprintln!("DATABASE_URL not set, skipping");
                return;
            }
        }
    };
}

async fn create_task(ctx: &TestContext, user: &str, body: Value) -> Value {
    let (status, task) = ctx.call("POST", "/api/todos", Some(user), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {}", task);
    task
}

#[tokio::test]
async fn test_create_task_defaults() {
    let ctx = require_db!();
    let user = unique_user();

    let task = create_task(&ctx, &user, json!({"title": "Test Task"})).await;

    assert_eq!(task["title"], "Test Task");
    assert_eq!(task["user_id"], user.as_str());
    assert_eq!(task["completed"], false);
    assert_eq!(task["priority"], "none");
    assert_eq!(task["tags"], json!([]));
    assert!(task["description"].is_null());
    assert!(task["updated_at"].is_null());
    assert!(task["id"].is_string());
}

#[tokio::test]
async fn test_other_users_task_is_not_found() {
    let ctx = require_db!();
    let owner = unique_user();
    let stranger = unique_user();

    let task = create_task(&ctx, &owner, json!({"title": "Private"})).await;
    let uri = format!("/api/todos/{}", task["id"].as_str().unwrap());

    let (status, body) = ctx.call("GET", &uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TASK_NOT_FOUND");

    let (status, _) = ctx
        .call("PATCH", &uri, Some(&stranger), Some(json!({"title": "Hijacked"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx.call("DELETE", &uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // still intact for the owner
    let (status, body) = ctx.call("GET", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Private");
}

#[tokio::test]
async fn test_update_is_partial() {
    let ctx = require_db!();
    let user = unique_user();

    let task = create_task(
        &ctx,
        &user,
        json!({"title": "Draft", "description": "first pass", "priority": "low"}),
    )
    .await;
    let uri = format!("/api/todos/{}", task["id"].as_str().unwrap());

    let (status, updated) = ctx
        .call("PATCH", &uri, Some(&user), Some(json!({"priority": "high"})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["priority"], "high");
    assert_eq!(updated["title"], "Draft");
    assert_eq!(updated["description"], "first pass");
    assert!(updated["updated_at"].is_string());
}

#[tokio::test]
async fn test_toggle_flips_completion() {
    let ctx = require_db!();
    let user = unique_user();

    let task = create_task(&ctx, &user, json!({"title": "Flip me"})).await;
    let uri = format!("/api/todos/{}/toggle", task["id"].as_str().unwrap());

    let (_, once) = ctx.call("POST", &uri, Some(&user), None).await;
    assert_eq!(once["completed"], true);

    let (_, twice) = ctx.call("POST", &uri, Some(&user), None).await;
    assert_eq!(twice["completed"], false);
}

#[tokio::test]
async fn test_delete_task() {
    let ctx = require_db!();
    let user = unique_user();

    let task = create_task(&ctx, &user, json!({"title": "Short lived", "tags": ["tmp"]})).await;
    let uri = format!("/api/todos/{}", task["id"].as_str().unwrap());

    let (status, body) = ctx.call("DELETE", &uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (status, _) = ctx.call("GET", &uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // the tag survives with no tasks
    let (_, tags) = ctx.call("GET", "/api/tags", Some(&user), None).await;
    assert_eq!(tags["tags"][0]["name"], "tmp");
    assert_eq!(tags["tags"][0]["task_count"], 0);
}

#[tokio::test]
async fn test_tags_are_normalized_and_replaced() {
    let ctx = require_db!();
    let user = unique_user();

    let task = create_task(
        &ctx,
        &user,
        json!({"title": "Tagged", "tags": ["Work", " urgent ", "WORK"]}),
    )
    .await;
    assert_eq!(task["tags"], json!(["urgent", "work"]));

    let uri = format!("/api/todos/{}", task["id"].as_str().unwrap());
    let (_, updated) = ctx
        .call("PATCH", &uri, Some(&user), Some(json!({"tags": ["home"]})))
        .await;
    assert_eq!(updated["tags"], json!(["home"]));

    let (_, task_tags) = ctx.call("GET", &format!("{}/tags", uri), Some(&user), None).await;
    assert_eq!(task_tags["tags"].as_array().unwrap().len(), 1);
    assert_eq!(task_tags["tags"][0]["name"], "home");

    // replaced tags stay behind until cleanup
    let (_, cleanup) = ctx.call("POST", "/api/tags/cleanup", Some(&user), None).await;
    assert_eq!(cleanup["deleted"], 2);

    let (_, tags) = ctx.call("GET", "/api/tags", Some(&user), None).await;
    assert_eq!(tags["tags"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_tag_is_rejected() {
    let ctx = require_db!();
    let user = unique_user();

    let (status, tag) = ctx
        .call("POST", "/api/tags", Some(&user), Some(json!({"name": "Errands"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tag["name"], "errands");
    assert_eq!(tag["task_count"], 0);

    let (status, body) = ctx
        .call("POST", "/api/tags", Some(&user), Some(json!({"name": "errands"})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"][0]["field"], "name");

    // the same name is fine for someone else
    let (status, _) = ctx
        .call("POST", "/api/tags", Some(&unique_user()), Some(json!({"name": "errands"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_rename_tag() {
    let ctx = require_db!();
    let user = unique_user();

    create_task(&ctx, &user, json!({"title": "Pay rent", "tags": ["bills", "home"]})).await;

    let (_, tags) = ctx.call("GET", "/api/tags", Some(&user), None).await;
    let bills_id = tags["tags"][0]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/tags/{}", bills_id);

    let (status, renamed) = ctx
        .call("PATCH", &uri, Some(&user), Some(json!({"name": "Finance"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "finance");
    assert_eq!(renamed["task_count"], 1);

    let (status, body) = ctx
        .call("PATCH", &uri, Some(&user), Some(json!({"name": "home"})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"][0]["field"], "name");

    let (status, _) = ctx
        .call("PATCH", &uri, Some(&unique_user()), Some(json!({"name": "stolen"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_tag_keeps_tasks() {
    let ctx = require_db!();
    let user = unique_user();

    let task = create_task(&ctx, &user, json!({"title": "Gym", "tags": ["health"]})).await;

    let (_, tags) = ctx.call("GET", "/api/tags", Some(&user), None).await;
    let tag_uri = format!("/api/tags/{}", tags["tags"][0]["id"].as_str().unwrap());

    let (status, _) = ctx.call("DELETE", &tag_uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = ctx.call("GET", &tag_uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let task_uri = format!("/api/todos/{}", task["id"].as_str().unwrap());
    let (status, body) = ctx.call("GET", &task_uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tags"], json!([]));
}

#[tokio::test]
async fn test_list_filters_and_counts() {
    let ctx = require_db!();
    let user = unique_user();

    create_task(&ctx, &user, json!({"title": "Buy milk", "tags": ["home"]})).await;
    create_task(&ctx, &user, json!({"title": "Write report", "priority": "high", "tags": ["work"]})).await;
    let taxes = create_task(&ctx, &user, json!({"title": "File taxes", "priority": "medium"})).await;
    ctx.call(
        "POST",
        &format!("/api/todos/{}/toggle", taxes["id"].as_str().unwrap()),
        Some(&user),
        None,
    )
    .await;

    // someone else's task never shows up
    create_task(&ctx, &unique_user(), json!({"title": "Buy milk"})).await;

    let (status, page) = ctx.call("GET", "/api/todos", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["filtered"], 3);
    assert_eq!(page["limit"], 50);
    assert_eq!(page["offset"], 0);

    let (_, page) = ctx.call("GET", "/api/todos?status=pending", Some(&user), None).await;
    assert_eq!(page["filtered"], 2);
    assert_eq!(page["total"], 3);

    let (_, page) = ctx.call("GET", "/api/todos?search=MILK", Some(&user), None).await;
    assert_eq!(page["filtered"], 1);
    assert_eq!(page["tasks"][0]["title"], "Buy milk");

    let (_, page) = ctx.call("GET", "/api/todos?tags=work,home", Some(&user), None).await;
    assert_eq!(page["filtered"], 2);

    let (status, page) = ctx.call("GET", "/api/todos/?tags=work&tags=home", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["filtered"], 2);

    let (_, page) = ctx.call("GET", "/api/todos?no_tags=true", Some(&user), None).await;
    assert_eq!(page["filtered"], 1);
    assert_eq!(page["tasks"][0]["title"], "File taxes");

    let (_, page) = ctx.call("GET", "/api/todos?priority=high", Some(&user), None).await;
    assert_eq!(page["tasks"][0]["title"], "Write report");

    let (_, page) = ctx.call("GET", "/api/todos?sort=priority", Some(&user), None).await;
    let titles: Vec<&str> = page["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Write report", "File taxes", "Buy milk"]);

    let (_, page) = ctx
        .call("GET", "/api/todos?sort=title&order=asc&limit=2&offset=1", Some(&user), None)
        .await;
    assert_eq!(page["filtered"], 3);
    let titles: Vec<&str> = page["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["File taxes", "Write report"]);
}

#[tokio::test]
async fn test_tag_list_reports_paging() {
    let ctx = require_db!();
    let user = unique_user();

    create_task(&ctx, &user, json!({"title": "Errands", "tags": ["home", "shop", "car"]})).await;

    let (status, page) = ctx.call("GET", "/api/tags?limit=2", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["offset"], 0);
    assert_eq!(page["tags"].as_array().unwrap().len(), 2);

    let (_, page) = ctx.call("GET", "/api/tags/?limit=2&offset=2", Some(&user), None).await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["tags"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_padded_tag_name_is_trimmed() {
    let ctx = require_db!();
    let user = unique_user();

    let padded = format!("  {}  ", "A".repeat(50));
    let (status, tag) = ctx
        .call("POST", "/api/tags", Some(&user), Some(json!({"name": padded})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tag["name"], "a".repeat(50));
}
