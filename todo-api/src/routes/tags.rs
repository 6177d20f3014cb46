/// Tag endpoints
///
/// Tags are per-user labels. Names are stored lowercase and unique per user;
/// tags are also created implicitly when a task names them.
///
/// ```text
/// GET    /api/tags            list with task counts
/// POST   /api/tags            create, 201
/// POST   /api/tags/cleanup    delete tags no task uses
/// GET    /api/tags/:id        fetch one
/// PATCH  /api/tags/:id        rename
/// DELETE /api/tags/:id        delete, 204; tasks keep existing
/// ```

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ValidJson, ValidQuery},
    middleware::auth::AuthUser,
};
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use todo_shared::models::{
    tag::{normalize_tag_name, Tag, TagWithCount},
    Pagination,
};
use uuid::Uuid;
use validator::Validate;

/// Create or rename request
///
/// The name is checked after normalization by [`tag_name`], so surrounding
/// whitespace does not count against the length limit.
#[derive(Debug, Deserialize, Validate)]
pub struct TagNameRequest {
    pub name: String,
}

fn default_limit() -> i64 {
    Pagination::DEFAULT_LIMIT
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListTagsQuery {
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[validate(range(min = 0, message = "offset must not be negative"))]
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TagListResponse {
    pub tags: Vec<TagWithCount>,

    /// All of the caller's tags, across pages
    pub total: i64,

    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    /// Number of tags removed
    pub deleted: u64,
}

fn parse_tag_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::TagNotFound)
}

fn tag_name(raw: &str) -> ApiResult<String> {
    normalize_tag_name(raw).map_err(|e| ApiError::invalid("name", e.to_string()))
}

pub async fn list_tags(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidQuery(query): ValidQuery<ListTagsQuery>,
) -> ApiResult<Json<TagListResponse>> {
    let page = Pagination::new(query.limit, query.offset);

    let mut conn = state.db.acquire().await?;
    let tags = Tag::list(&mut conn, &user.user_id, page.limit, page.offset).await?;
    let total = Tag::count_for_user(&mut conn, &user.user_id).await?;

    Ok(Json(TagListResponse {
        tags,
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}

pub async fn create_tag(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(req): ValidJson<TagNameRequest>,
) -> ApiResult<(StatusCode, Json<TagWithCount>)> {
    let name = tag_name(&req.name)?;

    let mut tx = state.db.begin().await?;
    let tag = Tag::create(&mut tx, &user.user_id, &name)
        .await?
        .ok_or_else(|| ApiError::invalid("name", format!("Tag '{}' already exists", name)))?;
    tx.commit().await?;

    tracing::debug!(user_id = %user.user_id, tag = %tag.name, "Tag created");

    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn get_tag(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<TagWithCount>> {
    let id = parse_tag_id(&id)?;

    let mut conn = state.db.acquire().await?;
    let tag = Tag::get_by_id(&mut conn, &user.user_id, id)
        .await?
        .ok_or(ApiError::TagNotFound)?;

    Ok(Json(tag))
}

/// Renaming onto an existing name is a 422 on `name`, raised by the
/// uniqueness constraint
pub async fn rename_tag(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<TagNameRequest>,
) -> ApiResult<Json<TagWithCount>> {
    let id = parse_tag_id(&id)?;
    let name = tag_name(&req.name)?;

    let mut tx = state.db.begin().await?;
    let tag = Tag::rename(&mut tx, &user.user_id, id, &name)
        .await?
        .ok_or(ApiError::TagNotFound)?;
    tx.commit().await?;

    Ok(Json(tag))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_tag_id(&id)?;

    let mut tx = state.db.begin().await?;
    if !Tag::delete(&mut tx, &user.user_id, id).await? {
        return Err(ApiError::TagNotFound);
    }
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn cleanup_tags(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<CleanupResponse>> {
    let mut tx = state.db.begin().await?;
    let deleted = Tag::cleanup_orphans(&mut tx, &user.user_id).await?;
    tx.commit().await?;

    if deleted > 0 {
        tracing::info!(user_id = %user.user_id, deleted, "Removed unused tags");
    }

    Ok(Json(CleanupResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_name_normalizes() {
        assert_eq!(tag_name("  Work ").unwrap(), "work");
    }

    #[test]
    fn test_tag_name_rejects_inner_whitespace() {
        match tag_name("two words") {
            Err(ApiError::Validation(details)) => assert_eq!(details[0].field, "name"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_padding_does_not_count_toward_length() {
        let padded = format!(" {} ", "a".repeat(50));
        let req: TagNameRequest = serde_json::from_value(serde_json::json!({ "name": padded })).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(tag_name(&req.name).unwrap(), "a".repeat(50));

        assert!(tag_name(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_tag_name_rejects_nul() {
        assert!(matches!(tag_name("a\0b"), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_parse_tag_id() {
        assert!(matches!(parse_tag_id("42"), Err(ApiError::TagNotFound)));
    }

    #[test]
    fn test_list_query_defaults() {
        let query: ListTagsQuery = serde_json::from_str("{}").unwrap();
        assert!(query.validate().is_ok());
        assert_eq!(query.limit, 50);
    }
}
