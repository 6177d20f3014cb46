/// Task endpoints
///
/// # Endpoints
///
/// ```text
/// POST   /api/todos              create, 201
/// GET    /api/todos              list with filters and paging
/// GET    /api/todos/:id          fetch one
/// PATCH  /api/todos/:id          partial update
/// DELETE /api/todos/:id          delete, 204
/// POST   /api/todos/:id/toggle   flip completion
/// GET    /api/todos/:id/tags     tags of one task
/// ```
///
/// All endpoints act on the caller's own tasks. An id that is malformed,
/// unknown or owned by someone else answers 404 `TASK_NOT_FOUND`.
///
/// # Example
///
/// ```text
/// POST /api/todos
/// Authorization: Bearer <token>
///
/// {"title": "Write report", "priority": "high", "tags": ["Work"]}
/// ```
///
/// Response (201):
/// ```json
/// {
///   "id": "1f0c...",
///   "user_id": "user-123",
///   "title": "Write report",
///   "description": null,
///   "completed": false,
///   "priority": "high",
///   "tags": ["work"],
///   "created_at": "2025-01-15T10:00:00Z",
///   "updated_at": null
/// }
/// ```

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{no_nul, ValidJson, ValidQuery},
    middleware::auth::AuthUser,
};
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use todo_shared::models::{
    priority::Priority,
    tag::{normalize_tags, Tag, TagWithCount},
    task::{
        NewTask, PriorityFilter, SortField, SortOrder, StatusFilter, Task, TaskChanges, TaskFilter,
        TaskWithTags,
    },
    Pagination,
};
use uuid::Uuid;
use validator::Validate;

/// Create task request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(
        length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"),
        custom(function = "no_nul")
    )]
    pub title: String,

    #[validate(
        length(max = 2000, message = "Description must be at most 2000 characters"),
        custom(function = "no_nul")
    )]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    /// Normalized before storing; at most 20
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Update task request; absent fields stay unchanged
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(
        length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"),
        custom(function = "no_nul")
    )]
    pub title: Option<String>,

    #[validate(
        length(max = 2000, message = "Description must be at most 2000 characters"),
        custom(function = "no_nul")
    )]
    pub description: Option<String>,

    pub completed: Option<bool>,

    pub priority: Option<Priority>,

    /// Replaces the task's tags when present
    pub tags: Option<Vec<String>>,
}

fn default_limit() -> i64 {
    Pagination::DEFAULT_LIMIT
}

/// Query parameters of `GET /api/todos`
#[derive(Debug, Deserialize, Validate)]
pub struct ListTasksQuery {
    #[validate(custom(function = "no_nul"))]
    pub search: Option<String>,

    #[serde(default)]
    pub status: StatusFilter,

    #[serde(default)]
    pub priority: PriorityFilter,

    /// Tags to match, any of them. Filled from every `tags` parameter by
    /// [`tag_params`]; repeated keys cannot go through the struct.
    #[serde(skip)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub no_tags: bool,

    #[serde(default)]
    pub sort: SortField,

    pub order: Option<SortOrder>,

    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[validate(range(min = 0, message = "offset must not be negative"))]
    #[serde(default)]
    pub offset: i64,
}

impl ListTasksQuery {
    fn into_filter(self) -> ApiResult<(TaskFilter, Pagination)> {
        let tags = normalize_tags(&self.tags)?;

        let filter = TaskFilter {
            search: self.search,
            status: self.status,
            priority: self.priority,
            tags,
            no_tags: self.no_tags,
            sort: self.sort,
            order: self.order,
        };

        Ok((filter, Pagination::new(self.limit, self.offset)))
    }
}

/// Tag names from `tags=a&tags=b`, each value also split on commas
fn tag_params(pairs: &[(String, String)]) -> Vec<String> {
    pairs
        .iter()
        .filter(|(key, _)| key == "tags")
        .flat_map(|(_, value)| value.split(','))
        .map(str::to_string)
        .collect()
}

/// Response of `GET /api/todos`
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskWithTags>,

    /// All of the caller's tasks
    pub total: i64,

    /// Tasks matching the filters, across pages
    pub filtered: i64,

    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskTagsResponse {
    pub tags: Vec<TagWithCount>,
}

/// Ids are opaque to clients; anything unparseable simply does not exist
fn parse_task_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::TaskNotFound)
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(req): ValidJson<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskWithTags>)> {
    let tags = normalize_tags(&req.tags)?;

    let mut tx = state.db.begin().await?;
    let task = Task::create(
        &mut tx,
        &user.user_id,
        NewTask {
            title: req.title,
            description: req.description,
            priority: req.priority,
            tags,
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.user_id, task_id = %task.task.id, "Task created");

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidQuery(mut query): ValidQuery<ListTasksQuery>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<TaskListResponse>> {
    query.tags = tag_params(&pairs);
    let (filter, page) = query.into_filter()?;
    tracing::debug!(user_id = %user.user_id, ?filter, limit = page.limit, offset = page.offset, "Listing tasks");

    let mut conn = state.db.acquire().await?;
    let result = Task::list(&mut conn, &user.user_id, &filter, page).await?;

    Ok(Json(TaskListResponse {
        tasks: result.tasks,
        total: result.total,
        filtered: result.filtered,
        limit: page.limit,
        offset: page.offset,
    }))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskWithTags>> {
    let id = parse_task_id(&id)?;

    let mut conn = state.db.acquire().await?;
    let task = Task::get_by_id(&mut conn, &user.user_id, id)
        .await?
        .ok_or(ApiError::TaskNotFound)?;

    Ok(Json(task))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdateTaskRequest>,
) -> ApiResult<Json<TaskWithTags>> {
    let id = parse_task_id(&id)?;
    let tags = req.tags.as_deref().map(normalize_tags).transpose()?;

    let changes = TaskChanges {
        title: req.title,
        description: req.description,
        completed: req.completed,
        priority: req.priority,
        tags,
    };

    let mut tx = state.db.begin().await?;
    let task = Task::update(&mut tx, &user.user_id, id, changes)
        .await?
        .ok_or(ApiError::TaskNotFound)?;
    tx.commit().await?;

    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_task_id(&id)?;

    let mut tx = state.db.begin().await?;
    if !Task::delete(&mut tx, &user.user_id, id).await? {
        return Err(ApiError::TaskNotFound);
    }
    tx.commit().await?;

    tracing::info!(user_id = %user.user_id, task_id = %id, "Task deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskWithTags>> {
    let id = parse_task_id(&id)?;

    let mut tx = state.db.begin().await?;
    let task = Task::toggle_completion(&mut tx, &user.user_id, id)
        .await?
        .ok_or(ApiError::TaskNotFound)?;
    tx.commit().await?;

    Ok(Json(task))
}

pub async fn task_tags(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskTagsResponse>> {
    let id = parse_task_id(&id)?;

    let mut conn = state.db.acquire().await?;
    if !Task::exists(&mut conn, &user.user_id, id).await? {
        return Err(ApiError::TaskNotFound);
    }
    let tags = Tag::for_task(&mut conn, &user.user_id, id).await?;

    Ok(Json(TaskTagsResponse { tags }))
}
