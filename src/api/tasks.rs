use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use serde_json::{Map, Value, json};

use crate::api::{error, success};
use crate::db::TaskRepository;
use crate::error::AppError;
use crate::models::Task;
use crate::models::task::{CREATE_RULES, UPDATE_RULES};
use crate::router::RequestContext;
use crate::validation::validate;

/// Columns a request body may set; everything else is server-generated.
const WRITABLE_FIELDS: &[&str] = &[
    "title",
    "description",
    "category_id",
    "priority",
    "status",
    "due_date",
];

/// Columns an explicit JSON null clears.
const NULLABLE_FIELDS: &[&str] = &["description", "category_id", "due_date"];

/// GET /api/tasks — paginated listing, filterable by status, priority and
/// category.
pub async fn index(ctx: RequestContext) -> Response {
    let page = ctx
        .query_param("page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1);
    let per_page = ctx
        .query_param("per_page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(10);

    let mut filters = Vec::new();
    if let Some(status) = non_empty(ctx.query_param("status")) {
        filters.push(("status", json!(status)));
    }
    if let Some(priority) = non_empty(ctx.query_param("priority")) {
        filters.push(("priority", json!(priority)));
    }
    if let Some(category_id) = non_empty(ctx.query_param("category_id")) {
        if let Ok(id) = category_id.parse::<i64>() {
            filters.push(("category_id", json!(id)));
        }
    }

    let repository = TaskRepository::new(ctx.state.db.clone());
    let (tasks, pagination) = repository.paginated(page, per_page, filters).await;

    success(
        json!({ "tasks": tasks, "pagination": pagination }),
        "Success",
        StatusCode::OK,
    )
}

/// GET /api/tasks/{id}
pub async fn show(ctx: RequestContext) -> Result<Response, AppError> {
    let id = ctx.params.id()?;

    match Task::find(&ctx.state.db, id).await {
        Some(task) => Ok(success(task, "Success", StatusCode::OK)),
        None => Ok(error("Task not found", None, StatusCode::NOT_FOUND)),
    }
}

/// POST /api/tasks
pub async fn store(ctx: RequestContext) -> Result<Response, AppError> {
    let data = ctx.json_body()?;

    let errors = validate(&data, CREATE_RULES);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let repository = TaskRepository::new(ctx.state.db.clone());
    let record = writable_fields(&data);

    let Some(id) = repository.repo().create(&record).await else {
        return Ok(error(
            "Failed to create task",
            None,
            StatusCode::INTERNAL_SERVER_ERROR,
        ));
    };

    repository
        .log_activity(id, "create", "Task created via API")
        .await;

    let task = Task::find(&ctx.state.db, id)
        .await
        .ok_or(AppError::InternalServerError)?;
    Ok(success(task, "Task created successfully", StatusCode::CREATED))
}

/// PUT /api/tasks/{id} — partial update; omitted fields stay untouched. The
/// transition into `completed` stamps `completed_at` exactly once, so a
/// repeated identical PUT is idempotent.
pub async fn update(ctx: RequestContext) -> Result<Response, AppError> {
    let id = ctx.params.id()?;

    let Some(current) = Task::find(&ctx.state.db, id).await else {
        return Ok(error("Task not found", None, StatusCode::NOT_FOUND));
    };

    let data = ctx.json_body()?;
    let errors = validate(&data, UPDATE_RULES);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let mut record = writable_fields(&data);
    if record.get("status").and_then(Value::as_str) == Some("completed")
        && current.status != "completed"
    {
        record.insert("completed_at".to_string(), json!(now_timestamp()));
    }
    record.insert("updated_at".to_string(), json!(now_timestamp()));

    let repository = TaskRepository::new(ctx.state.db.clone());
    if !repository.repo().update(id, &record).await {
        return Ok(error(
            "Failed to update task",
            None,
            StatusCode::INTERNAL_SERVER_ERROR,
        ));
    }

    repository
        .log_activity(id, "update", "Task updated via API")
        .await;

    let task = Task::find(&ctx.state.db, id)
        .await
        .ok_or(AppError::InternalServerError)?;
    Ok(success(task, "Task updated successfully", StatusCode::OK))
}

/// DELETE /api/tasks/{id} — soft delete.
pub async fn destroy(ctx: RequestContext) -> Result<Response, AppError> {
    let id = ctx.params.id()?;

    let repository = TaskRepository::new(ctx.state.db.clone());
    if Task::find(&ctx.state.db, id).await.is_none() {
        return Ok(error("Task not found", None, StatusCode::NOT_FOUND));
    }

    if !repository.repo().delete(id).await {
        return Ok(error(
            "Failed to delete task",
            None,
            StatusCode::INTERNAL_SERVER_ERROR,
        ));
    }

    repository
        .log_activity(id, "delete", "Task deleted via API")
        .await;

    Ok(success(Value::Null, "Task deleted successfully", StatusCode::OK))
}

/// POST /api/tasks/{id}/complete
pub async fn complete(ctx: RequestContext) -> Result<Response, AppError> {
    let id = ctx.params.id()?;

    let Some(current) = Task::find(&ctx.state.db, id).await else {
        return Ok(error("Task not found", None, StatusCode::NOT_FOUND));
    };

    let mut record = Map::new();
    record.insert("status".to_string(), json!("completed"));
    if current.status != "completed" {
        record.insert("completed_at".to_string(), json!(now_timestamp()));
    }
    record.insert("updated_at".to_string(), json!(now_timestamp()));

    let repository = TaskRepository::new(ctx.state.db.clone());
    if !repository.repo().update(id, &record).await {
        return Ok(error(
            "Failed to mark task as completed",
            None,
            StatusCode::INTERNAL_SERVER_ERROR,
        ));
    }

    repository
        .log_activity(id, "complete", "Task marked as completed via API")
        .await;

    let task = Task::find(&ctx.state.db, id)
        .await
        .ok_or(AppError::InternalServerError)?;
    Ok(success(task, "Task marked as completed", StatusCode::OK))
}

/// GET /api/tasks/stats
pub async fn stats(ctx: RequestContext) -> Response {
    let repository = TaskRepository::new(ctx.state.db.clone());
    success(repository.statistics().await, "Success", StatusCode::OK)
}

/// GET /api/tasks/overdue
pub async fn overdue(ctx: RequestContext) -> Response {
    let repository = TaskRepository::new(ctx.state.db.clone());
    success(repository.find_overdue().await, "Success", StatusCode::OK)
}

/// GET /api/tasks/today
pub async fn today(ctx: RequestContext) -> Response {
    let repository = TaskRepository::new(ctx.state.db.clone());
    success(repository.find_due_today().await, "Success", StatusCode::OK)
}

/// GET /api/tasks/upcoming?days=N
pub async fn upcoming(ctx: RequestContext) -> Response {
    let days = ctx
        .query_param("days")
        .and_then(|d| d.parse().ok())
        .unwrap_or(7);

    let repository = TaskRepository::new(ctx.state.db.clone());
    success(repository.find_upcoming(days).await, "Success", StatusCode::OK)
}

/// GET /api/tasks/search?q=keyword
pub async fn search(ctx: RequestContext) -> Response {
    let Some(keyword) = non_empty(ctx.query_param("q")) else {
        return error("Search keyword is required", None, StatusCode::BAD_REQUEST);
    };

    let repository = TaskRepository::new(ctx.state.db.clone());
    success(repository.search(keyword).await, "Success", StatusCode::OK)
}

fn non_empty(param: Option<&str>) -> Option<&str> {
    param.filter(|value| !value.is_empty())
}

/// Copies the writable columns out of a request body. Omitted fields stay
/// untouched; an explicit null clears a nullable column and is dropped
/// elsewhere. A numeric-string category id is normalized to an integer.
fn writable_fields(data: &Map<String, Value>) -> Map<String, Value> {
    let mut record = Map::new();

    for field in WRITABLE_FIELDS {
        let Some(value) = data.get(*field) else {
            continue;
        };
        if value.is_null() {
            if NULLABLE_FIELDS.contains(field) {
                record.insert(field.to_string(), Value::Null);
            }
            continue;
        }

        let value = if *field == "category_id" {
            match value {
                Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or_else(|_| value.clone()),
                _ => value.clone(),
            }
        } else {
            value.clone()
        };

        record.insert(field.to_string(), value);
    }

    record
}

fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
