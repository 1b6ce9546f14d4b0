use axum::http::StatusCode;
use axum::response::Response;
use serde_json::json;

use crate::api::success;
use crate::models::Category;
use crate::router::RequestContext;

/// GET /api/categories — active categories with their open-task counts.
pub async fn index(ctx: RequestContext) -> Response {
    let categories = Category::all(&ctx.state.db).await;

    let mut entries = Vec::with_capacity(categories.len());
    for category in categories {
        let task_count = category.task_count(&ctx.state.db).await;
        let mut entry = json!(category);
        entry["task_count"] = json!(task_count);
        entries.push(entry);
    }

    success(entries, "Success", StatusCode::OK)
}
