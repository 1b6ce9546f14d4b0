use std::sync::Arc;

use axum::Json;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderValue, Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::api;
use crate::router::{DispatchError, PatternRouter, RequestContext, RouterError};
use crate::shell;
use crate::state::AppState;

const BODY_LIMIT: usize = 1024 * 1024;

/// The route table. Routes match in registration order, first match wins, so
/// literal segments like `/api/tasks/stats` are registered before the
/// `/api/tasks/{id}` parameter route that would otherwise shadow them.
pub fn routes() -> Result<PatternRouter, RouterError> {
    let mut router = PatternRouter::new();

    // HTML pages all serve the static shell; views are client-side
    router
        .get("/", page)?
        .get("/tasks", page)?
        .get("/tasks/create", page)?
        .get("/tasks/{id}", page)?
        .get("/tasks/{id}/edit", page)?;

    router
        .get("/api/tasks", api::tasks::index)?
        .get("/api/tasks/stats", api::tasks::stats)?
        .get("/api/tasks/overdue", api::tasks::overdue)?
        .get("/api/tasks/today", api::tasks::today)?
        .get("/api/tasks/upcoming", api::tasks::upcoming)?
        .get("/api/tasks/search", api::tasks::search)?
        .get("/api/tasks/{id}", api::tasks::show)?
        .post("/api/tasks", api::tasks::store)?
        .put("/api/tasks/{id}", api::tasks::update)?
        .delete("/api/tasks/{id}", api::tasks::destroy)?
        .post("/api/tasks/{id}/complete", api::tasks::complete)?
        .get("/api/categories", api::categories::index)?;

    Ok(router)
}

/// Builds the axum application: a single fallback service forwarding every
/// request into the pattern router.
pub fn app(state: AppState) -> Result<axum::Router, RouterError> {
    let routes = Arc::new(routes()?);

    let router = axum::Router::new().fallback(move |request: Request<Body>| {
        let routes = routes.clone();
        let state = state.clone();
        async move { serve(routes, state, request).await }
    });

    Ok(router)
}

async fn page(_ctx: RequestContext) -> Response {
    shell::page().into_response()
}

async fn serve(routes: Arc<PatternRouter>, state: AppState, request: Request<Body>) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let is_api = path.starts_with("/api/");

    if is_api && method == Method::OPTIONS {
        return with_cors(StatusCode::NO_CONTENT.into_response());
    }

    let body = match to_bytes(request.into_body(), BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let ctx = RequestContext::new(state, &query, body);
    match routes.dispatch(&method, &path, ctx).await {
        Ok(response) if is_api => with_cors(response),
        Ok(response) => response,
        Err(DispatchError::NotFound { .. }) if is_api => {
            let body = Json(json!({
                "status": "error",
                "message": "Endpoint not found",
                "code": 404,
            }));
            with_cors((StatusCode::NOT_FOUND, body).into_response())
        }
        // unmatched non-API reads fall through to the default view
        Err(DispatchError::NotFound { .. }) if method == Method::GET => {
            shell::page().into_response()
        }
        Err(DispatchError::NotFound { .. }) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization, X-Requested-With"),
    );
    response
}
