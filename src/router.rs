use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::AppError;
use crate::state::AppState;

/// Everything a handler gets: shared state, extracted path parameters, the
/// decoded query map, and the raw request body.
pub struct RequestContext {
    pub state: AppState,
    pub params: PathParams,
    pub query: HashMap<String, String>,
    pub body: Bytes,
}

impl RequestContext {
    pub fn new(state: AppState, query_string: &str, body: Bytes) -> Self {
        Self {
            state,
            params: PathParams::default(),
            query: parse_query(query_string),
            body,
        }
    }

    /// Decodes the request body as a JSON object. An empty body is treated as
    /// an empty bag; anything other than a JSON object is a bad request.
    pub fn json_body(&self) -> Result<Map<String, Value>, AppError> {
        if self.body.is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_slice::<Value>(&self.body) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(AppError::BadRequest("Invalid JSON body".to_string())),
        }
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Named and positional captures extracted from a matched route pattern.
#[derive(Debug, Default, Clone)]
pub struct PathParams {
    named: HashMap<String, String>,
    positional: Vec<String>,
}

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    pub fn get_index(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    /// The `{id}` capture as an integer key. A missing or non-numeric capture
    /// behaves like a missing entity.
    pub fn id(&self) -> Result<i64, AppError> {
        self.get("id")
            .and_then(|raw| raw.parse().ok())
            .ok_or(AppError::NotFound)
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A registered route handler. Implemented for any async fn taking a
/// [`RequestContext`] and returning something that converts into a response.
pub trait Handler: Send + Sync {
    fn call(&self, ctx: RequestContext) -> HandlerFuture;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, ctx: RequestContext) -> HandlerFuture {
        let fut = self(ctx);
        Box::pin(async move { fut.await.into_response() })
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid route pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no route found for {method} {path}")]
    NotFound { method: Method, path: String },
}

struct Route {
    method: Method,
    regex: Regex,
    handler: Arc<dyn Handler>,
}

/// Ordered list of compiled route matchers. Routes are scanned in
/// registration order and the first match wins; overlapping patterns are an
/// accepted configuration hazard, not resolved here.
#[derive(Default)]
pub struct PatternRouter {
    routes: Vec<Route>,
}

impl PatternRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route. `{name}` segments in the pattern match one or more
    /// non-slash characters, captured under `name`. A pattern that fails to
    /// compile is a configuration error surfaced at registration.
    pub fn register(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RouterError> {
        let regex = compile_pattern(pattern).map_err(|source| RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        self.routes.push(Route {
            method,
            regex,
            handler: Arc::new(handler),
        });

        Ok(self)
    }

    pub fn get(
        &mut self,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RouterError> {
        self.register(Method::GET, pattern, handler)
    }

    pub fn post(
        &mut self,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RouterError> {
        self.register(Method::POST, pattern, handler)
    }

    pub fn put(
        &mut self,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RouterError> {
        self.register(Method::PUT, pattern, handler)
    }

    pub fn delete(
        &mut self,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RouterError> {
        self.register(Method::DELETE, pattern, handler)
    }

    /// Matches the request against the registered routes and invokes the
    /// first matching handler with its extracted parameters.
    pub async fn dispatch(
        &self,
        method: &Method,
        uri: &str,
        mut ctx: RequestContext,
    ) -> Result<Response, DispatchError> {
        let path = normalize_path(uri);

        for route in &self.routes {
            if route.method != *method {
                continue;
            }

            let Some(captures) = route.regex.captures(&path) else {
                continue;
            };

            let mut params = PathParams::default();
            for (i, capture) in captures.iter().enumerate().skip(1) {
                if let Some(m) = capture {
                    params.positional.push(m.as_str().to_string());
                    if let Some(name) = route.regex.capture_names().nth(i).flatten() {
                        params.named.insert(name.to_string(), m.as_str().to_string());
                    }
                }
            }

            ctx.params = params;
            return Ok(route.handler.call(ctx).await);
        }

        Err(DispatchError::NotFound {
            method: method.clone(),
            path,
        })
    }
}

/// Strips the query string and trailing slash; an empty path is the root.
fn normalize_path(uri: &str) -> String {
    let path = uri.split('?').next().unwrap_or(uri);
    let path = path.trim_end_matches('/');

    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Converts a `{name}` pattern into an anchored regex with named capture
/// groups; every other character is matched literally.
fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let mut source = String::from("^");
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        if c == '{' {
            let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
            source.push_str("(?P<");
            source.push_str(&name);
            source.push_str(">[^/]+)");
        } else {
            source.push_str(&regex::escape(&c.to_string()));
        }
    }

    source.push('$');
    Regex::new(&source)
}

fn parse_query(query_string: &str) -> HashMap<String, String> {
    let mut query = HashMap::new();

    for pair in query_string.split('&').filter(|p| !p.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        let key = decode_component(parts.next().unwrap_or_default());
        let value = decode_component(parts.next().unwrap_or_default());

        if !key.is_empty() {
            query.insert(key, value);
        }
    }

    query
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    percent_decode_str(&raw).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn test_ctx() -> RequestContext {
        let db = sqlx::SqlitePool::connect_lazy("sqlite::memory:").unwrap();
        RequestContext::new(AppState { db }, "", Bytes::new())
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn captures_named_parameter() {
        let mut router = PatternRouter::new();
        router
            .get("/tasks/{id}", |ctx: RequestContext| async move {
                format!("id={}", ctx.params.get("id").unwrap_or("?"))
            })
            .unwrap();

        let response = router
            .dispatch(&Method::GET, "/tasks/42", test_ctx())
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "id=42");
    }

    #[tokio::test]
    async fn pattern_does_not_overmatch_extra_segments() {
        let mut router = PatternRouter::new();
        router
            .get("/tasks/{id}", |_ctx: RequestContext| async { "hit" })
            .unwrap();

        let result = router
            .dispatch(&Method::GET, "/tasks/42/edit", test_ctx())
            .await;
        assert!(matches!(result, Err(DispatchError::NotFound { .. })));
    }

    #[tokio::test]
    async fn first_registered_route_wins() {
        let mut router = PatternRouter::new();
        router
            .get("/tasks/create", |_ctx: RequestContext| async { "literal" })
            .unwrap()
            .get("/tasks/{id}", |_ctx: RequestContext| async { "param" })
            .unwrap();

        let response = router
            .dispatch(&Method::GET, "/tasks/create", test_ctx())
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "literal");

        // reversed order: the parameter route shadows the literal one
        let mut shadowed = PatternRouter::new();
        shadowed
            .get("/tasks/{id}", |_ctx: RequestContext| async { "param" })
            .unwrap()
            .get("/tasks/create", |_ctx: RequestContext| async { "literal" })
            .unwrap();

        let response = shadowed
            .dispatch(&Method::GET, "/tasks/create", test_ctx())
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "param");
    }

    #[tokio::test]
    async fn method_must_match() {
        let mut router = PatternRouter::new();
        router
            .get("/tasks", |_ctx: RequestContext| async { "listing" })
            .unwrap();

        let result = router.dispatch(&Method::POST, "/tasks", test_ctx()).await;
        assert!(matches!(result, Err(DispatchError::NotFound { .. })));
    }

    #[tokio::test]
    async fn normalizes_trailing_slash_and_query_string() {
        let mut router = PatternRouter::new();
        router
            .get("/tasks", |_ctx: RequestContext| async { "listing" })
            .unwrap()
            .get("/", |_ctx: RequestContext| async { "root" })
            .unwrap();

        let response = router
            .dispatch(&Method::GET, "/tasks/?page=2", test_ctx())
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "listing");

        let response = router
            .dispatch(&Method::GET, "", test_ctx())
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "root");
    }

    #[tokio::test]
    async fn handlers_may_return_results() {
        let mut router = PatternRouter::new();
        router
            .get("/boom", |_ctx: RequestContext| async {
                Err::<Response, AppError>(AppError::NotFound)
            })
            .unwrap();

        let response = router
            .dispatch(&Method::GET, "/boom", test_ctx())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_pattern_is_a_registration_error() {
        let mut router = PatternRouter::new();
        let result = router.get("/tasks/{}", |_ctx: RequestContext| async { "never" });
        assert!(matches!(result, Err(RouterError::InvalidPattern { .. })));
    }

    #[test]
    fn query_parsing_decodes_components() {
        let query = parse_query("q=hello+world&status=in_progress&x=%2Fpath");
        assert_eq!(query["q"], "hello world");
        assert_eq!(query["status"], "in_progress");
        assert_eq!(query["x"], "/path");
    }
}
