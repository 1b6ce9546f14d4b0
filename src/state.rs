use sqlx::SqlitePool;

/// Shared per-request context. The pool is constructed once in `main` and
/// injected here; nothing else crosses request boundaries.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
}
