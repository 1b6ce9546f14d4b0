use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, Transaction, TypeInfo};
use tracing::error;

/// Options bag for [`Repository::find_all`]: equality filters, ordering and
/// pagination. Anything richer goes through the raw-query escape hatch.
#[derive(Debug, Default, Clone)]
pub struct QueryOptions {
    pub filters: Vec<(&'static str, Value)>,
    pub order_by: Option<&'static str>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl QueryOptions {
    pub fn filter(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push((column, value.into()));
        self
    }

    pub fn order_by(mut self, order: &'static str) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Table-scoped data access over an injected pool. Values always go through
/// parameter binding; string interpolation is confined to table and column
/// identifiers, which are `&'static str` originating from internal code and
/// never from request input.
///
/// Read paths degrade silently: a storage error is logged and turned into an
/// empty result rather than propagated. Write paths report plain booleans.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    table: &'static str,
}

impl Repository {
    pub fn new(pool: SqlitePool, table: &'static str) -> Self {
        Self { pool, table }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// `SELECT * FROM <table> WHERE is_deleted = 0` plus equality filters,
    /// ordering and LIMIT/OFFSET from the options bag.
    pub async fn find_all(&self, options: &QueryOptions) -> Vec<Map<String, Value>> {
        let mut sql = format!("SELECT * FROM {} WHERE is_deleted = 0", self.table);

        for (column, _) in &options.filters {
            sql.push_str(&format!(" AND {column} = ?"));
        }
        if let Some(order) = options.order_by {
            sql.push_str(&format!(" ORDER BY {order}"));
        }
        if options.limit.is_some() {
            sql.push_str(" LIMIT ?");
            if options.offset.is_some() {
                sql.push_str(" OFFSET ?");
            }
        }

        let mut query = sqlx::query(&sql);
        for (_, value) in &options.filters {
            query = bind_value(query, value);
        }
        if let Some(limit) = options.limit {
            query = query.bind(limit);
            if let Some(offset) = options.offset {
                query = query.bind(offset);
            }
        }

        match query.fetch_all(&self.pool).await {
            Ok(rows) => rows.iter().map(row_to_map).collect(),
            Err(e) => {
                error!("database error in find_all on {}: {}", self.table, e);
                Vec::new()
            }
        }
    }

    /// Single-row lookup scoped to not-deleted rows.
    pub async fn find_by_id(&self, id: i64) -> Option<Map<String, Value>> {
        let sql = format!(
            "SELECT * FROM {} WHERE id = ? AND is_deleted = 0",
            self.table
        );

        match sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await {
            Ok(row) => row.as_ref().map(row_to_map),
            Err(e) => {
                error!("database error in find_by_id on {}: {}", self.table, e);
                None
            }
        }
    }

    /// Parameterized INSERT built from the data bag's keys; returns the
    /// generated id, or `None` on failure.
    pub async fn create(&self, data: &Map<String, Value>) -> Option<i64> {
        let sql = if data.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table)
        } else {
            let columns: Vec<&str> = data.keys().map(String::as_str).collect();
            let placeholders = vec!["?"; columns.len()];
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        let mut query = sqlx::query(&sql);
        for value in data.values() {
            query = bind_value(query, value);
        }

        match query.execute(&self.pool).await {
            Ok(result) => Some(result.last_insert_rowid()),
            Err(e) => {
                error!("database error in create on {}: {}", self.table, e);
                None
            }
        }
    }

    /// Partial UPDATE: only the provided columns are touched.
    pub async fn update(&self, id: i64, data: &Map<String, Value>) -> bool {
        if data.is_empty() {
            return false;
        }

        let assignments: Vec<String> = data.keys().map(|column| format!("{column} = ?")).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            self.table,
            assignments.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for value in data.values() {
            query = bind_value(query, value);
        }
        query = query.bind(id);

        match query.execute(&self.pool).await {
            Ok(result) => result.rows_affected() > 0,
            Err(e) => {
                error!("database error in update on {}: {}", self.table, e);
                false
            }
        }
    }

    /// Soft delete: flags the row and refreshes `updated_at`; the row is
    /// never removed from storage.
    pub async fn delete(&self, id: i64) -> bool {
        let sql = format!(
            "UPDATE {} SET is_deleted = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            self.table
        );

        match sqlx::query(&sql).bind(id).execute(&self.pool).await {
            Ok(result) => result.rows_affected() > 0,
            Err(e) => {
                error!("database error in delete on {}: {}", self.table, e);
                false
            }
        }
    }

    /// Row count with the same equality-filter semantics as `find_all`.
    pub async fn count(&self, filters: &[(&'static str, Value)]) -> i64 {
        let mut sql = format!("SELECT COUNT(*) FROM {} WHERE is_deleted = 0", self.table);
        for (column, _) in filters {
            sql.push_str(&format!(" AND {column} = ?"));
        }

        let mut query = sqlx::query(&sql);
        for (_, value) in filters {
            query = bind_value(query, value);
        }

        match query.fetch_one(&self.pool).await {
            Ok(row) => row.try_get(0).unwrap_or(0),
            Err(e) => {
                error!("database error in count on {}: {}", self.table, e);
                0
            }
        }
    }

    /// Raw-query escape hatch for composed statements (joins, ranges, date
    /// functions) with positional parameter binding.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Vec<Map<String, Value>> {
        let mut query = sqlx::query(sql);
        for value in params {
            query = bind_value(query, value);
        }

        match query.fetch_all(&self.pool).await {
            Ok(rows) => rows.iter().map(row_to_map).collect(),
            Err(e) => {
                error!("database error in query on {}: {}", self.table, e);
                Vec::new()
            }
        }
    }

    /// Like [`Repository::query`] but fetches a single row.
    pub async fn query_one(&self, sql: &str, params: &[Value]) -> Option<Map<String, Value>> {
        let mut query = sqlx::query(sql);
        for value in params {
            query = bind_value(query, value);
        }

        match query.fetch_optional(&self.pool).await {
            Ok(row) => row.as_ref().map(row_to_map),
            Err(e) => {
                error!("database error in query_one on {}: {}", self.table, e);
                None
            }
        }
    }

    /// Raw statement escape hatch for writes outside the table scope.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> bool {
        let mut query = sqlx::query(sql);
        for value in params {
            query = bind_value(query, value);
        }

        match query.execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                error!("database error in execute on {}: {}", self.table, e);
                false
            }
        }
    }

    /// Transaction passthrough; commit/rollback on the returned handle.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

/// Converts a row into a JSON map keyed by column name, using the declared
/// column type to pick a decode. Expression and aggregate columns carry no
/// declared type, so the fallback probes runtime types instead of assuming
/// text.
fn row_to_map(row: &SqliteRow) -> Map<String, Value> {
    let mut map = Map::new();

    for column in row.columns() {
        let idx = column.ordinal();
        let value = match column.type_info().name() {
            "INTEGER" | "INT" | "BIGINT" => row
                .try_get::<Option<i64>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, Value::from),
            "REAL" | "NUMERIC" => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, Value::from),
            "BOOLEAN" => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, Value::from),
            "NULL" => Value::Null,
            _ => decode_dynamic(row, idx),
        };

        map.insert(column.name().to_string(), value);
    }

    map
}

fn decode_dynamic(row: &SqliteRow, idx: usize) -> Value {
    row.try_get::<Option<i64>, _>(idx)
        .ok()
        .flatten()
        .map(Value::from)
        .or_else(|| {
            row.try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from)
        })
        .or_else(|| {
            row.try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from)
        })
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test db");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn task_data(title: &str) -> Map<String, Value> {
        json!({
            "title": title,
            "priority": "high",
            "status": "pending",
        })
        .as_object()
        .expect("object literal")
        .clone()
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let repo = Repository::new(setup_test_db().await, "tasks");

        let id = repo.create(&task_data("Read Ch.3")).await.expect("created");
        assert!(id > 0);

        let row = repo.find_by_id(id).await.expect("row present");
        assert_eq!(row["title"], json!("Read Ch.3"));
        assert_eq!(row["priority"], json!("high"));
        assert_eq!(row["status"], json!("pending"));
        // server-generated columns are populated
        assert_eq!(row["id"], json!(id));
        assert!(row["created_at"].is_string());
    }

    #[tokio::test]
    async fn update_touches_only_provided_columns() {
        let repo = Repository::new(setup_test_db().await, "tasks");
        let id = repo.create(&task_data("Draft essay")).await.expect("created");

        let patch = json!({ "status": "in_progress" })
            .as_object()
            .expect("object literal")
            .clone();
        assert!(repo.update(id, &patch).await);

        let row = repo.find_by_id(id).await.expect("row present");
        assert_eq!(row["status"], json!("in_progress"));
        assert_eq!(row["title"], json!("Draft essay"));
    }

    #[tokio::test]
    async fn soft_delete_hides_row_but_keeps_it_in_storage() {
        let repo = Repository::new(setup_test_db().await, "tasks");
        let id = repo.create(&task_data("Old chore")).await.expect("created");

        assert!(repo.delete(id).await);
        assert!(repo.find_by_id(id).await.is_none());
        assert_eq!(repo.count(&[]).await, 0);

        // bypass via the raw escape hatch: the row still exists, flagged
        let row = repo
            .query_one(
                "SELECT * FROM tasks WHERE id = ? AND is_deleted = 1",
                &[json!(id)],
            )
            .await
            .expect("row still stored");
        assert_eq!(row["title"], json!("Old chore"));
    }

    #[tokio::test]
    async fn find_all_applies_filters_order_and_limit() {
        let repo = Repository::new(setup_test_db().await, "tasks");
        for (title, status) in [
            ("a", "pending"),
            ("b", "completed"),
            ("c", "completed"),
            ("d", "completed"),
        ] {
            let mut data = task_data(title);
            data.insert("status".to_string(), json!(status));
            repo.create(&data).await.expect("created");
        }

        let options = QueryOptions::default()
            .filter("status", "completed")
            .order_by("title ASC")
            .limit(2)
            .offset(1);
        let rows = repo.find_all(&options).await;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["title"], json!("c"));
        assert_eq!(rows[1]["title"], json!("d"));

        assert_eq!(repo.count(&[("status", json!("completed"))]).await, 3);
    }

    #[tokio::test]
    async fn aggregate_columns_decode_by_runtime_type() {
        let repo = Repository::new(setup_test_db().await, "tasks");
        repo.create(&task_data("a")).await.expect("created");
        repo.create(&task_data("b")).await.expect("created");

        let row = repo
            .query_one(
                "SELECT COUNT(*) AS count, AVG(id) AS avg_id, MAX(title) AS top FROM tasks",
                &[],
            )
            .await
            .expect("aggregate row");

        assert_eq!(row["count"], json!(2));
        assert!(row["avg_id"].is_number());
        assert_eq!(row["top"], json!("b"));
    }

    #[tokio::test]
    async fn storage_errors_degrade_to_empty_results() {
        let repo = Repository::new(setup_test_db().await, "no_such_table");

        assert!(repo.find_all(&QueryOptions::default()).await.is_empty());
        assert!(repo.find_by_id(1).await.is_none());
        assert!(repo.create(&task_data("x")).await.is_none());
        assert!(!repo.update(1, &task_data("x")).await);
        assert!(!repo.delete(1).await);
        assert_eq!(repo.count(&[]).await, 0);
    }

    #[tokio::test]
    async fn transaction_rollback_discards_writes() {
        let repo = Repository::new(setup_test_db().await, "tasks");

        let mut tx = repo.begin().await.expect("begin");
        sqlx::query("INSERT INTO tasks (title) VALUES (?)")
            .bind("uncommitted")
            .execute(&mut *tx)
            .await
            .expect("insert inside tx");
        tx.rollback().await.expect("rollback");

        assert_eq!(repo.count(&[]).await, 0);
    }
}
