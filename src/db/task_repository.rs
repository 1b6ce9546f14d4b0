use serde::Serialize;
use serde_json::{Map, Value, json};
use sqlx::SqlitePool;

use crate::db::repository::{QueryOptions, Repository};

/// Pagination metadata returned alongside a task page.
#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub per_page: i64,
    pub current_page: i64,
    pub total_pages: i64,
    pub has_more: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct PriorityCounts {
    pub low: i64,
    pub medium: i64,
    pub high: i64,
    pub urgent: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct TaskStatistics {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub overdue: i64,
    pub due_today: i64,
    pub by_priority: PriorityCounts,
}

/// Task data access: the generic repository plus the composed queries that
/// need ranges, date functions or LIKE.
#[derive(Clone)]
pub struct TaskRepository {
    repo: Repository,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            repo: Repository::new(pool, "tasks"),
        }
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// One page of not-deleted tasks with optional equality filters, ordered
    /// by due date then priority, plus the metadata to render a pager.
    pub async fn paginated(
        &self,
        page: i64,
        per_page: i64,
        filters: Vec<(&'static str, Value)>,
    ) -> (Vec<Map<String, Value>>, Pagination) {
        let page = page.max(1);
        let per_page = per_page.max(1);

        let total = self.repo.count(&filters).await;

        let options = QueryOptions {
            filters,
            order_by: Some("due_date ASC, priority DESC"),
            limit: Some(per_page),
            offset: Some((page - 1) * per_page),
        };
        let items = self.repo.find_all(&options).await;

        let total_pages = (total + per_page - 1) / per_page;
        let pagination = Pagination {
            total,
            per_page,
            current_page: page,
            total_pages,
            has_more: page < total_pages,
        };

        (items, pagination)
    }

    /// Open tasks whose due date has passed.
    pub async fn find_overdue(&self) -> Vec<Map<String, Value>> {
        self.repo
            .query(
                "SELECT * FROM tasks \
                 WHERE due_date < date('now') \
                 AND status NOT IN ('completed', 'cancelled') \
                 AND is_deleted = 0",
                &[],
            )
            .await
    }

    /// Open tasks due today.
    pub async fn find_due_today(&self) -> Vec<Map<String, Value>> {
        self.repo
            .query(
                "SELECT * FROM tasks \
                 WHERE date(due_date) = date('now') \
                 AND status NOT IN ('completed', 'cancelled') \
                 AND is_deleted = 0",
                &[],
            )
            .await
    }

    /// Open tasks due within the next `days` days, today included.
    pub async fn find_upcoming(&self, days: i64) -> Vec<Map<String, Value>> {
        self.repo
            .query(
                "SELECT * FROM tasks \
                 WHERE date(due_date) BETWEEN date('now') AND date('now', '+' || ? || ' days') \
                 AND status NOT IN ('completed', 'cancelled') \
                 AND is_deleted = 0",
                &[json!(days)],
            )
            .await
    }

    /// Keyword search over title and description.
    pub async fn search(&self, keyword: &str) -> Vec<Map<String, Value>> {
        let pattern = format!("%{keyword}%");
        self.repo
            .query(
                "SELECT * FROM tasks \
                 WHERE (title LIKE ? OR description LIKE ?) \
                 AND is_deleted = 0",
                &[json!(pattern.clone()), json!(pattern)],
            )
            .await
    }

    /// Aggregate counts by status and priority plus the overdue/due-today
    /// tallies.
    pub async fn statistics(&self) -> TaskStatistics {
        let mut stats = TaskStatistics::default();

        let by_status = self
            .repo
            .query(
                "SELECT status, COUNT(*) AS count FROM tasks \
                 WHERE is_deleted = 0 GROUP BY status",
                &[],
            )
            .await;
        for row in by_status {
            let count = row.get("count").and_then(Value::as_i64).unwrap_or(0);
            stats.total += count;
            match row.get("status").and_then(Value::as_str) {
                Some("pending") => stats.pending = count,
                Some("in_progress") => stats.in_progress = count,
                Some("completed") => stats.completed = count,
                Some("cancelled") => stats.cancelled = count,
                _ => {}
            }
        }

        stats.overdue = self.find_overdue().await.len() as i64;
        stats.due_today = self.find_due_today().await.len() as i64;

        let by_priority = self
            .repo
            .query(
                "SELECT priority, COUNT(*) AS count FROM tasks \
                 WHERE is_deleted = 0 GROUP BY priority",
                &[],
            )
            .await;
        for row in by_priority {
            let count = row.get("count").and_then(Value::as_i64).unwrap_or(0);
            match row.get("priority").and_then(Value::as_str) {
                Some("low") => stats.by_priority.low = count,
                Some("medium") => stats.by_priority.medium = count,
                Some("high") => stats.by_priority.high = count,
                Some("urgent") => stats.by_priority.urgent = count,
                _ => {}
            }
        }

        stats
    }

    /// Appends an audit row for a task mutation. Append-only; nothing reads
    /// this table back through the API.
    pub async fn log_activity(&self, record_id: i64, action: &str, details: &str) -> bool {
        self.repo
            .execute(
                "INSERT INTO audit_logs (table_name, record_id, action, details, created_at) \
                 VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)",
                &[
                    json!(self.repo.table()),
                    json!(record_id),
                    json!(action),
                    json!(details),
                ],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    async fn insert_task(repo: &TaskRepository, title: &str, status: &str, due_date: Option<&str>) {
        let mut data = Map::new();
        data.insert("title".to_string(), json!(title));
        data.insert("status".to_string(), json!(status));
        if let Some(due) = due_date {
            data.insert("due_date".to_string(), json!(due));
        }
        repo.repo().create(&data).await.expect("insert task");
    }

    #[tokio::test]
    async fn pagination_metadata_is_consistent() {
        let repo = TaskRepository::new(setup_test_db().await);
        for i in 0..12 {
            insert_task(&repo, &format!("task {i}"), "completed", None).await;
        }
        insert_task(&repo, "other", "pending", None).await;

        let (items, pagination) = repo
            .paginated(2, 5, vec![("status", json!("completed"))])
            .await;

        assert_eq!(items.len(), 5);
        assert!(items.iter().all(|t| t["status"] == json!("completed")));
        assert_eq!(pagination.total, 12);
        assert_eq!(pagination.per_page, 5);
        assert_eq!(pagination.current_page, 2);
        assert_eq!(pagination.total_pages, 3);
        assert!(pagination.has_more);

        let (items, pagination) = repo
            .paginated(3, 5, vec![("status", json!("completed"))])
            .await;
        assert_eq!(items.len(), 2);
        assert!(!pagination.has_more);
    }

    #[tokio::test]
    async fn overdue_excludes_closed_tasks() {
        let repo = TaskRepository::new(setup_test_db().await);
        insert_task(&repo, "late", "pending", Some("2000-01-01")).await;
        insert_task(&repo, "done late", "completed", Some("2000-01-01")).await;
        insert_task(&repo, "future", "pending", Some("2999-01-01")).await;

        let overdue = repo.find_overdue().await;
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0]["title"], json!("late"));
    }

    #[tokio::test]
    async fn search_matches_title_and_description() {
        let repo = TaskRepository::new(setup_test_db().await);
        insert_task(&repo, "Buy groceries", "pending", None).await;

        let mut data = Map::new();
        data.insert("title".to_string(), json!("Chore"));
        data.insert("description".to_string(), json!("grocery run"));
        repo.repo().create(&data).await.expect("insert task");

        assert_eq!(repo.search("grocer").await.len(), 2);
        assert_eq!(repo.search("nothing").await.len(), 0);
    }

    #[tokio::test]
    async fn statistics_counts_by_status_and_priority() {
        let repo = TaskRepository::new(setup_test_db().await);
        for (status, priority) in [
            ("pending", "high"),
            ("pending", "low"),
            ("completed", "high"),
            ("cancelled", "urgent"),
        ] {
            let mut data = Map::new();
            data.insert("title".to_string(), json!("t"));
            data.insert("status".to_string(), json!(status));
            data.insert("priority".to_string(), json!(priority));
            repo.repo().create(&data).await.expect("insert task");
        }

        let stats = repo.statistics().await;
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.by_priority.high, 2);
        assert_eq!(stats.by_priority.urgent, 1);
    }

    #[tokio::test]
    async fn log_activity_appends_audit_rows() {
        let repo = TaskRepository::new(setup_test_db().await);
        insert_task(&repo, "tracked", "pending", None).await;

        assert!(repo.log_activity(1, "create", "Task created via API").await);

        let row = repo
            .repo()
            .query_one("SELECT * FROM audit_logs WHERE record_id = ?", &[json!(1)])
            .await
            .expect("audit row");
        assert_eq!(row["table_name"], json!("tasks"));
        assert_eq!(row["action"], json!("create"));
    }
}
