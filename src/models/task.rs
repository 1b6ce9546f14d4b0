use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::error;

use crate::validation::{Rule, RuleSet};

pub const STATUSES: &[&str] = &["pending", "in_progress", "completed", "cancelled"];
pub const PRIORITIES: &[&str] = &["low", "medium", "high", "urgent"];

/// Rules for creating a task.
pub const CREATE_RULES: RuleSet = &[
    ("title", &[Rule::Required, Rule::Max(255)]),
    ("description", &[Rule::Max(1000)]),
    ("category_id", &[Rule::Numeric]),
    ("priority", &[Rule::OneOf(PRIORITIES)]),
    ("status", &[Rule::OneOf(STATUSES)]),
    ("due_date", &[Rule::Date]),
];

/// Rules for a partial update: same checks, but a field may be omitted. A
/// title that is sent must still be non-blank.
pub const UPDATE_RULES: RuleSet = &[
    ("title", &[Rule::Filled, Rule::Max(255)]),
    ("description", &[Rule::Max(1000)]),
    ("category_id", &[Rule::Numeric]),
    ("priority", &[Rule::OneOf(PRIORITIES)]),
    ("status", &[Rule::OneOf(STATUSES)]),
    ("due_date", &[Rule::Date]),
];

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub priority: String,
    pub status: String,
    pub due_date: Option<String>,
    pub completed_at: Option<String>,
    pub is_deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    /// Typed lookup scoped to not-deleted rows. A storage error degrades to
    /// an absent result, logged.
    pub async fn find(pool: &SqlitePool, id: i64) -> Option<Task> {
        let result = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .fetch_optional(pool)
            .await;

        match result {
            Ok(task) => task,
            Err(e) => {
                error!("database error in Task::find: {}", e);
                None
            }
        }
    }

    pub async fn all(pool: &SqlitePool) -> Vec<Task> {
        let result = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE is_deleted = 0")
            .fetch_all(pool)
            .await;

        match result {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("database error in Task::all: {}", e);
                Vec::new()
            }
        }
    }

    /// An open task whose due date lies in the past.
    pub fn is_overdue(&self) -> bool {
        if self.status == "completed" || self.status == "cancelled" {
            return false;
        }

        let Some(due) = self.due_date.as_deref() else {
            return false;
        };

        match NaiveDate::parse_from_str(due.get(..10).unwrap_or(due), "%Y-%m-%d") {
            Ok(date) => date < Utc::now().date_naive(),
            Err(_) => false,
        }
    }
}
