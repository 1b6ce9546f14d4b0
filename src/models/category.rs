use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub description: String,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// The starter set seeded on first run.
const DEFAULT_CATEGORIES: &[(&str, &str, &str, &str)] = &[
    ("Work", "#e74c3c", "briefcase", "Work-related tasks"),
    ("Study", "#3498db", "book", "Study and education tasks"),
    ("Personal", "#2ecc71", "user", "Personal tasks and goals"),
    ("Health", "#9b59b6", "heart", "Health and wellness tasks"),
    ("Errands", "#f1c40f", "shopping-cart", "Errands and shopping tasks"),
];

impl Category {
    pub async fn find(pool: &SqlitePool, id: i64) -> Option<Category> {
        let result =
            sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ? AND is_deleted = 0")
                .bind(id)
                .fetch_optional(pool)
                .await;

        match result {
            Ok(category) => category,
            Err(e) => {
                error!("database error in Category::find: {}", e);
                None
            }
        }
    }

    /// Active, not-deleted categories.
    pub async fn all(pool: &SqlitePool) -> Vec<Category> {
        let result = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE is_deleted = 0 AND is_active = 1 ORDER BY name ASC",
        )
        .fetch_all(pool)
        .await;

        match result {
            Ok(categories) => categories,
            Err(e) => {
                error!("database error in Category::all: {}", e);
                Vec::new()
            }
        }
    }

    /// Not-deleted tasks referencing this category.
    pub async fn task_count(&self, pool: &SqlitePool) -> i64 {
        let result = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tasks WHERE category_id = ? AND is_deleted = 0",
        )
        .bind(self.id)
        .fetch_one(pool)
        .await;

        match result {
            Ok(count) => count,
            Err(e) => {
                error!("database error in Category::task_count: {}", e);
                0
            }
        }
    }

    /// Seeds the default categories that are not present yet. Runs at
    /// startup, after migrations.
    pub async fn ensure_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        for (name, color, icon, description) in DEFAULT_CATEGORIES {
            let existing = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM categories WHERE name = ? AND is_deleted = 0",
            )
            .bind(name)
            .fetch_one(pool)
            .await?;

            if existing == 0 {
                sqlx::query(
                    "INSERT INTO categories (name, color, icon, description) VALUES (?, ?, ?, ?)",
                )
                .bind(name)
                .bind(color)
                .bind(icon)
                .bind(description)
                .execute(pool)
                .await?;
                info!("seeded default category {}", name);
            }
        }

        Ok(())
    }
}
