//! Database migration management.

use sqlx::{Pool, Sqlite};

use crate::error_handling::DatabaseError;

/// Runs the SQLx migrations from the `migrations/` directory.
///
/// The migrations are embedded at compile time, so the binary does not need
/// the source tree. Creates the bookkeeping row, both range tables and their
/// indexes.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), DatabaseError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_embedded_migrations_create_schema_and_are_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name IN ('dataset_metadata', 'ip_to_city_one', 'ip_to_city_two') ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(tables, ["dataset_metadata", "ip_to_city_one", "ip_to_city_two"]);

        let seeded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dataset_metadata")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(seeded, 1);
    }
}
