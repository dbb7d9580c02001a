//! Repository for the `system_injectables` table.

use sqlx::PgPool;

use crate::models::system_injectable::SystemInjectableRow;

const COLUMNS: &str = "key, data_type, is_active";

pub struct SystemInjectableRepo;

impl SystemInjectableRepo {
    pub async fn list(pool: &PgPool) -> Result<Vec<SystemInjectableRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM system_injectables ORDER BY key");
        sqlx::query_as::<_, SystemInjectableRow>(&query)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_keys(
        pool: &PgPool,
        keys: &[String],
    ) -> Result<Vec<SystemInjectableRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM system_injectables WHERE key = ANY($1)");
        sqlx::query_as::<_, SystemInjectableRow>(&query)
            .bind(keys)
            .fetch_all(pool)
            .await
    }

    /// Insert unless the key exists. Returns `true` if a row was inserted.
    pub async fn insert_if_missing(
        pool: &PgPool,
        key: &str,
        data_type: &str,
        is_active: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO system_injectables (key, data_type, is_active) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(data_type)
        .bind(is_active)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `true` if the key exists.
    pub async fn set_active(pool: &PgPool, key: &str, is_active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE system_injectables SET is_active = $2, updated_at = NOW() WHERE key = $1",
        )
        .bind(key)
        .bind(is_active)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
