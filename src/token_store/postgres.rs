use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::PgPool;

use super::{RefreshTokenEntry, RefreshTokenStore};
use crate::error::{store_error_from_sqlx, StoreError};

/// Refresh token store backed by the `refresh_tokens` table
///
/// Atomic pop is one `DELETE ... RETURNING` statement, so Postgres row
/// locking decides which of several racing callers gets the row.
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS refresh_tokens (
                id BIGSERIAL PRIMARY KEY,
                subject_id BIGINT NOT NULL,
                token_hash CHAR(64) NOT NULL,
                groups TEXT[] NOT NULL DEFAULT '{}',
                expires_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_refresh_tokens_subject_hash
                ON refresh_tokens (subject_id, token_hash)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_refresh_tokens_expires_at
                ON refresh_tokens (expires_at)
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| fault("init_token_schema", None, e))?;
        }
        Ok(())
    }
}

fn fault(operation: &'static str, subject_id: Option<i64>, err: sqlx::Error) -> StoreError {
    let err = store_error_from_sqlx(operation, err);
    tracing::error!(operation, subject_id = ?subject_id, error = %err, "Token store fault");
    err
}

#[async_trait]
impl RefreshTokenStore for PgTokenStore {
    async fn put(&self, entry: &RefreshTokenEntry) -> Result<bool, StoreError> {
        let groups: Vec<String> = entry.groups.iter().cloned().collect();
        let result = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (subject_id, token_hash, groups, expires_at, created_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (subject_id, token_hash) DO UPDATE
                SET groups = EXCLUDED.groups,
                    expires_at = EXCLUDED.expires_at,
                    created_at = now()
                WHERE refresh_tokens.expires_at <= now()
                   OR (refresh_tokens.groups = EXCLUDED.groups
                       AND refresh_tokens.expires_at = EXCLUDED.expires_at)
            "#,
        )
        .bind(entry.subject_id)
        .bind(&entry.token_hash)
        .bind(groups)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| fault("put_token", Some(entry.subject_id), e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn pop_groups(
        &self,
        subject_id: i64,
        token_hash: &str,
    ) -> Result<Option<BTreeSet<String>>, StoreError> {
        let row = sqlx::query_as::<_, (Vec<String>,)>(
            r#"
            DELETE FROM refresh_tokens
            WHERE subject_id = $1 AND token_hash = $2 AND expires_at > now()
            RETURNING groups
            "#,
        )
        .bind(subject_id)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| fault("pop_groups", Some(subject_id), e))?;

        Ok(row.map(|(groups,)| groups.into_iter().collect()))
    }

    async fn delete_for_subject(&self, subject_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE subject_id = $1")
            .bind(subject_id)
            .execute(&self.pool)
            .await
            .map_err(|e| fault("delete_for_subject", Some(subject_id), e))?;

        Ok(result.rows_affected())
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= now()")
            .execute(&self.pool)
            .await
            .map_err(|e| fault("sweep_expired", None, e))?;

        Ok(result.rows_affected())
    }
}
