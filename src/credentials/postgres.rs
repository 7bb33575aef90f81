use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::PgPool;

use super::{CredentialRecord, CredentialStore};
use crate::error::{store_error_from_sqlx, StoreError};

/// Credential store backed by the `credentials` table
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the table if it does not exist yet
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(254) NOT NULL UNIQUE,
                secret_hash VARCHAR(60) NOT NULL,
                groups TEXT[] NOT NULL DEFAULT '{}',
                last_mod TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| fault("init_credentials_schema", e))?;
        Ok(())
    }
}

/// Log a store fault where it is detected, pass conflicts through silently
fn fault(operation: &'static str, err: sqlx::Error) -> StoreError {
    let err = store_error_from_sqlx(operation, err);
    if let StoreError::Fault { message, .. } = &err {
        tracing::error!(operation, error = %message, "Credential store fault");
    }
    err
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create(&self, username: &str, secret_hash: &str) -> Result<i64, StoreError> {
        let (id,) = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO credentials (username, secret_hash, last_mod)
            VALUES ($1, $2, now())
            RETURNING id
            "#,
        )
        .bind(username)
        .bind(secret_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fault("create_credentials", e))?;

        Ok(id)
    }

    async fn find(&self, username: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let row = sqlx::query_as::<_, (i64, String, String, Vec<String>)>(
            r#"
            SELECT id, username, secret_hash, groups
            FROM credentials
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| fault("find_credentials", e))?;

        Ok(row.map(|(id, username, secret_hash, groups)| CredentialRecord {
            id,
            username,
            secret_hash,
            groups: groups.into_iter().collect(),
        }))
    }

    async fn update_username(&self, id: i64, username: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE credentials SET username = $2, last_mod = now() WHERE id = $1",
        )
        .bind(id)
        .bind(username)
        .execute(&self.pool)
        .await
        .map_err(|e| fault("update_username", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_secret(&self, id: i64, secret_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE credentials SET secret_hash = $2, last_mod = now() WHERE id = $1",
        )
        .bind(id)
        .bind(secret_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| fault("update_secret", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_groups(&self, id: i64, groups: &BTreeSet<String>) -> Result<bool, StoreError> {
        let groups: Vec<String> = groups.iter().cloned().collect();
        let result = sqlx::query(
            "UPDATE credentials SET groups = $2, last_mod = now() WHERE id = $1",
        )
        .bind(id)
        .bind(groups)
        .execute(&self.pool)
        .await
        .map_err(|e| fault("update_groups", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| fault("delete_credentials", e))?;

        Ok(result.rows_affected() > 0)
    }
}
