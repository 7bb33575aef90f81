/// Refresh token store API, service-to-service only
///
/// Mounted only on an instance that owns a local store; remote instances
/// reach it through `HttpTokenStore`.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::error::{AppError, ValidationError};
use crate::token_store::{RefreshTokenEntry, RefreshTokenStore};

#[derive(Deserialize)]
pub struct PopQuery {
    #[serde(rename = "token-hash")]
    pub token_hash: Option<String>,
}

/// PUT /tokens
///
/// 204 when stored, 409 when a different live entry holds the key.
pub async fn put(
    body: web::Json<RefreshTokenEntry>,
    store: web::Data<dyn RefreshTokenStore>,
) -> Result<HttpResponse, AppError> {
    if body.token_hash.trim().is_empty() {
        return Err(ValidationError::EmptyField("tokenHash".to_string()).into());
    }

    if store.put(&body).await? {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(AppError::Conflict)
    }
}

/// GET /tokens/{subject_id}?token-hash=...
///
/// Pops the entry: the groups come back once, later calls get 404.
pub async fn pop_groups(
    path: web::Path<i64>,
    query: web::Query<PopQuery>,
    store: web::Data<dyn RefreshTokenStore>,
) -> Result<HttpResponse, AppError> {
    let token_hash = query
        .token_hash
        .as_deref()
        .map(str::trim)
        .filter(|hash| !hash.is_empty())
        .ok_or_else(|| ValidationError::EmptyField("token-hash".to_string()))?;

    match store.pop_groups(path.into_inner(), token_hash).await? {
        Some(groups) => Ok(HttpResponse::Ok().json(groups)),
        None => Err(AppError::NotFound),
    }
}

/// DELETE /tokens/{subject_id}
pub async fn delete_for_subject(
    path: web::Path<i64>,
    store: web::Data<dyn RefreshTokenStore>,
) -> Result<HttpResponse, AppError> {
    let deleted = store.delete_for_subject(path.into_inner()).await?;
    Ok(HttpResponse::Ok().body(deleted.to_string()))
}

/// DELETE /tokens/expired
pub async fn sweep_expired(
    store: web::Data<dyn RefreshTokenStore>,
) -> Result<HttpResponse, AppError> {
    let deleted = store.sweep_expired().await?;
    Ok(HttpResponse::Ok().body(deleted.to_string()))
}
