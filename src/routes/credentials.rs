/// Credential store API, service-to-service only
///
/// Thin HTTP mapping of `CredentialStore`: unknown ids are 404, taken
/// usernames 409. Secrets arrive already hashed.

use std::collections::BTreeSet;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialStore;
use crate::error::{AppError, ValidationError};
use crate::validators::parse_username;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCredentials {
    pub username: String,
    pub secret_hash: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsResponse {
    pub id: i64,
    pub secret_hash: String,
    pub groups: BTreeSet<String>,
}

fn require_secret_hash(secret_hash: &str) -> Result<&str, ValidationError> {
    let secret_hash = secret_hash.trim();
    if secret_hash.is_empty() {
        return Err(ValidationError::EmptyField("secretHash".to_string()));
    }
    Ok(secret_hash)
}

fn no_content_or_not_found(updated: bool) -> Result<HttpResponse, AppError> {
    if updated {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(AppError::NotFound)
    }
}

/// POST /credentials
pub async fn create(
    body: web::Json<NewCredentials>,
    store: web::Data<dyn CredentialStore>,
) -> Result<HttpResponse, AppError> {
    let username = parse_username(&body.username)?;
    let secret_hash = require_secret_hash(&body.secret_hash)?;

    let id = store.create(&username, secret_hash).await?;
    Ok(HttpResponse::Ok().body(id.to_string()))
}

/// GET /credentials/{username}
pub async fn find(
    path: web::Path<String>,
    store: web::Data<dyn CredentialStore>,
) -> Result<HttpResponse, AppError> {
    let record = store
        .find(&path.into_inner())
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(HttpResponse::Ok().json(CredentialsResponse {
        id: record.id,
        secret_hash: record.secret_hash,
        groups: record.groups,
    }))
}

/// PUT /credentials/{id}/username
pub async fn update_username(
    path: web::Path<i64>,
    body: String,
    store: web::Data<dyn CredentialStore>,
) -> Result<HttpResponse, AppError> {
    let username = parse_username(&body)?;
    no_content_or_not_found(store.update_username(path.into_inner(), &username).await?)
}

/// PUT /credentials/{id}/secret
pub async fn update_secret(
    path: web::Path<i64>,
    body: String,
    store: web::Data<dyn CredentialStore>,
) -> Result<HttpResponse, AppError> {
    let secret_hash = require_secret_hash(&body)?;
    no_content_or_not_found(store.update_secret(path.into_inner(), secret_hash).await?)
}

/// PUT /credentials/{id}/groups
pub async fn update_groups(
    path: web::Path<i64>,
    body: web::Json<BTreeSet<String>>,
    store: web::Data<dyn CredentialStore>,
) -> Result<HttpResponse, AppError> {
    no_content_or_not_found(store.update_groups(path.into_inner(), &body).await?)
}

/// DELETE /credentials/{id}
pub async fn delete(
    path: web::Path<i64>,
    store: web::Data<dyn CredentialStore>,
) -> Result<HttpResponse, AppError> {
    no_content_or_not_found(store.delete(path.into_inner()).await?)
}
