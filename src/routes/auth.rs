/// Authentication Routes
///
/// Registration, login, token issuance and rotation, logout, and the
/// guarded mutations of a subject's own credential record.

use std::collections::BTreeSet;

use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{
    can_mutate, can_mutate_admin_only, hash_password, validate_secret, verify_password,
    verify_unknown_subject, TokenClaims,
};
use crate::configuration::LoginSettings;
use crate::credentials::CredentialStore;
use crate::error::{AppError, AuthError, ErrorContext, ValidationError};
use crate::issuance::{IssuedTokens, TokenService};
use crate::security::{delete_refresh_token_cookie, extract_refresh_token, refresh_token_cookie};
use crate::validators::parse_username;

/// Username and plaintext secret
#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub secret: String,
}

#[derive(Deserialize)]
pub struct RegisterQuery {
    #[serde(rename = "no-login", default)]
    pub no_login: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub subject_id: i64,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

/// Access token only; the refresh token travels in the cookie
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub access_expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub access_expires_at: DateTime<Utc>,
}

/// Response carrying the access token in the body and the refresh token
/// in the `r_token` cookie
fn cookie_token_response(tokens: IssuedTokens, refresh_lifetime: i64) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(refresh_token_cookie(&tokens.refresh_token, refresh_lifetime))
        .json(AccessTokenResponse {
            access_token: tokens.access_token,
            access_expires_at: tokens.access_expires_at,
        })
}

/// 401 that also tells the client to drop its refresh cookie
fn refresh_rejected() -> Result<HttpResponse, AppError> {
    let mut response = AppError::Auth(AuthError::RefreshRejected).error_response();
    response
        .add_cookie(&delete_refresh_token_cookie())
        .map_err(|e| AppError::Internal(format!("Failed to set cookie: {}", e)))?;
    Ok(response)
}

/// Public routes do not confirm which subject ids exist
fn unknown_subject() -> AppError {
    AppError::Validation(ValidationError::InvalidFormat("subject id".to_string()))
}

async fn hash_secret(secret: String) -> Result<String, AppError> {
    validate_secret(&secret)?;
    web::block(move || hash_password(&secret)).await?
}

/// POST /auth/register[?no-login=true]
///
/// Creates a record with no groups. With `no-login` the new id is returned
/// as text, otherwise the subject is logged in right away.
///
/// # Errors
/// - 400: Invalid username or secret
/// - 409: Username taken
pub async fn register(
    query: web::Query<RegisterQuery>,
    body: web::Json<CredentialsRequest>,
    credentials: web::Data<dyn CredentialStore>,
    tokens: web::Data<TokenService>,
) -> Result<HttpResponse, AppError> {
    let CredentialsRequest { username, secret } = body.into_inner();
    let username = parse_username(&username)?;
    let secret_hash = hash_secret(secret).await?;

    let subject_id = credentials.create(&username, &secret_hash).await?;
    tracing::info!(subject_id, "Registered new subject");

    if query.no_login {
        return Ok(HttpResponse::Ok().body(subject_id.to_string()));
    }

    let issued = tokens.issue(subject_id, BTreeSet::new()).await?;
    Ok(cookie_token_response(
        issued,
        tokens.signer().refresh_token_expiry(),
    ))
}

/// POST /auth/login
///
/// # Security Notes
/// - Unknown username and wrong secret give the same 401
/// - Both run one bcrypt verification and wait the same fixed delay
pub async fn login(
    body: web::Json<CredentialsRequest>,
    credentials: web::Data<dyn CredentialStore>,
    tokens: web::Data<TokenService>,
    settings: web::Data<LoginSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("login");
    let CredentialsRequest { username, secret } = body.into_inner();
    let username = parse_username(&username)?;

    let record = match credentials.find(&username).await? {
        Some(record) => record,
        None => {
            web::block(move || verify_unknown_subject(&secret)).await?;
            return mismatch(&context, settings.get_ref()).await;
        }
    };

    let stored_hash = record.secret_hash.clone();
    let matches = web::block(move || verify_password(&secret, &stored_hash)).await??;
    if !matches {
        return mismatch(&context, settings.get_ref()).await;
    }

    let issued = tokens.issue(record.id, record.groups).await?;
    tracing::info!(request_id = %context.request_id, subject_id = record.id, "Login succeeded");

    Ok(cookie_token_response(
        issued,
        tokens.signer().refresh_token_expiry(),
    ))
}

async fn mismatch(context: &ErrorContext, settings: &LoginSettings) -> Result<HttpResponse, AppError> {
    tracing::info!(request_id = %context.request_id, "Login credentials mismatch");
    tokio::time::sleep(settings.mismatch_delay()).await;
    Err(AppError::Auth(AuthError::InvalidCredentials))
}

/// POST /auth/generate (internal listener only)
///
/// Issues a pair for a subject another service has already authenticated.
pub async fn generate(
    body: web::Json<GenerateRequest>,
    tokens: web::Data<TokenService>,
) -> Result<HttpResponse, AppError> {
    let GenerateRequest { subject_id, groups } = body.into_inner();
    let issued = tokens.issue(subject_id, groups).await?;

    Ok(HttpResponse::Ok()
        .cookie(refresh_token_cookie(
            &issued.refresh_token,
            tokens.signer().refresh_token_expiry(),
        ))
        .json(TokenPairResponse {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            access_expires_at: issued.access_expires_at,
        }))
}

/// POST /auth/refresh
///
/// Reads the refresh token from the cookie or a Bearer header. Any failure
/// to redeem it is a 401 with a delete-cookie; store faults stay 500.
pub async fn refresh(
    req: HttpRequest,
    tokens: web::Data<TokenService>,
) -> Result<HttpResponse, AppError> {
    let raw = match extract_refresh_token(&req) {
        Some(raw) => raw,
        None => return refresh_rejected(),
    };

    match tokens.rotate(&raw).await {
        Ok(Some(issued)) => Ok(cookie_token_response(
            issued,
            tokens.signer().refresh_token_expiry(),
        )),
        Ok(None) | Err(AppError::Auth(_)) | Err(AppError::Validation(_)) => refresh_rejected(),
        Err(e) => Err(e),
    }
}

/// POST /auth/logout
pub async fn logout(
    claims: web::ReqData<TokenClaims>,
    tokens: web::Data<TokenService>,
) -> Result<HttpResponse, AppError> {
    let subject_id = claims.subject_id()?;
    tokens.revoke(subject_id).await?;

    Ok(HttpResponse::NoContent()
        .cookie(delete_refresh_token_cookie())
        .finish())
}

/// PUT /auth/{id}/username
pub async fn update_username(
    path: web::Path<i64>,
    claims: Option<web::ReqData<TokenClaims>>,
    body: String,
    credentials: web::Data<dyn CredentialStore>,
) -> Result<HttpResponse, AppError> {
    let subject_id = path.into_inner();
    if !can_mutate(claims.as_deref(), subject_id) {
        return Err(AuthError::Forbidden.into());
    }

    let username = parse_username(&body)?;
    if !credentials.update_username(subject_id, &username).await? {
        return Err(unknown_subject());
    }
    Ok(HttpResponse::NoContent().finish())
}

/// PUT /auth/{id}/secret
pub async fn update_secret(
    path: web::Path<i64>,
    claims: Option<web::ReqData<TokenClaims>>,
    body: String,
    credentials: web::Data<dyn CredentialStore>,
) -> Result<HttpResponse, AppError> {
    let subject_id = path.into_inner();
    if !can_mutate(claims.as_deref(), subject_id) {
        return Err(AuthError::Forbidden.into());
    }

    let secret_hash = hash_secret(body).await?;
    if !credentials.update_secret(subject_id, &secret_hash).await? {
        return Err(unknown_subject());
    }
    Ok(HttpResponse::NoContent().finish())
}

/// PUT /auth/{id}/groups (admin only)
pub async fn update_groups(
    path: web::Path<i64>,
    claims: Option<web::ReqData<TokenClaims>>,
    body: web::Json<BTreeSet<String>>,
    credentials: web::Data<dyn CredentialStore>,
) -> Result<HttpResponse, AppError> {
    let subject_id = path.into_inner();
    if !can_mutate_admin_only(claims.as_deref()) {
        return Err(AuthError::Forbidden.into());
    }

    if !credentials.update_groups(subject_id, &body).await? {
        return Err(unknown_subject());
    }
    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /auth/{id} (admin only)
///
/// Removes the record, then every refresh token of the subject.
pub async fn delete(
    path: web::Path<i64>,
    claims: Option<web::ReqData<TokenClaims>>,
    credentials: web::Data<dyn CredentialStore>,
    tokens: web::Data<TokenService>,
) -> Result<HttpResponse, AppError> {
    let subject_id = path.into_inner();
    if !can_mutate_admin_only(claims.as_deref()) {
        return Err(AuthError::Forbidden.into());
    }

    if !credentials.delete(subject_id).await? {
        return Err(unknown_subject());
    }
    let revoked = tokens.revoke(subject_id).await?;
    tracing::info!(subject_id, revoked, "Deleted subject");

    Ok(HttpResponse::NoContent().finish())
}
