/// Response security helpers
///
/// - Cache-Control value shared by every response of this service
/// - The HTTP-only refresh token cookie (issue and delete variants)

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;

pub const CACHE_CONTROL_ALL_OFF: &str = "private, no-store, no-cache";

pub const REFRESH_TOKEN_COOKIE_NAME: &str = "r_token";
const REFRESH_TOKEN_COOKIE_PATH: &str = "/auth";

/// Cookie delivering a refresh token out of band
///
/// `max_age_seconds` should equal the refresh token lifetime.
pub fn refresh_token_cookie(refresh_token: &str, max_age_seconds: i64) -> Cookie<'static> {
    Cookie::build(REFRESH_TOKEN_COOKIE_NAME, refresh_token.to_string())
        .path(REFRESH_TOKEN_COOKIE_PATH)
        .max_age(Duration::seconds(max_age_seconds))
        .http_only(true)
        .same_site(SameSite::Strict)
        .finish()
}

/// `Max-Age=0` acts as a delete-cookie instruction for the client
pub fn delete_refresh_token_cookie() -> Cookie<'static> {
    refresh_token_cookie("", 0)
}

/// Read the raw refresh token from the cookie, falling back to a Bearer header
pub fn extract_refresh_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(REFRESH_TOKEN_COOKIE_NAME) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }
    extract_bearer_token(req)
}

pub fn extract_bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
