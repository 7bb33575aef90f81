/// Authorization Guard
///
/// Decides whether the caller behind a set of access-token claims may
/// mutate a credential record. Fails closed: absent claims or a subject
/// that is not a numeric id deny.

use crate::auth::claims::TokenClaims;

pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

/// Permitted iff the caller is the target subject or an admin
pub fn can_mutate(claims: Option<&TokenClaims>, target_subject_id: i64) -> bool {
    let Some(claims) = claims else {
        return false;
    };
    let subject_id = match claims.sub.parse::<i64>() {
        Ok(id) => id,
        Err(_) => {
            tracing::warn!("Cannot convert token subject to a subject id");
            return false;
        }
    };
    subject_id == target_subject_id || claims.has_group(ROLE_ADMIN)
}

/// Permitted iff the caller is an admin
pub fn can_mutate_admin_only(claims: Option<&TokenClaims>) -> bool {
    match claims {
        Some(claims) => claims.sub.parse::<i64>().is_ok() && claims.has_group(ROLE_ADMIN),
        None => false,
    }
}
