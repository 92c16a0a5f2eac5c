use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use pasetors::claims::ClaimsValidationRules;
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use uuid::Uuid;

use crate::http::AppError;
use crate::AppState;

/// Issuer/audience the platform's auth service stamps into access tokens.
pub const TOKEN_ISSUER: &str = "domus";

/// The authenticated caller, recovered from a PASETO v4.local access token.
/// Session issuance and refresh live in the platform's auth service; this
/// extractor only verifies with the shared key.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::unauthorized("invalid Authorization header"))?;

        let user_id = verify_access_token(token, state.paseto_access_key)
            .ok_or_else(|| AppError::unauthorized("invalid token"))?;

        Ok(AuthUser { user_id })
    }
}

/// Decrypt and validate an access token, returning the subject user id.
pub fn verify_access_token(token: &str, key_bytes: [u8; 32]) -> Option<Uuid> {
    let key = SymmetricKey::<V4>::from(&key_bytes).ok()?;
    let mut rules = ClaimsValidationRules::new();
    rules.validate_issuer_with(TOKEN_ISSUER);
    rules.validate_audience_with(TOKEN_ISSUER);

    let untrusted = UntrustedToken::<Local, V4>::try_from(token).ok()?;
    let trusted = local::decrypt(&key, &untrusted, &rules, None, None).ok()?;
    let claims = trusted.payload_claims()?;

    let is_access = claims
        .get_claim("typ")
        .and_then(|value| value.as_str())
        .map(|value| value == "access")
        .unwrap_or(false);
    if !is_access {
        return None;
    }

    let subject = claims.get_claim("sub").and_then(|value| value.as_str())?;
    Uuid::parse_str(subject).ok()
}
