use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::{
    context::{self, RequestContext},
    errors::AppError,
};

const BEARER_PREFIX: &str = "bearer ";

/// Extracts the caller credential from an `Authorization` header value.
///
/// Accepts `Bearer <token>` (scheme matched case-insensitively) or a bare
/// token. Returns `None` when nothing remains after trimming.
pub fn parse_credential(raw: &str) -> Option<String> {
    let credential = match raw.get(..BEARER_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(BEARER_PREFIX) => &raw[BEARER_PREFIX.len()..],
        _ => raw,
    }
    .trim();

    (!credential.is_empty()).then(|| credential.to_string())
}

pub fn credential_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_credential)
}

/// Rejects requests without a credential; otherwise runs the rest of the
/// request inside a fresh [`RequestContext`].
pub async fn establish_request_context(request: Request, next: Next) -> Result<Response, AppError> {
    let Some(credential) = credential_from_headers(request.headers()) else {
        return Err(AppError::unauthorized(
            "missing_api_key",
            "Missing Authorization API key",
        ));
    };

    Ok(context::run(RequestContext::new(credential), next.run(request)).await)
}
