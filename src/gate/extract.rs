use super::error::Error;
use axum::http::{
    header::{AUTHORIZATION, COOKIE},
    HeaderMap, Uri,
};

pub const COOKIE_NAME: &str = "jwt_token";

pub const QUERY_PARAM: &str = "token";

const BEARER_PREFIX: &str = "Bearer ";

/// Find the token carried by a request.
///
/// Carriers are tried in a fixed order: `Authorization: Bearer`, then the
/// `token` query parameter, then the `jwt_token` cookie.
///
/// # Errors
/// Returns [`Error::NoToken`] if no carrier holds a token.
pub fn extract(headers: &HeaderMap, uri: &Uri) -> Result<String, Error> {
    bearer_token(headers)
        .or_else(|| query_token(uri))
        .or_else(|| cookie_token(headers))
        .ok_or(Error::NoToken)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Value of the `token` query parameter, if present and non-empty.
#[must_use]
pub fn query_token(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Value of the `jwt_token` cookie, if present.
#[must_use]
pub fn cookie_token(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            if key.trim() == COOKIE_NAME {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}
