pub mod health;
pub use self::health::health;

pub mod login;
pub mod public_key;
pub mod signout;

// common functions for the handlers
use super::extract::COOKIE_NAME;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

#[must_use]
pub fn method_not_allowed() -> Response {
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

/// Escape text for use in HTML bodies and quoted attributes.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Tokens are base64url segments joined by dots; anything else is never
/// written into a cookie.
#[must_use]
pub fn is_token_shaped(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// `Set-Cookie` value storing the token for the whole site.
#[must_use]
pub fn token_cookie(token: &str, secure: bool) -> Option<HeaderValue> {
    if !is_token_shaped(token) {
        return None;
    }
    let mut cookie = format!("{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

/// `Set-Cookie` value that makes the browser drop the token.
#[must_use]
pub fn clear_token_cookie(secure: bool) -> HeaderValue {
    let mut cookie = format!(
        "{COOKIE_NAME}=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; HttpOnly; SameSite=Lax"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static("jwt_token=; Max-Age=0"))
}
