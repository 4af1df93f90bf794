use super::{escape_html, token_cookie};
use crate::gate::{
    claims::{now_unix, Claims},
    extract,
    gateway::Gateway,
    notify::spawn_delivery,
};
use axum::{
    extract::{FromRequest, Request},
    http::{header::SET_COOKIE, HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

/// Same answer for every submitted handle.
pub const ACKNOWLEDGEMENT: &str = "<html><body><p>If your handle is authorized, a login link has been sent to it.</p></body></html>";

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct LoginForm {
    /// Identifier the login link is sent to, e.g. an email address.
    #[serde(default)]
    handle: String,
    /// Page the visitor was trying to reach.
    #[serde(default)]
    url: Option<String>,
}

fn form_page(action: &str, resume: Option<&str>) -> String {
    let hidden = resume.map_or_else(String::new, |url| {
        format!(
            "<input type=\"hidden\" name=\"url\" value=\"{}\"/>\n",
            escape_html(url)
        )
    });
    format!(
        "<html><body>\n<form action=\"{}\" method=\"POST\">\n{hidden}<input type=\"text\" name=\"handle\"/>\n<input type=\"submit\"/>\n</form></body></html>\n",
        escape_html(action)
    )
}

#[utoipa::path(
    get,
    path = "/login",
    params(("token" = Option<String>, Query, description = "Login token from a delivered link")),
    responses(
        (status = 200, description = "Handle entry form", body = String, content_type = "text/html"),
        (status = 303, description = "Token stored in the jwt_token cookie"),
    ),
    tag = "login"
)]
/// `GET <base>/login`: redeem a token from the query string into the
/// cookie, or show the handle form.
pub fn login_form(gateway: &Gateway, request: &Request) -> Response {
    let login_path = gateway.rule().login_path();
    let Some(token) = extract::query_token(request.uri()) else {
        return Html(form_page(&login_path, None)).into_response();
    };

    let mut headers = HeaderMap::new();
    match token_cookie(&token, gateway.rule().cookie_secure()) {
        Some(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        None => debug!("refusing to store malformed token in cookie"),
    }
    (headers, Redirect::to(&login_path)).into_response()
}

#[utoipa::path(
    post,
    path = "/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Acknowledged, whether or not the handle is authorized", body = String, content_type = "text/html"),
        (status = 303, description = "Empty handle, back to the form"),
    ),
    tag = "login"
)]
/// `POST <base>/login`: send a login link if the handle is allowed.
///
/// The response never depends on the outcome.
#[instrument(skip_all)]
pub async fn login(gateway: &Gateway, request: Request) -> Response {
    let form = match Form::<LoginForm>::from_request(request, &()).await {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!("unreadable login form: {rejection}");
            LoginForm::default()
        }
    };

    let handle = form.handle.trim();
    if handle.is_empty() {
        return Redirect::to(&gateway.rule().login_path()).into_response();
    }

    if let Some(resume) = form.url.as_deref() {
        debug!(resume, "login form resumed from protected page");
    }

    if gateway.authorizer().is_authorized(handle) {
        issue_and_deliver(gateway, handle);
    } else {
        debug!("login requested for handle outside the allow-list");
    }

    acknowledgement()
}

fn issue_and_deliver(gateway: &Gateway, handle: &str) {
    let rule = gateway.rule();
    let claims = Claims::new(handle, rule.resources(), now_unix(), rule.lifetime());
    let token = match gateway.identity().issue(&claims) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue token: {err}");
            return;
        }
    };
    let url = rule.login_url(&token);
    info!(handle, expires = claims.expires, "login link issued");
    spawn_delivery(
        gateway.notifier().clone(),
        handle.to_string(),
        url.to_string(),
        rule.delivery_timeout(),
    );
}

fn acknowledgement() -> Response {
    (StatusCode::OK, Html(ACKNOWLEDGEMENT)).into_response()
}

/// Login form shown in place of a protected resource. Keeps the requested
/// URL so it can be resumed.
#[must_use]
pub fn gated_login_form(gateway: &Gateway, requested: &Uri) -> Response {
    let resume = requested
        .path_and_query()
        .map_or_else(|| requested.path().to_string(), ToString::to_string);
    (
        StatusCode::UNAUTHORIZED,
        Html(form_page(&gateway.rule().login_path(), Some(&resume))),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_form_posts_back() {
        let page = form_page("/login", None);
        assert!(page.contains("action=\"/login\""));
        assert!(page.contains("method=\"POST\""));
        assert!(page.contains("name=\"handle\""));
        assert!(!page.contains("name=\"url\""));
    }

    #[test]
    fn resume_url_is_escaped() {
        let page = form_page("/auth/login", Some("/a?x=\"><script>"));
        assert!(page.contains("action=\"/auth/login\""));
        assert!(page.contains("value=\"/a?x=&quot;&gt;&lt;script&gt;\""));
        assert!(!page.contains("<script>"));
    }

    #[test]
    fn acknowledgement_is_fixed() {
        let response = acknowledgement();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!ACKNOWLEDGEMENT.contains('{'));
    }
}
