use super::clear_token_cookie;
use crate::gate::gateway::Gateway;
use axum::{
    http::header::SET_COOKIE,
    response::{IntoResponse, Redirect, Response},
};

#[utoipa::path(
    get,
    path = "/signout",
    responses(
        (status = 303, description = "Cookie cleared, redirected to the login page"),
    ),
    tag = "login"
)]
/// Any method on `<base>/signout`. The cookie is always cleared, whether or
/// not the request carried one.
pub fn signout(gateway: &Gateway) -> Response {
    let rule = gateway.rule();
    (
        [(SET_COOKIE, clear_token_cookie(rule.cookie_secure()))],
        Redirect::to(&rule.login_path()),
    )
        .into_response()
}
