use super::handlers;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(description = "Passwordless magic-link gate"),
    paths(
        handlers::health::health,
        handlers::login::login_form,
        handlers::login::login,
        handlers::signout::signout,
        handlers::public_key::public_key,
    ),
    components(schemas(handlers::health::Health, handlers::login::LoginForm)),
    tags(
        (name = "login", description = "Login link issuance, redemption and sign-out"),
        (name = "keys", description = "Token verification key"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

/// OpenAPI document for the gateway endpoints, relative to a `/` base path.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
