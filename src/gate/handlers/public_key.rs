use crate::gate::gateway::Gateway;
use axum::{
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

pub const CONTENT_TYPE_PKIX: &str = "application/pkix-cert";

#[utoipa::path(
    get,
    path = "/pub.cer",
    responses(
        (status = 200, description = "PEM encoded public key used to verify tokens", body = String, content_type = "application/pkix-cert"),
        (status = 500, description = "Public key could not be encoded"),
    ),
    tag = "keys"
)]
pub fn public_key(gateway: &Gateway) -> Response {
    match gateway.identity().public_key_pem() {
        Ok(pem) => ([(CONTENT_TYPE, CONTENT_TYPE_PKIX)], pem).into_response(),
        Err(err) => {
            error!("Failed to export public key: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
