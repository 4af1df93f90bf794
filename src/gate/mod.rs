//! Magic-link gate: token issuance, verification and the request flow
//! around protected paths.

pub mod authorize;
pub mod claims;
pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod handlers;
pub mod notify;
pub mod path;
pub mod signer;

mod openapi;

pub use authorize::{AuthorizationEngine, Authorizer, InMemoryAuthorizer};
pub use claims::Claims;
pub use config::ProtectionRule;
pub use error::Error;
pub use gateway::{gate, Gateway};
pub use notify::{LogNotifier, MessageTemplate, Notifier, RelayNotifier};
pub use openapi::openapi;
pub use signer::SigningIdentity;

use anyhow::Result;
use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::{convert::Infallible, path::PathBuf};
use tokio::net::TcpListener;
use tower::{Service, ServiceBuilder};
use tower_http::{
    request_id::PropagateRequestIdLayer, services::ServeDir, set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

/// Put `downstream` behind the gate. `/health` is answered before the gate.
pub fn router<S>(gateway: Gateway, downstream: S) -> Router
where
    S: Service<Request, Error = Infallible> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
{
    let gated = ServiceBuilder::new()
        .layer(from_fn_with_state(gateway, gate))
        .service(downstream);

    Router::new()
        .route("/health", get(handlers::health))
        .fallback_service(gated)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
}

/// Start the server, serving files from `root` behind the gate.
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, gateway: Gateway, root: PathBuf) -> Result<()> {
    let app = router(gateway, ServeDir::new(root));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.path = request.uri().path(),
        request_id
    )
}
