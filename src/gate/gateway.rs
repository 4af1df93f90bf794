use super::{
    authorize::{AuthorizationEngine, Authorizer},
    config::ProtectionRule,
    extract, handlers,
    notify::Notifier,
    path,
    signer::SigningIdentity,
};
use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Shared state of the gate: the rule, the signing identity and the two
/// collaborators. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

struct Inner {
    rule: ProtectionRule,
    identity: Arc<SigningIdentity>,
    engine: AuthorizationEngine,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("rule", &self.inner.rule)
            .field("identity", &self.inner.identity)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    #[must_use]
    pub fn new(
        rule: ProtectionRule,
        identity: Arc<SigningIdentity>,
        authorizer: Arc<dyn Authorizer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let engine = AuthorizationEngine::new(identity.public_key().clone(), authorizer);
        Self {
            inner: Arc::new(Inner {
                rule,
                identity,
                engine,
                notifier,
            }),
        }
    }

    #[must_use]
    pub fn rule(&self) -> &ProtectionRule {
        &self.inner.rule
    }

    #[must_use]
    pub fn identity(&self) -> &SigningIdentity {
        &self.inner.identity
    }

    #[must_use]
    pub fn engine(&self) -> &AuthorizationEngine {
        &self.inner.engine
    }

    #[must_use]
    pub fn authorizer(&self) -> &Arc<dyn Authorizer> {
        self.inner.engine.authorizer()
    }

    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.inner.notifier
    }
}

/// Middleware deciding what happens to a request.
///
/// Paths outside every protected resource pass straight through. Under a
/// protected resource the gate answers its own endpoints and requires a
/// valid token for everything else, falling back to the login form.
///
/// Every decision uses the canonical path (see [`path::canonicalize`]);
/// a path without one is refused with 400.
#[instrument(skip_all, fields(path = %request.uri().path(), method = %request.method()))]
pub async fn gate(State(gateway): State<Gateway>, request: Request, next: Next) -> Response {
    let rule = gateway.rule();
    let Some(canonical) = path::canonicalize(request.uri().path()) else {
        debug!("refusing path without a canonical form");
        return StatusCode::BAD_REQUEST.into_response();
    };
    let path = canonical.as_str();

    if !rule.is_protected(path) {
        return next.run(request).await;
    }

    if path == rule.public_key_path() {
        return match *request.method() {
            Method::GET | Method::HEAD => handlers::public_key::public_key(&gateway),
            _ => handlers::method_not_allowed(),
        };
    }
    if path == rule.login_path() {
        return match *request.method() {
            Method::GET => handlers::login::login_form(&gateway, &request),
            Method::POST => handlers::login::login(&gateway, request).await,
            _ => handlers::method_not_allowed(),
        };
    }
    if path == rule.signout_path() {
        return handlers::signout::signout(&gateway);
    }

    let authorized = extract::extract(request.headers(), request.uri())
        .and_then(|token| gateway.engine().authorize(&token, path));
    match authorized {
        Ok(claims) => {
            debug!(handle = %claims.handle, "request authorized");
            next.run(request).await
        }
        Err(err) => {
            debug!("request refused: {err}");
            handlers::login::gated_login_form(&gateway, request.uri())
        }
    }
}
