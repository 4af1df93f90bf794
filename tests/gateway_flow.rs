use anyhow::{anyhow, Result};
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        Method, Request, StatusCode,
    },
    response::Response,
    Router,
};
use passgate::gate::{
    claims::now_unix, router, Claims, Gateway, InMemoryAuthorizer, Notifier, ProtectionRule,
    SigningIdentity,
};
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use url::Url;

const SIGNING_KEY: &str = include_str!("fixtures/signing_key.pem");
const OTHER_KEY: &str = include_str!("fixtures/other_key.pem");

struct Outbox(UnboundedSender<(String, String)>);

impl Notifier for Outbox {
    fn send<'a>(
        &'a self,
        handle: &'a str,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.0
                .send((handle.to_string(), url.to_string()))
                .map_err(|_| anyhow!("outbox closed"))
        })
    }
}

/// Always fails to deliver.
struct Broken;

impl Notifier for Broken {
    fn send<'a>(
        &'a self,
        _handle: &'a str,
        _url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async { Err(anyhow!("relay unreachable")) })
    }
}

/// Never finishes delivering.
struct Stalled;

impl Notifier for Stalled {
    fn send<'a>(
        &'a self,
        _handle: &'a str,
        _url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(std::future::pending())
    }
}

struct Harness {
    app: Router,
    identity: Arc<SigningIdentity>,
    authorizer: Arc<InMemoryAuthorizer>,
    outbox: UnboundedReceiver<(String, String)>,
}

/// Gate with endpoints under `/a`, protecting `/a` and `/b`, in front of
/// `downstream`.
fn gated<S>(
    notifier: Arc<dyn Notifier>,
    downstream: S,
) -> Result<(Router, Arc<SigningIdentity>, Arc<InMemoryAuthorizer>)>
where
    S: tower::Service<Request<Body>, Error = std::convert::Infallible> + Clone + Send + 'static,
    S::Response: axum::response::IntoResponse,
    S::Future: Send + 'static,
{
    let identity = Arc::new(SigningIdentity::from_pem(SIGNING_KEY)?);
    let authorizer = Arc::new(InMemoryAuthorizer::new(["alice@example.com"]));

    let rule = ProtectionRule::new(Url::parse("http://localhost:8080")?)
        .with_base_path("/a")
        .with_resources(["/a", "/b"])
        .with_lifetime(Duration::from_secs(300))
        .normalize()?;

    let gateway = Gateway::new(rule, identity.clone(), authorizer.clone(), notifier);

    Ok((router(gateway, downstream), identity, authorizer))
}

fn harness() -> Result<Harness> {
    let (tx, outbox) = unbounded_channel();
    let downstream = Router::new().fallback(|| async { "protected content" });
    let (app, identity, authorizer) = gated(Arc::new(Outbox(tx)), downstream)?;

    Ok(Harness {
        app,
        identity,
        authorizer,
        outbox,
    })
}

fn get(uri: &str) -> Result<Request<Body>> {
    Ok(Request::builder().uri(uri).body(Body::empty())?)
}

fn login_post(handle: &str) -> Result<Request<Body>> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("handle", handle)
        .finish();
    Ok(Request::builder()
        .method(Method::POST)
        .uri("/a/login")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))?)
}

async fn body_string(response: Response) -> Result<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn header<'a>(response: &'a Response, name: axum::http::HeaderName) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn token_for(identity: &SigningIdentity, resources: &[&str], lifetime: u64) -> Result<String> {
    let resources: Vec<String> = resources.iter().map(ToString::to_string).collect();
    let claims = Claims::new(
        "alice@example.com",
        &resources,
        now_unix(),
        Duration::from_secs(lifetime),
    );
    Ok(identity.issue(&claims)?)
}

#[tokio::test]
async fn magic_link_round_trip() -> Result<()> {
    let mut h = harness()?;

    let response = h.app.clone().oneshot(login_post("alice@example.com")?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let (handle, link) = tokio::time::timeout(Duration::from_secs(5), h.outbox.recv())
        .await?
        .ok_or_else(|| anyhow!("no login link delivered"))?;
    assert_eq!(handle, "alice@example.com");
    let link = Url::parse(&link)?;
    assert_eq!(link.origin().ascii_serialization(), "http://localhost:8080");
    assert_eq!(link.path(), "/a/login");
    let token = link
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| anyhow!("link without token"))?;

    let redeem = format!("/a/login?{}", link.query().unwrap_or_default());
    let response = h.app.clone().oneshot(get(&redeem)?).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(header(&response, LOCATION), "/a/login");
    let cookie = header(&response, SET_COOKIE).to_string();
    assert!(cookie.starts_with(&format!("jwt_token={token};")));
    assert!(cookie.contains("HttpOnly"));
    assert!(!cookie.contains("Secure"));

    let request = Request::builder()
        .uri("/a/resource")
        .header(COOKIE, format!("jwt_token={token}"))
        .body(Body::empty())?;
    let response = h.app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await?, "protected content");
    Ok(())
}

#[tokio::test]
async fn acknowledgement_does_not_reveal_membership() -> Result<()> {
    let mut h = harness()?;

    let allowed = h.app.clone().oneshot(login_post("alice@example.com")?).await?;
    let unknown = h.app.clone().oneshot(login_post("mallory@example.com")?).await?;

    assert_eq!(allowed.status(), unknown.status());
    assert_eq!(
        header(&allowed, CONTENT_TYPE),
        header(&unknown, CONTENT_TYPE)
    );
    assert!(allowed.headers().get(SET_COOKIE).is_none());
    assert!(unknown.headers().get(SET_COOKIE).is_none());
    assert_eq!(body_string(allowed).await?, body_string(unknown).await?);

    let delivered = tokio::time::timeout(Duration::from_secs(5), h.outbox.recv()).await?;
    assert_eq!(
        delivered.map(|(handle, _)| handle),
        Some("alice@example.com".to_string())
    );
    // nothing for the unknown handle
    assert!(h.outbox.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn empty_handle_returns_to_form() -> Result<()> {
    let mut h = harness()?;
    let response = h.app.clone().oneshot(login_post("   ")?).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(header(&response, LOCATION), "/a/login");
    assert!(h.outbox.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn login_form_is_served() -> Result<()> {
    let h = harness()?;
    let response = h.app.clone().oneshot(get("/a/login")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await?;
    assert!(body.contains("name=\"handle\""));
    assert!(body.contains("action=\"/a/login\""));
    Ok(())
}

#[tokio::test]
async fn signout_clears_cookie() -> Result<()> {
    let h = harness()?;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/a/signout")
        .body(Body::empty())?;
    let response = h.app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(header(&response, LOCATION), "/a/login");
    let cookie = header(&response, SET_COOKIE);
    assert!(cookie.starts_with("jwt_token=;"));
    assert!(cookie.contains("Max-Age=0"));
    Ok(())
}

#[tokio::test]
async fn public_key_export() -> Result<()> {
    let h = harness()?;
    let response = h.app.clone().oneshot(get("/a/pub.cer")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, CONTENT_TYPE), "application/pkix-cert");
    let body = body_string(response).await?;
    assert_eq!(body, h.identity.public_key_pem()?);
    assert!(body.starts_with("-----BEGIN PUBLIC KEY-----"));

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/a/pub.cer")
        .body(Body::empty())?;
    let response = h.app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    Ok(())
}

#[tokio::test]
async fn unprotected_paths_bypass_the_gate() -> Result<()> {
    let h = harness()?;
    let response = h.app.clone().oneshot(get("/public/page")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await?, "protected content");

    // segment-aware: /abc is not under /a
    let response = h.app.clone().oneshot(get("/abc")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn missing_token_shows_login_form_with_resume_url() -> Result<()> {
    let h = harness()?;
    let response = h.app.clone().oneshot(get("/b/report?page=2")?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_string(response).await?;
    assert!(body.contains("name=\"url\" value=\"/b/report?page=2\""));
    assert!(body.contains("action=\"/a/login\""));
    assert!(!body.contains("protected content"));
    Ok(())
}

#[tokio::test]
async fn token_from_other_key_is_refused() -> Result<()> {
    let h = harness()?;
    let other = SigningIdentity::from_pem(OTHER_KEY)?;
    let token = token_for(&other, &["/a"], 300)?;
    let request = Request::builder()
        .uri("/a/resource")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())?;
    let response = h.app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn header_takes_precedence_over_cookie() -> Result<()> {
    let h = harness()?;
    let good = token_for(&h.identity, &["/a"], 300)?;

    let request = Request::builder()
        .uri("/a/resource")
        .header(AUTHORIZATION, "Bearer not.a.token")
        .header(COOKIE, format!("jwt_token={good}"))
        .body(Body::empty())?;
    let response = h.app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/a/resource")
        .header(AUTHORIZATION, format!("Bearer {good}"))
        .header(COOKIE, "jwt_token=not.a.token")
        .body(Body::empty())?;
    let response = h.app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn token_scope_is_enforced() -> Result<()> {
    let h = harness()?;
    let token = token_for(&h.identity, &["/a"], 300)?;

    let allowed = get(&format!("/a/page?token={token}"))?;
    let response = h.app.clone().oneshot(allowed).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let denied = get(&format!("/b/page?token={token}"))?;
    let response = h.app.clone().oneshot(denied).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn expired_token_is_refused() -> Result<()> {
    let h = harness()?;
    let resources = vec!["/a".to_string()];
    let claims = Claims::new(
        "alice@example.com",
        &resources,
        now_unix() - 120,
        Duration::from_secs(60),
    );
    let token = h.identity.issue(&claims)?;
    let request = Request::builder()
        .uri("/a/resource")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())?;
    let response = h.app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn revoked_handle_loses_access() -> Result<()> {
    let h = harness()?;
    let token = token_for(&h.identity, &["/a"], 300)?;
    let request = || -> Result<Request<Body>> {
        Ok(Request::builder()
            .uri("/a/resource")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())?)
    };

    let response = h.app.clone().oneshot(request()?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(h.authorizer.remove("alice@example.com"));
    let response = h.app.clone().oneshot(request()?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn login_rejects_other_methods() -> Result<()> {
    let h = harness()?;
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/a/login")
        .body(Body::empty())?;
    let response = h.app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    Ok(())
}

#[tokio::test]
async fn health_is_outside_the_gate() -> Result<()> {
    let h = harness()?;
    let response = h.app.clone().oneshot(get("/health")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());
    Ok(())
}

#[tokio::test]
async fn failed_delivery_keeps_the_acknowledgement() -> Result<()> {
    let h = harness()?;
    let response = h.app.clone().oneshot(login_post("alice@example.com")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let expected = body_string(response).await?;

    let downstream = Router::new().fallback(|| async { "protected content" });
    let notifiers: [Arc<dyn Notifier>; 2] = [Arc::new(Broken), Arc::new(Stalled)];
    for notifier in notifiers {
        let (app, _, _) = gated(notifier, downstream.clone())?;
        let response = tokio::time::timeout(
            Duration::from_secs(5),
            app.oneshot(login_post("alice@example.com")?),
        )
        .await??;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await?, expected);
    }
    Ok(())
}

#[tokio::test]
async fn encoded_paths_cannot_skip_the_gate() -> Result<()> {
    let root = tempfile::tempdir()?;
    std::fs::create_dir(root.path().join("a"))?;
    std::fs::write(root.path().join("a/secret.txt"), "TOP SECRET")?;

    let (tx, _outbox) = unbounded_channel();
    let (app, identity, _) = gated(Arc::new(Outbox(tx)), ServeDir::new(root.path()))?;
    let token = token_for(&identity, &["/a"], 300)?;

    for uri in [
        "/a/secret.txt",
        "/%61/secret.txt",
        "//a/secret.txt",
        "/./a/secret.txt",
        "/a/./secret.txt",
        "/a%2Fsecret.txt",
    ] {
        let response = app.clone().oneshot(get(uri)?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        assert!(!body_string(response).await?.contains("TOP SECRET"), "{uri}");

        let request = Request::builder()
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())?;
        let response = app.clone().oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(body_string(response).await?, "TOP SECRET", "{uri}");
    }

    for uri in ["/a/../a/secret.txt", "/b/%2e%2e/a/secret.txt", "/a/%ff"] {
        let response = app.clone().oneshot(get(uri)?).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
    Ok(())
}

#[tokio::test]
async fn redemption_redirect_stays_on_site() -> Result<()> {
    let h = harness()?;
    let token = token_for(&h.identity, &["/a"], 300)?;
    let response = h
        .app
        .clone()
        .oneshot(get(&format!("//a/login?token={token}"))?)
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(header(&response, LOCATION), "/a/login");
    Ok(())
}
