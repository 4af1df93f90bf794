use super::claims::{now_unix, Claims};
use super::error::{Denial, Error};
use super::path::PatternCache;
use super::signer;
use rsa::RsaPublicKey;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Decides whether a handle may hold a token.
pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, handle: &str) -> bool;
}

/// Allow-list kept in memory. Handles are compared trimmed and lowercased.
#[derive(Debug, Default)]
pub struct InMemoryAuthorizer {
    handles: RwLock<HashSet<String>>,
}

fn normalize_handle(handle: &str) -> String {
    handle.trim().to_ascii_lowercase()
}

impl InMemoryAuthorizer {
    #[must_use]
    pub fn new<I, S>(handles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let handles = handles
            .into_iter()
            .map(|h| normalize_handle(h.as_ref()))
            .filter(|h| !h.is_empty())
            .collect();
        Self {
            handles: RwLock::new(handles),
        }
    }

    /// Returns `false` if the handle was already present or is blank.
    pub fn add(&self, handle: &str) -> bool {
        let handle = normalize_handle(handle);
        if handle.is_empty() {
            return false;
        }
        match self.handles.write() {
            Ok(mut handles) => handles.insert(handle),
            Err(_) => {
                warn!("authorizer lock poisoned, handle not added");
                false
            }
        }
    }

    pub fn remove(&self, handle: &str) -> bool {
        match self.handles.write() {
            Ok(mut handles) => handles.remove(&normalize_handle(handle)),
            Err(_) => {
                warn!("authorizer lock poisoned, handle not removed");
                false
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.read().map_or(0, |handles| handles.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Authorizer for InMemoryAuthorizer {
    fn is_authorized(&self, handle: &str) -> bool {
        // A poisoned lock denies everyone.
        self.handles
            .read()
            .is_ok_and(|handles| handles.contains(&normalize_handle(handle)))
    }
}

/// Request-time check of a presented token: signature, expiry, handle and
/// resource scope, in that order.
#[derive(Clone)]
pub struct AuthorizationEngine {
    public_key: RsaPublicKey,
    authorizer: Arc<dyn Authorizer>,
    patterns: Arc<PatternCache>,
}

impl std::fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEngine").finish_non_exhaustive()
    }
}

impl AuthorizationEngine {
    #[must_use]
    pub fn new(public_key: RsaPublicKey, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            public_key,
            authorizer,
            patterns: Arc::new(PatternCache::new()),
        }
    }

    #[must_use]
    pub fn authorizer(&self) -> &Arc<dyn Authorizer> {
        &self.authorizer
    }

    /// Authorize `token` for `request_path` at the current time.
    ///
    /// # Errors
    /// Returns [`Error::InvalidToken`] on any failure.
    pub fn authorize(&self, token: &str, request_path: &str) -> Result<Claims, Error> {
        self.authorize_at(token, request_path, now_unix())
    }

    /// Authorize `token` for `request_path` as of `now` (Unix seconds).
    ///
    /// # Errors
    /// Returns [`Error::InvalidToken`] on any failure.
    pub fn authorize_at(&self, token: &str, request_path: &str, now: i64) -> Result<Claims, Error> {
        authorize(
            token,
            &self.public_key,
            self.authorizer.as_ref(),
            &self.patterns,
            request_path,
            now,
        )
        .map_err(|denial| {
            debug!(%denial, path = request_path, "token refused");
            Error::InvalidToken
        })
    }
}

fn authorize(
    token: &str,
    public_key: &RsaPublicKey,
    authorizer: &dyn Authorizer,
    patterns: &PatternCache,
    request_path: &str,
    now: i64,
) -> Result<Claims, Denial> {
    let claims = signer::verify(token, public_key).map_err(|_| Denial::Signature)?;
    if claims.is_expired(now) {
        return Err(Denial::Expired);
    }
    // Re-checked on every request so removing a handle revokes its tokens.
    if !authorizer.is_authorized(&claims.handle) {
        return Err(Denial::Handle);
    }
    if !patterns.matches_any(&claims.resources, request_path) {
        return Err(Denial::Scope);
    }
    Ok(claims)
}
