use super::error::Error;
use super::path::{self, ResourcePattern};
use std::time::Duration;
use url::Url;

const DEFAULT_LIFETIME: Duration = Duration::from_secs(60 * 60 * 24);
const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// What the gate protects and how it issues tokens. Read-only once the
/// gateway is built.
#[derive(Clone, Debug)]
pub struct ProtectionRule {
    base_path: String,
    lifetime: Duration,
    resources: Vec<String>,
    patterns: Vec<ResourcePattern>,
    handles: Vec<String>,
    site_url: Url,
    cookie_secure: Option<bool>,
    delivery_timeout: Duration,
}

impl ProtectionRule {
    /// Protect everything under `/` for 24 hours per token.
    #[must_use]
    pub fn new(site_url: Url) -> Self {
        Self {
            base_path: "/".to_string(),
            lifetime: DEFAULT_LIFETIME,
            resources: vec!["/".to_string()],
            patterns: vec![ResourcePattern::Prefix("/".to_string())],
            handles: Vec::new(),
            site_url,
            cookie_secure: None,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.to_string();
        self
    }

    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = resources.into_iter().map(Into::into).collect();
        // invalid patterns are reported by normalize()
        self.patterns = self
            .resources
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .filter_map(|r| ResourcePattern::new(r).ok())
            .collect();
        self
    }

    #[must_use]
    pub fn with_handles<I, S>(mut self, handles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handles = handles.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = Some(secure);
        self
    }

    #[must_use]
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Fill empty values with defaults and check every resource pattern.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if a resource pattern is invalid.
    pub fn normalize(self) -> Result<Self, Error> {
        let base_path = match self.base_path.trim() {
            "" => "/".to_string(),
            base if base.starts_with('/') => base.to_string(),
            base => format!("/{base}"),
        };
        let lifetime = if self.lifetime.is_zero() {
            DEFAULT_LIFETIME
        } else {
            self.lifetime
        };
        let resources: Vec<String> = self
            .resources
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        let resources = if resources.is_empty() {
            vec!["/".to_string()]
        } else {
            resources
        };
        let patterns = resources
            .iter()
            .map(|resource| {
                ResourcePattern::new(resource).map_err(|e| {
                    Error::Configuration(format!("invalid resource pattern {resource}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let handles = self
            .handles
            .into_iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();
        let delivery_timeout = if self.delivery_timeout.is_zero() {
            DEFAULT_DELIVERY_TIMEOUT
        } else {
            self.delivery_timeout
        };

        Ok(Self {
            base_path,
            lifetime,
            resources,
            patterns,
            handles,
            site_url: self.site_url,
            cookie_secure: self.cookie_secure,
            delivery_timeout,
        })
    }

    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    #[must_use]
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    #[must_use]
    pub fn handles(&self) -> &[String] {
        &self.handles
    }

    #[must_use]
    pub fn site_url(&self) -> &Url {
        &self.site_url
    }

    /// Explicit setting, otherwise secure when the site is served over https.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
            .unwrap_or_else(|| self.site_url.scheme() == "https")
    }

    #[must_use]
    pub fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }

    #[must_use]
    pub fn is_protected(&self, request_path: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches(request_path))
    }

    #[must_use]
    pub fn login_path(&self) -> String {
        path::endpoint(&self.base_path, "login")
    }

    #[must_use]
    pub fn signout_path(&self) -> String {
        path::endpoint(&self.base_path, "signout")
    }

    #[must_use]
    pub fn public_key_path(&self) -> String {
        path::endpoint(&self.base_path, "pub.cer")
    }

    /// Absolute link that redeems `token`, e.g.
    /// `https://site.tld/login?token=...`.
    #[must_use]
    pub fn login_url(&self, token: &str) -> Url {
        let mut url = self.site_url.clone();
        url.set_path(&self.login_path());
        url.set_fragment(None);
        url.query_pairs_mut()
            .clear()
            .append_pair(super::extract::QUERY_PARAM, token);
        url
    }
}
