use thiserror::Error;

/// Errors surfaced by the gate.
///
/// Every failure while checking a presented token collapses into
/// [`Error::InvalidToken`]; the cause is only ever visible in logs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token")]
    InvalidToken,
    #[error("no token found")]
    NoToken,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Why a presented token was refused. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Signature,
    Expired,
    Handle,
    Scope,
}

impl Denial {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signature => "signature",
            Self::Expired => "expired",
            Self::Handle => "handle",
            Self::Scope => "scope",
        }
    }
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
