//! Gateway-level access control.
//!
//! A single optional access key protects the whole gateway. The supplied key
//! arrives as a `key` query parameter; comparison is exact. When no key is
//! configured the gateway is open.

/// Result of evaluating a request against the configured access key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    /// No key configured; everything is allowed.
    Unprotected,
    /// Key configured and the request supplied a matching one.
    Authorized,
    /// Key configured and the request key is missing or wrong.
    Unauthorized,
}

impl AccessLevel {
    /// Whether the request may proceed to relay or subscribe.
    #[must_use]
    pub fn allows_relay(&self) -> bool {
        matches!(self, AccessLevel::Unprotected | AccessLevel::Authorized)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Unprotected => "unprotected",
            AccessLevel::Authorized => "authorized",
            AccessLevel::Unauthorized => "unauthorized",
        }
    }
}

/// Evaluates a supplied key against the configured one.
#[must_use]
pub fn evaluate(configured: Option<&str>, supplied: Option<&str>) -> AccessLevel {
    match configured {
        None => AccessLevel::Unprotected,
        Some(expected) if expected.is_empty() => AccessLevel::Unprotected,
        Some(expected) => match supplied {
            Some(given) if given == expected => AccessLevel::Authorized,
            _ => AccessLevel::Unauthorized,
        },
    }
}
