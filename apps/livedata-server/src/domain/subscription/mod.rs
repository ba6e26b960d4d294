//! Subscription Value Objects
//!
//! Identifiers and value types shared by the subscription manager, the
//! combining server and the storage adapters.

use serde::{Deserialize, Serialize};

/// Identifier for one security.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityId(String);

impl SecurityId {
    /// Create a security id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SecurityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SecurityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One fully-qualified subscription specification: a security plus the
/// normalization rule set its ticks flow through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LiveDataSpec {
    /// The security to distribute.
    pub security: SecurityId,
    /// Name of the normalization rule set applied to its ticks.
    pub normalization: String,
}

impl LiveDataSpec {
    /// Create a specification.
    #[must_use]
    pub fn new(security: impl Into<SecurityId>, normalization: impl Into<String>) -> Self {
        Self {
            security: security.into(),
            normalization: normalization.into(),
        }
    }
}

impl std::fmt::Display for LiveDataSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.security, self.normalization)
    }
}

impl From<SecurityId> for LiveDataSpec {
    /// Specification with the default (unnamed) normalization rule set.
    fn from(security: SecurityId) -> Self {
        Self {
            security,
            normalization: String::new(),
        }
    }
}

/// A subscription that must survive server restarts.
///
/// A value object wrapping one fully-qualified specification; equality
/// is by specification, so the desired-state container collapses
/// duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentSubscription {
    spec: LiveDataSpec,
}

impl PersistentSubscription {
    /// Create a persistent subscription for `spec`.
    #[must_use]
    pub const fn new(spec: LiveDataSpec) -> Self {
        Self { spec }
    }

    /// The wrapped specification.
    #[must_use]
    pub const fn spec(&self) -> &LiveDataSpec {
        &self.spec
    }
}

impl From<LiveDataSpec> for PersistentSubscription {
    fn from(spec: LiveDataSpec) -> Self {
        Self::new(spec)
    }
}

impl std::fmt::Display for PersistentSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.spec.fmt(f)
    }
}

/// Per-spec outcome of a subscribe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResult {
    /// The specification the result belongs to.
    pub spec: LiveDataSpec,
    /// Whether the subscription was established.
    pub succeeded: bool,
    /// Human-readable detail (failure reason or distribution topic).
    pub description: String,
}

impl SubscriptionResult {
    /// Successful result for `spec`.
    #[must_use]
    pub fn success(spec: LiveDataSpec, description: impl Into<String>) -> Self {
        Self {
            spec,
            succeeded: true,
            description: description.into(),
        }
    }

    /// Failed result for `spec`.
    #[must_use]
    pub fn failure(spec: LiveDataSpec, description: impl Into<String>) -> Self {
        Self {
            spec,
            succeeded: false,
            description: description.into(),
        }
    }
}
