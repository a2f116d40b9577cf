//! Record store configuration.

use std::time::Duration;

/// Modules every store knows about unless configured otherwise.
pub const DEFAULT_MODULES: &[&str] = &[
    "todos", "projects", "groups", "receipts", "invoices", "orders", "settings", "users",
];

/// Default prefix of every persisted key.
pub const DEFAULT_KEY_PREFIX: &str = "deskstore";

/// Default lifetime of a cache entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// What to do when a stored value is not valid JSON.
///
/// Valid JSON that is not a record collection is never treated as corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionPolicy {
    /// Move the raw value to `<prefix>_quarantine_<module>_<owner>`, log a
    /// warning and treat the collection as absent.
    Quarantine,
    /// Return [`crate::CoreError::CorruptCollection`] and leave the value in
    /// place.
    Fail,
}

/// Configuration for opening a record store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Prefix of every persisted key.
    pub key_prefix: String,

    /// How long a loaded collection stays valid in the cache.
    pub cache_ttl: Duration,

    /// Recovery policy for malformed stored content.
    pub corruption_policy: CorruptionPolicy,

    /// Registry of known module names, used by export, import and owner wipes.
    pub modules: Vec<String>,

    /// Whether mutations hold a per-collection lock across their
    /// read-modify-write.
    pub serialize_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            corruption_policy: CorruptionPolicy::Quarantine,
            modules: DEFAULT_MODULES.iter().map(|m| (*m).to_string()).collect(),
            serialize_writes: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the cache TTL.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the corruption policy.
    #[must_use]
    pub const fn corruption_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.corruption_policy = policy;
        self
    }

    /// Replaces the module registry.
    #[must_use]
    pub fn modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules = modules.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether mutations are serialized per collection.
    #[must_use]
    pub const fn serialize_writes(mut self, value: bool) -> Self {
        self.serialize_writes = value;
        self
    }

    /// Returns true if `module` is in the registry.
    #[must_use]
    pub fn is_registered(&self, module: &str) -> bool {
        self.modules.iter().any(|m| m == module)
    }
}
