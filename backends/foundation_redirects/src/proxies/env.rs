//! Environment access for proxy decisions.
//!
//! WHY: Proxy and no-proxy settings traditionally come from environment
//! variables, but reading (and worse, mutating) the process environment from
//! policy code makes it untestable and racy.
//!
//! WHAT: The [`Environment`] trait is an immutable view threaded through the
//! bypass decision. [`ProcessEnvironment`] reads the real process
//! environment; [`StaticEnvironment`] is a fixed snapshot. [`ScopedEnvVar`]
//! is the single place where the process environment is mutated, serialized
//! by a process-wide mutex and restored on drop.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::ProxyMap;

/// Read-only view of environment variables.
pub trait Environment: Send + Sync {
    /// Returns the value of `name`, if set.
    fn get(&self, name: &str) -> Option<String>;

    /// Returns every `(name, value)` pair.
    fn vars(&self) -> Vec<(String, String)>;

    /// Looks up a proxy-style variable, preferring the lower-case name over
    /// the upper-case one. Empty values count as unset.
    fn proxy_var(&self, key: &str) -> Option<String> {
        self.get(&key.to_ascii_lowercase())
            .filter(|value| !value.is_empty())
            .or_else(|| {
                self.get(&key.to_ascii_uppercase())
                    .filter(|value| !value.is_empty())
            })
    }

    /// Collects `<scheme>_proxy` variables into a [`ProxyMap`] keyed by scheme.
    ///
    /// Names are matched case-insensitively; an exactly lower-case name wins
    /// over any other casing, and an empty lower-case value removes the entry.
    /// The `no_proxy` variable is not a proxy and is skipped.
    fn proxies(&self) -> ProxyMap {
        let vars = self.vars();
        let mut found: BTreeMap<String, String> = BTreeMap::new();

        for (name, value) in &vars {
            let lowered = name.to_ascii_lowercase();
            if value.is_empty() {
                continue;
            }
            if let Some(scheme) = lowered.strip_suffix("_proxy") {
                found.insert(scheme.to_string(), value.clone());
            }
        }

        for (name, value) in &vars {
            if let Some(scheme) = name.strip_suffix("_proxy") {
                if scheme.chars().any(|c| c.is_ascii_uppercase()) {
                    continue;
                }
                if value.is_empty() {
                    found.remove(scheme);
                } else {
                    found.insert(scheme.to_string(), value.clone());
                }
            }
        }

        found.remove("no");
        found.into_iter().collect()
    }
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars().collect()
    }
}

/// A fixed set of variables, independent of the process environment.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    vars: BTreeMap<String, String>,
}

impl StaticEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl Environment for StaticEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

static ENV_MUTATION_LOCK: Mutex<()> = Mutex::new(());

/// Temporarily sets a process environment variable.
///
/// Holds a process-wide lock for its whole lifetime so concurrent redirect
/// chains never observe each other's transient value. On drop the variable
/// is restored to its previous value, or removed if it was previously unset.
/// Passing `None` changes nothing but still serializes with other scopes.
pub struct ScopedEnvVar {
    name: String,
    previous: Option<String>,
    changed: bool,
    _lock: MutexGuard<'static, ()>,
}

impl ScopedEnvVar {
    #[must_use]
    pub fn set(name: &str, value: Option<&str>) -> Self {
        let lock = ENV_MUTATION_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let previous = std::env::var(name).ok();
        let changed = match value {
            Some(value) => {
                std::env::set_var(name, value);
                true
            }
            None => false,
        };

        Self {
            name: name.to_string(),
            previous,
            changed,
            _lock: lock,
        }
    }
}

impl Drop for ScopedEnvVar {
    fn drop(&mut self) {
        if !self.changed {
            return;
        }
        match &self.previous {
            Some(previous) => std::env::set_var(&self.name, previous),
            None => std::env::remove_var(&self.name),
        }
    }
}

impl std::fmt::Debug for ScopedEnvVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedEnvVar")
            .field("name", &self.name)
            .field("changed", &self.changed)
            .finish_non_exhaustive()
    }
}
