//! Read-through cache coordinator
//!
//! `Stash::get` reads the raw entry, decodes it with the key's handler and
//! decides whether it can be served. When it cannot, the handler's refresh
//! collaborator is asked for a new value, which is stored and then delivered.
//!
//! Concurrent misses on the same key are not merged: each one refreshes and
//! writes, and the last write wins.

use std::fmt;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::StashConfig;
use crate::error::{Result, StashError};
use crate::handler::{Handler, HandlerDefinition};
use crate::registry::Registry;
use crate::store::Store;
use crate::value::{epoch_now, is_fresh, is_undefined, Value};

/// Where a delivered value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Served from the store without refreshing
    Cache,
    /// Produced by the handler's refresh collaborator
    Refresh,
}

/// A successfully retrieved value
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub key: String,
    pub value: Value,
    pub origin: Origin,
}

/// Why a cached value cannot be served as-is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Staleness {
    /// Nothing stored, or the stored data did not decode
    Missing,
    /// Decoded to an undefined value the handler does not accept
    Undefined,
    /// Force-pull is on and the handler can refresh
    Forced,
    /// The value's own timestamp is outside the expiry window
    Expired,
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Staleness::Missing => "missing",
            Staleness::Undefined => "undefined",
            Staleness::Forced => "forced",
            Staleness::Expired => "expired",
        })
    }
}

#[derive(Debug, PartialEq)]
enum Decision {
    Serve(Value),
    Refresh(Staleness),
}

/// The read-through cache
pub struct Stash<S> {
    registry: Registry,
    store: S,
    config: StashConfig,
}

impl<S: Store> Stash<S> {
    /// Creates a cache with default policy over `store`
    pub fn new(registry: Registry, store: S) -> Self {
        Self::with_config(registry, store, StashConfig::default())
    }

    pub fn with_config(registry: Registry, store: S, config: StashConfig) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// Registers or replaces a handler
    ///
    /// Takes `&mut self`, so registration cannot overlap with reads.
    pub fn define_handler(&mut self, name: impl Into<String>, definition: HandlerDefinition) {
        self.registry.register(name, definition);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &StashConfig {
        &self.config
    }

    pub fn set_force_pull(&mut self, force: bool) {
        self.config.force_pull = force;
    }

    /// Returns the handler responsible for `key`
    pub fn resolve(&self, key: &str) -> &Handler {
        self.registry.resolve(key)
    }

    /// Encodes `value` with the key's handler and writes it to the store
    pub async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let handler = self.registry.resolve(key);
        self.store_value(handler, key, value).await
    }

    /// Returns the value for `key`, refreshing it first when needed
    ///
    /// Undecodable entries are treated as missing. Refresh failures are
    /// returned as-is and leave the store untouched; there is no retry and no
    /// fallback to the stale value.
    pub async fn get(&self, key: &str) -> Result<Delivery> {
        let handler = self.registry.resolve(key);
        let raw = self
            .store
            .read(key)
            .await
            .map_err(|source| StashError::Store {
                key: key.to_string(),
                source,
            })?;

        let decoded = raw.and_then(|raw| match handler.decode(key, &raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, handler = handler.name(), "{e}; treating entry as missing");
                None
            }
        });

        match self.decide(handler, decoded, epoch_now()) {
            Decision::Serve(value) => {
                debug!(key, handler = handler.name(), "serving cached value");
                Ok(Delivery {
                    key: key.to_string(),
                    value,
                    origin: Origin::Cache,
                })
            }
            Decision::Refresh(staleness) => self.refresh(handler, key, staleness).await,
        }
    }

    /// Callback form of [`Stash::get`]: exactly one of the continuations runs, once
    pub async fn get_with<OnSuccess, OnFailure>(
        &self,
        key: &str,
        on_success: OnSuccess,
        on_failure: OnFailure,
    ) where
        OnSuccess: FnOnce(&str, Value),
        OnFailure: FnOnce(&str, StashError),
    {
        match self.get(key).await {
            Ok(delivery) => on_success(key, delivery.value),
            Err(e) => on_failure(key, e),
        }
    }

    /// Gets several keys concurrently, returning results in input order
    pub async fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> Vec<Result<Delivery>> {
        join_all(keys.iter().map(|key| self.get(key.as_ref()))).await
    }

    fn decide(&self, handler: &Handler, decoded: Option<Value>, now: i64) -> Decision {
        let Some(value) = decoded else {
            return Decision::Refresh(Staleness::Missing);
        };
        if is_undefined(&value) && !handler.allows_undefined() {
            return Decision::Refresh(Staleness::Undefined);
        }
        // Forcing only applies when something can replace the value.
        if self.config.force_pull && handler.can_refresh() {
            return Decision::Refresh(Staleness::Forced);
        }
        let expiry = handler.effective_expiry(self.config.default_expiry_seconds);
        if !is_fresh(&value, handler.expiry_field(), expiry, now) {
            return Decision::Refresh(Staleness::Expired);
        }
        Decision::Serve(value)
    }

    async fn refresh(&self, handler: &Handler, key: &str, staleness: Staleness) -> Result<Delivery> {
        if !handler.can_refresh() {
            warn!(key, handler = handler.name(), %staleness, "no refresh method");
            return Err(match staleness {
                Staleness::Undefined => StashError::UndefinedResult {
                    key: key.to_string(),
                    handler: handler.name().to_string(),
                },
                _ => StashError::NoRefreshMethod {
                    key: key.to_string(),
                    handler: handler.name().to_string(),
                },
            });
        }

        debug!(key, handler = handler.name(), %staleness, "refreshing");
        let value = handler.refresh(key).await.map_err(|e| {
            warn!(key, handler = handler.name(), "{e}");
            e
        })?;

        self.store_value(handler, key, &value).await?;
        Ok(Delivery {
            key: key.to_string(),
            value,
            origin: Origin::Refresh,
        })
    }

    async fn store_value(&self, handler: &Handler, key: &str, value: &Value) -> Result<()> {
        let raw = handler.encode(key, value)?;
        self.store
            .write(key, &raw)
            .await
            .map_err(|source| StashError::Store {
                key: key.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecKind;
    use crate::error::BoxError;
    use crate::handler::Matcher;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn stash(force_pull: bool) -> Stash<MemoryStore> {
        let mut registry = Registry::new();
        registry.register(
            "live",
            HandlerDefinition::new()
                .matching(Matcher::prefix("live:"))
                .kind(CodecKind::Json)
                .expires_in(10)
                .expiry_field("ts")
                .refresh_fn(|_key| async { Ok::<_, BoxError>(json!({"ts": 0})) }),
        );
        registry.register(
            "fixed",
            HandlerDefinition::new()
                .matching(Matcher::prefix("fixed:"))
                .kind(CodecKind::Json)
                .expiry_field("ts"),
        );
        let config = StashConfig {
            default_expiry_seconds: 10,
            force_pull,
        };
        Stash::with_config(registry, MemoryStore::new(), config)
    }

    #[test]
    fn test_decide_missing_value() {
        let stash = stash(false);
        let handler = stash.resolve("live:1");
        assert_eq!(
            stash.decide(handler, None, 100),
            Decision::Refresh(Staleness::Missing)
        );
    }

    #[test]
    fn test_decide_undefined_value() {
        let stash = stash(false);
        let handler = stash.resolve("live:1");
        assert_eq!(
            stash.decide(handler, Some(Value::Null), 100),
            Decision::Refresh(Staleness::Undefined)
        );
    }

    #[test]
    fn test_decide_force_pull_only_for_refreshable() {
        let stash = stash(true);
        let value = json!({"ts": 100});
        assert_eq!(
            stash.decide(stash.resolve("live:1"), Some(value.clone()), 100),
            Decision::Refresh(Staleness::Forced)
        );
        assert_eq!(
            stash.decide(stash.resolve("fixed:1"), Some(value.clone()), 100),
            Decision::Serve(value)
        );
    }

    #[test]
    fn test_decide_expiry_window() {
        let stash = stash(false);
        let handler = stash.resolve("live:1");
        assert_eq!(
            stash.decide(handler, Some(json!({"ts": 80})), 100),
            Decision::Refresh(Staleness::Expired)
        );
        assert_eq!(
            stash.decide(handler, Some(json!({"ts": 95})), 100),
            Decision::Serve(json!({"ts": 95}))
        );
    }

    #[test]
    fn test_decide_fixed_uses_default_expiry() {
        let stash = stash(false);
        let handler = stash.resolve("fixed:1");
        assert_eq!(
            stash.decide(handler, Some(json!({"ts": 80})), 100),
            Decision::Refresh(Staleness::Expired)
        );
    }

    #[tokio::test]
    async fn test_undefined_without_refresh_is_undefined_result() {
        let stash = stash(false);
        stash.store().write("fixed:1", "null").await.unwrap();
        let err = stash.get("fixed:1").await.unwrap_err();
        assert!(matches!(err, StashError::UndefinedResult { ref key, .. } if key == "fixed:1"));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_is_no_refresh_method() {
        let stash = stash(false);
        stash.store().write("fixed:1", r#"{"ts": 0}"#).await.unwrap();
        let err = stash.get("fixed:1").await.unwrap_err();
        assert!(matches!(err, StashError::NoRefreshMethod { ref handler, .. } if handler == "fixed"));
    }

    #[tokio::test]
    async fn test_refresh_result_is_stored_even_when_stale() {
        let stash = stash(false);
        let delivery = stash.get("live:1").await.unwrap();
        assert_eq!(delivery.origin, Origin::Refresh);
        assert_eq!(delivery.value, json!({"ts": 0}));
        assert_eq!(stash.store().raw("live:1").as_deref(), Some(r#"{"ts":0}"#));
    }
}
