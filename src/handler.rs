//! Handler definitions
//!
//! A handler bundles everything the cache needs to know about one class of
//! keys: which keys it claims, how their values are encoded, how long they
//! stay fresh, and how to fetch a replacement when they do not.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::codec::{Codec, CodecKind, TextCodec};
use crate::error::{BoxError, Result, StashError};
use crate::value::{Expiry, Value};

/// Name of the handler used when no other handler claims a key
pub const FALLBACK_HANDLER: &str = "none";

/// Produces a fresh value for a key from an external source
///
/// Implementations own any timeout or retry policy; the cache waits for the
/// returned future without limit.
#[async_trait]
pub trait Refresh: Send + Sync {
    async fn refresh(&self, key: &str) -> std::result::Result<Value, BoxError>;
}

/// Adapts an async closure into a [`Refresh`] implementation
pub struct RefreshFn<F>(pub F);

#[async_trait]
impl<F, Fut> Refresh for RefreshFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Value, BoxError>> + Send,
{
    async fn refresh(&self, key: &str) -> std::result::Result<Value, BoxError> {
        (self.0)(key.to_string()).await
    }
}

/// Decides whether a handler claims a key
#[derive(Clone)]
pub enum Matcher {
    /// Key matches a regular expression
    Pattern(Regex),
    /// Key starts with a literal prefix
    Prefix(String),
    /// Arbitrary predicate over the key
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Matcher {
    /// Compiles a regular expression matcher
    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(Matcher::Pattern(Regex::new(pattern)?))
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Matcher::Prefix(prefix.into())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Matcher::Predicate(Arc::new(f))
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Matcher::Pattern(re) => re.is_match(key),
            Matcher::Prefix(prefix) => key.starts_with(prefix.as_str()),
            Matcher::Predicate(f) => f(key),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Matcher::Prefix(p) => f.debug_tuple("Prefix").field(p).finish(),
            Matcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Caller-facing description of a handler, completed by the registry
///
/// Built with chained setters:
///
/// ```ignore
/// let def = HandlerDefinition::new()
///     .matching(Matcher::prefix("user:"))
///     .kind(CodecKind::Json)
///     .expires_in(100)
///     .refresh_fn(|key| async move { fetch_user(&key).await });
/// ```
#[derive(Clone, Default)]
pub struct HandlerDefinition {
    pub(crate) matcher: Option<Matcher>,
    pub(crate) type_tag: Option<String>,
    pub(crate) codec: Option<Arc<dyn Codec>>,
    pub(crate) expiry_seconds: Option<u64>,
    pub(crate) expiry_field: Option<String>,
    pub(crate) allow_undefined: bool,
    pub(crate) refresh: Option<Arc<dyn Refresh>>,
}

impl HandlerDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matching(mut self, matcher: Matcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Selects a built-in codec family
    pub fn kind(mut self, kind: CodecKind) -> Self {
        self.type_tag = Some(kind.as_str().to_string());
        self
    }

    /// Selects a codec family by tag
    ///
    /// The tag is checked at registration: an unknown tag is logged and the
    /// handler stores values verbatim.
    pub fn type_tag(mut self, tag: impl Into<String>) -> Self {
        self.type_tag = Some(tag.into());
        self
    }

    /// Uses a caller-supplied codec, which takes precedence over the family
    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Overrides the global expiry window; `0` means never expires
    pub fn expires_in(mut self, seconds: u64) -> Self {
        self.expiry_seconds = Some(seconds);
        self
    }

    /// Names the field of a composite value holding its creation timestamp
    pub fn expiry_field(mut self, field: impl Into<String>) -> Self {
        self.expiry_field = Some(field.into());
        self
    }

    pub fn allow_undefined(mut self, allow: bool) -> Self {
        self.allow_undefined = allow;
        self
    }

    pub fn refresh(mut self, refresh: impl Refresh + 'static) -> Self {
        self.refresh = Some(Arc::new(refresh));
        self
    }

    pub fn refresh_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, BoxError>> + Send + 'static,
    {
        self.refresh(RefreshFn(f))
    }
}

/// A registered handler
#[derive(Clone)]
pub struct Handler {
    pub(crate) name: String,
    pub(crate) matcher: Option<Matcher>,
    pub(crate) kind: Option<CodecKind>,
    pub(crate) codec: Option<Arc<dyn Codec>>,
    pub(crate) expiry_seconds: Option<u64>,
    pub(crate) expiry_field: Option<String>,
    pub(crate) allow_undefined: bool,
    pub(crate) refresh: Option<Arc<dyn Refresh>>,
}

impl Handler {
    /// The handler for keys nobody else claims: verbatim text, no refresh
    pub fn fallback() -> Self {
        Self {
            name: FALLBACK_HANDLER.to_string(),
            matcher: None,
            kind: Some(CodecKind::Text),
            codec: Some(CodecKind::Text.codec()),
            expiry_seconds: None,
            expiry_field: None,
            allow_undefined: false,
            refresh: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Option<CodecKind> {
        self.kind
    }

    pub fn matcher(&self) -> Option<&Matcher> {
        self.matcher.as_ref()
    }

    /// Whether this handler claims `key`; handlers without a matcher claim nothing
    pub fn matches(&self, key: &str) -> bool {
        self.matcher.as_ref().is_some_and(|m| m.matches(key))
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh.is_some()
    }

    pub fn expiry_field(&self) -> Option<&str> {
        self.expiry_field.as_deref()
    }

    pub fn allows_undefined(&self) -> bool {
        self.allow_undefined
    }

    /// The handler's own window, or `default_seconds` when it has none
    pub fn effective_expiry(&self, default_seconds: u64) -> Expiry {
        Expiry::from_seconds(self.expiry_seconds.unwrap_or(default_seconds))
    }

    pub fn encode(&self, key: &str, value: &Value) -> Result<String> {
        let encoded = match &self.codec {
            Some(codec) => codec.encode(key, value),
            None => TextCodec.encode(key, value),
        };
        encoded.map_err(|e| StashError::Encode {
            key: key.to_string(),
            handler: self.name.clone(),
            reason: e.to_string(),
        })
    }

    pub fn decode(&self, key: &str, raw: &str) -> Result<Value> {
        let decoded = match &self.codec {
            Some(codec) => codec.decode(key, raw),
            None => TextCodec.decode(key, raw),
        };
        decoded.map_err(|e| StashError::Decode {
            key: key.to_string(),
            handler: self.name.clone(),
            reason: e.to_string(),
        })
    }

    /// Asks the refresh collaborator for a fresh value
    pub async fn refresh(&self, key: &str) -> Result<Value> {
        let refresh = self
            .refresh
            .as_ref()
            .ok_or_else(|| StashError::NoRefreshMethod {
                key: key.to_string(),
                handler: self.name.clone(),
            })?;
        refresh
            .refresh(key)
            .await
            .map_err(|source| StashError::RefreshFailed {
                key: key.to_string(),
                source,
            })
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("matcher", &self.matcher)
            .field("kind", &self.kind)
            .field("custom_codec", &self.codec.is_some())
            .field("expiry_seconds", &self.expiry_seconds)
            .field("expiry_field", &self.expiry_field)
            .field("allow_undefined", &self.allow_undefined)
            .field("can_refresh", &self.refresh.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matchers() {
        let re = Matcher::pattern("^user:").unwrap();
        assert!(re.matches("user:1"));
        assert!(!re.matches("xuser:1"));

        let prefix = Matcher::prefix("@");
        assert!(prefix.matches("@home"));
        assert!(!prefix.matches("home"));

        let pred = Matcher::predicate(|k| k.len() == 3);
        assert!(pred.matches("abc"));
        assert!(!pred.matches("abcd"));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(matches!(
            Matcher::pattern("(unclosed"),
            Err(StashError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_fallback_claims_nothing_and_cannot_refresh() {
        let fallback = Handler::fallback();
        assert_eq!(fallback.name(), FALLBACK_HANDLER);
        assert!(!fallback.matches("anything"));
        assert!(!fallback.can_refresh());
    }

    #[tokio::test]
    async fn test_fallback_refresh_reports_no_refresh_method() {
        let err = Handler::fallback().refresh("x:1").await.unwrap_err();
        assert!(matches!(
            err,
            StashError::NoRefreshMethod { ref key, ref handler } if key == "x:1" && handler == "none"
        ));
    }

    #[test]
    fn test_effective_expiry_prefers_handler_override() {
        let mut handler = Handler::fallback();
        assert_eq!(handler.effective_expiry(60), Expiry::After(60));
        handler.expiry_seconds = Some(0);
        assert_eq!(handler.effective_expiry(60), Expiry::Never);
        handler.expiry_seconds = Some(5);
        assert_eq!(handler.effective_expiry(60), Expiry::After(5));
    }

    #[test]
    fn test_decode_failure_names_handler() {
        let mut handler = Handler::fallback();
        handler.name = "user".to_string();
        handler.codec = Some(CodecKind::Json.codec());
        let err = handler.decode("user:1", "not json").unwrap_err();
        assert!(matches!(err, StashError::Decode { ref handler, .. } if handler == "user"));
    }

    #[tokio::test]
    async fn test_refresh_fn_receives_key() {
        let refresh = RefreshFn(|key: String| async move { Ok::<_, BoxError>(json!({ "key": key })) });
        let value = refresh.refresh("user:7").await.unwrap();
        assert_eq!(value, json!({"key": "user:7"}));
    }
}
