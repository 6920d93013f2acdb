//! Handler registry
//!
//! Handlers are checked in registration order and the first matcher that
//! accepts a key wins. Keys nobody claims go to the fallback handler, so
//! every key routes somewhere.

use tracing::{debug, warn};

use crate::codec::CodecKind;
use crate::handler::{Handler, HandlerDefinition, FALLBACK_HANDLER};

/// Named handlers plus the mandatory fallback
#[derive(Debug, Clone)]
pub struct Registry {
    /// Matchable handlers in registration order
    handlers: Vec<Handler>,
    /// Handler used when no matcher claims a key
    fallback: Handler,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates a registry holding only the built-in fallback handler
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            fallback: Handler::fallback(),
        }
    }

    /// Stores or replaces the handler called `name`
    ///
    /// A known codec family fills in the codec unless the definition brings
    /// its own. An unknown family is logged and values are stored verbatim.
    /// Replacing a handler keeps its original position in the match order.
    /// Registering under `"none"` replaces the fallback, which never has a
    /// matcher.
    pub fn register(&mut self, name: impl Into<String>, definition: HandlerDefinition) {
        let name = name.into();

        let kind = match definition.type_tag.as_deref() {
            Some(tag) => match tag.parse::<CodecKind>() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    warn!(handler = %name, "{e}; storing values verbatim");
                    None
                }
            },
            None => None,
        };
        let codec = definition.codec.or_else(|| kind.map(|k| k.codec()));

        let mut handler = Handler {
            name: name.clone(),
            matcher: definition.matcher,
            kind,
            codec,
            expiry_seconds: definition.expiry_seconds,
            expiry_field: definition.expiry_field,
            allow_undefined: definition.allow_undefined,
            refresh: definition.refresh,
        };

        if name == FALLBACK_HANDLER {
            if handler.matcher.take().is_some() {
                warn!("matcher on the fallback handler is ignored");
            }
            debug!(handler = %name, "replaced fallback handler");
            self.fallback = handler;
            return;
        }

        match self.handlers.iter_mut().find(|h| h.name == name) {
            Some(existing) => {
                debug!(handler = %name, "replaced handler");
                *existing = handler;
            }
            None => {
                debug!(handler = %name, "registered handler");
                self.handlers.push(handler);
            }
        }
    }

    /// Returns the handler responsible for `key`
    pub fn resolve(&self, key: &str) -> &Handler {
        self.handlers
            .iter()
            .find(|h| h.matches(key))
            .unwrap_or(&self.fallback)
    }

    /// Looks a handler up by name
    pub fn get(&self, name: &str) -> Option<&Handler> {
        if name == FALLBACK_HANDLER {
            return Some(&self.fallback);
        }
        self.handlers.iter().find(|h| h.name == name)
    }

    pub fn fallback(&self) -> &Handler {
        &self.fallback
    }

    /// All handlers in match order, fallback last
    pub fn handlers(&self) -> impl Iterator<Item = &Handler> {
        self.handlers.iter().chain(std::iter::once(&self.fallback))
    }

    /// Number of handlers including the fallback
    pub fn len(&self) -> usize {
        self.handlers.len() + 1
    }

    /// Always false: the fallback handler is always present
    pub fn is_empty(&self) -> bool {
        false
    }
}
