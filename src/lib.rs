//! Stash: a local read-through cache
//!
//! Keys are routed to handlers by a [`Registry`]. [`Stash::get`] serves a
//! stored value when its handler says it is still usable, and otherwise asks
//! the handler's refresh collaborator for a fresh one, stores it, and returns
//! it. Storage sits behind the [`Store`] trait.

pub mod cli;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handler;
pub mod refresh;
pub mod registry;
pub mod store;
pub mod value;

pub use codec::{Codec, CodecKind, JsonCodec, TextCodec};
pub use config::{HandlerEntry, HandlerFile, StashConfig};
pub use coordinator::{Delivery, Origin, Stash};
pub use error::{BoxError, Result, StashError};
pub use handler::{Handler, HandlerDefinition, Matcher, Refresh, RefreshFn, FALLBACK_HANDLER};
pub use refresh::CommandRefresher;
pub use registry::Registry;
pub use store::{FileStore, MemoryStore, Store};
pub use value::{Expiry, Value};
