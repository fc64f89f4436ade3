//! Resource resolver — lazily fetched, memoized entity listings.
//!
//! Each [`ResourceKind`] has one cache, populated wholesale from a single
//! listing fetch (or from handshake seed data). Resolution is an explicit
//! two-step procedure: scan the cache; if it has never been filled, fetch
//! once and scan exactly once more. There is never a second refill, so a
//! transient empty upstream listing is treated as permanently
//! empty for this connection's lifetime.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::ResolveError;
use crate::gateway::ApiGateway;

/// Entity categories the resolver knows how to list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Named conversation channels.
    Channel,
    /// Workspace members.
    User,
}

impl ResourceKind {
    /// Listing endpoint for this kind.
    fn list_path(self) -> &'static str {
        match self {
            Self::Channel => "channels.list",
            Self::User => "users.list",
        }
    }

    /// Key of the entity array inside the listing payload.
    fn list_key(self) -> &'static str {
        match self {
            Self::Channel => "channels",
            Self::User => "users",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Channel => "channel",
            Self::User => "user",
        })
    }
}

/// One named entity from a listing, extra fields kept opaque.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Remote identifier (e.g. `C024BE91L`).
    pub id: String,
    /// Human-readable name used for resolution.
    pub name: String,
    /// Remaining listing fields, unvalidated.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-kind cache: `None` = never filled, `Some` = complete (even if empty).
type Cache = RwLock<Option<Vec<Entity>>>;

/// Resolves human-readable names to entities, fetching each listing at most
/// once per connection.
pub struct Directory {
    gateway: Arc<ApiGateway>,
    channels: Cache,
    users: Cache,
}

impl Directory {
    /// Directory backed by the given gateway, all caches unfilled.
    #[must_use]
    pub fn new(gateway: Arc<ApiGateway>) -> Self {
        Self {
            gateway,
            channels: RwLock::new(None),
            users: RwLock::new(None),
        }
    }

    /// Populate a cache wholesale from handshake seed data.
    ///
    /// An empty seed list leaves the cache unfilled so a later [`resolve`]
    /// may still fetch the listing.
    ///
    /// [`resolve`]: Self::resolve
    pub fn seed(&self, kind: ResourceKind, entries: Vec<Entity>) {
        if entries.is_empty() {
            return;
        }
        debug!(%kind, count = entries.len(), "seeding directory cache");
        *self.cache(kind).write() = Some(entries);
    }

    /// Resolve a name to its entity.
    ///
    /// At most one listing fetch per unfilled cache; after the cache is
    /// filled (even with an empty listing) a miss is final:
    /// [`ResolveError::NotFound`] with no retry.
    pub async fn resolve(&self, kind: ResourceKind, name: &str) -> Result<Entity, ResolveError> {
        match self.scan(kind, name) {
            Some(Some(entity)) => return Ok(entity),
            Some(None) => {
                return Err(ResolveError::NotFound {
                    kind,
                    name: name.to_owned(),
                });
            }
            None => {}
        }

        self.refill(kind).await?;

        // Exactly one post-refill scan, never a loop.
        match self.scan(kind, name) {
            Some(Some(entity)) => Ok(entity),
            _ => Err(ResolveError::NotFound {
                kind,
                name: name.to_owned(),
            }),
        }
    }

    /// Fetch the whole listing once and store it, empty or not.
    async fn refill(&self, kind: ResourceKind) -> Result<(), ResolveError> {
        debug!(%kind, "cache unfilled, fetching listing");
        let listing = self
            .gateway
            .get_with(kind.list_path(), &[], HeaderMap::new(), |mut body| {
                body[kind.list_key()].take()
            })
            .await?;
        let entries: Vec<Entity> =
            serde_json::from_value(listing).map_err(|_| ResolveError::Listing { kind })?;
        *self.cache(kind).write() = Some(entries);
        Ok(())
    }

    /// Linear scan. Outer `None` = cache unfilled, inner `None` = miss.
    fn scan(&self, kind: ResourceKind, name: &str) -> Option<Option<Entity>> {
        let cache = self.cache(kind).read();
        cache
            .as_ref()
            .map(|entries| entries.iter().find(|e| e.name == name).cloned())
    }

    fn cache(&self, kind: ResourceKind) -> &Cache {
        match kind {
            ResourceKind::Channel => &self.channels,
            ResourceKind::User => &self.users,
        }
    }
}
