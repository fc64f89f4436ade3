//! Handler registry — type-keyed fan-out with wildcard subscription.
//!
//! Registrations are kept in order per discriminator; the `"*"` wildcard
//! matches every event and fires after the type-specific handlers. Dispatch
//! is fire-and-forget: each handler runs in its own spawned task, and a
//! handler's failure is logged and counted, never propagated to the loop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use metrics::counter;
use relay_core::Event;
use tracing::{debug, warn};

use crate::errors::RegistryError;

/// Discriminator matched for every event.
pub const WILDCARD: &str = "*";

/// Opaque identity of one registration, used to unregister it.
///
/// Closures have no usable equality in Rust, so removal goes through the id
/// handed out at registration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type HandlerFn = Arc<dyn Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct Registration {
    id: HandlerId,
    handler: HandlerFn,
}

/// Ordered per-discriminator handler lists.
pub struct EventRegistry {
    handlers: HashMap<String, Vec<Registration>>,
    next_id: u64,
}

impl EventRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            next_id: 0,
        }
    }

    /// Append a handler for a discriminator (or [`WILDCARD`]).
    ///
    /// Duplicate registrations are preserved as duplicates and will all
    /// fire. Returns the id needed to unregister this registration.
    pub fn on<F, Fut>(&mut self, event_type: &str, handler: F) -> HandlerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        let handler: HandlerFn = Arc::new(move |event| Box::pin(handler(event)));
        self.handlers
            .entry(event_type.to_owned())
            .or_default()
            .push(Registration { id, handler });
        id
    }

    /// Remove the first registration with this id under the discriminator.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotRegistered`] when no such registration exists;
    /// a silent no-op would hide bugs.
    pub fn off(&mut self, event_type: &str, id: HandlerId) -> Result<(), RegistryError> {
        let not_registered = || RegistryError::NotRegistered {
            event_type: event_type.to_owned(),
        };
        let list = self.handlers.get_mut(event_type).ok_or_else(not_registered)?;
        let position = list
            .iter()
            .position(|registration| registration.id == id)
            .ok_or_else(not_registered)?;
        let _ = list.remove(position);
        Ok(())
    }

    /// Fire-and-forget dispatch to every matching handler.
    ///
    /// Type-specific registrations launch first in registration order, then
    /// wildcard registrations in registration order. Dispatch does not wait
    /// for handler completion; handler errors are logged out-of-band.
    /// Returns the number of handlers launched.
    pub fn dispatch(&self, event: &Event) -> usize {
        let specific = self.handlers.get(event.event_type()).into_iter().flatten();
        let wildcard = self.handlers.get(WILDCARD).into_iter().flatten();

        let mut launched = 0usize;
        for registration in specific.chain(wildcard) {
            let handler = Arc::clone(&registration.handler);
            let event = event.clone();
            let _ = tokio::spawn(async move {
                let event_type = event.event_type().to_owned();
                if let Err(error) = handler(event).await {
                    counter!("relay_handler_failures_total").increment(1);
                    warn!(event_type, error = %error, "handler failed");
                }
            });
            launched += 1;
        }

        counter!("relay_events_dispatched_total").increment(1);
        debug!(event_type = event.event_type(), handlers = launched, "dispatched event");
        launched
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
