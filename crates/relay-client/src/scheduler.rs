//! Producer scheduler — round-robin outbound message production.
//!
//! An ordered list of [`Producer`]s cycled forever by a persistent cursor.
//! Each [`ProducerSet::next`] call waits one shared inter-production delay
//! (the rate limit for the whole outbound side, not per producer), advances
//! the cursor by exactly one, and resolves that producer: a static record
//! yields a clone of itself, a dynamic thunk is awaited and may yield
//! nothing ("skip this turn"). Concrete records are wrapped as
//! [`OutboundMessage`]s with a freshly assigned correlation id.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use relay_core::{CorrelationId, OutboundMessage};
use serde_json::{Map, Value};
use tokio::time::sleep;
use tracing::trace;

use crate::errors::ProducerError;

/// Default inter-production delay.
pub const DEFAULT_PRODUCER_DELAY: Duration = Duration::from_millis(500);

type DynamicFn =
    Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<Option<Map<String, Value>>>> + Send + Sync>;

/// One outbound-message source.
///
/// A closed two-variant union: either a fixed record that yields itself
/// every turn, or a zero-argument async thunk that may yield a record,
/// yield nothing for this turn, or fail.
pub enum Producer {
    /// Always yields a clone of this record.
    Static(Map<String, Value>),
    /// Invoked each turn; `None` means skip, the cursor still advances.
    Dynamic(DynamicFn),
}

impl Producer {
    /// Static record source.
    #[must_use]
    pub fn fixed(record: Map<String, Value>) -> Self {
        Self::Static(record)
    }

    /// Dynamic source from a zero-argument async operation.
    pub fn dynamic<F, Fut>(thunk: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Option<Map<String, Value>>>>
            + Send
            + 'static,
    {
        Self::Dynamic(Box::new(move || Box::pin(thunk())))
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(record) => f.debug_tuple("Static").field(record).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").finish(),
        }
    }
}

/// The ordered producer list with its round-robin cursor and the
/// per-connection correlation-id counter.
pub struct ProducerSet {
    producers: Vec<Producer>,
    cursor: usize,
    delay: Duration,
    next_correlation: CorrelationId,
}

impl ProducerSet {
    /// Empty set with the given shared inter-production delay.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            producers: Vec::new(),
            cursor: 0,
            delay,
            next_correlation: 1,
        }
    }

    /// Append a producer. List mutation resets the cursor.
    pub fn add(&mut self, producer: Producer) {
        self.producers.push(producer);
        self.cursor = 0;
    }

    /// Whether any producers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// One scheduling turn.
    ///
    /// Empty list → `Ok(None)` immediately, no delay. Otherwise: wait the
    /// shared delay, advance the cursor past the chosen producer, resolve
    /// it. A dynamic producer yielding nothing is `Ok(None)` with the
    /// cursor already advanced; the following turn serves the next
    /// producer and no source can starve the others.
    ///
    /// # Errors
    ///
    /// [`ProducerError`] when a dynamic producer's own operation fails. The
    /// cursor has advanced past it; the next call serves the next source.
    pub async fn next(&mut self) -> Result<Option<OutboundMessage>, ProducerError> {
        if self.producers.is_empty() {
            return Ok(None);
        }

        sleep(self.delay).await;

        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.producers.len();

        let record = match &self.producers[index] {
            Producer::Static(record) => Some(record.clone()),
            Producer::Dynamic(thunk) => thunk()
                .await
                .map_err(|source| ProducerError { index, source })?,
        };

        let Some(record) = record else {
            trace!(index, "producer skipped this turn");
            return Ok(None);
        };

        let id = self.next_correlation;
        self.next_correlation += 1;
        Ok(Some(OutboundMessage::new(id, record)))
    }
}
