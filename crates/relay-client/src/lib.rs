//! # relay-client
//!
//! Persistent-connection event client for real-time messaging services:
//! one bootstrap exchange obtains a stream URL, then a duplex loop races
//! inbound dispatch against scheduled outbound production on a single
//! WebSocket connection.
//!
//! - **Gateway**: authenticated HTTP call/response exchanges with uniform
//!   success/failure classification.
//! - **Directory**: lazily fetched, memoized name → entity resolution.
//! - **Registry**: type-keyed handler fan-out with `"*"` wildcard,
//!   fire-and-forget dispatch.
//! - **Scheduler**: round-robin producer rotation with a shared rate-limit
//!   delay and correlation-id tagging.
//! - **Client**: the duplex event loop tying the above to one connection's
//!   `Handshaking → Connecting → Running → Terminated` lifecycle.
//!
//! ## Crate Position
//!
//! Depends on: relay-core (frame types).
//! Transport: reqwest (HTTP), tokio-tungstenite (stream).

#![deny(unsafe_code)]

pub mod client;
pub mod directory;
pub mod errors;
pub mod gateway;
pub mod registry;
pub mod scheduler;

pub use client::{Client, ClientConfig, SessionState};
pub use directory::{Directory, Entity, ResourceKind};
pub use errors::{ClientError, GatewayError, ProducerError, RegistryError, ResolveError};
pub use gateway::ApiGateway;
pub use registry::{EventRegistry, HandlerId, WILDCARD};
pub use relay_core::{CorrelationId, Event, FrameError, OutboundMessage};
pub use scheduler::{DEFAULT_PRODUCER_DELAY, Producer, ProducerSet};
