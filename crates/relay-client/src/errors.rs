//! Error types for the client crate.
//!
//! Propagation policy:
//!
//! - [`GatewayError`] and [`ResolveError`] return to whoever awaited the
//!   call; callers may recover.
//! - [`RegistryError`] is a synchronous registration-API failure.
//! - [`ProducerError`] and handler failures are isolated where they occur:
//!   logged and counted, never allowed to abort the duplex loop.
//! - [`ClientError`] variants are fatal to one connection's loop and are
//!   returned from [`Client::run`](crate::Client::run).

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::directory::ResourceKind;

/// A request/response exchange against the HTTP API failed.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Non-success HTTP status.
    #[error("`{path}` returned HTTP {status}")]
    Transport {
        /// HTTP status code.
        status: u16,
        /// Path segment the request targeted.
        path: String,
    },

    /// Success status but the decoded body reported `ok != true`.
    #[error("`{path}` reported a logical failure (ok=false)")]
    Api {
        /// Path segment the request targeted.
        path: String,
    },

    /// The exchange never produced a decodable body.
    #[error("http exchange failed")]
    Http(#[from] reqwest::Error),
}

/// A name lookup through the resolver failed.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No entity with that name, after at most one cache refill.
    #[error("no {kind} named `{name}`")]
    NotFound {
        /// Entity category that was searched.
        kind: ResourceKind,
        /// Name that was looked up.
        name: String,
    },

    /// The listing payload did not contain a decodable entity array.
    #[error("{kind} listing payload was malformed")]
    Listing {
        /// Entity category whose listing failed to decode.
        kind: ResourceKind,
    },

    /// The refill fetch itself failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// A registration-API call failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// `off` targeted a handler that is not registered under that
    /// discriminator. Explicit by contract; a silent no-op would hide bugs.
    #[error("no such handler registered for `{event_type}`")]
    NotRegistered {
        /// Discriminator the removal targeted.
        event_type: String,
    },
}

/// A producer's own operation failed for one scheduling turn.
///
/// Never fatal: the loop logs it and the cursor has already advanced past
/// the failing producer.
#[derive(Debug, Error)]
#[error("producer {index} failed")]
pub struct ProducerError {
    /// Position of the failing producer in the registration list.
    pub index: usize,
    /// The producer's underlying error.
    #[source]
    pub source: anyhow::Error,
}

/// Fatal failure of one connection's duplex loop.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The bootstrap exchange failed.
    #[error("handshake failed")]
    HandshakeFailed(#[source] GatewayError),

    /// The bootstrap payload had no usable connection URL.
    #[error("handshake response missing a connection url")]
    InvalidHandshake,

    /// Opening the duplex stream failed.
    #[error("connect failed")]
    ConnectFailed(#[source] tungstenite::Error),

    /// The inbound side of the stream died mid-run.
    #[error("stream read failed")]
    StreamReadFailed(#[source] tungstenite::Error),

    /// Writing an outbound frame failed.
    #[error("stream write failed")]
    StreamWriteFailed(#[source] tungstenite::Error),
}
