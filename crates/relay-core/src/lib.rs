//! # relay-core
//!
//! Wire-level frame types shared by the relay client:
//!
//! - **[`Event`]**: A decoded inbound frame: an opaque JSON object with a
//!   mandatory `type` discriminator. Malformed frames are typed
//!   [`FrameError`]s, never silently defaulted.
//! - **[`OutboundMessage`]**: An outbound frame: a producer's record merged
//!   with a connection-unique correlation `id` assigned before transmission.
//!
//! No I/O lives here; transport and dispatch are in `relay-client`.

pub mod event;
pub mod message;

pub use event::{Event, FrameError};
pub use message::{CorrelationId, OutboundMessage};
