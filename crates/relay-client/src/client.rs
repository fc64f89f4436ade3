//! The client and its duplex event loop.
//!
//! One [`Client`] owns exactly one connection lifecycle:
//! `Handshaking → Connecting → Running → Terminated`. The handshake is a
//! single gateway exchange that returns the stream URL (and seed listings
//! for the directory); the running loop then races the next inbound frame
//! against the next scheduled outbound message on one duplex stream.
//!
//! The race is `tokio::select!` over two cancel-safe operations: the split
//! stream's `next()` (tungstenite buffers partial frames internally, so an
//! abandoned poll drops no bytes) and an mpsc `recv()` fed by a pump task
//! that drains the producer scheduler (a produced message stays queued until
//! the write side wins a turn). Losing the race abandons only the poll,
//! never the work.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use metrics::counter;
use relay_core::Event;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::directory::{Directory, Entity, ResourceKind};
use crate::errors::{ClientError, RegistryError};
use crate::gateway::ApiGateway;
use crate::registry::{EventRegistry, HandlerId};
use crate::scheduler::{DEFAULT_PRODUCER_DELAY, Producer, ProducerSet};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bootstrap endpoint: one POST returns the stream URL plus seed listings.
const BOOTSTRAP_PATH: &str = "rtm.start";

/// Outbound queue depth between the producer pump and the stream writer.
const OUTBOUND_BUFFER: usize = 16;

/// Lifecycle of one connection. Terminal state is never left; there is no
/// reconnect inside one [`Client::run`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Performing the bootstrap exchange.
    Handshaking,
    /// Opening the duplex stream.
    Connecting,
    /// Racing inbound dispatch against outbound production.
    Running,
    /// Stream closed; no further dispatch or production.
    Terminated,
}

/// Client construction parameters.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Authentication token sent with every gateway exchange.
    pub token: String,
    /// Override of the fixed API base endpoint (tests, alternate hosts).
    pub base_url: Option<String>,
    /// Override of the shared inter-production delay.
    pub producer_delay: Option<Duration>,
}

impl ClientConfig {
    /// Config with defaults for everything but the token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: None,
            producer_delay: None,
        }
    }
}

/// A persistent-connection event client.
///
/// Register handlers and producers, then call [`run`](Self::run). Registry,
/// directory caches, and the scheduler cursor are owned by this instance, so
/// independent clients coexist freely.
pub struct Client {
    gateway: Arc<ApiGateway>,
    directory: Arc<Directory>,
    registry: EventRegistry,
    producers: ProducerSet,
    state_tx: watch::Sender<SessionState>,
}

impl Client {
    /// Build a client from config. No I/O happens until [`run`](Self::run).
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let gateway = Arc::new(match config.base_url {
            Some(base_url) => ApiGateway::with_base_url(config.token, base_url),
            None => ApiGateway::new(config.token),
        });
        let directory = Arc::new(Directory::new(Arc::clone(&gateway)));
        let (state_tx, _) = watch::channel(SessionState::Handshaking);
        Self {
            gateway,
            directory,
            registry: EventRegistry::new(),
            producers: ProducerSet::new(config.producer_delay.unwrap_or(DEFAULT_PRODUCER_DELAY)),
            state_tx,
        }
    }

    /// Register a handler for an event type (or the `"*"` wildcard).
    pub fn on<F, Fut>(&mut self, event_type: &str, handler: F) -> HandlerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.registry.on(event_type, handler)
    }

    /// Unregister a previously registered handler.
    pub fn off(&mut self, event_type: &str, id: HandlerId) -> Result<(), RegistryError> {
        self.registry.off(event_type, id)
    }

    /// Append an outbound-message source to the round-robin rotation.
    pub fn add_producer(&mut self, producer: Producer) {
        self.producers.add(producer);
    }

    /// Shared resolver handle, for use inside handlers and producers.
    #[must_use]
    pub fn directory(&self) -> Arc<Directory> {
        Arc::clone(&self.directory)
    }

    /// Observe connection state transitions.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Drive one connection to completion.
    ///
    /// Consumes the client: registry, caches, and cursor die with the
    /// connection. Returns `Ok(())` on clean remote close.
    ///
    /// # Errors
    ///
    /// The fatal [`ClientError`] that terminated the loop; handler and
    /// producer failures never surface here.
    pub async fn run(self) -> Result<(), ClientError> {
        let Self {
            gateway,
            directory,
            registry,
            producers,
            state_tx,
        } = self;
        let result = Self::drive(&gateway, &directory, registry, producers, &state_tx).await;
        // Terminal on every exit path, fatal or clean.
        let _ = state_tx.send(SessionState::Terminated);
        info!("terminated");
        result
    }

    /// Handshake, connect, then hand off to the steady-state loop.
    async fn drive(
        gateway: &ApiGateway,
        directory: &Directory,
        registry: EventRegistry,
        producers: ProducerSet,
        state_tx: &watch::Sender<SessionState>,
    ) -> Result<(), ClientError> {
        let _ = state_tx.send(SessionState::Handshaking);
        info!("handshaking");
        let handshake = gateway
            .post(BOOTSTRAP_PATH, &[], HeaderMap::new())
            .await
            .map_err(ClientError::HandshakeFailed)?;
        let url = handshake
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or(ClientError::InvalidHandshake)?
            .to_owned();
        Self::seed_directory(directory, &handshake);

        let _ = state_tx.send(SessionState::Connecting);
        info!(url = %url, "connecting");
        let (stream, _response) = connect_async(&url)
            .await
            .map_err(ClientError::ConnectFailed)?;

        let _ = state_tx.send(SessionState::Running);
        info!("running");
        Self::run_loop(stream, registry, producers).await
    }

    /// Seed directory caches from the handshake payload's listings.
    fn seed_directory(directory: &Directory, handshake: &Value) {
        for (kind, key) in [(ResourceKind::Channel, "channels"), (ResourceKind::User, "users")] {
            let Some(listing) = handshake.get(key) else {
                continue;
            };
            match serde_json::from_value::<Vec<Entity>>(listing.clone()) {
                Ok(entries) => directory.seed(kind, entries),
                Err(error) => warn!(%kind, error = %error, "ignoring undecodable seed listing"),
            }
        }
    }

    /// The steady-state race: next inbound frame vs. next outbound message.
    async fn run_loop(
        stream: WsStream,
        registry: EventRegistry,
        mut producers: ProducerSet,
    ) -> Result<(), ClientError> {
        let (mut ws_tx, mut ws_rx) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel(OUTBOUND_BUFFER);

        // Production pump: repeatedly take a scheduling turn and queue the
        // result. Producer failures are logged and counted here;
        // the rotation moves on.
        let pump = tokio::spawn(async move {
            if producers.is_empty() {
                return;
            }
            loop {
                match producers.next().await {
                    Ok(Some(message)) => {
                        if out_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(error) => {
                        counter!("relay_producer_failures_total").increment(1);
                        warn!(index = error.index, error = %error.source, "producer failed");
                    }
                }
            }
        });

        let mut producing = true;
        let result = loop {
            tokio::select! {
                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => match Event::parse(&text) {
                        Ok(event) => {
                            info!(event_type = event.event_type(), "received event");
                            let _ = registry.dispatch(&event);
                        }
                        Err(error) => {
                            counter!("relay_malformed_frames_total").increment(1);
                            warn!(error = %error, "malformed frame");
                        }
                    },
                    // Pings are answered by tungstenite itself; binary and
                    // pong frames carry nothing for us.
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        info!("stream closed by remote");
                        break Ok(());
                    }
                    Some(Err(source)) => break Err(ClientError::StreamReadFailed(source)),
                },
                produced = out_rx.recv(), if producing => match produced {
                    Some(message) => {
                        debug!(id = message.id(), "sending message");
                        counter!("relay_messages_sent_total").increment(1);
                        if let Err(source) = ws_tx.send(Message::text(message.to_frame())).await {
                            break Err(ClientError::StreamWriteFailed(source));
                        }
                    }
                    // Pump finished (no producers); read-only from here on.
                    None => producing = false,
                },
            }
        };

        pump.abort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ClientConfig {
        ClientConfig {
            token: "xoxb-test".into(),
            base_url: Some(server.uri()),
            producer_delay: Some(Duration::from_millis(1)),
        }
    }

    #[tokio::test]
    async fn failed_handshake_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rtm.start"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = Client::new(config(&server));
        let mut state = client.state_watch();
        let error = client.run().await.unwrap_err();
        assert_matches!(error, ClientError::HandshakeFailed(_));
        assert_eq!(*state.borrow_and_update(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn handshake_without_url_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rtm.start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = Client::new(config(&server));
        let error = client.run().await.unwrap_err();
        assert_matches!(error, ClientError::InvalidHandshake);
    }

    #[tokio::test]
    async fn unreachable_stream_url_is_connect_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rtm.start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                // Nothing listens on port 1.
                "url": "ws://127.0.0.1:1/",
                "channels": [],
                "users": [],
            })))
            .mount(&server)
            .await;

        let client = Client::new(config(&server));
        let error = client.run().await.unwrap_err();
        assert_matches!(error, ClientError::ConnectFailed(_));
    }

    #[tokio::test]
    async fn handshake_seeds_the_directory() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rtm.start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "url": "ws://127.0.0.1:1/",
                "channels": [{"id": "C1", "name": "general"}],
                "users": [{"id": "U1", "name": "alice"}],
            })))
            .mount(&server)
            .await;

        let client = Client::new(config(&server));
        let directory = client.directory();
        // Connect fails (nothing listens), but seeding already happened.
        let _ = client.run().await.unwrap_err();

        let channel = directory
            .resolve(ResourceKind::Channel, "general")
            .await
            .unwrap();
        assert_eq!(channel.id, "C1");
        let user = directory.resolve(ResourceKind::User, "alice").await.unwrap();
        assert_eq!(user.id, "U1");
    }

    #[tokio::test]
    async fn registration_api_round_trip() {
        let mut client = Client::new(ClientConfig::new("xoxb-test"));
        let id = client.on("message", |_event| async { Ok(()) });
        client.off("message", id).unwrap();
        assert_matches!(
            client.off("message", id),
            Err(RegistryError::NotRegistered { .. })
        );
    }
}
