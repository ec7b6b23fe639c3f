//! WebSocket Pact Server
//!
//! Async WebSocket server exposing a [`PactService`]. Each connection
//! authenticates with a JWT first; the token subject becomes the caller
//! for every later operation. Ledger events are pushed to every connection.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::core::ids::ActorId;
use crate::error::PactError;
use crate::ledger::AccessUpdate;
use crate::network::auth::{validate_token, AuthConfig};
use crate::network::protocol::{
    AdminAction, AuthResult, CallbackRequest, ClientMessage, ErrorBody, ErrorCode, ServerMessage,
    decode_bytes, MAX_ENCRYPT_VALUES,
};
use crate::network::service::PactService;

/// Default bind address.
pub const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8080);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outgoing message buffer per connection.
    pub outbound_buffer: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(DEFAULT_BIND_ADDR),
            max_connections: 1000,
            outbound_buffer: 64,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from `PACTS_BIND_ADDR` and `PACTS_MAX_CONNECTIONS`.
    pub fn from_env() -> Result<Self, ServerError> {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("PACTS_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|_| ServerError::Config(format!("invalid PACTS_BIND_ADDR: {addr}")))?;
        }
        if let Ok(max) = std::env::var("PACTS_MAX_CONNECTIONS") {
            config.max_connections = max
                .parse()
                .map_err(|_| ServerError::Config(format!("invalid PACTS_MAX_CONNECTIONS: {max}")))?;
        }
        Ok(config)
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Per-connection state.
#[derive(Debug, Default, Clone)]
pub struct ClientSession {
    /// Authenticated caller.
    pub actor: Option<ActorId>,
}

/// Connected client bookkeeping.
struct ConnectedClient {
    actor: Option<ActorId>,
    connected_at: Instant,
}

/// The pact server.
pub struct PactServer {
    config: ServerConfig,
    auth: AuthConfig,
    service: Arc<PactService>,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl PactServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, auth: AuthConfig, service: Arc<PactService>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            auth,
            service,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the accept loop until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Pact server v{} listening on {}", self.config.version, self.config.bind_addr);

        if !self.auth.is_configured() {
            warn!("Authentication not configured; every auth attempt will fail");
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connection_count().await >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let service = self.service.clone();
        let auth = self.auth.clone();
        let buffer = self.config.outbound_buffer;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(buffer);

            clients.write().await.insert(addr, ConnectedClient {
                actor: None,
                connected_at: Instant::now(),
            });

            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let mut events = service.subscribe_events();
            let event_tx = msg_tx.clone();
            let event_task = tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            debug!("Forwarding batch {} event to {}", event.batch_id(), addr);
                            if event_tx.send(ServerMessage::Event(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Client {} lagged, {} events dropped", addr, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });

            let mut session = ClientSession::default();

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let reply = match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        let reply = handle_client_message(&service, &auth, &mut session, client_msg).await;
                                        if let Some(client) = clients.write().await.get_mut(&addr) {
                                            client.actor = session.actor;
                                        }
                                        reply
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        ServerMessage::error(ErrorCode::InvalidInput, "Invalid message format")
                                    }
                                };
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx
                                    .send(ServerMessage::error(ErrorCode::InvalidInput, "Binary frames not supported"))
                                    .await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            event_task.abort();
            sender_task.abort();

            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    "Client {} ({}) cleaned up after {:?}",
                    addr,
                    client.actor.map(|a| a.to_string()).unwrap_or_else(|| "anonymous".into()),
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Authenticated connection count.
    pub async fn authenticated_count(&self) -> usize {
        self.clients.read().await.values().filter(|c| c.actor.is_some()).count()
    }
}

// =============================================================================
// MESSAGE HANDLING
// =============================================================================

/// Handle one client message and produce the reply.
pub async fn handle_client_message(
    service: &PactService,
    auth: &AuthConfig,
    session: &mut ClientSession,
    msg: ClientMessage,
) -> ServerMessage {
    let caller = match (&msg, session.actor) {
        (ClientMessage::Auth { token }, _) => return handle_auth(auth, session, token),
        (ClientMessage::Ping { timestamp }, _) => {
            return ServerMessage::Pong {
                timestamp: *timestamp,
                server_time: u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0),
            };
        }
        (_, Some(actor)) => actor,
        (_, None) => return ServerMessage::error(ErrorCode::NotAuthenticated, "Authenticate first"),
    };

    match msg {
        ClientMessage::Encrypt { values } => {
            if values.is_empty() || values.len() > MAX_ENCRYPT_VALUES {
                return ServerMessage::error(
                    ErrorCode::InvalidInput,
                    format!("Expected 1 to {MAX_ENCRYPT_VALUES} values"),
                );
            }
            let handles = service
                .encrypt_inputs(&values)
                .await
                .iter()
                .map(|value| hex::encode(value.handle()))
                .collect();
            ServerMessage::Encrypted { handles }
        }
        ClientMessage::OpenBatch => match service.open_batch(caller).await {
            Ok(batch_id) => ServerMessage::Batch { batch_id, open: true },
            Err(e) => rejected(e),
        },
        ClientMessage::CloseBatch => match service.close_batch(caller).await {
            Ok(batch_id) => ServerMessage::Batch { batch_id, open: false },
            Err(e) => rejected(e),
        },
        ClientMessage::Submit(request) => {
            let input = match request.to_input() {
                Ok(input) => input,
                Err(field) => {
                    return ServerMessage::error(ErrorCode::InvalidInput, format!("Malformed handle: {field}"));
                }
            };
            match service.submit(caller, input).await {
                Ok(record_id) => ServerMessage::Submitted { record_id },
                Err(e) => rejected(e),
            }
        }
        ClientMessage::RequestDecryption { batch_id } => {
            match service.request_decryption(caller, batch_id).await {
                Ok(ticket) => ServerMessage::DecryptionRequested {
                    request_id: ticket.request_id,
                    batch_id: ticket.batch_id,
                    commitment: hex::encode(ticket.commitment),
                },
                Err(e) => rejected(e),
            }
        }
        ClientMessage::Callback(callback) => handle_callback(service, caller, callback).await,
        ClientMessage::Admin(action) => {
            let update = match access_update(&action) {
                Some(update) => update,
                None => return ServerMessage::error(ErrorCode::InvalidInput, "Malformed actor id"),
            };
            match service.update_access(caller, update).await {
                Ok(()) => ServerMessage::Done,
                Err(e) => rejected(e),
            }
        }
        ClientMessage::GetBatch { batch_id } => ServerMessage::BatchInfo(service.batch_info(batch_id).await),
        ClientMessage::GetRequest { request_id } => match service.request_info(request_id).await {
            Some(info) => ServerMessage::RequestInfo(info),
            None => ServerMessage::error(ErrorCode::NotFound, format!("Unknown request {request_id}")),
        },
        ClientMessage::Auth { .. } | ClientMessage::Ping { .. } => {
            ServerMessage::error(ErrorCode::InvalidInput, "Unexpected message")
        }
    }
}

fn handle_auth(auth: &AuthConfig, session: &mut ClientSession, token: &str) -> ServerMessage {
    match validate_token(token, auth) {
        Ok(claims) => {
            let actor = claims.actor_id();
            session.actor = Some(actor);
            info!("Authenticated {} as {}", claims.sub, actor);
            ServerMessage::AuthResult(AuthResult {
                success: true,
                actor_id: Some(actor.to_uuid_string()),
                error: None,
            })
        }
        Err(e) => {
            warn!("Authentication failed: {}", e);
            ServerMessage::AuthResult(AuthResult {
                success: false,
                actor_id: None,
                error: Some(e.to_string()),
            })
        }
    }
}

async fn handle_callback(service: &PactService, caller: ActorId, callback: CallbackRequest) -> ServerMessage {
    let (Some(plaintext), Some(proof)) = (decode_bytes(&callback.plaintext), decode_bytes(&callback.proof)) else {
        return ServerMessage::error(ErrorCode::InvalidInput, "Malformed hex payload");
    };
    match service
        .on_decryption_callback(caller, callback.request_id, &plaintext, &proof)
        .await
    {
        Ok(revealed) => ServerMessage::Revealed(revealed),
        Err(e) => rejected(e),
    }
}

fn access_update(action: &AdminAction) -> Option<AccessUpdate> {
    let actor = |raw: &str| ActorId::from_uuid_str(raw);
    Some(match action {
        AdminAction::AddProvider { actor: a } => AccessUpdate::AddProvider(actor(a)?),
        AdminAction::RemoveProvider { actor: a } => AccessUpdate::RemoveProvider(actor(a)?),
        AdminAction::SetRelay { actor: a } => AccessUpdate::SetRelay(actor(a)?),
        AdminAction::SetPaused { paused } => AccessUpdate::SetPaused(*paused),
        AdminAction::SetCooldown { seconds } => AccessUpdate::SetCooldown(*seconds),
        AdminAction::TransferOwnership { actor: a } => AccessUpdate::TransferOwnership(actor(a)?),
    })
}

fn rejected(err: PactError) -> ServerMessage {
    ServerMessage::Error(ErrorBody {
        code: ErrorCode::Rejected,
        class: Some(err.class()),
        message: err.to_string(),
    })
}
