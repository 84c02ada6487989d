//! The provider protocol server.
//!
//! Serves [`ProviderRequest`] frames as newline-delimited JSON over TCP and
//! prints the handshake line to stdout once the listener is bound. The
//! server handles OS signals (SIGTERM, SIGINT) for graceful shutdown: the
//! accept loop stops, in-flight connections get a bounded drain window, and
//! anything still running after the timeout is dropped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::orchestrator::{CrudOrchestrator, LedgerCheck, OperationOutcome};
use crate::proto::{ProviderRequest, ProviderResponse, HANDSHAKE_PREFIX, PROTOCOL_VERSION};
use crate::types::OperationStatus;

/// Options for [`serve_with_options`].
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Timeout for graceful shutdown. After receiving a shutdown signal,
    /// in-flight connections get this long to finish before being dropped.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServeOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the graceful shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Dispatches protocol requests onto a [`CrudOrchestrator`].
#[derive(Debug, Clone)]
pub struct ProviderServer {
    orchestrator: Arc<CrudOrchestrator>,
}

impl ProviderServer {
    /// Wrap an orchestrator for serving.
    pub fn new(orchestrator: CrudOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Handle one request frame.
    ///
    /// Mutating requests go through the operation ledger: a request id that
    /// already reached a terminal state gets the recorded outcome replayed,
    /// and one that is still executing on another connection answers
    /// `conflict` rather than running twice.
    #[instrument(skip_all, fields(op = request_op(&request)))]
    pub async fn handle(&self, request: ProviderRequest) -> ProviderResponse {
        if let Some(request_id) = request.request_id() {
            match self.orchestrator.ledger().begin(request_id) {
                LedgerCheck::New => {},
                LedgerCheck::InFlight(status) => {
                    warn!(request_id, ?status, "Duplicate request id still executing");
                    return ProviderResponse::Error {
                        code: "conflict".to_string(),
                        message: format!("request '{}' is still executing", request_id),
                        field: None,
                    };
                },
                LedgerCheck::Done(outcome) => {
                    debug!(request_id, "Replaying recorded outcome");
                    return outcome.into();
                },
            }
        }

        match request {
            ProviderRequest::GetSchema { type_name } => self.get_schema(type_name),
            ProviderRequest::Configure { config } => match self.orchestrator.configure(&config) {
                Ok(()) => ProviderResponse::Configured,
                Err(e) => ProviderResponse::from(&e),
            },
            ProviderRequest::Validate { spec } => match self.orchestrator.validate(&spec) {
                Ok(diagnostics) => ProviderResponse::Diagnostics { diagnostics },
                Err(e) => ProviderResponse::from(&e),
            },
            ProviderRequest::Plan { state, spec } => {
                match self.orchestrator.plan(state.as_ref(), &spec) {
                    Ok(plan) => ProviderResponse::Plan { plan },
                    Err(e) => ProviderResponse::from(&e),
                }
            },
            ProviderRequest::Create { request_id, spec } => {
                self.track(&request_id, true);
                let result = self.orchestrator.create(&spec).await.map(Some);
                self.finish(&request_id, OperationOutcome::from_result(&result))
            },
            ProviderRequest::Read { state } => match self.orchestrator.read(&state).await {
                Ok(state) => ProviderResponse::State { state },
                Err(e) => ProviderResponse::from(&e),
            },
            ProviderRequest::Update {
                request_id,
                state,
                spec,
            } => {
                self.track(&request_id, true);
                let result = self.orchestrator.update(&state, &spec).await.map(Some);
                self.finish(&request_id, OperationOutcome::from_result(&result))
            },
            ProviderRequest::Delete { request_id, state } => {
                self.track(&request_id, false);
                let outcome = match self.orchestrator.delete(&state).await {
                    Ok(()) => OperationOutcome::Deleted,
                    Err(e) => OperationOutcome::failure(&e),
                };
                self.finish(&request_id, outcome)
            },
        }
    }

    fn get_schema(&self, type_name: Option<String>) -> ProviderResponse {
        match type_name {
            Some(name) => match self.orchestrator.registry().schema(&name) {
                Ok(schema) => ProviderResponse::Schemas {
                    schemas: [(name, schema)].into_iter().collect(),
                },
                Err(e) => ProviderResponse::from(&e),
            },
            None => ProviderResponse::Schemas {
                schemas: self.orchestrator.registry().schemas(),
            },
        }
    }

    // Validation happens inside the orchestrator call; delete has no spec
    // to validate, so it moves straight to Executing.
    fn track(&self, request_id: &str, validates: bool) {
        let ledger = self.orchestrator.ledger();
        if validates {
            ledger.advance(request_id, OperationStatus::Validated);
        }
        ledger.advance(request_id, OperationStatus::Executing);
    }

    fn finish(&self, request_id: &str, outcome: OperationOutcome) -> ProviderResponse {
        self.orchestrator.ledger().complete(request_id, outcome.clone());
        outcome.into()
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// On Unix, this waits for SIGTERM or SIGINT. Elsewhere it waits for
/// CTRL+C.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
        info!("Received CTRL+C, initiating graceful shutdown");
    }
}

/// Serve an orchestrator on an ephemeral local port.
///
/// This function:
/// 1. Binds to an available 127.0.0.1 port
/// 2. Outputs the handshake string to stdout
/// 3. Serves JSON frames until a shutdown signal arrives
///
/// The handshake format is: `SENDGRID_PROVIDER|<version>|<address>`
///
/// For custom configuration, use [`serve_with_options`].
pub async fn serve(orchestrator: CrudOrchestrator) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(orchestrator, ServeOptions::default()).await
}

/// Serve with custom options. See [`serve`] for details.
pub async fn serve_with_options(
    orchestrator: CrudOrchestrator,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_on_listener(orchestrator, listener, options).await
}

/// Serve on a specific address rather than an ephemeral port.
pub async fn serve_on(
    orchestrator: CrudOrchestrator,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    serve_on_listener(orchestrator, listener, ServeOptions::default()).await
}

async fn serve_on_listener(
    orchestrator: CrudOrchestrator,
    listener: TcpListener,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = listener.local_addr()?;

    // The handshake; the engine parses this line to find the server.
    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);
    info!(address = %addr, "Provider server starting");

    let server = ProviderServer::new(orchestrator);
    let mut connections = JoinSet::new();

    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Connection accepted");
                        let server = server.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(server, stream).await {
                                warn!(%peer, error = %e, "Connection error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    // Give in-flight connections a bounded window to finish.
    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(options.shutdown_timeout, drain).await.is_err() {
        warn!(
            timeout = ?options.shutdown_timeout,
            "Shutdown timeout exceeded, dropping remaining connections"
        );
        connections.shutdown().await;
    }

    info!("Provider shutdown complete");
    Ok(())
}

async fn handle_connection(
    server: ProviderServer,
    stream: TcpStream,
) -> Result<(), std::io::Error> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ProviderRequest>(&line) {
            Ok(request) => server.handle(request).await,
            Err(e) => ProviderResponse::Error {
                code: "serialization".to_string(),
                message: format!("malformed request frame: {}", e),
                field: None,
            },
        };
        let mut frame = serde_json::to_vec(&response).unwrap_or_else(|_| {
            // A response we built ourselves always serializes; this is the
            // last-resort frame if that assumption ever breaks.
            br#"{"result":"error","code":"internal","message":"response serialization failed"}"#
                .to_vec()
        });
        frame.push(b'\n');
        writer.write_all(&frame).await?;
        writer.flush().await?;
    }

    Ok(())
}

fn request_op(request: &ProviderRequest) -> &'static str {
    match request {
        ProviderRequest::GetSchema { .. } => "get_schema",
        ProviderRequest::Configure { .. } => "configure",
        ProviderRequest::Validate { .. } => "validate",
        ProviderRequest::Plan { .. } => "plan",
        ProviderRequest::Create { .. } => "create",
        ProviderRequest::Read { .. } => "read",
        ProviderRequest::Update { .. } => "update",
        ProviderRequest::Delete { .. } => "delete",
    }
}
