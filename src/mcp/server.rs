//! MCP Server
//!
//! Protocol handling for the tool server plus its two transports: newline-
//! delimited JSON-RPC on stdin/stdout for same-host pairing, and HTTP+SSE
//! for networked deployment. In SSE mode each connection gets its own
//! session: `GET /sse` opens the event stream and announces the session's
//! message endpoint; requests are POSTed there and answered on the stream.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::kite::KiteClient;
use crate::tools::{self, ToolRequest};

use super::protocol::*;

const SERVER_NAME: &str = "zerodha-mcp";

/// The tool server: one shared brokerage client plus the immutable catalog.
pub struct McpServer {
    /// Single-writer cell - `get_access_token` takes the write half, every
    /// other tool reads. This is the documented guarantee that a token
    /// refresh is atomic relative to concurrent calls.
    kite: RwLock<KiteClient>,
    catalog: Vec<Tool>,
}

impl McpServer {
    pub fn new(kite: KiteClient) -> Self {
        Self {
            kite: RwLock::new(kite),
            catalog: tools::catalog(),
        }
    }

    /// Handle one JSON-RPC message. Notifications return `None`.
    pub async fn handle(&self, request: Request) -> Option<Response> {
        let Some(id) = request.id.clone() else {
            debug!(method = %request.method, "notification");
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => json_result(
                id,
                InitializeResult::new(SERVER_NAME, env!("CARGO_PKG_VERSION")),
            ),
            "ping" => Response::success(id, Value::Object(Default::default())),
            "tools/list" => json_result(
                id,
                ListToolsResult {
                    tools: self.catalog.clone(),
                },
            ),
            "tools/call" => self.call_tool(id, request.params).await,
            other => {
                warn!(method = other, "unknown method");
                Response::error(id, METHOD_NOT_FOUND, format!("unknown method: {other}"))
            }
        };
        Some(response)
    }

    async fn call_tool(&self, id: Value, params: Value) -> Response {
        let params: CallToolParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => return Response::error(id, INVALID_PARAMS, format!("bad params: {e}")),
        };

        let request = match ToolRequest::parse(&params.name, &params.arguments) {
            Ok(request) => request,
            Err(message) => return Response::error(id, INVALID_PARAMS, message),
        };

        debug!(tool = %params.name, "dispatching tool call");
        json_result(id, tools::dispatch(&self.kite, request).await)
    }
}

fn json_result<T: serde::Serialize>(id: Value, result: T) -> Response {
    match serde_json::to_value(result) {
        Ok(value) => Response::success(id, value),
        Err(e) => Response::error(id, INTERNAL_ERROR, format!("serialization failed: {e}")),
    }
}

// ============================================================================
// stdio transport
// ============================================================================

/// Serve newline-delimited JSON-RPC on stdin/stdout until EOF. Logging must
/// go to stderr in this mode - stdout belongs to the protocol.
pub async fn run_stdio(server: Arc<McpServer>) -> Result<()> {
    info!("Serving MCP on stdio");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => server.handle(request).await,
            Err(e) => Some(Response::error(
                Value::Null,
                PARSE_ERROR,
                format!("invalid request: {e}"),
            )),
        };
        if let Some(response) = response {
            let mut out = serde_json::to_vec(&response).context("encoding response")?;
            out.push(b'\n');
            stdout.write_all(&out).await.context("writing stdout")?;
            stdout.flush().await.context("flushing stdout")?;
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}

// ============================================================================
// HTTP + SSE transport
// ============================================================================

struct SseState {
    server: Arc<McpServer>,
    sessions: Mutex<HashMap<Uuid, mpsc::Sender<String>>>,
}

/// Serve MCP over HTTP+SSE on the given port. Bind failure is fatal.
pub async fn run_sse(server: Arc<McpServer>, port: u16) -> Result<()> {
    let state = Arc::new(SseState {
        server,
        sessions: Mutex::new(HashMap::new()),
    });

    let app = Router::new()
        .route("/sse", get(sse_handler))
        .route("/messages", post(message_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Serving MCP over SSE at http://{addr}/sse");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}

async fn sse_handler(
    State(state): State<Arc<SseState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel::<String>(64);
    state.sessions.lock().await.insert(session_id, tx);
    info!(%session_id, "SSE session opened");

    // First event tells the client where to POST its requests; responses
    // follow on this stream.
    let endpoint = stream::once(async move {
        Ok(Event::default()
            .event("endpoint")
            .data(format!("/messages?session_id={session_id}")))
    });
    let responses = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|msg| (Ok(Event::default().event("message").data(msg)), rx))
    });

    Sse::new(endpoint.chain(responses)).keep_alive(KeepAlive::default())
}

#[derive(serde::Deserialize)]
struct SessionQuery {
    session_id: Uuid,
}

async fn message_handler(
    State(state): State<Arc<SseState>>,
    Query(query): Query<SessionQuery>,
    body: String,
) -> impl IntoResponse {
    let request = match serde_json::from_str::<Request>(&body) {
        Ok(request) => request,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid request: {e}")),
    };

    let Some(response) = state.server.handle(request).await else {
        return (StatusCode::ACCEPTED, String::new());
    };

    let payload = match serde_json::to_string(&response) {
        Ok(payload) => payload,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}")),
    };

    let sender = state.sessions.lock().await.get(&query.session_id).cloned();
    match sender {
        Some(sender) => {
            if sender.send(payload).await.is_err() {
                // Stream side is gone; drop the dead session
                state.sessions.lock().await.remove(&query.session_id);
                return (StatusCode::GONE, "session closed".to_string());
            }
            (StatusCode::ACCEPTED, String::new())
        }
        None => (StatusCode::NOT_FOUND, "unknown session".to_string()),
    }
}
