//! Transport (§4.12, secondary): an axum HTTP + WebSocket front end exposing
//! the §6.3 Client Message Protocol over the network, plus static asset
//! serving for a browser-based front end.
//!
//! Every handler offloads to [`crate::client::NoeticClient::Local`] via
//! `spawn_blocking`, since the protocol calls end up taking a `Mutex` guard
//! somewhere inside [`noetic::cognition::Cognition`] — cheap, but not async.
//! The WebSocket route is the only place that talks to the bus directly: it
//! subscribes once per connection and forwards every [`noetic::event::Event`]
//! of interest to the socket, while decoding inbound frames as
//! [`noetic::message::ClientRequest`] and replaying them onto the same
//! `NoeticClient`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use noetic::bus::EventBus;
use noetic::client::{write_pid_file, NoeticClient, ServerInfo};
use noetic::cognition::Cognition;
use noetic::config::EngineConfig;
use noetic::event::{Event, QueryType, RetractTarget};
use noetic::kb::GLOBAL_CONTEXT;
use noetic::message::{ClientRequest, ClientResponse};
use noetic::paths::NoeticPaths;

#[derive(Parser, Debug)]
#[command(name = "noetic-server", about = "HTTP/WebSocket front end for the noetic cognitive engine")]
struct Cli {
    /// Address to bind the HTTP server on.
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8420)]
    port: u16,

    /// Path to an `EngineConfig` TOML file; falls back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of static assets to serve at `/`.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Load this persistence snapshot on startup.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

struct AppState {
    cognition: Arc<Cognition>,
    client: NoeticClient,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).unwrap_or_else(|e| {
            warn!(%e, "failed to load config, using defaults");
            EngineConfig::default()
        }),
        None => EngineConfig::default(),
    };

    let bus = Arc::new(EventBus::start());
    let llm_enabled = config.llm_enabled;
    let (llm_base_url, llm_model, dialogue_timeout_ms) = (config.llm_base_url.clone(), config.llm_model.clone(), config.dialogue_timeout_ms);
    let cognition = Cognition::new(config, bus);
    if llm_enabled {
        cognition.set_llm_client(Arc::new(noetic::llm::HttpLlmClient::new(llm_base_url, llm_model)), dialogue_timeout_ms);
    }

    if let Some(path) = &cli.snapshot {
        if path.exists() {
            if let Err(e) = noetic::persistence::load(path, &cognition) {
                warn!(%e, "failed to load snapshot, starting empty");
            }
        }
    }

    let state = Arc::new(AppState { client: NoeticClient::local(Arc::clone(&cognition)), cognition });

    let mut router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/kif", post(assert_kif))
        .route("/query", post(query))
        .route("/retract", post(retract))
        .route("/tools/{name}", post(run_tool))
        .route("/dialogue/{id}", post(dialogue_response))
        .route("/ws", get(ws_upgrade))
        .with_state(Arc::clone(&state))
        .layer(CorsLayer::permissive());

    if let Some(dir) = &cli.static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    if let Ok(paths) = NoeticPaths::resolve() {
        let info = ServerInfo { pid: std::process::id(), port: cli.port, bind: cli.bind.clone() };
        let _ = paths.ensure_dirs();
        let _ = write_pid_file(&paths.pid_file(), &info);
    }

    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse().expect("invalid bind address");
    info!(%addr, "noetic-server listening");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind");
    axum::serve(listener, router).await.expect("server error");
}

#[derive(serde::Deserialize)]
struct AssertKifBody {
    kb: Option<String>,
    kif: String,
    #[serde(default)]
    source_note_id: Option<String>,
}

async fn assert_kif(State(state): State<Arc<AppState>>, Json(body): Json<AssertKifBody>) -> impl IntoResponse {
    let kb = body.kb.unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
    match state.client.assert_kif(&kb, &body.kif, body.source_note_id) {
        Ok(assertion_id) => Json(ClientResponse::Asserted { id: "http".into(), assertion_id }).into_response(),
        Err(e) => Json(ClientResponse::error("http", e.to_string())).into_response(),
    }
}

#[derive(serde::Deserialize)]
struct QueryBody {
    query_type: QueryType,
    pattern: String,
    target_kb_id: Option<String>,
}

async fn query(State(state): State<Arc<AppState>>, Json(body): Json<QueryBody>) -> impl IntoResponse {
    match state.client.query(body.query_type, &body.pattern, body.target_kb_id) {
        Ok(answer) => Json(ClientResponse::Answered { id: "http".into(), answer }).into_response(),
        Err(e) => Json(ClientResponse::error("http", e.to_string())).into_response(),
    }
}

#[derive(serde::Deserialize)]
struct RetractBody {
    kb: Option<String>,
    target: RetractTarget,
}

async fn retract(State(state): State<Arc<AppState>>, Json(body): Json<RetractBody>) -> impl IntoResponse {
    let kb = body.kb.unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
    match state.client.retract(&kb, body.target) {
        Ok(()) => Json(ClientResponse::Retracted { id: "http".into() }).into_response(),
        Err(e) => Json(ClientResponse::error("http", e.to_string())).into_response(),
    }
}

#[derive(serde::Deserialize)]
struct RunToolBody {
    kb: Option<String>,
    parameters: Vec<(String, String)>,
}

async fn run_tool(State(state): State<Arc<AppState>>, Path(name): Path<String>, Json(body): Json<RunToolBody>) -> impl IntoResponse {
    let kb = body.kb.unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
    match state.client.run_tool(&kb, &name, body.parameters) {
        Ok(result) => Json(ClientResponse::ToolRan { id: "http".into(), result }).into_response(),
        Err(e) => Json(ClientResponse::error("http", e.to_string())).into_response(),
    }
}

#[derive(serde::Deserialize)]
struct DialogueBody {
    response: String,
}

async fn dialogue_response(State(state): State<Arc<AppState>>, Path(dialogue_id): Path<String>, Json(body): Json<DialogueBody>) -> impl IntoResponse {
    match state.client.dialogue_response(&dialogue_id, &body.response) {
        Ok(()) => Json(ClientResponse::DialogueAcknowledged { id: "http".into() }).into_response(),
        Err(e) => Json(ClientResponse::error("http", e.to_string())).into_response(),
    }
}

/// Upgrade to a WebSocket that frames bus [`Event`]s outbound and decodes
/// [`ClientRequest`]s inbound (§4.12).
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    state.cognition.bus().subscribe(Box::new(move |event| {
        let _ = tx.send(event.clone());
    }));

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let response = dispatch_client_request(&state, &text);
                        if let Ok(json) = serde_json::to_string(&response) {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

fn dispatch_client_request(state: &Arc<AppState>, text: &str) -> ClientResponse {
    let request: ClientRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => return ClientResponse::error("unknown", e.to_string()),
    };
    let id = request.id().to_string();
    match request {
        ClientRequest::AssertKif { kb, kif, source_note_id, .. } => {
            let kb = kb.unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
            match state.client.assert_kif(&kb, &kif, source_note_id) {
                Ok(assertion_id) => ClientResponse::Asserted { id, assertion_id },
                Err(e) => ClientResponse::error(id, e.to_string()),
            }
        }
        ClientRequest::Query { query_type, pattern, target_kb_id, .. } => match state.client.query(query_type, &pattern, target_kb_id) {
            Ok(answer) => ClientResponse::Answered { id, answer },
            Err(e) => ClientResponse::error(id, e.to_string()),
        },
        ClientRequest::Retract { kb, target, .. } => {
            let kb = kb.unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
            match state.client.retract(&kb, target) {
                Ok(()) => ClientResponse::Retracted { id },
                Err(e) => ClientResponse::error(id, e.to_string()),
            }
        }
        ClientRequest::RunTool { tool_name, kb, parameters, .. } => {
            let kb = kb.unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
            match state.client.run_tool(&kb, &tool_name, parameters) {
                Ok(result) => ClientResponse::ToolRan { id, result },
                Err(e) => ClientResponse::error(id, e.to_string()),
            }
        }
        ClientRequest::DialogueResponse { dialogue_id, response, .. } => match state.client.dialogue_response(&dialogue_id, &response) {
            Ok(()) => ClientResponse::DialogueAcknowledged { id },
            Err(e) => ClientResponse::error(id, e.to_string()),
        },
    }
}
