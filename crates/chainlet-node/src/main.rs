use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chainlet_core::pow::CancelFlag;
use chainlet_core::{consensus, constants, Block, Ledger, LedgerError, Transaction};
use clap::Parser;
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

mod registry;
use registry::NodeRegistry;

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Leading zero hex digits required of a valid proof
    #[arg(long, default_value_t = constants::DEFAULT_DIFFICULTY)]
    difficulty: u32,

    /// Abort a mine attempt after this many seconds
    #[arg(long, default_value_t = 30)]
    mine_timeout_secs: u64,
}

#[derive(Clone)]
struct AppState {
    ledger: Arc<RwLock<Ledger>>,
    peers: Arc<RwLock<NodeRegistry>>,
    http: reqwest::Client,
    node_id: String,
    mine_timeout: Duration,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Deserialize)]
struct TxIn {
    sender: String,
    recipient: String,
    amount: u64,
}

#[derive(Serialize)]
struct TxQueued {
    message: String,
    index: u64,
}

#[derive(Serialize)]
struct MinedBlock {
    message: &'static str,
    #[serde(flatten)]
    block: Block,
}

#[derive(Serialize)]
struct ChainView {
    chain: Vec<Block>,
    length: usize,
}

/// Shape of a peer's `GET /chain` response.
#[derive(Deserialize)]
struct ChainSnapshot {
    chain: Vec<Block>,
}

#[derive(Deserialize)]
struct RegisterIn {
    nodes: Vec<String>,
}

#[derive(Serialize)]
struct RegisterOut {
    message: &'static str,
    nodes: Vec<String>,
}

#[derive(Serialize)]
struct ResolveOut {
    replaced: bool,
    length: usize,
    chain: Vec<Block>,
}

enum ApiError {
    BadRequest(String),
    Retryable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Retryable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidTransaction(_) => ApiError::BadRequest(err.to_string()),
            LedgerError::SearchCancelled(_) => ApiError::Retryable(err.to_string()),
            LedgerError::EmptyChain | LedgerError::InvalidChain => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn submit_transaction(
    State(state): State<AppState>,
    Json(tx): Json<TxIn>,
) -> Result<(StatusCode, Json<TxQueued>), ApiError> {
    let index = state.ledger.write().submit_transaction(Transaction {
        sender: tx.sender,
        recipient: tx.recipient,
        amount: tx.amount,
    })?;
    Ok((
        StatusCode::CREATED,
        Json(TxQueued {
            message: format!("transaction will be included in block {index}"),
            index,
        }),
    ))
}

async fn pending_transactions(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    Json(state.ledger.read().pending().to_vec())
}

/// Mining runs on the blocking pool holding the ledger's exclusive lock for
/// the whole compound operation; a watchdog arms the cancel flag so a slow
/// search ends as a retryable 503 instead of wedging the node.
async fn mine(State(state): State<AppState>) -> Result<Json<MinedBlock>, ApiError> {
    let cancel = CancelFlag::new();
    let watchdog = {
        let cancel = cancel.clone();
        let timeout = state.mine_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!("mine timed out, cancelling proof search");
            cancel.cancel();
        })
    };

    let ledger = state.ledger.clone();
    let recipient = state.node_id.clone();
    let result = tokio::task::spawn_blocking(move || ledger.write().mine(&recipient, &cancel))
        .await
        .map_err(|err| ApiError::Internal(format!("mining task failed: {err}")))?;
    watchdog.abort();

    let block = result?;
    Ok(Json(MinedBlock {
        message: "new block forged",
        block,
    }))
}

async fn chain(State(state): State<AppState>) -> Json<ChainView> {
    let ledger = state.ledger.read();
    Json(ChainView {
        chain: ledger.chain().to_vec(),
        length: ledger.len(),
    })
}

async fn register_nodes(
    State(state): State<AppState>,
    Json(body): Json<RegisterIn>,
) -> Result<(StatusCode, Json<RegisterOut>), ApiError> {
    if body.nodes.is_empty() {
        return Err(ApiError::BadRequest("no peer addresses supplied".into()));
    }
    let mut peers = state.peers.write();
    for address in &body.nodes {
        peers
            .register(address)
            .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    }
    info!(total = peers.len(), "peer registry updated");
    Ok((
        StatusCode::CREATED,
        Json(RegisterOut {
            message: "peers registered",
            nodes: peers.addresses(),
        }),
    ))
}

/// Peer chains are fetched with no lock held; only the final
/// compare-and-swap takes the ledger's write lock.
async fn resolve_conflicts(State(state): State<AppState>) -> Json<ResolveOut> {
    let peers = state.peers.read().addresses();
    let mut candidates = Vec::with_capacity(peers.len());
    for peer in peers {
        match fetch_peer_chain(&state.http, &peer).await {
            Ok(chain) => candidates.push(chain),
            Err(err) => warn!(%peer, %err, "skipping peer during resolution"),
        }
    }

    let mut ledger = state.ledger.write();
    let outcome = consensus::resolve(&mut ledger, candidates);
    Json(ResolveOut {
        replaced: outcome.replaced,
        length: outcome.length,
        chain: ledger.chain().to_vec(),
    })
}

async fn fetch_peer_chain(
    http: &reqwest::Client,
    base: &str,
) -> Result<Vec<Block>, reqwest::Error> {
    let snapshot = http
        .get(format!("{base}/chain"))
        .send()
        .await?
        .error_for_status()?
        .json::<ChainSnapshot>()
        .await?;
    Ok(snapshot.chain)
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chain", get(chain))
        .route("/transactions/new", post(submit_transaction))
        .route("/transactions/pending", get(pending_transactions))
        .route("/mine", get(mine))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/resolve", get(resolve_conflicts))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Per-process identifier; mining rewards go to it.
fn fresh_node_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        args.difficulty <= constants::MAX_DIFFICULTY,
        "difficulty cannot exceed {} hex digits",
        constants::MAX_DIFFICULTY
    );

    let node_id = fresh_node_id();
    let state = AppState {
        ledger: Arc::new(RwLock::new(Ledger::new(args.difficulty))),
        peers: Arc::new(RwLock::new(NodeRegistry::new())),
        http: reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?,
        node_id: node_id.clone(),
        mine_timeout: Duration::from_secs(args.mine_timeout_secs),
    };

    let app = router(state);
    let addr: SocketAddr = args.listen.parse()?;
    info!(%addr, %node_id, difficulty = args.difficulty, "chainlet-node listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
