//! In-process engine node serving the custody REST API.
//!
//! Stores blinded shares in memory, checks that the authorization tag names
//! the requesting wallet and seals downloads to the requester's ephemeral key.
//! Signatures are not verified.

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{patch, put};
use axum::{Json, Router};
use parking_lot::{Mutex, RwLock};
use rand::rngs::OsRng;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use custody_crypto::sealed::public_key_from_hex;
use custody_crypto::{commit, generate_ephemeral_key, seal, BoxSecretKey};
use custody_types::{
    AddAddressMessage, DownloadMessage, EncryptedShareResponse, RecoveringAddress,
    RemoveAddressMessage, UploadShareRequest,
};

/// How the engine answers requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Normal,
    /// Answer every request with this status
    Fail(u16),
    /// Seal downloads with a key the client cannot open
    Corrupt,
}

#[derive(Clone, Debug)]
struct StoredShare {
    share_data: Vec<u8>,
    addresses: BTreeSet<String>,
}

struct EngineState {
    contract: String,
    secret_key: BoxSecretKey,
    mode: RwLock<Mode>,
    shares: Mutex<HashMap<String, StoredShare>>,
}

impl EngineState {
    fn gate(&self, contract: &str) -> Result<(), StatusCode> {
        if let Mode::Fail(code) = *self.mode.read() {
            return Err(StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));
        }
        if contract != self.contract {
            return Err(StatusCode::NOT_FOUND);
        }
        Ok(())
    }
}

/// Tag of a well-formed `Authorization: <TAG> <signature>` header.
fn auth_tag(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (tag, signature) = value.split_once(' ')?;
    if signature.trim().is_empty() {
        return None;
    }
    Some(tag)
}

fn authorize(headers: &HeaderMap, requester: &RecoveringAddress) -> Result<(), StatusCode> {
    let tag = auth_tag(headers).ok_or(StatusCode::UNAUTHORIZED)?;
    match requester.wallet_type() {
        Some(wallet) if wallet.tag() == tag => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn upload(
    State(state): State<Arc<EngineState>>,
    Path((contract, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<UploadShareRequest>,
) -> StatusCode {
    if let Err(code) = state.gate(&contract) {
        return code;
    }

    let tag = match auth_tag(&headers) {
        Some(tag) => tag,
        None => return StatusCode::UNAUTHORIZED,
    };
    let authorized = request
        .recovering_addresses
        .iter()
        .any(|a| a.wallet_type().map(|w| w.tag()) == Some(tag));
    if !authorized {
        return StatusCode::UNAUTHORIZED;
    }

    if !request
        .share_commitments
        .contains(&commit(&request.share_data).to_hex())
    {
        return StatusCode::BAD_REQUEST;
    }

    let stored = StoredShare {
        share_data: request.share_data,
        addresses: request
            .recovering_addresses
            .iter()
            .map(|a| a.as_str().to_string())
            .collect(),
    };
    let replaced = state.shares.lock().insert(id.clone(), stored).is_some();
    debug!(%id, replaced, "stored share");

    if replaced {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    }
}

async fn download(
    State(state): State<Arc<EngineState>>,
    Path((contract, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<DownloadMessage>,
) -> Result<Json<EncryptedShareResponse>, StatusCode> {
    state.gate(&contract)?;
    authorize(&headers, &request.recovering_address)?;

    let share_data = {
        let shares = state.shares.lock();
        let stored = shares.get(&id).ok_or(StatusCode::NOT_FOUND)?;
        if !stored.addresses.contains(request.recovering_address.as_str()) {
            return Err(StatusCode::FORBIDDEN);
        }
        stored.share_data.clone()
    };

    let recipient = public_key_from_hex(&request.public_key).map_err(|_| StatusCode::BAD_REQUEST)?;
    let mut rng = OsRng;
    let recipient = if *state.mode.read() == Mode::Corrupt {
        generate_ephemeral_key(&mut rng).public_key()
    } else {
        recipient
    };
    let sealed = seal(&share_data, &recipient, &state.secret_key, &mut rng)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(EncryptedShareResponse {
        encrypted_share: sealed.ciphertext,
        public_key: sealed.sender_public_key.to_vec(),
        nonce: sealed.nonce.to_vec(),
    }))
}

fn mutate(
    state: &EngineState,
    id: &str,
    requester: &RecoveringAddress,
    apply: impl FnOnce(&mut BTreeSet<String>),
) -> StatusCode {
    let mut shares = state.shares.lock();
    let Some(stored) = shares.get_mut(id) else {
        return StatusCode::NOT_FOUND;
    };
    if !stored.addresses.contains(requester.as_str()) {
        return StatusCode::FORBIDDEN;
    }
    apply(&mut stored.addresses);
    StatusCode::OK
}

async fn add_address(
    State(state): State<Arc<EngineState>>,
    Path((contract, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<AddAddressMessage>,
) -> StatusCode {
    if let Err(code) = state
        .gate(&contract)
        .and_then(|_| authorize(&headers, &request.recovering_address))
    {
        return code;
    }
    mutate(&state, &id, &request.recovering_address, |addresses| {
        addresses.insert(request.address_to_add.as_str().to_string());
    })
}

async fn remove_address(
    State(state): State<Arc<EngineState>>,
    Path((contract, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<RemoveAddressMessage>,
) -> StatusCode {
    if let Err(code) = state
        .gate(&contract)
        .and_then(|_| authorize(&headers, &request.recovering_address))
    {
        return code;
    }
    mutate(&state, &id, &request.recovering_address, |addresses| {
        addresses.remove(request.address_to_remove.as_str());
    })
}

fn router(state: Arc<EngineState>) -> Router {
    Router::new()
        .route("/offchain/:contract/shares/:id", put(upload).post(download))
        .route("/offchain/:contract/shares/:id/add_address", patch(add_address))
        .route("/offchain/:contract/shares/:id/remove_address", patch(remove_address))
        .with_state(state)
}

/// A running engine. The server stops when this is dropped.
pub struct EngineStub {
    addr: SocketAddr,
    state: Arc<EngineState>,
    task: JoinHandle<()>,
}

impl EngineStub {
    pub async fn spawn(contract: &str) -> Result<Self> {
        let state = Arc::new(EngineState {
            contract: contract.to_string(),
            secret_key: generate_ephemeral_key(&mut OsRng),
            mode: RwLock::new(Mode::Normal),
            shares: Mutex::new(HashMap::new()),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router(state.clone());
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                tracing::error!("engine server error: {}", e);
            }
        });
        info!("engine listening on {}", addr);

        Ok(Self { addr, state, task })
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.state.mode.write() = mode;
    }

    /// Blinded share stored under `id`.
    pub fn stored_share(&self, id: &str) -> Option<Vec<u8>> {
        self.state.shares.lock().get(id).map(|s| s.share_data.clone())
    }

    /// Recovering addresses authorized for `id`.
    pub fn addresses(&self, id: &str) -> Vec<String> {
        self.state
            .shares
            .lock()
            .get(id)
            .map(|s| s.addresses.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Drop for EngineStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}
