//! Threshold client: fans each operation out to every engine and reduces the
//! per-engine statuses to one outcome.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rand::rngs::OsRng;
use tokio::sync::OnceCell;
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};

use custody_crypto::{decode_share, unblind, BlindedShareSet, BoxPublicKey, BoxSecretKey};
use custody_types::{
    AddAddressMessage, DownloadMessage, RecoveringAddress, RemoveAddressMessage, UploadMessage,
    UploadShareRequest, WalletIdentity, WalletType,
};

use crate::auth::{self, Domain, MessageSchema, SignableMessage};
use crate::chain::{decode_custody_state, CustodyChain, RpcCustodyChain};
use crate::config::{ClientConfig, ThresholdParams};
use crate::error::ClientError;
use crate::outcome::{
    aggregate_download, aggregate_mutation, aggregate_upload, DownloadOutcome, DownloadStatus,
    WriteOutcome, WriteStatus,
};
use crate::transport::{EngineConnector, EngineTransport, HttpConnector};

/// Engines of the custody contract, in on-chain order.
pub struct EngineSet {
    engines: Vec<Arc<dyn EngineTransport>>,
    params: ThresholdParams,
}

impl EngineSet {
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn params(&self) -> ThresholdParams {
        self.params
    }

    pub fn engines(&self) -> &[Arc<dyn EngineTransport>] {
        &self.engines
    }

    pub fn endpoints(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.endpoint()).collect()
    }
}

/// Client for one custody contract, signing as one wallet type.
pub struct ThresholdClient {
    config: ClientConfig,
    domain: Domain,
    wallet: WalletType,
    chain: Arc<dyn CustodyChain>,
    connector: Arc<dyn EngineConnector>,
    engines: OnceCell<EngineSet>,
}

impl ThresholdClient {
    pub fn new(
        config: ClientConfig,
        wallet: WalletType,
        chain: Arc<dyn CustodyChain>,
        connector: Arc<dyn EngineConnector>,
    ) -> Self {
        Self {
            domain: Domain::for_contract(config.contract.clone()),
            config,
            wallet,
            chain,
            connector,
            engines: OnceCell::new(),
        }
    }

    /// Client over the chain JSON-RPC endpoint and HTTP engines from `config`.
    pub fn connect(config: ClientConfig, wallet: WalletType) -> Result<Self, ClientError> {
        config.validate()?;
        let chain = RpcCustodyChain::new(&config.chain_rpc, config.request_timeout())?;
        let connector = HttpConnector::new(&config)?;
        Ok(Self::new(config, wallet, Arc::new(chain), Arc::new(connector)))
    }

    /// Switch the signing wallet. The engine set is resolved again on next use.
    pub fn reconfigure(&mut self, wallet: WalletType) {
        info!(from = %self.wallet, to = %wallet, "Reconfiguring threshold client");
        self.wallet = wallet;
        self.engines = OnceCell::new();
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn wallet(&self) -> WalletType {
        self.wallet
    }

    /// Engine set of the contract, read from chain on first use only.
    pub async fn engine_set(&self) -> Result<&EngineSet, ClientError> {
        self.engines.get_or_try_init(|| self.resolve_engines()).await
    }

    async fn resolve_engines(&self) -> Result<EngineSet, ClientError> {
        let bytes = self.chain.custody_state(&self.config.contract).await?;
        let state = decode_custody_state(&bytes)?;

        let total = u32::try_from(state.engines.len())
            .map_err(|_| ClientError::MalformedState("too many engines".into()))?;
        let params = self.config.threshold_params(total);

        let engines = state
            .engines
            .iter()
            .enumerate()
            .map(|(index, record)| self.connector.connect(index, record, self.wallet))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            contract = %self.config.contract,
            engines = params.total,
            threshold = params.threshold,
            "Resolved engine set"
        );
        Ok(EngineSet { engines, params })
    }

    pub async fn threshold(&self) -> Result<ThresholdParams, ClientError> {
        Ok(self.engine_set().await?.params())
    }

    /// Split a secret into one blinded share per engine.
    pub async fn blinded_shares(&self, secret: &[u8]) -> Result<BlindedShareSet, ClientError> {
        let params = self.threshold().await?;
        let mut rng = OsRng;
        Ok(custody_crypto::blinded_shares(
            secret,
            params.total,
            params.threshold,
            &mut rng,
        )?)
    }

    // =========================
    // MESSAGES TO SIGN
    // =========================

    pub fn upload_message_to_sign(
        &self,
        shares: &BlindedShareSet,
        recovering: &[WalletIdentity],
    ) -> Result<SignableMessage<UploadMessage>, ClientError> {
        auth::upload_message_to_sign(&self.domain, shares, recovering)
    }

    pub fn download_message_to_sign(
        &self,
        wallet: &WalletIdentity,
        ephemeral_public_key: &BoxPublicKey,
    ) -> Result<SignableMessage<DownloadMessage>, ClientError> {
        self.check_signer(wallet)?;
        auth::download_message_to_sign(&self.domain, wallet, ephemeral_public_key, auth::now_millis()?)
    }

    pub fn add_address_message_to_sign(
        &self,
        wallet: &WalletIdentity,
        address_to_add: &WalletIdentity,
    ) -> Result<SignableMessage<AddAddressMessage>, ClientError> {
        self.check_signer(wallet)?;
        auth::add_address_message_to_sign(&self.domain, wallet, address_to_add, auth::now_millis()?)
    }

    pub fn remove_address_message_to_sign(
        &self,
        wallet: &WalletIdentity,
        address_to_remove: &WalletIdentity,
    ) -> Result<SignableMessage<RemoveAddressMessage>, ClientError> {
        self.check_signer(wallet)?;
        auth::remove_address_message_to_sign(
            &self.domain,
            wallet,
            address_to_remove,
            auth::now_millis()?,
        )
    }

    fn check_signer(&self, wallet: &WalletIdentity) -> Result<(), ClientError> {
        if wallet.wallet_type != self.wallet {
            return Err(ClientError::WalletMismatch {
                expected: self.wallet,
                got: wallet.wallet_type.to_string(),
            });
        }
        Ok(())
    }

    fn check_requester(&self, requester: &RecoveringAddress) -> Result<(), ClientError> {
        if requester.wallet_type() != Some(self.wallet) {
            return Err(ClientError::WalletMismatch {
                expected: self.wallet,
                got: requester.to_string(),
            });
        }
        Ok(())
    }

    fn check_message<M: MessageSchema>(&self, message: &SignableMessage<M>) -> Result<(), ClientError> {
        message.check_domain(&self.domain)
    }

    // =========================
    // OPERATIONS
    // =========================

    /// Store one blinded share on each engine.
    pub async fn upload_secret(
        &self,
        id: &str,
        message: &SignableMessage<UploadMessage>,
        signature: &str,
        shares: &BlindedShareSet,
    ) -> Result<WriteOutcome, ClientError> {
        self.check_message(message)?;
        if message.message.share_commitments != shares.commitment_hex() {
            return Err(ClientError::CommitmentMismatch);
        }

        let engines = self.engine_set().await?;
        if shares.len() != engines.len() {
            return Err(ClientError::ShareCountMismatch {
                expected: engines.len(),
                got: shares.len(),
            });
        }
        let params = engines.params();
        check_share_set(shares, params)?;

        info!(id, engines = engines.len(), "Uploading shares");
        let tasks = engines
            .engines()
            .iter()
            .zip(shares.shares.iter())
            .map(|(engine, share)| {
                let engine = Arc::clone(engine);
                let request = UploadShareRequest::new(&message.message, share.clone());
                let id = id.to_string();
                let signature = signature.to_string();
                (engine.index(), async move {
                    engine.upload(&id, &request, &signature).await
                })
            })
            .collect();

        let statuses = log_writes("upload", gather(tasks, WriteStatus::Unreachable).await);
        let outcome = aggregate_upload(&statuses, params.threshold);
        info!(id, %outcome, "Upload finished");
        Ok(outcome)
    }

    /// Collect shares from every engine and reconstruct the secret.
    pub async fn download_secret(
        &self,
        id: &str,
        message: &SignableMessage<DownloadMessage>,
        signature: &str,
        ephemeral_secret_key: &BoxSecretKey,
    ) -> Result<DownloadOutcome, ClientError> {
        self.check_message(message)?;
        self.check_requester(&message.message.recovering_address)?;
        if message.message.public_key != hex::encode(ephemeral_secret_key.public_key().as_bytes()) {
            return Err(ClientError::EphemeralKeyMismatch);
        }

        let engines = self.engine_set().await?;
        info!(id, engines = engines.len(), "Downloading shares");

        let key = Arc::new(ephemeral_secret_key.clone());
        let request = Arc::new(message.message.clone());
        let tasks = engines
            .engines()
            .iter()
            .map(|engine| {
                let engine = Arc::clone(engine);
                let key = Arc::clone(&key);
                let request = Arc::clone(&request);
                let id = id.to_string();
                let signature = signature.to_string();
                (engine.index(), async move {
                    engine.download(&id, &request, &signature, &key).await
                })
            })
            .collect();

        let statuses: Vec<DownloadStatus> = gather(tasks, DownloadStatus::Unreachable)
            .await
            .into_iter()
            .map(|(engine, status)| {
                match &status {
                    DownloadStatus::Share(_) | DownloadStatus::NotFound => {
                        debug!(engine, ?status, "download")
                    }
                    _ => warn!(engine, ?status, "download failed"),
                }
                status
            })
            .collect();

        let outcome = aggregate_download(&statuses, engines.params());
        info!(id, %outcome, "Download finished");
        Ok(outcome)
    }

    /// Authorize another address on every engine.
    pub async fn add_address(
        &self,
        id: &str,
        message: &SignableMessage<AddAddressMessage>,
        signature: &str,
    ) -> Result<WriteOutcome, ClientError> {
        self.check_message(message)?;
        self.check_requester(&message.message.recovering_address)?;

        let engines = self.engine_set().await?;
        info!(id, address = %message.message.address_to_add, "Adding recovering address");

        let request = Arc::new(message.message.clone());
        let tasks = engines
            .engines()
            .iter()
            .map(|engine| {
                let engine = Arc::clone(engine);
                let request = Arc::clone(&request);
                let id = id.to_string();
                let signature = signature.to_string();
                (engine.index(), async move {
                    engine.add_address(&id, &request, &signature).await
                })
            })
            .collect();

        let statuses = log_writes("add_address", gather(tasks, WriteStatus::Unreachable).await);
        let outcome = aggregate_mutation(&statuses);
        info!(id, %outcome, "Add address finished");
        Ok(outcome)
    }

    /// Revoke an address on every engine.
    pub async fn remove_address(
        &self,
        id: &str,
        message: &SignableMessage<RemoveAddressMessage>,
        signature: &str,
    ) -> Result<WriteOutcome, ClientError> {
        self.check_message(message)?;
        self.check_requester(&message.message.recovering_address)?;

        let engines = self.engine_set().await?;
        info!(id, address = %message.message.address_to_remove, "Removing recovering address");

        let request = Arc::new(message.message.clone());
        let tasks = engines
            .engines()
            .iter()
            .map(|engine| {
                let engine = Arc::clone(engine);
                let request = Arc::clone(&request);
                let id = id.to_string();
                let signature = signature.to_string();
                (engine.index(), async move {
                    engine.remove_address(&id, &request, &signature).await
                })
            })
            .collect();

        let statuses = log_writes("remove_address", gather(tasks, WriteStatus::Unreachable).await);
        let outcome = aggregate_mutation(&statuses);
        info!(id, %outcome, "Remove address finished");
        Ok(outcome)
    }
}

/// Run one task per engine and wait for all of them.
///
/// A task that panics or is cancelled yields `on_join_error` for its engine.
/// Dropping the returned future aborts every task still running.
async fn gather<T, Fut>(tasks: Vec<(usize, Fut)>, on_join_error: fn(String) -> T) -> Vec<(usize, T)>
where
    T: Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let mut set = JoinSet::new();
    let mut engine_of: HashMap<task::Id, usize> = HashMap::with_capacity(tasks.len());
    for (index, task) in tasks {
        let handle = set.spawn(task);
        engine_of.insert(handle.id(), index);
    }

    let mut results = Vec::with_capacity(engine_of.len());
    while let Some(joined) = set.join_next_with_id().await {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => (e.id(), on_join_error(e.to_string())),
        };
        if let Some(&index) = engine_of.get(&id) {
            results.push((index, result));
        }
    }
    results.sort_by_key(|(index, _)| *index);
    results
}

/// A share set must be split for this engine set, with share i at engine i.
fn check_share_set(shares: &BlindedShareSet, params: ThresholdParams) -> Result<(), ClientError> {
    if shares.threshold != params.threshold {
        return Err(ClientError::ThresholdMismatch {
            expected: params.threshold,
            got: shares.threshold,
        });
    }
    for (position, blinded) in shares.shares.iter().enumerate() {
        let share = decode_share(unblind(blinded)?)?;
        if share.threshold != params.threshold {
            return Err(ClientError::ThresholdMismatch {
                expected: params.threshold,
                got: share.threshold,
            });
        }
        if share.total != params.total || share.index as usize != position {
            return Err(ClientError::MisplacedShare {
                position,
                index: share.index,
                total: share.total,
            });
        }
    }
    Ok(())
}

fn log_writes(operation: &str, results: Vec<(usize, WriteStatus)>) -> Vec<WriteStatus> {
    results
        .into_iter()
        .map(|(engine, status)| {
            match &status {
                WriteStatus::Acknowledged => debug!(engine, operation, "acknowledged"),
                WriteStatus::Rejected(code) => warn!(engine, operation, code, "rejected"),
                WriteStatus::Unreachable(reason) => {
                    warn!(engine, operation, %reason, "unreachable")
                }
            }
            status
        })
        .collect()
}
