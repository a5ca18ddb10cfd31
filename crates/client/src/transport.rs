//! Per-engine HTTP transport.
//!
//! One [`EngineTransport`] per engine node. Calls never fail as a whole: every
//! HTTP or decryption problem is mapped to a typed status for that node, and
//! the orchestrator decides what the set of statuses means.

use std::sync::Arc;

use jsonrpsee::core::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;
use zeroize::Zeroizing;

use custody_crypto::{open, unblind, BoxSecretKey, CryptoError};
use custody_types::{
    AddAddressMessage, DownloadMessage, EncryptedShareResponse, EngineRecord,
    RemoveAddressMessage, UploadShareRequest, WalletType,
};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::outcome::{DownloadStatus, WriteStatus};

/// Operations one engine node serves.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    /// Logical index of the engine in the custody contract.
    fn index(&self) -> usize;

    fn endpoint(&self) -> &str;

    async fn upload(&self, id: &str, request: &UploadShareRequest, signature: &str) -> WriteStatus;

    /// Fetch, open and unblind this engine's share.
    async fn download(
        &self,
        id: &str,
        request: &DownloadMessage,
        signature: &str,
        ephemeral_secret_key: &BoxSecretKey,
    ) -> DownloadStatus;

    async fn add_address(
        &self,
        id: &str,
        request: &AddAddressMessage,
        signature: &str,
    ) -> WriteStatus;

    async fn remove_address(
        &self,
        id: &str,
        request: &RemoveAddressMessage,
        signature: &str,
    ) -> WriteStatus;
}

/// Builds a transport for each engine listed on chain.
pub trait EngineConnector: Send + Sync {
    fn connect(
        &self,
        index: usize,
        record: &EngineRecord,
        wallet: WalletType,
    ) -> Result<Arc<dyn EngineTransport>, ClientError>;
}

/// [`EngineConnector`] producing [`HttpEngine`]s that share one HTTP client.
#[derive(Clone)]
pub struct HttpConnector {
    client: Client,
    contract: String,
}

impl HttpConnector {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;
        Ok(Self {
            client,
            contract: config.contract.clone(),
        })
    }
}

impl EngineConnector for HttpConnector {
    fn connect(
        &self,
        index: usize,
        record: &EngineRecord,
        wallet: WalletType,
    ) -> Result<Arc<dyn EngineTransport>, ClientError> {
        let engine = HttpEngine::new(
            self.client.clone(),
            index,
            &record.endpoint,
            &self.contract,
            wallet,
        )?;
        Ok(Arc::new(engine))
    }
}

/// REST client for one engine, rooted at `{endpoint}/offchain/{contract}/shares`.
pub struct HttpEngine {
    client: Client,
    index: usize,
    endpoint: String,
    shares_url: Url,
    wallet: WalletType,
}

impl HttpEngine {
    pub fn new(
        client: Client,
        index: usize,
        endpoint: &str,
        contract: &str,
        wallet: WalletType,
    ) -> Result<Self, ClientError> {
        let mut shares_url = Url::parse(endpoint)
            .map_err(|e| ClientError::MalformedState(format!("engine {index} endpoint {endpoint}: {e}")))?;
        shares_url
            .path_segments_mut()
            .map_err(|_| ClientError::MalformedState(format!("engine {index} endpoint {endpoint} cannot be a base")))?
            .pop_if_empty()
            .extend(["offchain", contract, "shares"]);

        Ok(Self {
            client,
            index,
            endpoint: endpoint.to_string(),
            shares_url,
            wallet,
        })
    }

    fn share_url(&self, id: &str, action: Option<&str>) -> Url {
        let mut url = self.shares_url.clone();
        // The base URL was validated as hierarchical in `new`.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        url
    }

    fn authorization(&self, signature: &str) -> String {
        format!("{} {}", self.wallet.tag(), signature)
    }

    async fn write(&self, request: reqwest::RequestBuilder, accepted: &[StatusCode]) -> WriteStatus {
        match request.send().await {
            Ok(response) if accepted.contains(&response.status()) => WriteStatus::Acknowledged,
            Ok(response) => WriteStatus::Rejected(response.status().as_u16()),
            Err(e) => WriteStatus::Unreachable(e.to_string()),
        }
    }
}

#[async_trait]
impl EngineTransport for HttpEngine {
    fn index(&self) -> usize {
        self.index
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn upload(&self, id: &str, request: &UploadShareRequest, signature: &str) -> WriteStatus {
        let url = self.share_url(id, None);
        debug!(engine = self.index, %url, "PUT share");

        let builder = self
            .client
            .put(url)
            .header(AUTHORIZATION, self.authorization(signature))
            .json(request);
        self.write(builder, &[StatusCode::OK, StatusCode::CREATED]).await
    }

    async fn download(
        &self,
        id: &str,
        request: &DownloadMessage,
        signature: &str,
        ephemeral_secret_key: &BoxSecretKey,
    ) -> DownloadStatus {
        let url = self.share_url(id, None);
        debug!(engine = self.index, %url, "POST share");

        let response = match self
            .client
            .post(url)
            .header(AUTHORIZATION, self.authorization(signature))
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return DownloadStatus::Unreachable(e.to_string()),
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return DownloadStatus::NotFound,
            other => return DownloadStatus::Rejected(other.as_u16()),
        }

        let body: EncryptedShareResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return DownloadStatus::Malformed(e.to_string()),
        };

        let opened = match open(
            &body.encrypted_share,
            &body.nonce,
            &body.public_key,
            ephemeral_secret_key,
        ) {
            Ok(opened) => opened,
            Err(CryptoError::AuthenticationFailed) => return DownloadStatus::DecryptFailed,
            Err(e) => return DownloadStatus::Malformed(e.to_string()),
        };

        match unblind(&opened) {
            Ok(share) => DownloadStatus::Share(Zeroizing::new(share.to_vec())),
            Err(e) => DownloadStatus::Malformed(e.to_string()),
        }
    }

    async fn add_address(
        &self,
        id: &str,
        request: &AddAddressMessage,
        signature: &str,
    ) -> WriteStatus {
        let url = self.share_url(id, Some("add_address"));
        debug!(engine = self.index, %url, "PATCH add_address");

        let builder = self
            .client
            .patch(url)
            .header(AUTHORIZATION, self.authorization(signature))
            .json(request);
        self.write(builder, &[StatusCode::OK]).await
    }

    async fn remove_address(
        &self,
        id: &str,
        request: &RemoveAddressMessage,
        signature: &str,
    ) -> WriteStatus {
        let url = self.share_url(id, Some("remove_address"));
        debug!(engine = self.index, %url, "PATCH remove_address");

        let builder = self
            .client
            .patch(url)
            .header(AUTHORIZATION, self.authorization(signature))
            .json(request);
        self.write(builder, &[StatusCode::OK]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(endpoint: &str) -> HttpEngine {
        HttpEngine::new(Client::new(), 0, endpoint, "custody.testnet", WalletType::Near).unwrap()
    }

    #[test]
    fn test_share_urls() {
        let engine = engine("http://engine-0.local:8080");
        assert_eq!(
            engine.share_url("vault-1", None).as_str(),
            "http://engine-0.local:8080/offchain/custody.testnet/shares/vault-1"
        );
        assert_eq!(
            engine.share_url("vault-1", Some("add_address")).as_str(),
            "http://engine-0.local:8080/offchain/custody.testnet/shares/vault-1/add_address"
        );
    }

    #[test]
    fn test_endpoint_with_path_prefix() {
        let engine = engine("https://engines.example.com/node2/");
        assert_eq!(
            engine.share_url("id", Some("remove_address")).as_str(),
            "https://engines.example.com/node2/offchain/custody.testnet/shares/id/remove_address"
        );
    }

    #[test]
    fn test_id_is_path_escaped() {
        let engine = engine("http://engine");
        assert_eq!(
            engine.share_url("a/b", None).as_str(),
            "http://engine/offchain/custody.testnet/shares/a%2Fb"
        );
    }

    #[test]
    fn test_authorization_header_uses_wallet_tag() {
        assert_eq!(engine("http://engine").authorization("0xsig"), "NEAR 0xsig");
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let result = HttpEngine::new(Client::new(), 3, "not a url", "c", WalletType::Evm);
        assert!(matches!(result, Err(ClientError::MalformedState(_))));

        let result = HttpEngine::new(Client::new(), 3, "mailto:ops@example.com", "c", WalletType::Evm);
        assert!(matches!(result, Err(ClientError::MalformedState(_))));
    }

    #[tokio::test]
    async fn test_unreachable_engine_maps_to_status() {
        // Nothing listens on port 9 of the loopback interface.
        let engine = engine("http://127.0.0.1:9");
        let request = UploadShareRequest {
            share_commitments: vec![],
            recovering_addresses: vec![],
            share_data: vec![1, 2, 3],
        };
        let status = engine.upload("id", &request, "sig").await;
        assert!(matches!(status, WriteStatus::Unreachable(_)));
    }
}
