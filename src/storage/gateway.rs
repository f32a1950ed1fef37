/// Ordered IPFS gateway mirrors for retrieval.
///
/// Content is fetched with `GET <gateway>/ipfs/<cid>`, trying each mirror
/// in order with its own short timeout. The first mirror reports tier
/// `primary`, every later one `secondary`.
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    bounded, BackendFailure, FailureKind, GatewayTier, Retrieved, DEFAULT_GATEWAY_TIMEOUT,
};

pub const DEFAULT_GATEWAYS: [&str; 2] = ["https://gateway.pinata.cloud", "https://ipfs.io"];

/// An ordered list of mirror base URLs sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct GatewayMirrors {
    client: Client,
    bases: Vec<String>,
    attempt_timeout: Duration,
    /// Credentials for the first mirror only.
    origin_auth: Option<(String, Option<String>)>,
}

impl GatewayMirrors {
    pub fn new(client: Client, bases: Vec<String>) -> Self {
        Self {
            client,
            bases: bases
                .into_iter()
                .map(|b| b.trim_end_matches('/').to_string())
                .collect(),
            attempt_timeout: DEFAULT_GATEWAY_TIMEOUT,
            origin_auth: None,
        }
    }

    /// Send HTTP basic auth to the first mirror. Later mirrors never see
    /// the credentials.
    pub fn with_origin_basic_auth(mut self, username: String, password: Option<String>) -> Self {
        self.origin_auth = Some((username, password));
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Gateway URL for `cid` on the first mirror, if any.
    pub fn primary_url(&self, cid: &str) -> Option<String> {
        self.bases.first().map(|base| format!("{base}/ipfs/{cid}"))
    }

    /// Walk the mirrors in order using `<base>/ipfs/<cid>`.
    pub async fn fetch(
        &self,
        cid: &str,
        cancel: &CancellationToken,
    ) -> Result<Retrieved, BackendFailure> {
        self.fetch_with(|base| format!("{base}/ipfs/{cid}"), cancel)
            .await
    }

    /// Walk the mirrors in order, building each URL with `url_for`.
    ///
    /// Returns the first successful body. When every mirror fails, the
    /// failure lists each mirror's reason in order.
    pub async fn fetch_with<U>(
        &self,
        url_for: U,
        cancel: &CancellationToken,
    ) -> Result<Retrieved, BackendFailure>
    where
        U: Fn(&str) -> String,
    {
        if self.bases.is_empty() {
            return Err(BackendFailure::configuration("no gateways configured"));
        }

        let mut reasons = Vec::with_capacity(self.bases.len());

        for (index, base) in self.bases.iter().enumerate() {
            let url = url_for(base);
            let tier = GatewayTier::for_mirror(index);
            debug!(url = %url, tier = %tier, "Trying gateway");

            let attempt = bounded(
                self.get_bytes(&url, index == 0),
                self.attempt_timeout,
                cancel,
                "gateway timeout",
            );

            match attempt.await {
                Ok(data) => {
                    return Ok(Retrieved {
                        data,
                        tier,
                        source: url,
                    })
                }
                Err(failure) if failure.kind == FailureKind::Cancelled => return Err(failure),
                Err(failure) => {
                    debug!(url = %url, error = %failure, "Gateway attempt failed");
                    reasons.push(format!("{base}: {failure}"));
                }
            }
        }

        Err(BackendFailure::new(
            FailureKind::Network,
            format!("all gateways failed ({})", reasons.join("; ")),
        ))
    }

    async fn get_bytes(&self, url: &str, is_origin: bool) -> Result<Vec<u8>, BackendFailure> {
        let mut request = self.client.get(url);
        let auth = if is_origin { self.origin_auth.as_ref() } else { None };
        if let Some((username, password)) = auth {
            request = request.basic_auth(username, password.as_ref());
        }

        let resp = request.send().await.map_err(|e| BackendFailure::network(&e))?;

        if !resp.status().is_success() {
            return Err(BackendFailure::http(resp.status()));
        }

        let bytes = resp.bytes().await.map_err(|e| BackendFailure::network(&e))?;
        Ok(bytes.to_vec())
    }
}
