use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::chain::rpc::{parse_batch_body, RpcRequest, RpcResponse, RpcTransport};
use crate::error::EngineResult;

/// JSON-RPC over HTTP. The only component that touches the network.
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: Url, timeout: Duration) -> EngineResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send_batch(&self, requests: &[RpcRequest]) -> EngineResult<Vec<RpcResponse>> {
        let body = self
            .client
            .post(self.endpoint.clone())
            .json(requests)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_batch_body(&body)
    }
}

pub fn create_transport(rpc_url: &str, timeout: Duration) -> anyhow::Result<Arc<dyn RpcTransport>> {
    let endpoint = Url::parse(rpc_url).with_context(|| format!("invalid RPC_URL {:?}", rpc_url))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        bail!("unsupported RPC scheme {}", endpoint.scheme());
    }
    let transport = HttpTransport::new(endpoint, timeout).context("failed to build HTTP client")?;
    Ok(Arc::new(transport))
}
