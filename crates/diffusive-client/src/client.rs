use async_trait::async_trait;
use diffusive_common::protocol::error::{DiffusiveError, Result};
use diffusive_common::protocol::{
    CreateDiffuserRequest, DiffuserInfo, ExecuteResponse, InvocationRequest, InvocationResult,
};
use diffusive_common::transport::{ClassTransport, HttpTransport, InvocationTransport, HOPS_HEADER};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Timeouts and polling cadence for peer calls.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// TCP connect timeout per request
    ///
    /// Default: 5s
    pub connect_timeout: Duration,
    /// Timeout for a single HTTP exchange, connect included
    ///
    /// Default: 30s
    pub request_timeout: Duration,
    /// Delay between polls of a running remote result
    ///
    /// Default: 50ms
    pub poll_interval: Duration,
    /// How long to wait for a remote result before giving up on the peer
    ///
    /// Default: 300s
    pub result_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
            result_timeout: Duration::from_secs(300),
        }
    }
}

/// Outcome of polling a result resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPoll {
    Running,
    Done(InvocationResult),
}

/// HTTP client for diffusive peers.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone)]
pub struct DiffuserClient {
    http: Client<HttpConnector, Full<Bytes>>,
    config: ClientConfig,
    /// Classpaths advertised to peers when a diffuser is created remotely
    class_paths: Vec<String>,
}

impl DiffuserClient {
    /// Create a client with default timeouts
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with custom timeouts
    pub fn with_config(config: ClientConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout));
        connector.set_nodelay(true);

        let http = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            http,
            config,
            class_paths: Vec::new(),
        }
    }

    /// Classpath URIs peers should fetch missing code from.
    ///
    /// Typically the caller's own `/classpath` resource, so a peer can load
    /// whatever the caller can.
    pub fn with_class_paths(mut self, class_paths: Vec<String>) -> Self {
        self.class_paths = class_paths;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Create (or refresh) a diffuser on a peer.
    pub async fn create_diffuser(&self, endpoint: &str, create: &CreateDiffuserRequest) -> Result<DiffuserInfo> {
        let url = HttpTransport::diffusers_url(endpoint)?;
        let body = serde_json::to_vec(create)?;
        let (status, bytes) = self.send(Method::PUT, &url, Some(body), None).await?;
        expect_json(endpoint, status, &bytes)
    }

    /// List the diffusers hosted by a peer.
    pub async fn list_diffusers(&self, endpoint: &str) -> Result<Vec<DiffuserInfo>> {
        let url = HttpTransport::diffusers_url(endpoint)?;
        let (status, bytes) = self.send(Method::GET, &url, None, None).await?;
        expect_json(endpoint, status, &bytes)
    }

    /// Describe one diffuser, `None` if the peer does not host it.
    pub async fn diffuser(&self, endpoint: &str, signature: &str) -> Result<Option<DiffuserInfo>> {
        let url = HttpTransport::diffuser_url(endpoint, signature)?;
        let (status, bytes) = self.send(Method::GET, &url, None, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        expect_json(endpoint, status, &bytes).map(Some)
    }

    /// Delete a diffuser, returning whether it existed.
    pub async fn delete_diffuser(&self, endpoint: &str, signature: &str) -> Result<bool> {
        let url = HttpTransport::diffuser_url(endpoint, signature)?;
        let (status, bytes) = self.send(Method::DELETE, &url, None, None).await?;
        match status {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(unexpected(endpoint, s, &bytes)),
        }
    }

    /// Submit an invocation to an existing diffuser on a peer.
    ///
    /// Returns as soon as the peer has accepted the invocation; use
    /// [`DiffuserClient::await_result`] to wait for the outcome.
    pub async fn execute(&self, endpoint: &str, request: &InvocationRequest) -> Result<ExecuteResponse> {
        let (status, bytes) = self.post_execute(endpoint, request).await?;
        expect_json(endpoint, status, &bytes)
    }

    async fn post_execute(&self, endpoint: &str, request: &InvocationRequest) -> Result<(StatusCode, Bytes)> {
        let url = HttpTransport::diffuser_url(endpoint, &request.signature().key())?;
        let body = serde_json::to_vec(request)?;
        self.send(Method::POST, &url, Some(body), None).await
    }

    /// Poll a result once.
    pub async fn poll_result(&self, endpoint: &str, signature: &str, request_id: &str) -> Result<ResultPoll> {
        let url = HttpTransport::result_url(endpoint, signature, request_id)?;
        let (status, bytes) = self.send(Method::GET, &url, None, None).await?;
        match status {
            StatusCode::OK => Ok(ResultPoll::Done(decode_json(&bytes)?)),
            StatusCode::ACCEPTED | StatusCode::NO_CONTENT => Ok(ResultPoll::Running),
            s => Err(unexpected(endpoint, s, &bytes)),
        }
    }

    /// Probe a result without transferring it.
    ///
    /// # Returns
    ///
    /// - `Some(true)` - The result is complete
    /// - `Some(false)` - Still running
    /// - `None` - The peer does not know this request (never seen, or evicted)
    pub async fn result_status(&self, endpoint: &str, signature: &str, request_id: &str) -> Result<Option<bool>> {
        let url = HttpTransport::result_url(endpoint, signature, request_id)?;
        let (status, bytes) = self.send(Method::HEAD, &url, None, None).await?;
        match status {
            StatusCode::OK => Ok(Some(true)),
            StatusCode::NO_CONTENT | StatusCode::ACCEPTED => Ok(Some(false)),
            StatusCode::NOT_FOUND => Ok(None),
            s => Err(unexpected(endpoint, s, &bytes)),
        }
    }

    /// Poll a result until it completes or `result_timeout` elapses.
    pub async fn await_result(&self, endpoint: &str, signature: &str, request_id: &str) -> Result<InvocationResult> {
        let deadline = Instant::now() + self.config.result_timeout;
        loop {
            if let ResultPoll::Done(result) = self.poll_result(endpoint, signature, request_id).await? {
                return Ok(result);
            }
            if Instant::now() >= deadline {
                return Err(DiffusiveError::Timeout(self.config.result_timeout.as_millis() as u64));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Fetch code bytes from a classpath resource.
    ///
    /// # Arguments
    ///
    /// * `class_path` - Full classpath URI (e.g., "http://10.0.0.5:8182/classpath")
    /// * `class_name` - Fully-qualified class name
    /// * `hops` - Hop budget the peer may spend on its own upstream classpaths
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the peer answers 404
    pub async fn fetch_class(&self, class_path: &str, class_name: &str, hops: u32) -> Result<Option<Vec<u8>>> {
        let url = HttpTransport::class_url(class_path, class_name)?;
        let (status, bytes) = self
            .send(Method::GET, &url, None, Some(hops))
            .await?;
        match status {
            StatusCode::OK => Ok(Some(bytes.to_vec())),
            StatusCode::NOT_FOUND => {
                debug!("{} not found at {}: {}", class_name, class_path, String::from_utf8_lossy(&bytes));
                Ok(None)
            }
            s => Err(unexpected(class_path, s, &bytes)),
        }
    }

    /// Sends one HTTP request and collects the whole response body.
    ///
    /// The connect timeout is enforced by the connector; this wraps the full
    /// exchange in `request_timeout`.
    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<Vec<u8>>,
        hops: Option<u32>,
    ) -> Result<(StatusCode, Bytes)> {
        let mut builder = Request::builder().method(method).uri(url.as_str());
        if body.is_some() {
            builder = builder.header("Content-Type", "application/json");
        }
        if let Some(hops) = hops {
            builder = builder.header(HOPS_HEADER, hops.to_string());
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| DiffusiveError::Transport(format!("Failed to build request: {}", e)))?;

        let timeout = self.config.request_timeout;
        let exchange = async {
            let response = self
                .http
                .request(request)
                .await
                .map_err(|e| DiffusiveError::Transport(format!("HTTP request to {} failed: {}", url, e)))?;
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| DiffusiveError::Transport(format!("Failed to read response: {}", e)))?
                .to_bytes();
            Ok::<_, DiffusiveError>((status, bytes))
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| DiffusiveError::Timeout(timeout.as_millis() as u64))?
    }
}

impl Default for DiffuserClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvocationTransport for DiffuserClient {
    /// Runs `request` on a peer: submit, then poll until done.
    ///
    /// If the peer does not host a diffuser for the signature yet (first
    /// contact, or the peer restarted), one is created with this client's
    /// class paths and the submission is repeated once.
    async fn invoke(&self, endpoint: &str, request: &InvocationRequest) -> Result<InvocationResult> {
        let signature = request.signature().key();

        let (mut status, mut bytes) = self.post_execute(endpoint, request).await?;
        if status == StatusCode::NOT_FOUND {
            debug!("Creating diffuser {} on {}", signature, endpoint);
            let create = CreateDiffuserRequest {
                signature: signature.clone(),
                class_paths: self.class_paths.clone(),
                serializer: request.serializer(),
            };
            self.create_diffuser(endpoint, &create).await?;
            (status, bytes) = self.post_execute(endpoint, request).await?;
        }

        let accepted: ExecuteResponse = expect_json(endpoint, status, &bytes)?;
        if accepted.request_id != request.request_id() {
            warn!(
                "Peer {} renamed request {} to {}",
                endpoint,
                request.request_id(),
                accepted.request_id
            );
        }

        self.await_result(endpoint, &accepted.signature, &accepted.request_id)
            .await
    }
}

#[async_trait]
impl ClassTransport for DiffuserClient {
    async fn fetch_class(&self, class_path: &str, class_name: &str, hops: u32) -> Result<Option<Vec<u8>>> {
        DiffuserClient::fetch_class(self, class_path, class_name, hops).await
    }
}

fn decode_json<T: DeserializeOwned>(bytes: &Bytes) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| DiffusiveError::InvalidResponse(format!("Malformed response body: {}", e)))
}

fn expect_json<T: DeserializeOwned>(endpoint: &str, status: StatusCode, bytes: &Bytes) -> Result<T> {
    if !status.is_success() {
        return Err(unexpected(endpoint, status, bytes));
    }
    decode_json(bytes)
}

fn unexpected(endpoint: &str, status: StatusCode, bytes: &Bytes) -> DiffusiveError {
    DiffusiveError::Dispatch {
        endpoint: endpoint.to_string(),
        reason: format!("{}: {}", status, String::from_utf8_lossy(bytes)),
    }
}
