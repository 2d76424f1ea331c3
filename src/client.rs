//! Root client: shared configuration, header construction and transport
//!
//! Every request goes through [`Client::send`], which makes exactly one HTTP
//! attempt and maps the outcome into [`ApiResult`]. Nothing here retries.

use crate::auth_client::Auth;
use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult, ClientError, Result};
use crate::query::QueryBuilder;
use crate::storage::KeyValueStorage;
use crate::token_store::{redact, TokenStore};
use crate::types::AuthState;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// `Prefer` value asking the backend to echo affected rows
pub const RETURN_REPRESENTATION: &str = "return=representation";
/// `Prefer` value for upserts: merge on primary-key conflict and echo rows
pub const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=representation";

const APIKEY: HeaderName = HeaderName::from_static("apikey");
const PREFER: HeaderName = HeaderName::from_static("prefer");

/// Entry point for data and auth operations
///
/// Cloning is cheap and clones share the HTTP connection pool, the token
/// store and the auth state channel.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    http: reqwest::Client,
    tokens: TokenStore,
    api_key_header: HeaderValue,
    anon_bearer: HeaderValue,
    auth_state: watch::Sender<AuthState>,
}

/// One outgoing request, fully resolved except for headers
pub(crate) struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub prefer: &'static str,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

/// Successful (2xx) response with a JSON body
#[derive(Debug)]
pub(crate) struct JsonResponse {
    pub status: u16,
    pub body: Value,
}

impl Client {
    /// Create a client persisting its session in `storage`
    pub fn new(config: ClientConfig, storage: Arc<dyn KeyValueStorage>) -> Result<Self> {
        config.validate()?;

        let api_key_header = HeaderValue::from_str(&config.api_key)
            .map_err(|e| ClientError::Configuration(format!("API key is not a valid header value: {e}")))?;
        let anon_bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| ClientError::Configuration(format!("API key is not a valid header value: {e}")))?;

        let http = reqwest::Client::builder().build()?;
        // Seeded by get_session or sign-in; a persisted session is not read here
        let (auth_state, _) = watch::channel(AuthState::SignedOut);

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                http,
                tokens: TokenStore::new(storage),
                api_key_header,
                anon_bearer,
                auth_state,
            }),
        })
    }

    /// Builder for queries against `resource`. No network activity happens
    /// until a terminal `execute` is awaited.
    ///
    /// # Panics
    ///
    /// Panics if `resource` is empty.
    pub fn from(&self, resource: &str) -> QueryBuilder {
        assert!(!resource.is_empty(), "resource name must not be empty");
        QueryBuilder::new(self.clone(), resource)
    }

    /// Sign up, sign in, sign out and session access
    pub fn auth(&self) -> Auth<'_> {
        Auth::new(self)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Get the token store (for advanced usage)
    pub fn token_store(&self) -> &TokenStore {
        &self.inner.tokens
    }

    pub(crate) fn auth_state(&self) -> &watch::Sender<AuthState> {
        &self.inner.auth_state
    }

    /// Headers for the next request
    ///
    /// The bearer credential is re-read from the token store on every call;
    /// without one the API key itself is sent, giving anonymous-tier access.
    pub(crate) async fn headers(&self, prefer: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(4);
        headers.insert(APIKEY, self.inner.api_key_header.clone());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(PREFER, HeaderValue::from_static(prefer));

        let bearer = match self.inner.tokens.load().await {
            Some(token) => match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    debug!(token = %redact(&token), "Using access token for request");
                    value
                }
                Err(e) => {
                    warn!(error = %e, "Stored access token is not a valid header value, using API key");
                    self.inner.anon_bearer.clone()
                }
            },
            None => {
                debug!("Using API key for request");
                self.inner.anon_bearer.clone()
            }
        };
        headers.insert(AUTHORIZATION, bearer);

        headers
    }

    /// Perform a single request, honouring the per-request or client-wide deadline
    pub(crate) async fn send(&self, request: PreparedRequest) -> ApiResult<JsonResponse> {
        match request.timeout.or(self.inner.config.request_timeout) {
            Some(deadline) => tokio::time::timeout(deadline, self.send_once(request))
                .await
                .map_err(|_| {
                    warn!(timeout = ?deadline, "Request deadline elapsed");
                    ApiError::Timeout(deadline)
                })?,
            None => self.send_once(request).await,
        }
    }

    async fn send_once(&self, request: PreparedRequest) -> ApiResult<JsonResponse> {
        let PreparedRequest {
            method,
            url,
            prefer,
            body,
            ..
        } = request;

        let headers = self.headers(prefer).await;
        let mut builder = self.inner.http.request(method.clone(), &url).headers(headers);
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| {
            warn!(%method, %url, error = %e, "Request failed");
            ApiError::Transport(e)
        })?;

        let status = response.status();
        let text = response.text().await?;
        debug!(
            %method,
            %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Response received"
        );

        let payload: Value = serde_json::from_str(&text).map_err(|source| ApiError::Decode {
            status: status.as_u16(),
            source,
        })?;

        if !status.is_success() {
            warn!(%method, %url, status = status.as_u16(), error = %payload, "Backend rejected request");
            return Err(ApiError::Backend {
                status: status.as_u16(),
                payload,
            });
        }

        Ok(JsonResponse {
            status: status.as_u16(),
            body: payload,
        })
    }
}
