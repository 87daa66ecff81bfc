//! HTTP/SSE transport for remote MCP servers (Streamable HTTP transport).
//!
//! Uses HTTP POST for JSON-RPC requests and GET for server-initiated SSE events.
//! Supports optional OAuth Bearer token injection and automatic 401 retry.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {
    reqwest::Client,
    secrecy::ExposeSecret,
    tokio::sync::RwLock,
    tracing::{debug, info, warn},
};

use crate::{
    auth::SharedAuthProvider,
    error::{Context, Error, Result},
    traits::McpTransport,
    types::{
        JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpTransportError, PROTOCOL_VERSION,
    },
};

const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
const MCP_SESSION_ID_HEADER: &str = "Mcp-Session-Id";
const STREAMABLE_ACCEPT_HEADER: &str = "application/json, text/event-stream";

/// HTTP/SSE-based transport for a remote MCP server.
pub struct SseTransport {
    client: Client,
    url: String,
    next_id: AtomicU64,
    /// Optional auth provider for Bearer token injection.
    auth: Option<SharedAuthProvider>,
    /// Session identifier used by streamable HTTP servers.
    session_id: RwLock<Option<String>>,
}

impl SseTransport {
    /// Create a new SSE transport pointing at the given MCP server URL.
    pub fn new(url: &str) -> Result<Arc<Self>> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client for SSE transport")?;

        Ok(Arc::new(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
            auth: None,
            session_id: RwLock::new(None),
        }))
    }

    /// Create a new SSE transport with an OAuth auth provider.
    pub fn with_auth(url: &str, auth: SharedAuthProvider) -> Result<Arc<Self>> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client for SSE transport")?;

        Ok(Arc::new(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
            auth: Some(auth),
            session_id: RwLock::new(None),
        }))
    }

    /// Build a request builder with optional Bearer token.
    async fn build_post(&self) -> Result<reqwest::RequestBuilder> {
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", STREAMABLE_ACCEPT_HEADER)
            .header(MCP_PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION);

        if let Some(session_id) = self.session_id.read().await.clone() {
            req = req.header(MCP_SESSION_ID_HEADER, session_id);
        }

        if let Some(token) = match &self.auth {
            Some(auth) => auth.access_token().await?,
            None => None,
        } {
            req = req.header("Authorization", format!("Bearer {}", token.expose_secret()));
        }

        Ok(req)
    }

    async fn store_session_id_from_response(&self, response: &reqwest::Response) {
        let Some(raw) = response.headers().get(MCP_SESSION_ID_HEADER) else {
            return;
        };
        let Ok(session_id) = raw.to_str() else {
            return;
        };
        if session_id.trim().is_empty() {
            return;
        }

        let mut slot = self.session_id.write().await;
        let session_id = session_id.to_string();
        if slot.as_ref() != Some(&session_id) {
            debug!(
                url = %self.url,
                session_id = %session_id,
                "updated MCP streamable HTTP session id"
            );
            *slot = Some(session_id);
        }
    }

    fn response_is_event_stream(resp: &reqwest::Response) -> bool {
        resp.headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| {
                ct.split(';')
                    .next()
                    .is_some_and(|base| base.trim() == "text/event-stream")
            })
            .unwrap_or(false)
    }

    fn parse_event_stream_response(body: &str, method: &str) -> Result<JsonRpcResponse> {
        let mut data = String::new();

        for line in body.lines() {
            let trimmed = line.trim_end();
            if let Some(rest) = trimmed.strip_prefix("data:") {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(rest.trim_start());
                continue;
            }

            if trimmed.is_empty() && !data.is_empty() {
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&data) {
                    return Ok(resp);
                }
                data.clear();
            }
        }

        if !data.is_empty()
            && let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&data)
        {
            return Ok(resp);
        }

        Err(Error::message(format!(
            "failed to parse JSON-RPC response from event stream for '{method}'"
        )))
    }

    /// Send a POST request and handle 401 with auth retry.
    /// Returns the HTTP response or a typed `McpTransportError`.
    async fn send_with_auth_retry(
        &self,
        method: &str,
        body: &impl serde::Serialize,
    ) -> Result<reqwest::Response> {
        // First attempt
        let req = self.build_post().await?;
        let http_resp = req
            .json(body)
            .send()
            .await
            .with_context(|| format!("SSE POST to '{}' for '{method}' failed", self.url))?;

        if http_resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            let has_session_header = http_resp.headers().contains_key(MCP_SESSION_ID_HEADER);
            self.store_session_id_from_response(&http_resp).await;

            if let Some(auth) = &self.auth {
                let first_www_auth = http_resp
                    .headers()
                    .get("www-authenticate")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);

                // Some streamable HTTP servers issue a session ID alongside 401
                // and expect subsequent requests to include it. Retry once with
                // current auth/session before forcing interactive re-auth.
                if has_session_header {
                    info!(
                        method = %method,
                        url = %self.url,
                        www_authenticate = ?first_www_auth,
                        "received 401 with session header, replaying request before OAuth re-auth"
                    );

                    let req = self.build_post().await?;
                    let replay_resp = req.json(body).send().await.with_context(|| {
                        format!(
                            "SSE POST session replay to '{}' for '{method}' failed",
                            self.url
                        )
                    })?;

                    if replay_resp.status() != reqwest::StatusCode::UNAUTHORIZED {
                        self.store_session_id_from_response(&replay_resp).await;
                        return Ok(replay_resp);
                    }

                    self.store_session_id_from_response(&replay_resp).await;
                    let replay_www_auth = replay_resp
                        .headers()
                        .get("www-authenticate")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);

                    info!(
                        method = %method,
                        url = %self.url,
                        "received 401 after session replay, attempting OAuth re-auth"
                    );

                    if auth.handle_unauthorized(replay_www_auth.as_deref()).await? {
                        // Retry with new token
                        let req = self.build_post().await?;
                        let retry_resp = req.json(body).send().await.with_context(|| {
                            format!("SSE POST retry to '{}' for '{method}' failed", self.url)
                        })?;

                        if retry_resp.status() == reqwest::StatusCode::UNAUTHORIZED {
                            return Err(McpTransportError::Unauthorized {
                                www_authenticate: retry_resp
                                    .headers()
                                    .get("www-authenticate")
                                    .and_then(|v| v.to_str().ok())
                                    .map(String::from),
                            }
                            .into());
                        }

                        self.store_session_id_from_response(&retry_resp).await;
                        return Ok(retry_resp);
                    }

                    return Err(McpTransportError::Unauthorized {
                        www_authenticate: replay_www_auth,
                    }
                    .into());
                }

                info!(
                    method = %method,
                    url = %self.url,
                    www_authenticate = ?first_www_auth,
                    "received 401, attempting OAuth re-auth"
                );

                if auth.handle_unauthorized(first_www_auth.as_deref()).await? {
                    // Retry with new token
                    let req = self.build_post().await?;
                    let retry_resp = req.json(body).send().await.with_context(|| {
                        format!("SSE POST retry to '{}' for '{method}' failed", self.url)
                    })?;

                    if retry_resp.status() == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(McpTransportError::Unauthorized {
                            www_authenticate: retry_resp
                                .headers()
                                .get("www-authenticate")
                                .and_then(|v| v.to_str().ok())
                                .map(String::from),
                        }
                        .into());
                    }

                    self.store_session_id_from_response(&retry_resp).await;
                    return Ok(retry_resp);
                }
            }

            // No auth provider or auth failed
            return Err(McpTransportError::Unauthorized {
                www_authenticate: http_resp
                    .headers()
                    .get("www-authenticate")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from),
            }
            .into());
        }

        self.store_session_id_from_response(&http_resp).await;
        Ok(http_resp)
    }
}

#[async_trait::async_trait]
impl McpTransport for SseTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);

        debug!(method = %method, id = %id, url = %self.url, "SSE client -> server");

        let http_resp = self.send_with_auth_retry(method, &req).await?;

        if !http_resp.status().is_success() {
            let status = http_resp.status();
            let body = http_resp.text().await.unwrap_or_default();
            return Err(Error::message(format!(
                "MCP SSE server returned HTTP {status} for '{method}': {body}"
            )));
        }

        let resp: JsonRpcResponse = if Self::response_is_event_stream(&http_resp) {
            let body = http_resp
                .text()
                .await
                .with_context(|| format!("failed to read event stream response for '{method}'"))?;
            Self::parse_event_stream_response(&body, method)?
        } else {
            http_resp
                .json()
                .await
                .with_context(|| format!("failed to parse JSON-RPC response for '{method}'"))?
        };

        if let Some(ref err) = resp.error {
            return Err(Error::message(format!(
                "MCP SSE error on '{method}': code={} message={}",
                err.code, err.message
            )));
        }

        Ok(resp)
    }

    async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<()> {
        let notif = JsonRpcNotification {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
        };

        debug!(method = %method, url = %self.url, "SSE client -> server (notification)");

        let http_resp = self.send_with_auth_retry(method, &notif).await?;

        if !http_resp.status().is_success() {
            let status = http_resp.status();
            warn!(method = %method, %status, "SSE notification returned non-success");
        }

        Ok(())
    }

    async fn is_alive(&self) -> bool {
        // Try a lightweight GET request to check connectivity and session continuity.
        let mut req = self
            .client
            .get(&self.url)
            .timeout(std::time::Duration::from_secs(5))
            .header("Accept", STREAMABLE_ACCEPT_HEADER)
            .header(MCP_PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION);

        if let Some(session_id) = self.session_id.read().await.clone() {
            req = req.header(MCP_SESSION_ID_HEADER, session_id);
        }

        // Include auth header in health checks too
        if let Some(token) = match &self.auth {
            Some(auth) => auth.access_token().await.ok().flatten(),
            None => None,
        } {
            req = req.header("Authorization", format!("Bearer {}", token.expose_secret()));
        }

        match req.send().await {
            Ok(resp) => {
                self.store_session_id_from_response(&resp).await;
                true
            },
            Err(_) => false,
        }
    }

    async fn kill(&self) {
        let session_id = {
            let mut slot = self.session_id.write().await;
            slot.take()
        };

        let Some(session_id) = session_id else {
            return;
        };

        let mut req = self
            .client
            .delete(&self.url)
            .timeout(std::time::Duration::from_secs(5))
            .header(MCP_PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION)
            .header(MCP_SESSION_ID_HEADER, session_id);

        if let Some(token) = match &self.auth {
            Some(auth) => auth.access_token().await.ok().flatten(),
            None => None,
        } {
            req = req.header("Authorization", format!("Bearer {}", token.expose_secret()));
        }

        if let Err(e) = req.send().await {
            warn!(url = %self.url, error = %e, "failed to close MCP streamable HTTP session");
        }
    }
}
