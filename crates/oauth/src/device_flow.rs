use {anyhow::Result, reqwest::header::HeaderMap, secrecy::Secret};

use crate::types::{OAuthConfig, OAuthTokens};

/// Response from the device code request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    /// Some providers (e.g. Kimi) return a complete URI with the code embedded.
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

/// Request a device code from the provider.
pub async fn request_device_code(
    client: &reqwest::Client,
    config: &OAuthConfig,
) -> Result<DeviceCodeResponse> {
    request_device_code_with_headers(client, config, None).await
}

/// Request a device code, optionally sending extra headers.
pub async fn request_device_code_with_headers(
    client: &reqwest::Client,
    config: &OAuthConfig,
    extra_headers: Option<&HeaderMap>,
) -> Result<DeviceCodeResponse> {
    let mut req = client
        .post(&config.auth_url)
        .header("Accept", "application/json")
        .form(&[("client_id", config.client_id.as_str()), ("scope", "")]);

    if let Some(headers) = extra_headers {
        req = req.headers(headers.clone());
    }

    let resp = req.send().await?;

    if !resp.status().is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("device code request failed: {body}");
    }

    Ok(resp.json().await?)
}

#[derive(Debug, serde::Deserialize)]
struct TokenPollResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

/// Poll the token endpoint until the user completes the device flow.
pub async fn poll_for_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    device_code: &str,
    interval: u64,
) -> Result<OAuthTokens> {
    poll_for_token_with_headers(client, config, device_code, interval, None).await
}

/// Poll the token endpoint, optionally sending extra headers.
pub async fn poll_for_token_with_headers(
    client: &reqwest::Client,
    config: &OAuthConfig,
    device_code: &str,
    interval: u64,
    extra_headers: Option<&HeaderMap>,
) -> Result<OAuthTokens> {
    loop {
        tokio::time::sleep(std::time::Duration::from_secs(interval)).await;

        let mut req = client
            .post(&config.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", config.client_id.as_str()),
                ("device_code", device_code),
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ]);

        if let Some(headers) = extra_headers {
            req = req.headers(headers.clone());
        }

        let resp = req.send().await?;

        let body: TokenPollResponse = resp.json().await?;

        if let Some(token) = body.access_token {
            let expires_at = body.expires_in.and_then(|secs| {
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .ok()
                    .map(|d| d.as_secs() + secs)
            });
            return Ok(OAuthTokens {
                access_token: Secret::new(token),
                refresh_token: body.refresh_token.map(Secret::new),
                expires_at,
            });
        }

        match body.error.as_deref() {
            Some("authorization_pending") => continue,
            Some("slow_down") => {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                continue;
            },
            Some(err) => anyhow::bail!("device flow error: {err}"),
            None => anyhow::bail!("unexpected response from token endpoint"),
        }
    }
}
