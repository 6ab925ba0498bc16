//! Replication-remote discovery handshake.
//!
//! One authenticated POST exchanges the long-lived access token for a
//! short-lived pull URL and bearer token scoped to a factory.

use serde::Deserialize;

use crate::error::SyncError;
use crate::http;

/// Header carrying the access token on the handshake.
pub const TOKEN_HEADER: &str = "osf-token";

/// Where to pull from and the bearer token to present.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct PullTarget {
    #[serde(rename = "download_url")]
    pub base_url: String,
    #[serde(rename = "access_token")]
    pub token: String,
}

impl std::fmt::Debug for PullTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullTarget")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Resolves the pull target for a factory.
pub trait Discovery {
    fn pull_target(&self, factory: &str) -> Result<PullTarget, SyncError>;
}

/// HTTP implementation against `{base}/{factory}/v2/repos/lmp/download-urls`.
pub struct DiscoveryClient {
    agent: ureq::Agent,
    api_base: String,
    token: String,
}

impl DiscoveryClient {
    pub fn new(agent: ureq::Agent, api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            agent,
            api_base: api_base.into(),
            token: token.into(),
        }
    }

    pub fn endpoint(&self, factory: &str) -> String {
        format!(
            "{}/{}/v2/repos/lmp/download-urls",
            self.api_base.trim_end_matches('/'),
            factory
        )
    }
}

impl Discovery for DiscoveryClient {
    fn pull_target(&self, factory: &str) -> Result<PullTarget, SyncError> {
        let url = self.endpoint(factory);
        tracing::info!(%url, "requesting pull credentials");

        let request = self.agent.post(&url).set(TOKEN_HEADER, &self.token);
        let response = http::call(request, &url)?;
        let targets: Vec<PullTarget> =
            response.into_json().map_err(|e| SyncError::Transfer {
                url: url.clone(),
                reason: format!("malformed discovery response: {e}"),
            })?;

        targets.into_iter().next().ok_or_else(|| SyncError::Transfer {
            url,
            reason: "discovery response listed no download urls".to_string(),
        })
    }
}
