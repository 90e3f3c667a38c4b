//! Federated sign-in: turns a short-lived external session id into a profile.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::IdentityConfig;

/// Profile returned by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalIdentity {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, external_session_id: &str) -> anyhow::Result<ExternalIdentity>;
}

/// Resolves ids against the provider's session-data endpoint.
#[derive(Clone)]
pub struct HttpIdentityResolver {
    http: reqwest::Client,
    url: String,
}

impl HttpIdentityResolver {
    pub fn new(config: &IdentityConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build identity http client")?;
        Ok(Self {
            http,
            url: config.session_data_url.clone(),
        })
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(&self, external_session_id: &str) -> anyhow::Result<ExternalIdentity> {
        let response = self
            .http
            .get(&self.url)
            .header("X-Session-ID", external_session_id)
            .send()
            .await
            .context("identity provider request")?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "identity provider rejected session");
            anyhow::bail!("identity provider returned {status}");
        }

        let identity: ExternalIdentity = response
            .json()
            .await
            .context("decode identity provider response")?;
        debug!(email = %identity.email, "federated identity resolved");
        Ok(identity)
    }
}
