//! Single-attempt reachability probe for one address.
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Url};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::LinkStatus;

pub const DEFAULT_SCHEME: &str = "http://";

#[async_trait]
pub trait Probe: Send + Sync {
    /// Classify `address` as available or not. Never fails: every error
    /// collapses to `LinkStatus::NotAvailable`.
    async fn probe(&self, address: &str) -> LinkStatus;
}

/// Prepend the default scheme unless the address already carries http(s).
pub fn normalize_address(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("{}{}", DEFAULT_SCHEME, raw)
    }
}

#[derive(Clone)]
pub struct HttpProber {
    http: Client,
}

impl fmt::Debug for HttpProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProber").finish_non_exhaustive()
    }
}

impl HttpProber {
    /// Client honouring the usual proxy environment variables.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        Self::from_builder(Self::client_builder(timeout, user_agent))
    }

    /// Builder preloaded with the shared timeout and user agent, for callers
    /// that need to tweak the client further.
    pub fn client_builder(timeout: Duration, user_agent: &str) -> ClientBuilder {
        Client::builder().user_agent(user_agent).timeout(timeout)
    }

    pub fn from_builder(builder: ClientBuilder) -> Result<Self> {
        let http = builder
            .build()
            .context("failed to build probe http client")?;
        Ok(Self { http })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            Duration::from_secs(cfg.probe.timeout_seconds),
            &cfg.probe.user_agent,
        )
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn probe(&self, address: &str) -> LinkStatus {
        let normalized = normalize_address(address);

        let url = match Url::parse(&normalized) {
            Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => url,
            Ok(_) => {
                warn!(url = %normalized, "invalid url: missing host");
                return LinkStatus::NotAvailable;
            }
            Err(err) => {
                warn!(url = %normalized, ?err, "invalid url");
                return LinkStatus::NotAvailable;
            }
        };

        let res = match self.http.get(url).send().await {
            Ok(res) => res,
            Err(err) => {
                warn!(url = %normalized, ?err, "failed to fetch");
                return LinkStatus::NotAvailable;
            }
        };

        let code = res.status().as_u16();
        info!(url = %normalized, status = code, "probe returned");
        if (200..400).contains(&code) {
            LinkStatus::Available
        } else {
            LinkStatus::NotAvailable
        }
    }
}
