//! External IP lookup.

use std::net::IpAddr;
use std::time::Duration;

use reachgrid_core::BoxFuture;
use tracing::debug;

use crate::error::{GuardError, GuardResult};

/// Something that can tell us our current external IP.
pub trait IpLookup: Send + Sync {
    fn lookup(&self) -> BoxFuture<'_, GuardResult<IpAddr>>;
}

/// Looks up the external IP from a plain-text HTTP endpoint such as
/// `https://icanhazip.com`.
pub struct HttpIpLookup {
    client: reqwest::Client,
    url: String,
}

impl HttpIpLookup {
    pub fn new(url: impl Into<String>, timeout: Duration) -> GuardResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reachgrid/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GuardError::Lookup(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch(&self) -> GuardResult<IpAddr> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| GuardError::Lookup(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GuardError::Lookup(format!("{} returned {status}", self.url)));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| GuardError::Lookup(e.to_string()))?;
        let ip = parse_ip_body(&body)?;
        debug!(%ip, url = %self.url, "egress IP looked up");
        Ok(ip)
    }
}

impl IpLookup for HttpIpLookup {
    fn lookup(&self) -> BoxFuture<'_, GuardResult<IpAddr>> {
        Box::pin(self.fetch())
    }
}

/// Parse a lookup response body, ignoring surrounding whitespace and
/// line breaks.
pub fn parse_ip_body(body: &str) -> GuardResult<IpAddr> {
    let trimmed = body.trim();
    trimmed
        .parse()
        .map_err(|_| GuardError::InvalidAddress(trimmed.to_string()))
}
