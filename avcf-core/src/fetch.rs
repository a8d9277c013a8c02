//! Remote key retrieval.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, instrument};

use crate::error::{AvcfError, Result};

/// Fixed timeout for the single key fetch. The fetch is never retried;
/// callers fall back to the embedded key instead.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP fetcher for armored public keys.
pub struct KeyFetcher {
    client: Client,
}

impl KeyFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| AvcfError::Key(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// GET `url`, expecting an armored public key as the body. Any
    /// non-success status is a failure.
    #[instrument(level = "debug", skip(self))]
    pub fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(AvcfError::Key(format!(
                "key fetch from {url} returned status {status}"
            )));
        }
        let body = response.text()?;
        debug!(bytes = body.len(), "Fetched key material");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_constructs() {
        assert!(KeyFetcher::new().is_ok());
    }

    #[test]
    fn test_fetch_unreachable_host_fails() {
        let fetcher = KeyFetcher::new().unwrap();
        // Nothing listens on this port; the connection is refused locally.
        assert!(fetcher.fetch("http://127.0.0.1:9/key.asc").is_err());
    }

    #[test]
    fn test_fetch_invalid_url_fails() {
        let fetcher = KeyFetcher::new().unwrap();
        assert!(fetcher.fetch("not a url").is_err());
    }
}
