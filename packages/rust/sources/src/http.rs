//! Shared HTTP client for all source adapters.
//!
//! Successive requests to the same origin are spaced by a randomized
//! politeness delay drawn from `[politeness_min_ms, politeness_max_ms]`.

use std::collections::HashMap;
use std::time::Duration;

use aidigest_shared::{AdaptersConfig, AiDigestError, Result};
use rand::Rng;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("aidigest/", env!("CARGO_PKG_VERSION"));

/// Bounds of the randomized pause between requests to one origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Politeness {
    pub min: Duration,
    pub max: Duration,
}

impl Politeness {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        let (lo, hi) = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };
        Self {
            min: Duration::from_millis(lo),
            max: Duration::from_millis(hi),
        }
    }

    /// No delay at all (tests, local mirrors).
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    fn sample(&self) -> Duration {
        if self.max.is_zero() {
            return Duration::ZERO;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

/// HTTP client with user agent, timeout, redirect limit and per-origin pacing.
pub struct HttpClient {
    client: Client,
    politeness: Politeness,
    /// Earliest start time of the next request, per origin.
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl HttpClient {
    /// Build a client from the `[adapters]` config section.
    pub fn new(config: &AdaptersConfig) -> Result<Self> {
        Self::with_politeness(
            Duration::from_secs(config.timeout_secs),
            Politeness::new(config.politeness_min_ms, config.politeness_max_ms),
        )
    }

    pub fn with_politeness(timeout: Duration, politeness: Politeness) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| AiDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            politeness,
            next_slot: Mutex::new(HashMap::new()),
        })
    }

    /// Wait until this origin may be contacted again, and reserve the next slot.
    async fn pace(&self, url: &Url) {
        let origin = url.origin().ascii_serialization();
        let start = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let start = slots.get(&origin).map_or(now, |&slot| slot.max(now));
            slots.insert(origin, start + self.politeness.sample());
            start
        };
        if start > Instant::now() {
            debug!(url = %url, "politeness delay");
            tokio::time::sleep_until(start).await;
        }
    }

    async fn send(&self, url: &str, bearer: Option<&str>) -> Result<reqwest::Response> {
        let parsed =
            Url::parse(url).map_err(|e| AiDigestError::validation(format!("{url}: {e}")))?;
        self.pace(&parsed).await;
        debug!(%url, "GET");

        let mut request = self.client.get(parsed);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AiDigestError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AiDigestError::Network(format!("{url}: HTTP {status}")));
        }
        Ok(response)
    }

    /// GET a body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.send(url, None)
            .await?
            .text()
            .await
            .map_err(|e| AiDigestError::Network(format!("{url}: body read failed: {e}")))
    }

    /// GET and decode a JSON body, optionally with a bearer token.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, bearer: Option<&str>) -> Result<T> {
        self.send(url, bearer)
            .await?
            .json::<T>()
            .await
            .map_err(|e| AiDigestError::parse(format!("{url}: invalid JSON: {e}")))
    }
}
