//! Budgeted outbound HTTPS fetching
//!
//! Every network call the engine makes (did:web documents, remote
//! manifests, revocation endpoints) goes through [`HttpFetch`] under an
//! explicit [`FetchBudget`]: a deadline, a byte cap and a redirect cap.
//! Redirects are followed manually so the scheme stays `https` on every
//! hop and a missing `Location` aborts instead of hanging.

use async_trait::async_trait;
use std::time::Duration;

/// Default total time budget for a fetch
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 2_000;

/// Default cap on response bytes read
pub const DEFAULT_FETCH_MAX_BYTES: usize = 100 * 1024;

/// Default cap on redirect hops
pub const DEFAULT_FETCH_MAX_REDIRECTS: usize = 3;

/// Errors from budgeted fetching
///
/// Callers collapse these before they reach a wire response; the variants
/// exist for logging and tests, not for clients.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The time budget elapsed
    #[error("fetch timed out")]
    Timeout,

    /// The response exceeded the byte cap
    #[error("response exceeded {0} bytes")]
    TooLarge(usize),

    /// More redirect hops than the budget allows
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    /// A hop left the https scheme
    #[error("refusing non-https URL")]
    SchemeNotHttps,

    /// A 3xx response carried no Location header
    #[error("redirect without Location header")]
    MissingLocation,

    /// Non-success terminal status
    #[error("unexpected status {0}")]
    Status(u16),

    /// Transport-level failure (DNS, TLS, connect, read)
    #[error("transport error: {0}")]
    Transport(String),

    /// Body was not valid JSON
    #[error("invalid JSON body: {0}")]
    Json(String),
}

/// The (deadline, byte-cap, redirect-cap) triple every outbound call carries
#[derive(Debug, Clone)]
pub struct FetchBudget {
    /// Total wall-clock budget for the whole fetch, redirects included
    pub timeout: Duration,
    /// Maximum response bytes to read
    pub max_bytes: usize,
    /// Maximum redirect hops to follow
    pub max_redirects: usize,
}

impl Default for FetchBudget {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            max_bytes: DEFAULT_FETCH_MAX_BYTES,
            max_redirects: DEFAULT_FETCH_MAX_REDIRECTS,
        }
    }
}

impl FetchBudget {
    /// Build a budget, clamping the timeout to 500..=10000 ms and the
    /// redirect cap to 0..=5.
    pub fn new(timeout_ms: u64, max_bytes: usize, max_redirects: usize) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms.clamp(500, 10_000)),
            max_bytes,
            max_redirects: max_redirects.min(5),
        }
    }

    /// The tighter budget used for revocation checks (≤ 2 s, ≤ 10 KiB).
    pub fn revocation() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            max_bytes: 10 * 1024,
            max_redirects: DEFAULT_FETCH_MAX_REDIRECTS,
        }
    }
}

/// Injectable HTTPS GET returning a JSON body
///
/// The production implementation is [`BudgetedFetcher`]; tests inject
/// scripted fakes.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// GET `url` within `budget` and parse the body as JSON.
    async fn get_json(
        &self,
        url: &str,
        budget: &FetchBudget,
    ) -> std::result::Result<serde_json::Value, FetchError>;
}

/// reqwest-backed fetcher with manual redirect handling
pub struct BudgetedFetcher {
    client: reqwest::Client,
}

impl BudgetedFetcher {
    /// Build a fetcher. Automatic redirect following is disabled; hops
    /// are walked explicitly so each one is scheme-checked and counted.
    pub fn new(user_agent: &str) -> std::result::Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    async fn get_within_budget(
        &self,
        url: &str,
        budget: &FetchBudget,
    ) -> std::result::Result<serde_json::Value, FetchError> {
        let mut current = reqwest::Url::parse(url)
            .map_err(|e| FetchError::Transport(format!("invalid URL: {}", e)))?;

        for _hop in 0..=budget.max_redirects {
            if current.scheme() != "https" {
                return Err(FetchError::SchemeNotHttps);
            }

            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or(FetchError::MissingLocation)?;
                current = current
                    .join(location)
                    .map_err(|e| FetchError::Transport(format!("bad Location: {}", e)))?;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let body = read_capped(response, budget.max_bytes).await?;
            return serde_json::from_slice(&body).map_err(|e| FetchError::Json(e.to_string()));
        }

        Err(FetchError::TooManyRedirects(budget.max_redirects))
    }
}

/// Stream the body, aborting as soon as the cap is crossed.
async fn read_capped(
    mut response: reqwest::Response,
    max_bytes: usize,
) -> std::result::Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?
    {
        if body.len() + chunk.len() > max_bytes {
            return Err(FetchError::TooLarge(max_bytes));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[async_trait]
impl HttpFetch for BudgetedFetcher {
    async fn get_json(
        &self,
        url: &str,
        budget: &FetchBudget,
    ) -> std::result::Result<serde_json::Value, FetchError> {
        match tokio::time::timeout(budget.timeout, self.get_within_budget(url, budget)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }
}
