//! Jupiter API Client
//!
//! HTTP client for the Jupiter quote API, used as the price source for
//! tracked tokens.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::quote::{QuoteRequest, QuoteResponse};
use crate::ports::quote::{Quote, QuoteError, QuoteProvider};

/// Default slippage tolerance for price probes (2.5%)
pub const DEFAULT_SLIPPAGE_BPS: u16 = 250;

/// Jupiter API client configuration
#[derive(Debug, Clone)]
pub struct JupiterConfig {
    /// Base URL for Jupiter API
    pub api_base_url: String,
    /// Optional API key for higher rate limits
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Number of attempts per quote
    pub max_retries: u32,
    pub slippage_bps: u16,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.jup.ag/swap/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
        }
    }
}

/// Jupiter DEX aggregator client
#[derive(Debug, Clone)]
pub struct JupiterClient {
    config: JupiterConfig,
    http: Client,
}

impl JupiterClient {
    /// Create a new Jupiter client with default configuration
    pub fn new() -> Result<Self, QuoteError> {
        Self::with_config(JupiterConfig::default())
    }

    /// Create a new Jupiter client with custom configuration
    pub fn with_config(config: JupiterConfig) -> Result<Self, QuoteError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| QuoteError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    /// Fetch a raw quote
    pub async fn fetch_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, QuoteError> {
        let url = format!("{}/quote", self.config.api_base_url.trim_end_matches('/'));

        let mut req = self.http.get(&url).query(&request.query_params());

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response: reqwest::Response = self
            .execute_with_retry(|| async {
                req.try_clone()
                    .ok_or_else(|| QuoteError::Transport("Failed to clone request".into()))?
                    .send()
                    .await
                    .map_err(|e| {
                        if e.is_timeout() {
                            QuoteError::Timeout(self.config.timeout)
                        } else {
                            QuoteError::Transport(e.to_string())
                        }
                    })
            })
            .await?;

        self.handle_response(response, &request.output_mint).await
    }

    /// Execute request with retry logic and rate limit handling
    async fn execute_with_retry<F, Fut>(&self, request_fn: F) -> Result<reqwest::Response, QuoteError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, QuoteError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            match request_fn().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let backoff = Duration::from_secs(2u64.pow(attempt + 1));
                        tracing::warn!(
                            "Rate limited (429), backing off for {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            self.config.max_retries
                        );
                        last_error = Some(QuoteError::Transport("Rate limit exceeded".into()));
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    if status.is_server_error() {
                        last_error = Some(QuoteError::Transport(format!("Server error: {}", status)));
                        tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    tracing::debug!(error = %e, attempt = attempt + 1, "Quote request failed");
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| QuoteError::Transport("Max retries exceeded".into())))
    }

    /// Map status codes to quote errors and deserialize the body
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        mint: &str,
    ) -> Result<T, QuoteError> {
        let status = response.status();

        // Jupiter answers 400 for untradable tokens and missing routes
        if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
            let error_text = response.text().await.unwrap_or_default();
            tracing::debug!(mint, %status, body = %error_text, "No route");
            return Err(QuoteError::NoQuote(mint.to_string()));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(QuoteError::Transport(format!("API error {}: {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| QuoteError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    /// Get the configured API base URL
    pub fn api_base_url(&self) -> &str {
        &self.config.api_base_url
    }
}

#[async_trait]
impl QuoteProvider for JupiterClient {
    async fn get_quote(
        &self,
        base_mint: &str,
        token_mint: &str,
        amount: u64,
    ) -> Result<Quote, QuoteError> {
        let request = QuoteRequest::new(
            base_mint.to_string(),
            token_mint.to_string(),
            amount,
            self.config.slippage_bps,
        );

        let response = self.fetch_quote(&request).await?;
        let price = response
            .price_per_token()
            .ok_or_else(|| QuoteError::NoQuote(token_mint.to_string()))?;
        tracing::debug!(mint = token_mint, price, venues = ?response.venues(), "Jupiter quote");

        Ok(Quote {
            input_mint: response.input_mint.clone(),
            output_mint: response.output_mint.clone(),
            in_amount: response.input_amount(),
            out_amount: response.output_amount(),
            price,
            price_impact_pct: response.price_impact(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const SOL: &str = "So11111111111111111111111111111111111111112";
    const TOKEN: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";

    fn quote_body(out_amount: u64) -> String {
        format!(
            r#"{{"inputMint":"{SOL}","outputMint":"{TOKEN}","inAmount":"100000","outAmount":"{out_amount}","priceImpactPct":"0.01","routePlan":[]}}"#
        )
    }

    /// Serve one canned HTTP response per accepted connection
    async fn serve(responses: Vec<(u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        format!("http://{addr}")
    }

    fn client(base_url: String) -> JupiterClient {
        JupiterClient::with_config(JupiterConfig {
            api_base_url: base_url,
            timeout: Duration::from_secs(5),
            max_retries: 2,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_jupiter_config_default() {
        let config = JupiterConfig::default();
        assert_eq!(config.api_base_url, "https://api.jup.ag/swap/v1");
        assert!(config.api_key.is_none());
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.slippage_bps, 250);
    }

    #[test]
    fn test_jupiter_client_creation() {
        let client = JupiterClient::new();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_get_quote_derives_price() {
        let url = serve(vec![(200, quote_body(3_500_000_000))]).await;

        let quote = client(url).get_quote(SOL, TOKEN, 100_000).await.unwrap();

        assert_eq!(quote.in_amount, 100_000);
        assert_eq!(quote.out_amount, 3_500_000_000);
        assert_relative_eq!(quote.price, 0.0001 / 3500.0, max_relative = 1e-12);
    }

    #[tokio::test]
    async fn test_bad_request_is_no_quote() {
        let url = serve(vec![(
            400,
            r#"{"error":"Could not find any route","errorCode":"COULD_NOT_FIND_ANY_ROUTE"}"#.to_string(),
        )])
        .await;

        let err = client(url).get_quote(SOL, TOKEN, 100_000).await.unwrap_err();
        assert!(err.is_no_quote());
    }

    #[tokio::test]
    async fn test_zero_output_is_no_quote() {
        let url = serve(vec![(200, quote_body(0))]).await;

        let err = client(url).get_quote(SOL, TOKEN, 100_000).await.unwrap_err();
        assert!(err.is_no_quote());
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let url = serve(vec![
            (503, "{}".to_string()),
            (200, quote_body(1_000_000)),
        ])
        .await;

        let quote = client(url).get_quote(SOL, TOKEN, 100_000).await.unwrap();
        assert_eq!(quote.out_amount, 1_000_000);
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let url = serve(vec![(200, "not json".to_string())]).await;

        let err = client(url).get_quote(SOL, TOKEN, 100_000).await.unwrap_err();
        assert!(matches!(err, QuoteError::InvalidResponse(_)));
    }
}
