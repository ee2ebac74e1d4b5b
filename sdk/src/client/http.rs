//! HTTP client implementation.
//!
//! Provides the signed REST transport: every request is signed, every
//! failure is classified, and retryable failures are retried with backoff.

use reqwest::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::auth::Credentials;
use super::config::{ClientConfig, Environment};
use super::error::{classify, parse_retry_after, ClientError};
use crate::types::{
    ApiKey, Balance, BookView, CreateOrderRequest, ExchangeStatus, Fill, Order, Position,
    RestOrderbook,
};

/// A REST request relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,

    /// Path below the base URL, e.g. `/portfolio/balance`.
    pub path: String,

    /// Query parameters.
    pub query: Vec<(String, String)>,

    /// JSON body.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a POST request with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Method::POST, path)
        }
    }

    /// Creates a DELETE request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Adds a query parameter, replacing any previous value for the key.
    #[must_use]
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.retain(|(k, _)| k != key);
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Adds a query parameter when the value is present.
    #[must_use]
    pub fn with_optional_query<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with_query(key, v),
            None => self,
        }
    }

    /// Returns true if this request creates or cancels an order.
    #[must_use]
    pub fn is_order_write(&self) -> bool {
        self.path.starts_with("/portfolio/orders")
            && (self.method == Method::POST || self.method == Method::DELETE)
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,

    /// Cursor for the next page; `None` on the last page.
    pub cursor: Option<String>,
}

impl<T> Page<T> {
    fn new(items: Vec<T>, cursor: Option<String>) -> Self {
        Self {
            items,
            cursor: cursor.filter(|c| !c.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PositionsResponse {
    #[serde(default)]
    market_positions: Vec<Position>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FillsResponse {
    #[serde(default)]
    fills: Vec<Fill>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrdersResponse {
    #[serde(default)]
    orders: Vec<Order>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order: Order,
}

#[derive(Debug, Deserialize)]
struct OrderbookResponse {
    #[serde(default)]
    orderbook: RestOrderbook,
}

#[derive(Debug, Deserialize)]
struct ApiKeysResponse {
    #[serde(default)]
    api_keys: Vec<ApiKey>,
}

/// Signed HTTP client for the Kalshi REST API.
///
/// Clones share the connection pool, credentials and shutdown signal.
#[derive(Debug, Clone)]
pub struct KalshiClient {
    config: ClientConfig,
    credentials: Option<Credentials>,
    http: reqwest::Client,
    cancel: CancellationToken,
}

impl KalshiClient {
    /// Creates a new client with the given configuration.
    ///
    /// Without credentials only public endpoints will succeed.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: ClientConfig, credentials: Option<Credentials>) -> Result<Self, ClientError> {
        Self::with_cancellation(config, credentials, CancellationToken::new())
    }

    /// Creates a client that stops retrying once `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn with_cancellation(
        config: ClientConfig,
        credentials: Option<Credentials>,
        cancel: CancellationToken,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(ClientError::Request)?;

        Ok(Self {
            config,
            credentials,
            http,
            cancel,
        })
    }

    /// Creates an authenticated client for an environment with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn for_environment(environment: Environment, credentials: Credentials) -> Result<Self, ClientError> {
        Self::new(ClientConfig::for_environment(environment), Some(credentials))
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the shutdown signal shared by clones of this client.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stops all pending retry loops at their next backoff checkpoint.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Sends a request, retrying retryable failures.
    ///
    /// Non-retryable errors are returned immediately and unmodified. When
    /// retries are exhausted the last error is returned.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the final attempt, or
    /// `ClientError::Cancelled` if the client was shut down.
    pub async fn send<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ClientError> {
        let policy = self.config.retry;
        let mut attempt: u32 = 1;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            let err = match self.execute(request).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() || !policy.allows_retry(attempt) {
                if err.is_retryable() {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        attempts = attempt,
                        error = %err,
                        "retries exhausted"
                    );
                }
                return Err(err);
            }

            let delay = policy.delay_for(attempt, err.retry_after());
            warn!(
                method = %request.method,
                path = %request.path,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying request"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Performs a single signed attempt.
    async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ClientError> {
        let mut url = Url::parse(&format!("{}{}", self.config.base_url, request.path))
            .map_err(|e| ClientError::InvalidConfig(format!("invalid request url: {}", e)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        let mut builder = self.http.request(request.method.clone(), url.clone());

        if let Some(credentials) = &self.credentials {
            let headers = credentials.headers(request.method.as_str(), url.path());
            for (name, value) in headers.pairs() {
                builder = builder.header(name, value);
            }
        }

        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.to_string());
        }

        debug!(method = %request.method, path = %request.path, "sending request");
        let resp = builder.send().await?;
        let status = resp.status();

        if status.is_success() {
            let body = resp.text().await.map_err(body_read_error)?;
            let body = if body.trim().is_empty() { "null" } else { body.as_str() };
            return serde_json::from_str(body).map_err(|e| ClientError::Deserialization(e.to_string()));
        }

        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = resp.text().await.unwrap_or_default();

        Err(classify(status, &body, retry_after, request.is_order_write()))
    }

    /// Walks cursor pages, stopping after the first unless `fetch_all`.
    async fn paginate<R, T, F>(
        &self,
        mut request: ApiRequest,
        fetch_all: bool,
        split: F,
    ) -> Result<Vec<T>, ClientError>
    where
        R: DeserializeOwned,
        F: Fn(R) -> Page<T>,
    {
        let mut items = Vec::new();
        loop {
            let page = split(self.send::<R>(&request).await?);
            items.extend(page.items);
            match page.cursor {
                Some(cursor) if fetch_all => request = request.with_query("cursor", cursor),
                _ => break,
            }
        }
        Ok(items)
    }

    /// Makes a GET request and decodes the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(&ApiRequest::get(path)).await
    }

    /// Makes a POST request with a JSON body and decodes the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized or the request
    /// fails.
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body).map_err(|e| ClientError::Deserialization(e.to_string()))?;
        self.send(&ApiRequest::post(path, body)).await
    }

    /// Makes a DELETE request and decodes the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(&ApiRequest::delete(path)).await
    }

    /// Gets the account balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_balance(&self) -> Result<Balance, ClientError> {
        self.get("/portfolio/balance").await
    }

    /// Places an order.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` or `OrderRejected` for exchange-side
    /// refusals, which are never retried.
    pub async fn place_order(&self, order: &CreateOrderRequest) -> Result<Order, ClientError> {
        let response: OrderResponse = self.post("/portfolio/orders", order).await?;
        Ok(response.order)
    }

    /// Cancels a resting order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the order is unknown.
    pub async fn cancel_order(&self, order_id: &str) -> Result<Order, ClientError> {
        let response: OrderResponse = self.delete(&format!("/portfolio/orders/{}", order_id)).await?;
        Ok(response.order)
    }

    /// Gets a single order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the order is unknown.
    pub async fn get_order(&self, order_id: &str) -> Result<Order, ClientError> {
        let response: OrderResponse = self.get(&format!("/portfolio/orders/{}", order_id)).await?;
        Ok(response.order)
    }

    /// Gets orders, optionally filtered by status (e.g. `resting`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_orders(&self, status: Option<&str>) -> Result<Vec<Order>, ClientError> {
        let request = ApiRequest::get("/portfolio/orders").with_optional_query("status", status);
        let response: OrdersResponse = self.send(&request).await?;
        Ok(response.orders)
    }

    /// Gets positions.
    ///
    /// # Arguments
    ///
    /// * `ticker` - Optional market filter
    /// * `limit` - Optional page size
    /// * `fetch_all` - Follow cursors until the last page
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails.
    pub async fn get_positions(
        &self,
        ticker: Option<&str>,
        limit: Option<u32>,
        fetch_all: bool,
    ) -> Result<Vec<Position>, ClientError> {
        let request = ApiRequest::get("/portfolio/positions")
            .with_optional_query("ticker", ticker)
            .with_optional_query("limit", limit);
        self.paginate(request, fetch_all, |r: PositionsResponse| {
            Page::new(r.market_positions, r.cursor)
        })
        .await
    }

    /// Gets one page of fills.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_fills_page(
        &self,
        ticker: Option<&str>,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<Page<Fill>, ClientError> {
        let request = ApiRequest::get("/portfolio/fills")
            .with_optional_query("ticker", ticker)
            .with_optional_query("limit", limit)
            .with_optional_query("cursor", cursor);
        let response: FillsResponse = self.send(&request).await?;
        Ok(Page::new(response.fills, response.cursor))
    }

    /// Gets fills.
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails.
    pub async fn get_fills(
        &self,
        ticker: Option<&str>,
        limit: Option<u32>,
        fetch_all: bool,
    ) -> Result<Vec<Fill>, ClientError> {
        let request = ApiRequest::get("/portfolio/fills")
            .with_optional_query("ticker", ticker)
            .with_optional_query("limit", limit);
        self.paginate(request, fetch_all, |r: FillsResponse| Page::new(r.fills, r.cursor))
            .await
    }

    /// Gets the REST order book for a market.
    ///
    /// The result carries no sequence number and is never marked synced.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_orderbook(&self, ticker: &str, depth: Option<u32>) -> Result<BookView, ClientError> {
        let ticker = ticker.to_uppercase();
        let request = ApiRequest::get(format!("/markets/{}/orderbook", ticker))
            .with_optional_query("depth", depth);
        let response: OrderbookResponse = self.send(&request).await?;
        Ok(response.orderbook.into_view(ticker))
    }

    /// Gets the exchange status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_exchange_status(&self) -> Result<ExchangeStatus, ClientError> {
        self.get("/exchange/status").await
    }

    /// Lists API keys on the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_api_keys(&self) -> Result<Vec<ApiKey>, ClientError> {
        let response: ApiKeysResponse = self.get("/api_keys").await?;
        Ok(response.api_keys)
    }

    /// Deletes an API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_api_key(&self, key_id: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self.delete(&format!("/api_keys/{}", key_id)).await?;
        Ok(())
    }

    /// Gets the account's API rate limits as returned by the exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_api_limits(&self) -> Result<serde_json::Value, ClientError> {
        self.get("/account/limits").await
    }
}

/// Maps a failure while reading a success body.
///
/// A timeout stays retryable; anything else is an undecodable body.
fn body_read_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Deserialization(err.to_string())
    }
}
