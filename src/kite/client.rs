//! Kite API Client
//!
//! HTTP client for the Kite Connect REST API with token-based
//! authentication. The access token is obtained once per session via
//! [`KiteClient::generate_session`]; all other calls only read it.

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::KiteError;

use super::models::*;

/// Production API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.kite.trade";

/// Interactive login page; the user is redirected back with a request token
pub const LOGIN_URL: &str = "https://kite.zerodha.com/connect/login";

/// Kite API version header value
const KITE_VERSION: &str = "3";

/// Kite API client holding the session credentials
pub struct KiteClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    access_token: Option<String>,
}

impl KiteClient {
    /// Create a new client with explicit credentials
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            access_token: None,
        }
    }

    /// Point the client at a different API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// The login URL the user must visit to obtain a request token.
    /// Pure string construction - no network call.
    pub fn login_url(&self) -> String {
        format!("{}?v=3&api_key={}", LOGIN_URL, self.api_key)
    }

    /// SHA-256 hex of api_key + request_token + api_secret, as required by
    /// the session endpoint.
    fn checksum(&self, request_token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.api_key.as_bytes());
        hasher.update(request_token.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Exchange a one-time request token for an access token and store it
    /// for the rest of the process lifetime.
    pub async fn generate_session(&mut self, request_token: &str) -> Result<SessionData, KiteError> {
        info!("Exchanging request token for access token...");

        let request = SessionTokenRequest {
            api_key: self.api_key.clone(),
            request_token: request_token.to_string(),
            checksum: self.checksum(request_token),
        };

        let response = self
            .client
            .post(format!("{}/session/token", self.base_url))
            .header("X-Kite-Version", KITE_VERSION)
            .form(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let data = match unwrap_envelope(status, &body) {
            Ok(data) => data,
            // Rejections during the exchange get their own error kind: fatal
            // for the login utility, reported-but-recoverable for the tool.
            Err(KiteError::Api { message, .. }) => {
                return Err(KiteError::AuthExchange(message));
            }
            Err(e) => return Err(e),
        };

        let session: SessionData = serde_json::from_value(data)
            .map_err(|e| KiteError::UnexpectedResponse(format!("session payload: {e}")))?;

        self.access_token = Some(session.access_token.clone());
        info!(user_id = ?session.user_id, "Access token acquired");
        Ok(session)
    }

    /// Get the authorization header value
    fn auth_header(&self) -> Result<String, KiteError> {
        let token = self
            .access_token
            .as_ref()
            .ok_or(KiteError::NotAuthenticated)?;
        Ok(format!("token {}:{}", self.api_key, token))
    }

    /// Make an authenticated GET request and unwrap the envelope
    async fn get(&self, endpoint: &str) -> Result<Value, KiteError> {
        let auth = self.auth_header()?;
        debug!(endpoint, "GET");

        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .header("X-Kite-Version", KITE_VERSION)
            .header("Authorization", auth)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        unwrap_envelope(status, &body)
    }

    /// Make an authenticated form request (POST/PUT/DELETE) and unwrap the
    /// envelope
    async fn send_form(
        &self,
        method: Method,
        endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<Value, KiteError> {
        let auth = self.auth_header()?;
        debug!(endpoint, %method, "form request");

        let response = self
            .client
            .request(method, format!("{}{}", self.base_url, endpoint))
            .header("X-Kite-Version", KITE_VERSION)
            .header("Authorization", auth)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        unwrap_envelope(status, &body)
    }

    // ========================================================================
    // Account
    // ========================================================================

    /// Profile of the authenticated user
    pub async fn profile(&self) -> Result<Value, KiteError> {
        self.get("/user/profile").await
    }

    /// Funds and margins, optionally restricted to one segment
    /// (equity or commodity)
    pub async fn margins(&self, segment: Option<&str>) -> Result<Value, KiteError> {
        match segment {
            Some(segment) => self.get(&format!("/user/margins/{segment}")).await,
            None => self.get("/user/margins").await,
        }
    }

    // ========================================================================
    // Portfolio
    // ========================================================================

    /// Portfolio holdings
    pub async fn holdings(&self) -> Result<Value, KiteError> {
        self.get("/portfolio/holdings").await
    }

    /// Day and net positions
    pub async fn positions(&self) -> Result<Value, KiteError> {
        self.get("/portfolio/positions").await
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// All orders placed for the day
    pub async fn orders(&self) -> Result<Value, KiteError> {
        self.get("/orders").await
    }

    /// States an order has gone through
    pub async fn order_history(&self, order_id: &str) -> Result<Value, KiteError> {
        self.get(&format!("/orders/{order_id}")).await
    }

    /// Trades generated by an order
    pub async fn order_trades(&self, order_id: &str) -> Result<Value, KiteError> {
        self.get(&format!("/orders/{order_id}/trades")).await
    }

    /// Place a new order. Returns the brokerage-assigned order ID.
    pub async fn place_order(&self, params: &PlaceOrderParams) -> Result<String, KiteError> {
        info!(
            symbol = %params.tradingsymbol,
            side = %params.transaction_type,
            qty = params.quantity,
            "Placing order"
        );

        let data = self
            .send_form(
                Method::POST,
                &format!("/orders/{}", params.variety()),
                &params.to_form(),
            )
            .await?;

        let receipt: OrderReceipt = serde_json::from_value(data)
            .map_err(|e| KiteError::UnexpectedResponse(format!("order payload: {e}")))?;
        info!(order_id = %receipt.order_id, "Order placed");
        Ok(receipt.order_id)
    }

    /// Modify an open order. Returns the order ID.
    pub async fn modify_order(&self, params: &ModifyOrderParams) -> Result<String, KiteError> {
        info!(order_id = %params.order_id, "Modifying order");

        let data = self
            .send_form(
                Method::PUT,
                &format!("/orders/{}/{}", params.variety(), params.order_id),
                &params.to_form(),
            )
            .await?;

        let receipt: OrderReceipt = serde_json::from_value(data)
            .map_err(|e| KiteError::UnexpectedResponse(format!("order payload: {e}")))?;
        Ok(receipt.order_id)
    }

    /// Cancel an open order. Returns the order ID.
    pub async fn cancel_order(&self, variety: &str, order_id: &str) -> Result<String, KiteError> {
        info!(order_id, "Cancelling order");

        let data = self
            .send_form(Method::DELETE, &format!("/orders/{variety}/{order_id}"), &[])
            .await?;

        let receipt: OrderReceipt = serde_json::from_value(data)
            .map_err(|e| KiteError::UnexpectedResponse(format!("order payload: {e}")))?;
        Ok(receipt.order_id)
    }
}

/// Unwrap Kite's `{status, data, message, error_type}` envelope, turning
/// error envelopes (and non-JSON failures) into [`KiteError::Api`].
fn unwrap_envelope(status: StatusCode, body: &str) -> Result<Value, KiteError> {
    match serde_json::from_str::<ApiEnvelope>(body) {
        Ok(envelope) if envelope.status == "success" => {
            Ok(envelope.data.unwrap_or(Value::Null))
        }
        Ok(envelope) => Err(KiteError::Api {
            message: envelope
                .message
                .unwrap_or_else(|| format!("request failed with status {status}")),
            error_type: envelope
                .error_type
                .unwrap_or_else(|| "GeneralException".to_string()),
        }),
        Err(_) if !status.is_success() => Err(KiteError::Api {
            message: format!("HTTP {status}: {body}"),
            error_type: "HTTPError".to_string(),
        }),
        Err(e) => Err(KiteError::UnexpectedResponse(format!("{e}: {body}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> KiteClient {
        KiteClient::new("test_key", "test_secret").with_base_url(server.uri())
    }

    async fn authenticated_client(server: &MockServer) -> KiteClient {
        Mock::given(method("POST"))
            .and(path("/session/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"access_token": "tok123", "user_id": "AB1234"}
            })))
            .mount(server)
            .await;

        let mut kite = client(server);
        kite.generate_session("req_token").await.unwrap();
        kite
    }

    #[test]
    fn login_url_contains_api_key() {
        let kite = KiteClient::new("X", "secret");
        let url = kite.login_url();
        assert!(url.contains("api_key=X"));
        assert!(url.starts_with(LOGIN_URL));
    }

    #[test]
    fn checksum_is_hex_sha256() {
        let kite = KiteClient::new("key", "secret");
        let sum = kite.checksum("token");
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
        // Deterministic, and sensitive to the request token
        assert_eq!(sum, kite.checksum("token"));
        assert_ne!(sum, kite.checksum("other"));
    }

    #[tokio::test]
    async fn generate_session_stores_token() {
        let server = MockServer::start().await;
        let kite = authenticated_client(&server).await;
        assert!(kite.is_authenticated());
    }

    #[tokio::test]
    async fn generate_session_rejection_is_auth_exchange_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/token"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "status": "error",
                "message": "Token is invalid or has expired.",
                "error_type": "TokenException"
            })))
            .mount(&server)
            .await;

        let mut kite = client(&server);
        let err = kite.generate_session("stale").await.unwrap_err();
        match err {
            KiteError::AuthExchange(message) => {
                assert!(message.contains("invalid or has expired"))
            }
            other => panic!("expected AuthExchange, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_before_auth_fails_without_network() {
        let kite = KiteClient::new("key", "secret");
        let err = kite.positions().await.unwrap_err();
        assert!(matches!(err, KiteError::NotAuthenticated));
    }

    #[tokio::test]
    async fn positions_returns_native_payload() {
        let server = MockServer::start().await;
        let payload = json!({
            "net": [{"tradingsymbol": "INFY", "quantity": 10, "pnl": 150.5}],
            "day": []
        });
        Mock::given(method("GET"))
            .and(path("/portfolio/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": payload
            })))
            .mount(&server)
            .await;

        let kite = authenticated_client(&server).await;
        assert_eq!(kite.positions().await.unwrap(), payload);
    }

    #[tokio::test]
    async fn place_order_returns_order_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders/regular"))
            .and(body_string_contains("tradingsymbol=INFY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"order_id": "240805000123456"}
            })))
            .mount(&server)
            .await;

        let kite = authenticated_client(&server).await;
        let params: PlaceOrderParams = serde_json::from_value(json!({
            "exchange": "NSE",
            "tradingsymbol": "INFY",
            "transaction_type": "BUY",
            "quantity": 10
        }))
        .unwrap();

        assert_eq!(kite.place_order(&params).await.unwrap(), "240805000123456");
    }

    #[tokio::test]
    async fn place_order_rejection_carries_brokerage_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders/regular"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": "error",
                "message": "Insufficient funds. Required margin is 28000.00",
                "error_type": "InputException"
            })))
            .mount(&server)
            .await;

        let kite = authenticated_client(&server).await;
        let params: PlaceOrderParams = serde_json::from_value(json!({
            "exchange": "NSE",
            "tradingsymbol": "INFY",
            "transaction_type": "BUY",
            "quantity": 100000
        }))
        .unwrap();

        match kite.place_order(&params).await.unwrap_err() {
            KiteError::Api {
                message,
                error_type,
            } => {
                assert!(message.contains("Insufficient funds"));
                assert_eq!(error_type, "InputException");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_unknown_order_carries_brokerage_message() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/orders/regular/does-not-exist"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": "error",
                "message": "Order cannot be cancelled as it is not open",
                "error_type": "OrderException"
            })))
            .mount(&server)
            .await;

        let kite = authenticated_client(&server).await;
        match kite.cancel_order("regular", "does-not-exist").await.unwrap_err() {
            KiteError::Api { message, .. } => {
                assert!(message.contains("cannot be cancelled"))
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn margins_segment_selects_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/margins/equity"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"available": {"cash": 12000.0}}
            })))
            .mount(&server)
            .await;

        let kite = authenticated_client(&server).await;
        let data = kite.margins(Some("equity")).await.unwrap();
        assert_eq!(data["available"]["cash"], 12000.0);
    }
}
