//! Kite API Data Models
//!
//! Request and response types for the Kite Connect REST API. Read-endpoint
//! payloads (holdings, positions, ...) are passed through as raw JSON - the
//! tool layer returns the brokerage's native structure unmodified - so only
//! the envelope, the session exchange, and the order requests are typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every Kite response wraps its payload in this envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    /// "success" or "error"
    pub status: String,
    /// Payload on success
    #[serde(default)]
    pub data: Option<Value>,
    /// Error message on failure
    #[serde(default)]
    pub message: Option<String>,
    /// Kite exception class on failure (TokenException, InputException, ...)
    #[serde(default)]
    pub error_type: Option<String>,
}

/// Response from the token exchange
#[derive(Debug, Clone, Deserialize)]
pub struct SessionData {
    /// Access token for authenticated API calls
    pub access_token: String,
    /// Zerodha user ID
    #[serde(default)]
    pub user_id: Option<String>,
    /// Account holder name
    #[serde(default)]
    pub user_name: Option<String>,
    /// Registered email
    #[serde(default)]
    pub email: Option<String>,
    /// Login timestamp reported by the brokerage
    #[serde(default)]
    pub login_time: Option<String>,
}

/// Payload of a successful place/modify/cancel call
#[derive(Debug, Deserialize)]
pub struct OrderReceipt {
    /// Order ID assigned by the brokerage
    pub order_id: String,
}

/// Request to place a new order
///
/// Forwarded verbatim as form fields; no validation beyond required-field
/// presence. Optional fields fall back to the Kite defaults for delivery
/// trading.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderParams {
    /// Exchange the security is listed on (NSE, BSE, NFO, ...)
    pub exchange: String,
    /// Trading symbol (RELIANCE, INFY, ...)
    pub tradingsymbol: String,
    /// BUY or SELL
    pub transaction_type: String,
    /// Order quantity
    pub quantity: u32,
    /// Limit price, for LIMIT orders
    #[serde(default)]
    pub price: Option<f64>,
    /// Trigger price, for SL and SL-M orders
    #[serde(default)]
    pub trigger_price: Option<f64>,
    /// Product code (CNC, MIS, ...). Default CNC.
    #[serde(default)]
    pub product: Option<String>,
    /// Order type (MARKET, LIMIT, ...). Default MARKET.
    #[serde(default)]
    pub order_type: Option<String>,
    /// Order validity (DAY, IOC). Default DAY.
    #[serde(default)]
    pub validity: Option<String>,
    /// Order variety (regular, amo, co, ...). Default regular.
    #[serde(default)]
    pub variety: Option<String>,
}

impl PlaceOrderParams {
    pub fn variety(&self) -> &str {
        self.variety.as_deref().unwrap_or("regular")
    }

    /// Form fields in the shape the Kite API expects.
    pub fn to_form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("exchange", self.exchange.clone()),
            ("tradingsymbol", self.tradingsymbol.clone()),
            ("transaction_type", self.transaction_type.clone()),
            ("quantity", self.quantity.to_string()),
            (
                "product",
                self.product.clone().unwrap_or_else(|| "CNC".to_string()),
            ),
            (
                "order_type",
                self.order_type
                    .clone()
                    .unwrap_or_else(|| "MARKET".to_string()),
            ),
            (
                "validity",
                self.validity.clone().unwrap_or_else(|| "DAY".to_string()),
            ),
        ];
        if let Some(price) = self.price {
            form.push(("price", price.to_string()));
        }
        if let Some(trigger) = self.trigger_price {
            form.push(("trigger_price", trigger.to_string()));
        }
        form
    }
}

/// Request to modify an existing order
#[derive(Debug, Clone, Deserialize)]
pub struct ModifyOrderParams {
    /// ID of the order to modify
    pub order_id: String,
    /// New quantity
    #[serde(default)]
    pub quantity: Option<u32>,
    /// New limit price
    #[serde(default)]
    pub price: Option<f64>,
    /// New order type (LIMIT, SL, SL-M, MARKET)
    #[serde(default)]
    pub order_type: Option<String>,
    /// New trigger price
    #[serde(default)]
    pub trigger_price: Option<f64>,
    /// New validity (DAY, IOC)
    #[serde(default)]
    pub validity: Option<String>,
    /// Order variety. Default regular.
    #[serde(default)]
    pub variety: Option<String>,
}

impl ModifyOrderParams {
    pub fn variety(&self) -> &str {
        self.variety.as_deref().unwrap_or("regular")
    }

    pub fn to_form(&self) -> Vec<(&'static str, String)> {
        let mut form = Vec::new();
        if let Some(quantity) = self.quantity {
            form.push(("quantity", quantity.to_string()));
        }
        if let Some(price) = self.price {
            form.push(("price", price.to_string()));
        }
        if let Some(order_type) = &self.order_type {
            form.push(("order_type", order_type.clone()));
        }
        if let Some(trigger) = self.trigger_price {
            form.push(("trigger_price", trigger.to_string()));
        }
        if let Some(validity) = &self.validity {
            form.push(("validity", validity.clone()));
        }
        form
    }
}

/// Request body for the token exchange
#[derive(Debug, Serialize)]
pub struct SessionTokenRequest {
    pub api_key: String,
    pub request_token: String,
    /// SHA-256 hex of api_key + request_token + api_secret
    pub checksum: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn place_order_fills_kite_defaults() {
        let params: PlaceOrderParams = serde_json::from_value(json!({
            "exchange": "NSE",
            "tradingsymbol": "INFY",
            "transaction_type": "BUY",
            "quantity": 10
        }))
        .unwrap();

        assert_eq!(params.variety(), "regular");
        let form = params.to_form();
        assert!(form.contains(&("product", "CNC".to_string())));
        assert!(form.contains(&("order_type", "MARKET".to_string())));
        assert!(form.contains(&("validity", "DAY".to_string())));
        // Unset optionals are omitted entirely, not sent empty
        assert!(!form.iter().any(|(k, _)| *k == "price"));
    }

    #[test]
    fn place_order_keeps_explicit_fields() {
        let params: PlaceOrderParams = serde_json::from_value(json!({
            "exchange": "NSE",
            "tradingsymbol": "RELIANCE",
            "transaction_type": "SELL",
            "quantity": 5,
            "price": 2850.5,
            "order_type": "LIMIT",
            "variety": "amo"
        }))
        .unwrap();

        assert_eq!(params.variety(), "amo");
        let form = params.to_form();
        assert!(form.contains(&("price", "2850.5".to_string())));
        assert!(form.contains(&("order_type", "LIMIT".to_string())));
    }

    #[test]
    fn modify_order_sends_only_changed_fields() {
        let params: ModifyOrderParams = serde_json::from_value(json!({
            "order_id": "240805000123456",
            "price": 101.25
        }))
        .unwrap();

        let form = params.to_form();
        assert_eq!(form, vec![("price", "101.25".to_string())]);
    }

    #[test]
    fn error_envelope_deserializes() {
        let envelope: ApiEnvelope = serde_json::from_value(json!({
            "status": "error",
            "message": "Insufficient funds",
            "error_type": "InputException"
        }))
        .unwrap();

        assert_eq!(envelope.status, "error");
        assert_eq!(envelope.message.as_deref(), Some("Insufficient funds"));
        assert!(envelope.data.is_none());
    }
}
