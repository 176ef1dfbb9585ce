//! Brokerage Tool Registry
//!
//! The fixed catalog of 12 brokerage operations exposed over MCP, the
//! closed [`ToolRequest`] union they parse into, and the dispatcher that
//! forwards each variant to the shared [`KiteClient`].
//!
//! Dispatch is a single `match` over the tagged union rather than a
//! name-keyed lookup of duck-typed callables, so a malformed call fails at
//! parse time - before any brokerage traffic.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::KiteError;
use crate::kite::models::{ModifyOrderParams, PlaceOrderParams};
use crate::kite::KiteClient;
use crate::mcp::protocol::{CallToolResult, Tool};

/// One parsed tool invocation. Every brokerage operation the server exposes
/// is a variant here; adding a tool means adding a variant, a catalog entry,
/// and a dispatch arm.
#[derive(Debug)]
pub enum ToolRequest {
    GetLoginUrl,
    GetAccessToken { request_token: String },
    GetUserProfile,
    GetMargins { segment: Option<String> },
    GetHoldings,
    GetPositions,
    GetOrders,
    GetOrderHistory { order_id: String },
    GetOrderTrades { order_id: String },
    PlaceOrder(PlaceOrderParams),
    ModifyOrder(ModifyOrderParams),
    CancelOrder { order_id: String, variety: Option<String> },
}

impl ToolRequest {
    /// Parse a `tools/call` (name, arguments) pair. Unknown names and
    /// missing required fields are rejected here with a message suitable
    /// for an invalid-params response.
    pub fn parse(name: &str, arguments: &Value) -> Result<Self, String> {
        #[derive(serde::Deserialize)]
        struct TokenArgs {
            request_token: String,
        }
        #[derive(serde::Deserialize)]
        struct MarginsArgs {
            #[serde(default)]
            segment: Option<String>,
        }
        #[derive(serde::Deserialize)]
        struct OrderIdArgs {
            order_id: String,
        }
        #[derive(serde::Deserialize)]
        struct CancelArgs {
            order_id: String,
            #[serde(default)]
            variety: Option<String>,
        }

        match name {
            "get_login_url" => Ok(Self::GetLoginUrl),
            "get_access_token" => {
                let args: TokenArgs = parse_args(name, arguments)?;
                Ok(Self::GetAccessToken {
                    request_token: args.request_token,
                })
            }
            "get_user_profile" => Ok(Self::GetUserProfile),
            "get_margins" => {
                let args: MarginsArgs = parse_args(name, arguments)?;
                Ok(Self::GetMargins {
                    segment: args.segment,
                })
            }
            "get_holdings" => Ok(Self::GetHoldings),
            "get_positions" => Ok(Self::GetPositions),
            "get_orders" => Ok(Self::GetOrders),
            "get_order_history" => {
                let args: OrderIdArgs = parse_args(name, arguments)?;
                Ok(Self::GetOrderHistory {
                    order_id: args.order_id,
                })
            }
            "get_order_trades" => {
                let args: OrderIdArgs = parse_args(name, arguments)?;
                Ok(Self::GetOrderTrades {
                    order_id: args.order_id,
                })
            }
            "place_order" => Ok(Self::PlaceOrder(parse_args(name, arguments)?)),
            "modify_order" => Ok(Self::ModifyOrder(parse_args(name, arguments)?)),
            "cancel_order" => {
                let args: CancelArgs = parse_args(name, arguments)?;
                Ok(Self::CancelOrder {
                    order_id: args.order_id,
                    variety: args.variety,
                })
            }
            other => Err(format!("unknown tool: {other}")),
        }
    }
}

fn parse_args<T: DeserializeOwned>(name: &str, arguments: &Value) -> Result<T, String> {
    // Tools without required fields may be called with no arguments at all
    let value = if arguments.is_null() {
        json!({})
    } else {
        arguments.clone()
    };
    serde_json::from_value(value).map_err(|e| format!("invalid arguments for {name}: {e}"))
}

/// Execute one parsed request against the shared brokerage client.
///
/// `get_access_token` is the only writer: it takes the write half of the
/// lock so the token swap is atomic relative to concurrent reads. All
/// brokerage failures - rejections and transport errors alike - come back
/// as error payloads, never as faults.
pub async fn dispatch(kite: &RwLock<KiteClient>, request: ToolRequest) -> CallToolResult {
    match request {
        ToolRequest::GetLoginUrl => CallToolResult::text(kite.read().await.login_url()),

        ToolRequest::GetAccessToken { request_token } => {
            match kite.write().await.generate_session(&request_token).await {
                Ok(session) => CallToolResult::text(session.access_token),
                Err(e) => fail("Token exchange failed", e),
            }
        }

        ToolRequest::GetUserProfile => passthrough(kite.read().await.profile().await),
        ToolRequest::GetMargins { segment } => {
            passthrough(kite.read().await.margins(segment.as_deref()).await)
        }
        ToolRequest::GetHoldings => passthrough(kite.read().await.holdings().await),
        ToolRequest::GetPositions => passthrough(kite.read().await.positions().await),
        ToolRequest::GetOrders => passthrough(kite.read().await.orders().await),
        ToolRequest::GetOrderHistory { order_id } => {
            passthrough(kite.read().await.order_history(&order_id).await)
        }
        ToolRequest::GetOrderTrades { order_id } => {
            passthrough(kite.read().await.order_trades(&order_id).await)
        }

        ToolRequest::PlaceOrder(params) => {
            match kite.read().await.place_order(&params).await {
                Ok(order_id) => {
                    CallToolResult::text(format!("Order placed successfully. Order ID: {order_id}"))
                }
                Err(e) => fail("Order placement failed", e),
            }
        }

        ToolRequest::ModifyOrder(params) => {
            match kite.read().await.modify_order(&params).await {
                Ok(order_id) => CallToolResult::text(format!(
                    "Order modified successfully. Order ID: {order_id}"
                )),
                Err(e) => fail("Order modification failed", e),
            }
        }

        ToolRequest::CancelOrder { order_id, variety } => {
            let variety = variety.as_deref().unwrap_or("regular");
            match kite.read().await.cancel_order(variety, &order_id).await {
                Ok(order_id) => CallToolResult::text(format!(
                    "Order cancelled successfully. Order ID: {order_id}"
                )),
                Err(e) => fail("Order cancellation failed", e),
            }
        }
    }
}

/// Wrap a read-endpoint payload, unmodified, in a text content block.
fn passthrough(result: Result<Value, KiteError>) -> CallToolResult {
    match result {
        Ok(data) => CallToolResult::text(
            serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string()),
        ),
        Err(e) => fail("Request failed", e),
    }
}

fn fail(context: &str, error: KiteError) -> CallToolResult {
    warn!(%error, "{context}");
    CallToolResult::error(format!("{context}: {error}"))
}

/// The fixed tool catalog. Built once at startup; descriptors are immutable.
pub fn catalog() -> Vec<Tool> {
    fn tool(name: &str, description: &str, schema: Value) -> Tool {
        Tool {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: schema,
        }
    }

    fn no_args() -> Value {
        json!({"type": "object", "properties": {}})
    }

    vec![
        tool(
            "get_login_url",
            "Get the Zerodha login URL. Redirect the user there to obtain the one-time \
             request token needed by get_access_token.",
            no_args(),
        ),
        tool(
            "get_access_token",
            "Exchange a one-time request token for an access token and authenticate this \
             session for all further brokerage calls.",
            json!({
                "type": "object",
                "properties": {
                    "request_token": {
                        "type": "string",
                        "description": "Request token from the post-login redirect"
                    }
                },
                "required": ["request_token"]
            }),
        ),
        tool(
            "get_user_profile",
            "Get the authenticated user's Zerodha profile: user ID, name, email, enabled \
             products and order types, exchange memberships.",
            no_args(),
        ),
        tool(
            "get_margins",
            "Get available margins and fund details: cash balance, used and available \
             margin, collateral, SPAN/exposure breakdown.",
            json!({
                "type": "object",
                "properties": {
                    "segment": {
                        "type": "string",
                        "enum": ["equity", "commodity"],
                        "description": "Trading segment; omit for all segments"
                    }
                }
            }),
        ),
        tool(
            "get_holdings",
            "Get portfolio holdings: symbol, exchange, ISIN, product, average and last \
             price, quantity, P&L.",
            no_args(),
        ),
        tool(
            "get_positions",
            "Get current day and net positions: symbol, exchange, product, quantity, \
             average price, P&L, overnight quantity.",
            no_args(),
        ),
        tool(
            "get_orders",
            "Get all orders placed today with status, prices, filled/pending quantities \
             and timestamps.",
            no_args(),
        ),
        tool(
            "get_order_history",
            "Get the states one order has gone through (OPEN, COMPLETE, REJECTED, \
             CANCELLED, ...) with quantities at each state.",
            json!({
                "type": "object",
                "properties": {
                    "order_id": {"type": "string", "description": "Order to inspect"}
                },
                "required": ["order_id"]
            }),
        ),
        tool(
            "get_order_trades",
            "Get the trades an order was executed in. An order can fill in multiple \
             trades.",
            json!({
                "type": "object",
                "properties": {
                    "order_id": {"type": "string", "description": "Order to inspect"}
                },
                "required": ["order_id"]
            }),
        ),
        tool(
            "place_order",
            "Place a new order on Zerodha. Moves real money once the market accepts it.",
            json!({
                "type": "object",
                "properties": {
                    "exchange": {"type": "string", "description": "NSE, BSE, NFO, ..."},
                    "tradingsymbol": {"type": "string", "description": "RELIANCE, INFY, ..."},
                    "transaction_type": {"type": "string", "enum": ["BUY", "SELL"]},
                    "quantity": {"type": "integer", "minimum": 1},
                    "price": {"type": "number", "description": "Required for LIMIT orders"},
                    "trigger_price": {"type": "number", "description": "For SL and SL-M orders"},
                    "product": {"type": "string", "description": "CNC (delivery, default) or MIS"},
                    "order_type": {"type": "string", "description": "MARKET (default), LIMIT, SL, SL-M"},
                    "validity": {"type": "string", "description": "DAY (default) or IOC"},
                    "variety": {"type": "string", "description": "regular (default), amo, co"}
                },
                "required": ["exchange", "tradingsymbol", "transaction_type", "quantity"]
            }),
        ),
        tool(
            "modify_order",
            "Modify an open order's quantity, price, type, trigger price or validity.",
            json!({
                "type": "object",
                "properties": {
                    "order_id": {"type": "string"},
                    "quantity": {"type": "integer"},
                    "price": {"type": "number"},
                    "order_type": {"type": "string", "description": "LIMIT, SL, SL-M, MARKET"},
                    "trigger_price": {"type": "number"},
                    "validity": {"type": "string"},
                    "variety": {"type": "string", "description": "regular (default)"}
                },
                "required": ["order_id"]
            }),
        ),
        tool(
            "cancel_order",
            "Cancel an open order.",
            json!({
                "type": "object",
                "properties": {
                    "order_id": {"type": "string"},
                    "variety": {"type": "string", "description": "regular (default)"}
                },
                "required": ["order_id"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOOL_NAMES: [&str; 12] = [
        "get_login_url",
        "get_access_token",
        "get_user_profile",
        "get_margins",
        "get_holdings",
        "get_positions",
        "get_orders",
        "get_order_history",
        "get_order_trades",
        "place_order",
        "modify_order",
        "cancel_order",
    ];

    #[test]
    fn catalog_lists_all_twelve_tools() {
        let names: Vec<String> = catalog().into_iter().map(|t| t.name).collect();
        assert_eq!(names, TOOL_NAMES);
    }

    #[test]
    fn every_catalog_entry_parses_with_minimal_arguments() {
        // Minimal well-formed arguments per tool, mirroring the schemas
        let minimal = |name: &str| -> Value {
            match name {
                "get_access_token" => json!({"request_token": "tok"}),
                "get_order_history" | "get_order_trades" | "cancel_order" => {
                    json!({"order_id": "1"})
                }
                "modify_order" => json!({"order_id": "1"}),
                "place_order" => json!({
                    "exchange": "NSE", "tradingsymbol": "INFY",
                    "transaction_type": "BUY", "quantity": 1
                }),
                _ => Value::Null,
            }
        };
        for tool in catalog() {
            ToolRequest::parse(&tool.name, &minimal(&tool.name))
                .unwrap_or_else(|e| panic!("{}: {e}", tool.name));
        }
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let err = ToolRequest::parse("get_quotes", &Value::Null).unwrap_err();
        assert!(err.contains("unknown tool"));
    }

    #[test]
    fn missing_required_field_is_rejected_before_dispatch() {
        let err = ToolRequest::parse("place_order", &json!({"exchange": "NSE"})).unwrap_err();
        assert!(err.contains("place_order"));
    }

    #[test]
    fn margins_segment_is_optional() {
        match ToolRequest::parse("get_margins", &Value::Null).unwrap() {
            ToolRequest::GetMargins { segment } => assert!(segment.is_none()),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_url_tool_needs_no_network() {
        let kite = RwLock::new(KiteClient::new("X", "secret"));
        let result = dispatch(&kite, ToolRequest::GetLoginUrl).await;
        assert!(!result.is_error);
        assert!(result.text_content().contains("api_key=X"));
    }

    async fn kite_with_session(server: &MockServer) -> RwLock<KiteClient> {
        Mock::given(method("POST"))
            .and(path("/session/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"access_token": "tok"}
            })))
            .mount(server)
            .await;
        let kite = RwLock::new(KiteClient::new("key", "secret").with_base_url(server.uri()));
        dispatch(
            &kite,
            ToolRequest::GetAccessToken {
                request_token: "req".to_string(),
            },
        )
        .await;
        kite
    }

    #[tokio::test]
    async fn positions_payload_is_passed_through() {
        let server = MockServer::start().await;
        let kite = kite_with_session(&server).await;
        Mock::given(method("GET"))
            .and(path("/portfolio/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"net": [{"tradingsymbol": "INFY", "pnl": 12.5}], "day": []}
            })))
            .mount(&server)
            .await;

        let result = dispatch(&kite, ToolRequest::GetPositions).await;
        assert!(!result.is_error);
        assert!(result.text_content().contains("INFY"));
    }

    #[tokio::test]
    async fn brokerage_rejection_becomes_error_payload() {
        let server = MockServer::start().await;
        let kite = kite_with_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/orders/regular"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": "error",
                "message": "Insufficient funds",
                "error_type": "InputException"
            })))
            .mount(&server)
            .await;

        let request = ToolRequest::parse(
            "place_order",
            &json!({
                "exchange": "NSE", "tradingsymbol": "INFY",
                "transaction_type": "BUY", "quantity": 100000
            }),
        )
        .unwrap();

        let result = dispatch(&kite, request).await;
        assert!(result.is_error);
        let text = result.text_content();
        assert!(text.contains("Order placement failed"));
        assert!(text.contains("Insufficient funds"));
    }

    #[tokio::test]
    async fn cancel_unknown_order_reports_brokerage_message() {
        let server = MockServer::start().await;
        let kite = kite_with_session(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/orders/regular/999"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": "error",
                "message": "Order cannot be cancelled as it is not open",
                "error_type": "OrderException"
            })))
            .mount(&server)
            .await;

        let result = dispatch(
            &kite,
            ToolRequest::CancelOrder {
                order_id: "999".to_string(),
                variety: None,
            },
        )
        .await;
        assert!(result.is_error);
        assert!(result.text_content().contains("cannot be cancelled"));
    }
}
