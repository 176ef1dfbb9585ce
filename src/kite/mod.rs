//! Zerodha Kite API Integration
//!
//! This module provides the HTTP client for the Kite Connect REST API
//! used by the MCP tool layer and the login utility.
//!
//! # Components
//!
//! - [`client`] - HTTP client with token-based authentication
//! - [`models`] - Request/response data types
//!
//! # API Endpoints Used
//!
//! - `POST /session/token` - Request-token to access-token exchange
//! - `GET /user/profile` - Account profile
//! - `GET /user/margins[/{segment}]` - Funds and margins
//! - `GET /portfolio/holdings` - Portfolio holdings
//! - `GET /portfolio/positions` - Open positions
//! - `GET /orders` - Orders for the day
//! - `GET /orders/{order_id}` - Order history
//! - `GET /orders/{order_id}/trades` - Trades for an order
//! - `POST /orders/{variety}` - Place orders
//! - `PUT /orders/{variety}/{order_id}` - Modify orders
//! - `DELETE /orders/{variety}/{order_id}` - Cancel orders

pub mod client;
pub mod models;

// Re-export commonly used types
pub use client::{KiteClient, DEFAULT_BASE_URL, LOGIN_URL};
pub use models::{ModifyOrderParams, PlaceOrderParams, SessionData};
