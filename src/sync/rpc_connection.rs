//! Request-only facade over [`TransportClient`] (§4.6).
//!
//! No local state and no listener registration — every method is a direct
//! `request`/reply round trip, the wire shape parsed into the typed model.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::error::SdkError;
use crate::models::{AccountInformation, Deal, Order, Position};
use crate::trade::{TradeReply, TradeRequest, TRADE_RETCODE_DONE};
use crate::transport::{packets::request_type, TransportClient};

fn deserialize_field<T: serde::de::DeserializeOwned>(reply: &Value, field: &str) -> Result<T, SdkError> {
    let value = reply.get(field).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|err| SdkError::Internal {
        message: format!("malformed `{field}` in server reply: {err}"),
    })
}

/// A thin request/reply facade over one account's [`TransportClient`] (§4.6).
#[derive(Debug, Clone)]
pub struct RpcConnection {
    transport: Arc<TransportClient>,
    account_id: String,
}

impl RpcConnection {
    /// Build a facade over `transport`, scoped to `account_id`.
    #[must_use]
    pub fn new(transport: Arc<TransportClient>, account_id: impl Into<String>) -> Self {
        Self {
            transport,
            account_id: account_id.into(),
        }
    }

    async fn request(&self, packet_type: &str, payload: Value) -> Result<Value, SdkError> {
        self.transport.request(packet_type, &self.account_id, payload).await
    }

    /// `getAccountInformation`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn get_account_information(&self) -> Result<AccountInformation, SdkError> {
        let reply = self.request(request_type::GET_ACCOUNT_INFORMATION, Value::Null).await?;
        deserialize_field(&reply, "accountInformation")
    }

    /// `getPositions`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn get_positions(&self) -> Result<Vec<Position>, SdkError> {
        let reply = self.request(request_type::GET_POSITIONS, Value::Null).await?;
        deserialize_field(&reply, "positions")
    }

    /// `getPosition`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn get_position(&self, position_id: &str) -> Result<Position, SdkError> {
        let reply = self
            .request(request_type::GET_POSITION, json!({ "positionId": position_id }))
            .await?;
        deserialize_field(&reply, "position")
    }

    /// `getOrders`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn get_orders(&self) -> Result<Vec<Order>, SdkError> {
        let reply = self.request(request_type::GET_ORDERS, Value::Null).await?;
        deserialize_field(&reply, "orders")
    }

    /// `getOrder`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn get_order(&self, order_id: &str) -> Result<Order, SdkError> {
        let reply = self
            .request(request_type::GET_ORDER, json!({ "orderId": order_id }))
            .await?;
        deserialize_field(&reply, "order")
    }

    /// `getHistoryOrdersByTicket`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn get_history_orders_by_ticket(&self, ticket: &str) -> Result<Vec<Order>, SdkError> {
        let reply = self
            .request(
                request_type::GET_HISTORY_ORDERS_BY_TICKET,
                json!({ "ticket": ticket }),
            )
            .await?;
        deserialize_field(&reply, "historyOrders")
    }

    /// `getHistoryOrdersByPosition`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn get_history_orders_by_position(&self, position_id: &str) -> Result<Vec<Order>, SdkError> {
        let reply = self
            .request(
                request_type::GET_HISTORY_ORDERS_BY_POSITION,
                json!({ "positionId": position_id }),
            )
            .await?;
        deserialize_field(&reply, "historyOrders")
    }

    /// `getHistoryOrdersByTimeRange`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn get_history_orders_by_time_range(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Order>, SdkError> {
        let reply = self
            .request(
                request_type::GET_HISTORY_ORDERS_BY_TIME_RANGE,
                json!({ "startTime": start_time, "endTime": end_time }),
            )
            .await?;
        deserialize_field(&reply, "historyOrders")
    }

    /// `getDealsByTicket`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn get_deals_by_ticket(&self, ticket: &str) -> Result<Vec<Deal>, SdkError> {
        let reply = self
            .request(request_type::GET_DEALS_BY_TICKET, json!({ "ticket": ticket }))
            .await?;
        deserialize_field(&reply, "deals")
    }

    /// `getDealsByPosition`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn get_deals_by_position(&self, position_id: &str) -> Result<Vec<Deal>, SdkError> {
        let reply = self
            .request(
                request_type::GET_DEALS_BY_POSITION,
                json!({ "positionId": position_id }),
            )
            .await?;
        deserialize_field(&reply, "deals")
    }

    /// `getDealsByTimeRange`.
    ///
    /// # Errors
    ///
    /// See [`TransportClient::request`].
    pub async fn get_deals_by_time_range(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Deal>, SdkError> {
        let reply = self
            .request(
                request_type::GET_DEALS_BY_TIME_RANGE,
                json!({ "startTime": start_time, "endTime": end_time }),
            )
            .await?;
        deserialize_field(&reply, "deals")
    }

    /// `trade` (§6). A reply whose `numericCode` is not
    /// [`TRADE_RETCODE_DONE`] is surfaced as [`SdkError::Trade`] rather than
    /// returned as `Ok`, even though the transport itself saw a `response`
    /// packet, not a `processingError` one.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Validation`] if `request` fails its own
    /// client-side checks (§6 comment/clientId length), or [`SdkError::Trade`]
    /// if the server rejects the command.
    pub async fn trade(&self, request: &TradeRequest) -> Result<TradeReply, SdkError> {
        request.validate()?;
        let payload = serde_json::to_value(request).map_err(|err| SdkError::Validation {
            message: format!("failed to serialize trade request: {err}"),
            details: None,
        })?;
        let reply = self.request(request_type::TRADE, payload).await?;
        let trade_reply: TradeReply = serde_json::from_value(reply).map_err(|err| SdkError::Internal {
            message: format!("malformed trade reply: {err}"),
        })?;

        if trade_reply.numeric_code == TRADE_RETCODE_DONE {
            Ok(trade_reply)
        } else {
            Err(SdkError::Trade {
                code: trade_reply.numeric_code,
                string_code: trade_reply.string_code,
                message: trade_reply.message.unwrap_or_default(),
            })
        }
    }
}
