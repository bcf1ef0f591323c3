//! Packet envelope shapes and the event/request type vocabulary (§6).

use serde_json::Value;

/// Server→client event types that carry no reply.
pub mod event_type {
    /// Handshake completed.
    pub const AUTHENTICATED: &str = "authenticated";
    /// A synchronization round has begun.
    pub const SYNCHRONIZATION_STARTED: &str = "synchronizationStarted";
    /// Full account information snapshot.
    pub const ACCOUNT_INFORMATION: &str = "accountInformation";
    /// Full positions snapshot.
    pub const POSITIONS: &str = "positions";
    /// Full orders snapshot.
    pub const ORDERS: &str = "orders";
    /// Full symbol specifications snapshot.
    pub const SPECIFICATIONS: &str = "specifications";
    /// Incremental position/order/symbol-spec change.
    pub const UPDATE: &str = "update";
    /// Symbol price ticks.
    pub const PRICES: &str = "prices";
    /// Deal history synchronization finished.
    pub const DEAL_SYNCHRONIZATION_FINISHED: &str = "dealSynchronizationFinished";
    /// Order history synchronization finished.
    pub const ORDER_SYNCHRONIZATION_FINISHED: &str = "orderSynchronizationFinished";
    /// Transport/broker health status report.
    pub const HEALTH_STATUS: &str = "healthStatus";
    /// A subscription was downgraded by the server.
    pub const DOWNGRADE_SUBSCRIPTION: &str = "downgradeSubscription";
    /// The server closed the session.
    pub const DISCONNECTED: &str = "disconnected";
    /// A request failed; carries `requestId` and `error`.
    pub const PROCESSING_ERROR: &str = "processingError";
    /// A request succeeded; carries `requestId` and the reply payload.
    pub const RESPONSE: &str = "response";
}

/// Client→server request types.
pub mod request_type {
    /// Fetch account information.
    pub const GET_ACCOUNT_INFORMATION: &str = "getAccountInformation";
    /// Fetch all open positions.
    pub const GET_POSITIONS: &str = "getPositions";
    /// Fetch a single position.
    pub const GET_POSITION: &str = "getPosition";
    /// Fetch all pending orders.
    pub const GET_ORDERS: &str = "getOrders";
    /// Fetch a single pending order.
    pub const GET_ORDER: &str = "getOrder";
    /// Fetch history orders by ticket.
    pub const GET_HISTORY_ORDERS_BY_TICKET: &str = "getHistoryOrdersByTicket";
    /// Fetch history orders by position.
    pub const GET_HISTORY_ORDERS_BY_POSITION: &str = "getHistoryOrdersByPosition";
    /// Fetch history orders by time range.
    pub const GET_HISTORY_ORDERS_BY_TIME_RANGE: &str = "getHistoryOrdersByTimeRange";
    /// Fetch deals by ticket.
    pub const GET_DEALS_BY_TICKET: &str = "getDealsByTicket";
    /// Fetch deals by position.
    pub const GET_DEALS_BY_POSITION: &str = "getDealsByPosition";
    /// Fetch deals by time range.
    pub const GET_DEALS_BY_TIME_RANGE: &str = "getDealsByTimeRange";
    /// Remove locally cached history.
    pub const REMOVE_HISTORY: &str = "removeHistory";
    /// Remove the application's subscription.
    pub const REMOVE_APPLICATION: &str = "removeApplication";
    /// Subscribe this client to an account's replica set.
    pub const SUBSCRIBE: &str = "subscribe";
    /// Request synchronization, carrying the three content hashes.
    pub const SYNCHRONIZE: &str = "synchronize";
    /// Subscribe to market data for a symbol.
    pub const SUBSCRIBE_TO_MARKET_DATA: &str = "subscribeToMarketData";
    /// Unsubscribe from market data for a symbol.
    pub const UNSUBSCRIBE_FROM_MARKET_DATA: &str = "unsubscribeFromMarketData";
    /// Submit a trade command.
    pub const TRADE: &str = "trade";
    /// Ask the server to force a reconnect.
    pub const RECONNECT: &str = "reconnect";
    /// Report client-observed uptime.
    pub const SAVE_UPTIME: &str = "saveUptime";
}

/// Build the outbound JSON payload for a request: the caller's payload
/// object with `type`, `requestId` and `accountId` merged in (§4.1).
///
/// The caller's payload is expected to be a JSON object (or null, in which
/// case an empty object is created); any other shape is returned unchanged
/// with the identifying fields omitted, since there is no object to attach
/// them to.
#[must_use]
pub fn build_request_payload(
    packet_type: &str,
    request_id: &str,
    account_id: &str,
    payload: Value,
) -> Value {
    let mut payload = match payload {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    if let Value::Object(map) = &mut payload {
        map.insert("type".to_string(), Value::String(packet_type.to_string()));
        map.insert(
            "requestId".to_string(),
            Value::String(request_id.to_string()),
        );
        map.insert(
            "accountId".to_string(),
            Value::String(account_id.to_string()),
        );
    }
    payload
}

/// Read the `type` field off a decoded packet, if present.
#[must_use]
pub fn packet_type(packet: &Value) -> Option<&str> {
    packet.get("type").and_then(Value::as_str)
}

/// Read the `requestId` field off a decoded packet, if present.
#[must_use]
pub fn packet_request_id(packet: &Value) -> Option<&str> {
    packet.get("requestId").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_request_payload_merges_identifying_fields() {
        let payload = json!({"symbol": "EURUSD"});
        let built = build_request_payload(
            request_type::GET_POSITION,
            "req123",
            "acct1",
            payload,
        );
        assert_eq!(built["type"], "getPosition");
        assert_eq!(built["requestId"], "req123");
        assert_eq!(built["accountId"], "acct1");
        assert_eq!(built["symbol"], "EURUSD");
    }

    #[test]
    fn build_request_payload_handles_null() {
        let built = build_request_payload(request_type::GET_POSITIONS, "r1", "a1", Value::Null);
        assert_eq!(built["type"], "getPositions");
        assert_eq!(built["requestId"], "r1");
    }

    #[test]
    fn packet_type_and_request_id_readers() {
        let packet = json!({"type": "response", "requestId": "abc"});
        assert_eq!(packet_type(&packet), Some("response"));
        assert_eq!(packet_request_id(&packet), Some("abc"));
        assert_eq!(packet_type(&json!({})), None);
    }
}
