//! The `trade` request payload and reply shape (§6 "Trade payload").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// `actionType` (§6): the operation a `trade` command performs. Covers both
/// order placement (the eight `ORDER_TYPE_*` variants, mirroring
/// [`crate::models::OrderType`]) and position/order management commands that
/// have no open-position analogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeActionType {
    /// Market buy.
    #[serde(rename = "ORDER_TYPE_BUY")]
    OrderTypeBuy,
    /// Market sell.
    #[serde(rename = "ORDER_TYPE_SELL")]
    OrderTypeSell,
    /// Place a buy-limit pending order.
    #[serde(rename = "ORDER_TYPE_BUY_LIMIT")]
    OrderTypeBuyLimit,
    /// Place a sell-limit pending order.
    #[serde(rename = "ORDER_TYPE_SELL_LIMIT")]
    OrderTypeSellLimit,
    /// Place a buy-stop pending order.
    #[serde(rename = "ORDER_TYPE_BUY_STOP")]
    OrderTypeBuyStop,
    /// Place a sell-stop pending order.
    #[serde(rename = "ORDER_TYPE_SELL_STOP")]
    OrderTypeSellStop,
    /// Place a buy-stop-limit pending order.
    #[serde(rename = "ORDER_TYPE_BUY_STOP_LIMIT")]
    OrderTypeBuyStopLimit,
    /// Place a sell-stop-limit pending order.
    #[serde(rename = "ORDER_TYPE_SELL_STOP_LIMIT")]
    OrderTypeSellStopLimit,
    /// Modify an open position's stop-loss/take-profit.
    #[serde(rename = "POSITION_MODIFY")]
    PositionModify,
    /// Close part of an open position's volume.
    #[serde(rename = "POSITION_PARTIAL")]
    PositionPartial,
    /// Close a single position by id.
    #[serde(rename = "POSITION_CLOSE_ID")]
    PositionCloseId,
    /// Close one position against another (hedged accounts).
    #[serde(rename = "POSITION_CLOSE_BY")]
    PositionCloseBy,
    /// Close every open position on a symbol.
    #[serde(rename = "POSITIONS_CLOSE_SYMBOL")]
    PositionsCloseSymbol,
    /// Modify a pending order's price/stop-loss/take-profit.
    #[serde(rename = "ORDER_MODIFY")]
    OrderModify,
    /// Cancel a pending order.
    #[serde(rename = "ORDER_CANCEL")]
    OrderCancel,
}

/// How `stopLoss` is expressed (§6 `stopLossUnits`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopLossUnits {
    /// An absolute price level.
    #[serde(rename = "ABSOLUTE_PRICE")]
    AbsolutePrice,
    /// A price offset from the open price.
    #[serde(rename = "RELATIVE_PRICE")]
    RelativePrice,
    /// An offset expressed in points.
    #[serde(rename = "RELATIVE_POINTS")]
    RelativePoints,
    /// An offset expressed in account currency.
    #[serde(rename = "RELATIVE_CURRENCY")]
    RelativeCurrency,
    /// An offset expressed as a percentage of account balance.
    #[serde(rename = "RELATIVE_BALANCE_PERCENTAGE")]
    RelativeBalancePercentage,
}

/// How `takeProfit` is expressed. Same vocabulary as [`StopLossUnits`], kept
/// as a distinct type since the two fields are independently optional and a
/// caller should not be able to pass one's unit to the other's field.
pub type TakeProfitUnits = StopLossUnits;

/// `expiration` (§6): when a pending order lapses. `expiration_type` is kept
/// as an opaque string — like [`crate::models::SymbolSpecification::execution_mode`],
/// the broker-reported vocabulary (`ORDER_TIME_GTC`, `ORDER_TIME_DAY`, …) is
/// open-ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expiration {
    /// Expiration mode.
    #[serde(rename = "type")]
    pub expiration_type: String,
    /// Expiration instant, required when `expiration_type` demands one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

/// The maximum combined length of `comment` and `client_id` the server
/// accepts on a trade command (§6).
pub const MAX_COMMENT_AND_CLIENT_ID_LEN: usize = 26;

/// A `trade` command (§6). Every field beyond `action_type` is optional;
/// which ones the server requires depends on `action_type` and is not
/// validated client-side beyond the combined comment/client-id length limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    /// The operation to perform.
    pub action_type: TradeActionType,
    /// Traded symbol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Order/position volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Requested open price (pending orders).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_price: Option<f64>,
    /// Stop-limit trigger price (stop-limit orders).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_limit_price: Option<f64>,
    /// Stop-loss value, interpreted per `stop_loss_units`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    /// Unit `stop_loss` is expressed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss_units: Option<StopLossUnits>,
    /// Take-profit value, interpreted per `take_profit_units`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    /// Unit `take_profit` is expressed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit_units: Option<TakeProfitUnits>,
    /// Free-text comment. Combined with `client_id` must not exceed
    /// [`MAX_COMMENT_AND_CLIENT_ID_LEN`] characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Client-supplied correlation id. See `comment`'s length constraint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Expert-advisor magic number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magic: Option<i64>,
    /// Maximum acceptable slippage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slippage: Option<f64>,
    /// Acceptable order-filling modes, in preference order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filling_modes: Option<Vec<String>>,
    /// Pending-order expiration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Expiration>,
    /// Position id, for position-targeted commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    /// The other position's id, for `POSITION_CLOSE_BY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_by_position_id: Option<String>,
    /// Order id, for order-targeted commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

impl TradeRequest {
    /// A bare trade command with every optional field unset.
    #[must_use]
    pub const fn new(action_type: TradeActionType) -> Self {
        Self {
            action_type,
            symbol: None,
            volume: None,
            open_price: None,
            stop_limit_price: None,
            stop_loss: None,
            stop_loss_units: None,
            take_profit: None,
            take_profit_units: None,
            comment: None,
            client_id: None,
            magic: None,
            slippage: None,
            filling_modes: None,
            expiration: None,
            position_id: None,
            close_by_position_id: None,
            order_id: None,
        }
    }

    /// The server-side length limit on `comment`+`client_id` (§6), checked
    /// before the command is sent.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Validation`] if the combined length exceeds
    /// [`MAX_COMMENT_AND_CLIENT_ID_LEN`].
    pub fn validate(&self) -> Result<(), SdkError> {
        let comment_len = self.comment.as_deref().map_or(0, str::len);
        let client_id_len = self.client_id.as_deref().map_or(0, str::len);
        if comment_len + client_id_len > MAX_COMMENT_AND_CLIENT_ID_LEN {
            return Err(SdkError::Validation {
                message: format!(
                    "comment + clientId must not exceed {MAX_COMMENT_AND_CLIENT_ID_LEN} characters, got {}",
                    comment_len + client_id_len
                ),
                details: None,
            });
        }
        Ok(())
    }
}

/// The trading server result code that indicates success — `"TRADE_RETCODE_DONE"`'s
/// numeric counterpart. Any other `numeric_code` on a `trade` reply is
/// surfaced as [`SdkError::Trade`] rather than returned as `Ok`.
pub const TRADE_RETCODE_DONE: i32 = 0;

/// The server's reply to a `trade` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeReply {
    /// Numeric result code; [`TRADE_RETCODE_DONE`] on success.
    pub numeric_code: i32,
    /// String result code, echoed verbatim from the server.
    pub string_code: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Id of the order the command produced or targeted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Id of the position the command produced or targeted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
}
