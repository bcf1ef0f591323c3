//! Wire-shaped data model (§3): account information, positions, orders,
//! symbol specifications and prices.
//!
//! Every monetary/price/volume field is `f64`, matching the remote
//! terminal's wire format where all numbers arrive as JSON numbers (see
//! SPEC_FULL.md §3, "Numeric representation"). Timestamps are
//! `DateTime<Utc>`, rehydrated from ISO-8601 strings by
//! [`crate::transport::codec`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trading platform a terminal instance connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// MetaTrader 4.
    Mt4,
    /// MetaTrader 5.
    Mt5,
}

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionType {
    /// Long position.
    #[serde(rename = "BUY")]
    Buy,
    /// Short position.
    #[serde(rename = "SELL")]
    Sell,
}

impl PositionType {
    /// `true` for [`PositionType::Buy`].
    #[must_use]
    pub const fn is_buy(self) -> bool {
        matches!(self, Self::Buy)
    }
}

/// Pending order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Immediate buy.
    #[serde(rename = "BUY")]
    Buy,
    /// Immediate sell.
    #[serde(rename = "SELL")]
    Sell,
    /// Pending buy limit.
    #[serde(rename = "BUY_LIMIT")]
    BuyLimit,
    /// Pending sell limit.
    #[serde(rename = "SELL_LIMIT")]
    SellLimit,
    /// Pending buy stop.
    #[serde(rename = "BUY_STOP")]
    BuyStop,
    /// Pending sell stop.
    #[serde(rename = "SELL_STOP")]
    SellStop,
    /// Pending buy stop-limit.
    #[serde(rename = "BUY_STOP_LIMIT")]
    BuyStopLimit,
    /// Pending sell stop-limit.
    #[serde(rename = "SELL_STOP_LIMIT")]
    SellStopLimit,
}

impl OrderType {
    /// `true` for any buy-side variant (used to pick bid/ask for
    /// `currentPrice`, §4.4 step 3).
    #[must_use]
    pub const fn is_buy_variant(self) -> bool {
        matches!(
            self,
            Self::Buy | Self::BuyLimit | Self::BuyStop | Self::BuyStopLimit
        )
    }
}

/// `AccountInformation` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInformation {
    /// Trading platform.
    pub platform: Platform,
    /// Broker name.
    pub broker: String,
    /// ISO-3 currency code.
    pub currency: String,
    /// Broker server name.
    pub server: String,
    /// Account balance.
    pub balance: f64,
    /// Account equity (recomputed on price ticks, §4.4 step 5).
    pub equity: f64,
    /// Margin in use.
    pub margin: f64,
    /// Free margin.
    pub free_margin: f64,
    /// Account leverage.
    pub leverage: f64,
    /// Margin level percentage.
    pub margin_level: f64,
}

/// An open `Position` (§3), keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Unique position id.
    pub id: String,
    /// Long or short.
    #[serde(rename = "type")]
    pub position_type: PositionType,
    /// Traded symbol.
    pub symbol: String,
    /// Position volume (lots).
    pub volume: f64,
    /// Price at which the position was opened.
    pub open_price: f64,
    /// Latest known price.
    pub current_price: f64,
    /// Latest known tick value for this position's symbol.
    pub current_tick_value: f64,
    /// Stop-loss price, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    /// Take-profit price, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    /// Accrued swap.
    pub swap: f64,
    /// Accrued commission.
    pub commission: f64,
    /// Total profit (`unrealized_profit + realized_profit`).
    pub profit: f64,
    /// Unrealized profit, recomputed on price ticks (§4.4 step 2).
    pub unrealized_profit: f64,
    /// Realized profit (partial closes).
    pub realized_profit: f64,
    /// Expert-advisor magic number.
    pub magic: i64,
    /// Time the position was opened.
    pub time: DateTime<Utc>,
    /// Time the position was last updated.
    pub update_time: DateTime<Utc>,
    /// Free-text comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Client-supplied correlation id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// A pending `Order` (§3), keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Unique order id.
    pub id: String,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Server-reported order state (kept as an opaque string — the set of
    /// values is broker-specific and not closed).
    pub state: String,
    /// Traded symbol.
    pub symbol: String,
    /// Requested open price.
    pub open_price: f64,
    /// Latest known price.
    pub current_price: f64,
    /// Requested volume.
    pub volume: f64,
    /// Remaining (unfilled) volume.
    pub current_volume: f64,
    /// Id of the position this order resulted in, once filled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    /// Time the order reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_time: Option<DateTime<Utc>>,
    /// Platform the order originated on.
    pub platform: Platform,
}

/// `SymbolSpecification` (§3), keyed by `symbol`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolSpecification {
    /// Instrument symbol.
    pub symbol: String,
    /// Number of decimal digits in quoted prices.
    pub digits: u32,
    /// Minimal price increment.
    pub tick_size: f64,
    /// Execution mode (broker-specific, kept opaque).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<String>,
    /// Supported order-filling modes (broker-specific, kept opaque).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filling_modes: Vec<String>,
    /// Human-readable description (stripped from `cloud-g1` content hashes,
    /// §4.4 step 3).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Direction/kind of a completed `Deal` (§4.6/§4.8). Kept broader than
/// [`PositionType`]: a deal can also be a balance operation, not just a
/// side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealType {
    /// Deal that opened or added to a long position.
    #[serde(rename = "DEAL_TYPE_BUY")]
    Buy,
    /// Deal that opened or added to a short position.
    #[serde(rename = "DEAL_TYPE_SELL")]
    Sell,
    /// Balance adjustment (deposit/withdrawal), not tied to a symbol.
    #[serde(rename = "DEAL_TYPE_BALANCE")]
    Balance,
    /// Any other broker-reported deal kind (credit, correction, ...),
    /// kept opaque since the set is broker-specific.
    #[serde(other)]
    Other,
}

/// A completed `Deal` (§4.6 `getDealsByTicket/Position/TimeRange`, §4.8
/// `HistoryStorage::on_deals_synchronized`), keyed by `id`.
///
/// Represents one execution against a position or order: an open, a
/// close, a partial fill, or a standalone balance operation. Unlike
/// [`Position`]/[`Order`] a deal never updates in place once it has
/// arrived; history storage only ever appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    /// Unique deal id.
    pub id: String,
    /// Deal kind.
    #[serde(rename = "type")]
    pub deal_type: DealType,
    /// Time the deal was executed.
    pub time: DateTime<Utc>,
    /// Traded symbol, absent for balance operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Id of the order that generated this deal, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Id of the position this deal belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    /// Volume filled by this deal.
    #[serde(default)]
    pub volume: f64,
    /// Execution price.
    #[serde(default)]
    pub price: f64,
    /// Commission charged for this deal.
    #[serde(default)]
    pub commission: f64,
    /// Swap charged for this deal.
    #[serde(default)]
    pub swap: f64,
    /// Profit realized by this deal.
    #[serde(default)]
    pub profit: f64,
    /// Expert-advisor magic number.
    #[serde(default)]
    pub magic: i64,
    /// Platform the deal originated on.
    pub platform: Platform,
    /// Free-text comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Client-supplied correlation id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// `SymbolPrice` (§3), keyed by `symbol`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolPrice {
    /// Instrument symbol.
    pub symbol: String,
    /// Best bid.
    pub bid: f64,
    /// Best ask.
    pub ask: f64,
    /// Tick value applied when a price move favors the position.
    pub profit_tick_value: f64,
    /// Tick value applied when a price move is against the position.
    pub loss_tick_value: f64,
    /// Quote timestamp.
    pub time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_type_buy_variant_classification() {
        assert!(OrderType::Buy.is_buy_variant());
        assert!(OrderType::BuyLimit.is_buy_variant());
        assert!(OrderType::BuyStop.is_buy_variant());
        assert!(OrderType::BuyStopLimit.is_buy_variant());
        assert!(!OrderType::Sell.is_buy_variant());
        assert!(!OrderType::SellLimit.is_buy_variant());
        assert!(!OrderType::SellStop.is_buy_variant());
        assert!(!OrderType::SellStopLimit.is_buy_variant());
    }

    #[test]
    fn position_type_is_buy() {
        assert!(PositionType::Buy.is_buy());
        assert!(!PositionType::Sell.is_buy());
    }

    #[test]
    fn deal_balance_operation_has_no_symbol_or_position() {
        let deal = Deal {
            id: "1".to_string(),
            deal_type: DealType::Balance,
            time: Utc::now(),
            symbol: None,
            order_id: None,
            position_id: None,
            volume: 0.0,
            price: 0.0,
            commission: 0.0,
            swap: 0.0,
            profit: 500.0,
            magic: 0,
            platform: Platform::Mt5,
            comment: Some("deposit".to_string()),
            client_id: None,
        };
        let json = serde_json::to_value(&deal).unwrap();
        assert_eq!(json["type"], "DEAL_TYPE_BALANCE");
        assert!(json.get("symbol").is_none());
        let parsed: Deal = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.profit, 500.0);
    }

    #[test]
    fn deal_type_accepts_unknown_broker_specific_kinds() {
        let parsed: DealType = serde_json::from_value(serde_json::json!("DEAL_TYPE_CREDIT")).unwrap();
        assert_eq!(parsed, DealType::Other);
    }

    #[test]
    fn position_round_trips_through_json() {
        let position = Position {
            id: "42".to_string(),
            position_type: PositionType::Buy,
            symbol: "EURUSD".to_string(),
            volume: 1.0,
            open_price: 1.1,
            current_price: 1.1,
            current_tick_value: 1.0,
            stop_loss: None,
            take_profit: None,
            swap: 0.0,
            commission: 0.0,
            profit: 0.0,
            unrealized_profit: 0.0,
            realized_profit: 0.0,
            magic: 0,
            time: Utc::now(),
            update_time: Utc::now(),
            comment: None,
            client_id: None,
        };
        let json = serde_json::to_value(&position).unwrap();
        assert_eq!(json["type"], "BUY");
        let parsed: Position = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.id, position.id);
    }
}
