//! Deterministic content hashes used to resume synchronization without
//! re-sending unchanged data (§4.4 `getHashes`, §8 properties 4/5, scenario
//! S3).

use serde_json::Value;

use crate::models::{Order, Position, SymbolSpecification};
use crate::transport::codec::g1_stringify;

/// Which server account-type content-hash dialect to use (§4.4 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountType {
    /// Legacy stringified-number dialect.
    CloudG1,
    /// Natural JSON dialect.
    CloudG2,
}

/// The three content hashes `StreamingConnection::synchronize` sends to the
/// server so it can skip re-sending data the mirror already has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hashes {
    /// Hash of the symbol specification set, or `None` if empty.
    pub specifications_md5: Option<String>,
    /// Hash of the position set, or `None` before positions have
    /// synchronized once.
    pub positions_md5: Option<String>,
    /// Hash of the pending order set, or `None` before orders have
    /// synchronized once.
    pub orders_md5: Option<String>,
}

const POSITION_VOLATILE_FIELDS: &[&str] = &[
    "profit",
    "unrealizedProfit",
    "realizedProfit",
    "currentPrice",
    "currentTickValue",
    "updateSequenceNumber",
    "accountCurrencyExchangeRate",
    "comment",
    "brokerComment",
    "clientId",
];

const ORDER_VOLATILE_FIELDS: &[&str] = &[
    "currentPrice",
    "updateSequenceNumber",
    "accountCurrencyExchangeRate",
    "comment",
    "brokerComment",
    "clientId",
];

fn strip_fields(value: &mut Value, fields: &[&str]) {
    if let Value::Object(map) = value {
        for field in fields {
            map.remove(*field);
        }
    }
}

fn canonicalize(value: &Value, account_type: AccountType) -> String {
    match account_type {
        AccountType::CloudG1 => g1_stringify(value),
        AccountType::CloudG2 => value.to_string(),
    }
}

fn digest_hex(serialized: &str) -> String {
    format!("{:x}", md5::compute(serialized.as_bytes()))
}

/// Content hash of the specification set. `None` when there are no
/// specifications to hash yet.
#[must_use]
pub fn specifications_md5(
    specifications: &[SymbolSpecification],
    account_type: AccountType,
) -> Option<String> {
    if specifications.is_empty() {
        return None;
    }

    let mut sorted: Vec<&SymbolSpecification> = specifications.iter().collect();
    sorted.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let values: Vec<Value> = sorted
        .into_iter()
        .map(|spec| {
            let mut value = serde_json::to_value(spec).unwrap_or(Value::Null);
            if account_type == AccountType::CloudG1 {
                strip_fields(&mut value, &["description"]);
            }
            value
        })
        .collect();

    Some(digest_hex(&canonicalize(&Value::Array(values), account_type)))
}

/// Content hash of the position set. `None` before `positionsInitialized`.
#[must_use]
pub fn positions_md5(
    positions: &[Position],
    positions_initialized: bool,
    account_type: AccountType,
) -> Option<String> {
    if !positions_initialized {
        return None;
    }

    let mut sorted: Vec<&Position> = positions.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let values: Vec<Value> = sorted
        .into_iter()
        .map(|position| {
            let mut value = serde_json::to_value(position).unwrap_or(Value::Null);
            strip_fields(&mut value, POSITION_VOLATILE_FIELDS);
            if account_type == AccountType::CloudG1 {
                strip_fields(&mut value, &["time", "updateTime"]);
            }
            value
        })
        .collect();

    Some(digest_hex(&canonicalize(&Value::Array(values), account_type)))
}

/// Content hash of the pending order set. `None` before `ordersInitialized`.
#[must_use]
pub fn orders_md5(orders: &[Order], orders_initialized: bool, account_type: AccountType) -> Option<String> {
    if !orders_initialized {
        return None;
    }

    let mut sorted: Vec<&Order> = orders.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let values: Vec<Value> = sorted
        .into_iter()
        .map(|order| {
            let mut value = serde_json::to_value(order).unwrap_or(Value::Null);
            strip_fields(&mut value, ORDER_VOLATILE_FIELDS);
            if account_type == AccountType::CloudG1 {
                strip_fields(&mut value, &["time"]);
            }
            value
        })
        .collect();

    Some(digest_hex(&canonicalize(&Value::Array(values), account_type)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Platform, PositionType};
    use chrono::Utc;
    use proptest::prelude::*;

    fn position(id: &str) -> Position {
        Position {
            id: id.to_string(),
            position_type: PositionType::Buy,
            symbol: "EURUSD".to_string(),
            volume: 1.0,
            open_price: 1.1,
            current_price: 1.12,
            current_tick_value: 1.0,
            stop_loss: None,
            take_profit: None,
            swap: 0.0,
            commission: 0.0,
            profit: 20.0,
            unrealized_profit: 20.0,
            realized_profit: 0.0,
            magic: 0,
            time: Utc::now(),
            update_time: Utc::now(),
            comment: None,
            client_id: None,
        }
    }

    #[test]
    fn null_hashes_when_uninitialized() {
        assert_eq!(specifications_md5(&[], AccountType::CloudG2), None);
        assert_eq!(positions_md5(&[position("1")], false, AccountType::CloudG2), None);
        assert_eq!(orders_md5(&[], false, AccountType::CloudG2), None);
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let positions = vec![position("2"), position("1")];
        let first = positions_md5(&positions, true, AccountType::CloudG2);
        let second = positions_md5(&positions, true, AccountType::CloudG2);
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn invariant_under_input_order_permutation() {
        let forward = vec![position("1"), position("2"), position("3")];
        let shuffled = vec![position("3"), position("1"), position("2")];
        assert_eq!(
            positions_md5(&forward, true, AccountType::CloudG2),
            positions_md5(&shuffled, true, AccountType::CloudG2)
        );
    }

    #[test]
    fn volatile_fields_do_not_affect_the_hash() {
        let mut a = position("1");
        let mut b = position("1");
        a.profit = 999.0;
        a.unrealized_profit = 999.0;
        a.current_price = 5.0;
        b.profit = -1.0;
        b.unrealized_profit = -1.0;
        b.current_price = 0.1;
        assert_eq!(
            positions_md5(&[a], true, AccountType::CloudG2),
            positions_md5(&[b], true, AccountType::CloudG2)
        );
    }

    #[test]
    fn g1_stringifies_digits_as_bare_integer_and_strips_description() {
        let spec = SymbolSpecification {
            symbol: "EURUSD".to_string(),
            digits: 5,
            tick_size: 0.00001,
            execution_mode: None,
            filling_modes: Vec::new(),
            description: Some("Euro vs US Dollar".to_string()),
        };
        let g1 = specifications_md5(std::slice::from_ref(&spec), AccountType::CloudG1);
        let g2 = specifications_md5(std::slice::from_ref(&spec), AccountType::CloudG2);
        assert!(g1.is_some());
        assert!(g2.is_some());
        assert_ne!(g1, g2);
    }

    proptest! {
        // §8 invariant 5: getHashes is invariant under input-order permutation,
        // for arbitrary id sets and arbitrary volatile field values.
        #[test]
        fn positions_md5_ignores_order_and_volatile_fields(
            ids in prop::collection::vec(1u32..500, 1..8),
            profit_seed in -1000.0f64..1000.0,
            price_seed in 0.1f64..5.0,
        ) {
            let mut seen = std::collections::HashSet::new();
            let ids: Vec<u32> = ids.into_iter().filter(|id| seen.insert(*id)).collect();

            let mut forward: Vec<Position> = ids.iter().map(|id| position(&id.to_string())).collect();
            for (i, p) in forward.iter_mut().enumerate() {
                // these fields are in POSITION_VOLATILE_FIELDS and must not
                // affect the hash at all, let alone its order-invariance.
                p.profit = profit_seed + i as f64;
                p.unrealized_profit = profit_seed - i as f64;
                p.current_price = price_seed + i as f64 * 0.01;
            }
            let mut reversed = forward.clone();
            reversed.reverse();

            let forward_hash = positions_md5(&forward, true, AccountType::CloudG2);
            let reversed_hash = positions_md5(&reversed, true, AccountType::CloudG2);
            prop_assert_eq!(forward_hash.clone(), reversed_hash);

            // §8 invariant 4: repeated calls over the same input are deterministic.
            let again = positions_md5(&forward, true, AccountType::CloudG2);
            prop_assert_eq!(forward_hash, again);
        }
    }
}
