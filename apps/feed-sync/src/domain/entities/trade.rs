//! Trades (executions against orders).

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::OrderSide;
use crate::domain::aurc::{ReconcilableRecord, update_field};
use crate::domain::catalog::{AccountCode, MarketCode};
use crate::domain::record_list::KeyedRecord;

/// Map key of a trade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeKey {
    /// Server trade id.
    pub trade_id: String,
    /// Owning account.
    pub account_code: AccountCode,
}

impl fmt::Display for TradeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.trade_id, self.account_code)
    }
}

/// Field identifiers of [`Trade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TradeField {
    /// Executed quantity.
    Quantity,
    /// Execution price.
    Price,
    /// Cancellation flag.
    Cancelled,
}

/// A trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Server trade id.
    pub trade_id: String,
    /// Owning account.
    pub account_code: AccountCode,
    /// Order this trade filled.
    pub order_id: String,
    /// Symbol code.
    pub code: String,
    /// Market.
    pub market_code: MarketCode,
    /// Side.
    pub side: OrderSide,
    /// Executed quantity.
    pub quantity: Decimal,
    /// Execution price.
    pub price: Decimal,
    /// Whether the trade was cancelled after execution.
    pub cancelled: bool,
    /// Execution time.
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    /// Value of the trade.
    #[must_use]
    pub fn value(&self) -> Decimal {
        self.quantity * self.price
    }
}

/// Partial update of a [`Trade`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeChange {
    /// Trade to update.
    pub trade_id: String,
    /// Account of the trade.
    pub account_code: AccountCode,
    /// Corrected quantity.
    pub quantity: Option<Decimal>,
    /// Corrected price.
    pub price: Option<Decimal>,
    /// Cancellation flag.
    pub cancelled: Option<bool>,
}

impl KeyedRecord for Trade {
    type Key = TradeKey;

    fn key(&self) -> TradeKey {
        TradeKey {
            trade_id: self.trade_id.clone(),
            account_code: self.account_code.clone(),
        }
    }
}

impl ReconcilableRecord for Trade {
    type Data = Self;
    type Change = TradeChange;
    type Scope = AccountCode;
    type Field = TradeField;

    const ENTITY: &'static str = "trade";

    fn data_key(data: &Self) -> TradeKey {
        data.key()
    }

    fn change_key(change: &TradeChange) -> TradeKey {
        TradeKey {
            trade_id: change.trade_id.clone(),
            account_code: change.account_code.clone(),
        }
    }

    fn from_data(data: Self) -> Self {
        data
    }

    fn scope(&self) -> AccountCode {
        self.account_code.clone()
    }

    fn apply_change(&mut self, change: TradeChange) -> Vec<TradeField> {
        let mut changed = Vec::new();
        update_field(&mut self.quantity, change.quantity, TradeField::Quantity, &mut changed);
        update_field(&mut self.price, change.price, TradeField::Price, &mut changed);
        update_field(&mut self.cancelled, change.cancelled, TradeField::Cancelled, &mut changed);
        changed
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;

    fn trade() -> Trade {
        Trade {
            trade_id: "T9".to_string(),
            account_code: "A1".into(),
            order_id: "17".to_string(),
            code: "CBA".to_string(),
            market_code: "ASX".into(),
            side: OrderSide::Sell,
            quantity: dec!(25),
            price: dec!(110.50),
            cancelled: false,
            executed_at: Utc.with_ymd_and_hms(2024, 5, 1, 1, 30, 0).unwrap(),
        }
    }

    #[test]
    fn key_display() {
        assert_eq!(trade().key().to_string(), "T9|A1");
    }

    #[test]
    fn scoped_by_account() {
        assert_eq!(trade().scope(), AccountCode::new("A1"));
    }

    #[test]
    fn value_is_quantity_times_price() {
        assert_eq!(trade().value(), dec!(2762.50));
    }

    #[test]
    fn cancellation_is_a_field_change() {
        let mut t = trade();
        let change = TradeChange {
            trade_id: "T9".to_string(),
            account_code: "A1".into(),
            quantity: Some(dec!(25)),
            price: None,
            cancelled: Some(true),
        };
        assert_eq!(Trade::change_key(&change), t.key());

        let fields = t.apply_change(change);

        assert_eq!(fields, vec![TradeField::Cancelled]);
        assert!(t.cancelled);
    }

    #[test]
    fn correction_reports_fields_in_order() {
        let mut t = trade();
        let fields = t.apply_change(TradeChange {
            trade_id: "T9".to_string(),
            account_code: "A1".into(),
            quantity: Some(dec!(20)),
            price: Some(dec!(110.00)),
            cancelled: None,
        });

        assert_eq!(fields, vec![TradeField::Quantity, TradeField::Price]);
        assert_eq!(t.value(), dec!(2200.00));
    }
}
