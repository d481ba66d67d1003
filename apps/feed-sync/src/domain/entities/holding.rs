//! Holdings (positions held in an account).

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aurc::{ReconcilableRecord, update_field};
use crate::domain::catalog::{AccountCode, MarketCode};
use crate::domain::record_list::KeyedRecord;

/// Map key of a holding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldingKey {
    /// Exchange the holding is registered on.
    pub exchange_code: MarketCode,
    /// Symbol code.
    pub code: String,
    /// Owning account.
    pub account_code: AccountCode,
}

impl fmt::Display for HoldingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.exchange_code, self.code, self.account_code)
    }
}

/// Field identifiers of [`Holding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HoldingField {
    /// Quantity held.
    TotalQuantity,
    /// Quantity free to sell.
    TotalAvailableQuantity,
    /// Average purchase price.
    AveragePrice,
    /// Total cost base.
    Cost,
    /// Currency of price and cost.
    Currency,
}

/// A holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Exchange the holding is registered on.
    pub exchange_code: MarketCode,
    /// Symbol code.
    pub code: String,
    /// Owning account.
    pub account_code: AccountCode,
    /// Quantity held.
    pub total_quantity: Decimal,
    /// Quantity not committed to open sell orders.
    pub total_available_quantity: Decimal,
    /// Average purchase price.
    pub average_price: Decimal,
    /// Total cost base.
    pub cost: Decimal,
    /// Currency of price and cost.
    pub currency: String,
}

/// Partial update of a [`Holding`]. Key fields identify the record; `None`
/// leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingChange {
    /// Exchange of the holding to update.
    pub exchange_code: MarketCode,
    /// Symbol code of the holding to update.
    pub code: String,
    /// Account of the holding to update.
    pub account_code: AccountCode,
    /// New quantity held.
    pub total_quantity: Option<Decimal>,
    /// New available quantity.
    pub total_available_quantity: Option<Decimal>,
    /// New average price.
    pub average_price: Option<Decimal>,
    /// New cost base.
    pub cost: Option<Decimal>,
    /// New currency.
    pub currency: Option<String>,
}

impl KeyedRecord for Holding {
    type Key = HoldingKey;

    fn key(&self) -> HoldingKey {
        HoldingKey {
            exchange_code: self.exchange_code.clone(),
            code: self.code.clone(),
            account_code: self.account_code.clone(),
        }
    }
}

impl ReconcilableRecord for Holding {
    type Data = Self;
    type Change = HoldingChange;
    type Scope = AccountCode;
    type Field = HoldingField;

    const ENTITY: &'static str = "holding";

    fn data_key(data: &Self) -> HoldingKey {
        data.key()
    }

    fn change_key(change: &HoldingChange) -> HoldingKey {
        HoldingKey {
            exchange_code: change.exchange_code.clone(),
            code: change.code.clone(),
            account_code: change.account_code.clone(),
        }
    }

    fn from_data(data: Self) -> Self {
        data
    }

    fn scope(&self) -> AccountCode {
        self.account_code.clone()
    }

    fn apply_change(&mut self, change: HoldingChange) -> Vec<HoldingField> {
        let mut changed = Vec::new();
        update_field(
            &mut self.total_quantity,
            change.total_quantity,
            HoldingField::TotalQuantity,
            &mut changed,
        );
        update_field(
            &mut self.total_available_quantity,
            change.total_available_quantity,
            HoldingField::TotalAvailableQuantity,
            &mut changed,
        );
        update_field(
            &mut self.average_price,
            change.average_price,
            HoldingField::AveragePrice,
            &mut changed,
        );
        update_field(&mut self.cost, change.cost, HoldingField::Cost, &mut changed);
        update_field(&mut self.currency, change.currency, HoldingField::Currency, &mut changed);
        changed
    }
}
