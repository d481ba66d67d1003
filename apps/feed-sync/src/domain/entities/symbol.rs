//! Tradable Symbols
//!
//! Symbol metadata, scoped by market.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aurc::{ReconcilableRecord, update_field};
use crate::domain::catalog::MarketCode;
use crate::domain::record_list::KeyedRecord;

/// Map key of a symbol, displayed as `code.market`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolKey {
    /// Symbol code.
    pub code: String,
    /// Market.
    pub market_code: MarketCode,
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.code, self.market_code)
    }
}

/// Field identifiers of [`TradableSymbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SymbolField {
    /// Display name.
    Name,
    /// Listing exchange.
    Exchange,
    /// Minimum order multiple.
    LotSize,
    /// Minimum price increment.
    TickSize,
    /// Tradable flag.
    Tradable,
}

/// Metadata of a symbol tradable on a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradableSymbol {
    /// Symbol code.
    pub code: String,
    /// Market the symbol trades on.
    pub market_code: MarketCode,
    /// Display name.
    pub name: String,
    /// Listing exchange.
    pub exchange: String,
    /// Minimum order multiple.
    pub lot_size: Decimal,
    /// Minimum price increment.
    pub tick_size: Decimal,
    /// Whether orders are currently accepted.
    pub tradable: bool,
}

/// Partial update of a [`TradableSymbol`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolChange {
    /// Code of the symbol to update.
    pub code: String,
    /// Market of the symbol to update.
    pub market_code: MarketCode,
    /// New display name.
    pub name: Option<String>,
    /// New listing exchange.
    pub exchange: Option<String>,
    /// New lot size.
    pub lot_size: Option<Decimal>,
    /// New tick size.
    pub tick_size: Option<Decimal>,
    /// New tradable flag.
    pub tradable: Option<bool>,
}

impl KeyedRecord for TradableSymbol {
    type Key = SymbolKey;

    fn key(&self) -> SymbolKey {
        SymbolKey {
            code: self.code.clone(),
            market_code: self.market_code.clone(),
        }
    }
}

impl ReconcilableRecord for TradableSymbol {
    type Data = Self;
    type Change = SymbolChange;
    type Scope = MarketCode;
    type Field = SymbolField;

    const ENTITY: &'static str = "symbol";

    fn data_key(data: &Self) -> SymbolKey {
        data.key()
    }

    fn change_key(change: &SymbolChange) -> SymbolKey {
        SymbolKey {
            code: change.code.clone(),
            market_code: change.market_code.clone(),
        }
    }

    fn from_data(data: Self) -> Self {
        data
    }

    fn scope(&self) -> MarketCode {
        self.market_code.clone()
    }

    fn apply_change(&mut self, change: SymbolChange) -> Vec<SymbolField> {
        let mut changed = Vec::new();
        update_field(&mut self.name, change.name, SymbolField::Name, &mut changed);
        update_field(&mut self.exchange, change.exchange, SymbolField::Exchange, &mut changed);
        update_field(&mut self.lot_size, change.lot_size, SymbolField::LotSize, &mut changed);
        update_field(&mut self.tick_size, change.tick_size, SymbolField::TickSize, &mut changed);
        update_field(&mut self.tradable, change.tradable, SymbolField::Tradable, &mut changed);
        changed
    }
}
