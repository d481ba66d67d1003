//! Balances
//!
//! One balance line per account and currency.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aurc::{ReconcilableRecord, update_field};
use crate::domain::catalog::AccountCode;
use crate::domain::record_list::KeyedRecord;

/// Map key of a balance line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    /// Owning account.
    pub account_code: AccountCode,
    /// Currency of the line.
    pub currency: String,
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.account_code, self.currency)
    }
}

/// Field identifiers of [`Balance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BalanceField {
    /// Net cash.
    NetBalance,
    /// Cash available to trade.
    Trading,
    /// Cash held against open orders.
    NonTrading,
    /// Unsettled proceeds.
    Unsettled,
}

/// A balance line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Owning account.
    pub account_code: AccountCode,
    /// Currency.
    pub currency: String,
    /// Net cash.
    pub net_balance: Decimal,
    /// Cash available to trade.
    pub trading: Decimal,
    /// Cash held against open orders.
    pub non_trading: Decimal,
    /// Unsettled proceeds.
    pub unsettled: Decimal,
}

/// Partial update of a [`Balance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Account of the line to update.
    pub account_code: AccountCode,
    /// Currency of the line to update.
    pub currency: String,
    /// New net cash.
    pub net_balance: Option<Decimal>,
    /// New tradable cash.
    pub trading: Option<Decimal>,
    /// New cash held against orders.
    pub non_trading: Option<Decimal>,
    /// New unsettled proceeds.
    pub unsettled: Option<Decimal>,
}

impl KeyedRecord for Balance {
    type Key = BalanceKey;

    fn key(&self) -> BalanceKey {
        BalanceKey {
            account_code: self.account_code.clone(),
            currency: self.currency.clone(),
        }
    }
}

impl ReconcilableRecord for Balance {
    type Data = Self;
    type Change = BalanceChange;
    type Scope = AccountCode;
    type Field = BalanceField;

    const ENTITY: &'static str = "balance";

    fn data_key(data: &Self) -> BalanceKey {
        data.key()
    }

    fn change_key(change: &BalanceChange) -> BalanceKey {
        BalanceKey {
            account_code: change.account_code.clone(),
            currency: change.currency.clone(),
        }
    }

    fn from_data(data: Self) -> Self {
        data
    }

    fn scope(&self) -> AccountCode {
        self.account_code.clone()
    }

    fn apply_change(&mut self, change: BalanceChange) -> Vec<BalanceField> {
        let mut changed = Vec::new();
        update_field(
            &mut self.net_balance,
            change.net_balance,
            BalanceField::NetBalance,
            &mut changed,
        );
        update_field(&mut self.trading, change.trading, BalanceField::Trading, &mut changed);
        update_field(
            &mut self.non_trading,
            change.non_trading,
            BalanceField::NonTrading,
            &mut changed,
        );
        update_field(
            &mut self.unsettled,
            change.unsettled,
            BalanceField::Unsettled,
            &mut changed,
        );
        changed
    }
}
