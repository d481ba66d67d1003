//! Accounts Catalog
//!
//! Owning registry of trading accounts. Entities hold only an
//! [`AccountCode`] and resolve the account through the catalog on demand,
//! so no entity keeps the account alive or points back into it.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Codes
// =============================================================================

/// Trading account code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountCode(String);

impl AccountCode {
    /// Create from a string.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Market code (e.g. `ASX`, `NYSE`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketCode(String);

impl MarketCode {
    /// Create from a string.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MarketCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

// =============================================================================
// Account
// =============================================================================

/// A trading account known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account code.
    pub code: AccountCode,
    /// Display name.
    pub name: String,
    /// Base currency.
    pub currency: String,
    /// Broker the account belongs to.
    pub broker_code: String,
}

// =============================================================================
// Catalog
// =============================================================================

/// Owning registry of accounts keyed by code.
#[derive(Debug, Default)]
pub struct AccountsCatalog {
    accounts: HashMap<AccountCode, Account>,
}

impl AccountsCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account. Returns the previous value.
    pub fn upsert(&mut self, account: Account) -> Option<Account> {
        self.accounts.insert(account.code.clone(), account)
    }

    /// Remove an account.
    pub fn remove(&mut self, code: &AccountCode) -> Option<Account> {
        self.accounts.remove(code)
    }

    /// Resolve an account code.
    #[must_use]
    pub fn get(&self, code: &AccountCode) -> Option<&Account> {
        self.accounts.get(code)
    }

    /// Whether the code is registered.
    #[must_use]
    pub fn contains(&self, code: &AccountCode) -> bool {
        self.accounts.contains_key(code)
    }

    /// Number of registered accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no accounts are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Accounts sorted by code.
    #[must_use]
    pub fn sorted(&self) -> Vec<&Account> {
        let mut accounts: Vec<&Account> = self.accounts.values().collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        accounts
    }
}
