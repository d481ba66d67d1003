//! Streamed Entities
//!
//! Record types maintained by AURC reconciliation. Each implements
//! [`ReconcilableRecord`](crate::domain::aurc::ReconcilableRecord) with its
//! composite map key, owning scope and field-level partial update.
//!
//! | Entity | Key | Scope |
//! |--------|-----|-------|
//! | [`Order`] | `order_id\|account` | account |
//! | [`Holding`] | `exchange\|code\|account` | account |
//! | [`Balance`] | `account\|currency` | account |
//! | [`Trade`] | `trade_id\|account` | account |
//! | [`TradableSymbol`] | `code.market` | market |
//! | [`ScanDescriptor`] | scan id | single |
//! | [`WatchmakerEntry`] | entry id | single |

mod balance;
mod holding;
mod order;
mod scan;
mod symbol;
mod trade;
mod watchmaker;

pub use balance::{Balance, BalanceChange, BalanceField, BalanceKey};
pub use holding::{Holding, HoldingChange, HoldingField, HoldingKey};
pub use order::{
    Order, OrderChange, OrderField, OrderKey, OrderRoute, OrderRouting, OrderSide, OrderStatus,
    OrderTrigger,
};
pub use scan::{ScanChange, ScanDescriptor, ScanField};
pub use symbol::{SymbolChange, SymbolField, SymbolKey, TradableSymbol};
pub use trade::{Trade, TradeChange, TradeField, TradeKey};
pub use watchmaker::{WatchmakerChange, WatchmakerEntry, WatchmakerField};
