//! Orders
//!
//! Orders are scoped by account. The route, trigger and currency of an order
//! always change together: an Update carrying routing replaces all three.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aurc::{ReconcilableRecord, update_field};
use crate::domain::catalog::{Account, AccountCode, AccountsCatalog, MarketCode};
use crate::domain::record_list::KeyedRecord;

/// Map key of an order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    /// Server order id.
    pub order_id: String,
    /// Owning account.
    pub account_code: AccountCode,
}

impl OrderKey {
    /// Create a key.
    #[must_use]
    pub fn new(order_id: impl Into<String>, account_code: impl Into<AccountCode>) -> Self {
        Self {
            order_id: order_id.into(),
            account_code: account_code.into(),
        }
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.order_id, self.account_code)
    }
}

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted, not yet working.
    Placed,
    /// Working in the market.
    Working,
    /// Partially executed.
    PartiallyFilled,
    /// Fully executed.
    Filled,
    /// Cancelled.
    Cancelled,
    /// Rejected by the exchange or broker.
    Rejected,
    /// Expired.
    Expired,
}

/// Where the order is routed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderRoute {
    /// Direct market access.
    Market,
    /// Best execution across venues.
    BestMarket,
    /// Manually handled by a dealer.
    Fix(String),
}

/// Condition that releases the order to the market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderTrigger {
    /// Released immediately.
    Immediate,
    /// Released when the price crosses a level.
    Price(Decimal),
    /// Released at a given time.
    Time(DateTime<Utc>),
}

/// Route, trigger and currency, replaced as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRouting {
    /// Route.
    pub route: OrderRoute,
    /// Trigger.
    pub trigger: OrderTrigger,
    /// Settlement currency.
    pub currency: String,
}

/// Field identifiers of [`Order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OrderField {
    /// Status.
    Status,
    /// Ordered quantity.
    Quantity,
    /// Executed quantity.
    ExecutedQuantity,
    /// Limit price.
    LimitPrice,
    /// Route.
    Route,
    /// Trigger.
    Trigger,
    /// Currency.
    Currency,
    /// Last update time.
    UpdatedAt,
}

/// An order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Server order id.
    pub order_id: String,
    /// Owning account.
    pub account_code: AccountCode,
    /// Symbol code.
    pub code: String,
    /// Market the symbol trades on.
    pub market_code: MarketCode,
    /// Side.
    pub side: OrderSide,
    /// Status.
    pub status: OrderStatus,
    /// Ordered quantity.
    pub quantity: Decimal,
    /// Executed quantity.
    pub executed_quantity: Decimal,
    /// Limit price, `None` for market orders.
    pub limit_price: Option<Decimal>,
    /// Route, trigger, currency.
    pub routing: OrderRouting,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Resolve the owning account.
    #[must_use]
    pub fn account<'a>(&self, catalog: &'a AccountsCatalog) -> Option<&'a Account> {
        catalog.get(&self.account_code)
    }

    /// Quantity still to be executed.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        (self.quantity - self.executed_quantity).max(Decimal::ZERO)
    }
}

/// Partial update of an [`Order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderChange {
    /// Server order id.
    pub order_id: String,
    /// Owning account.
    pub account_code: AccountCode,
    /// New status.
    pub status: Option<OrderStatus>,
    /// New ordered quantity.
    pub quantity: Option<Decimal>,
    /// New executed quantity.
    pub executed_quantity: Option<Decimal>,
    /// New limit price.
    pub limit_price: Option<Option<Decimal>>,
    /// New route, trigger and currency.
    pub routing: Option<OrderRouting>,
    /// Update time.
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrderChange {
    /// Change touching no fields.
    #[must_use]
    pub fn new(order_id: impl Into<String>, account_code: impl Into<AccountCode>) -> Self {
        Self {
            order_id: order_id.into(),
            account_code: account_code.into(),
            status: None,
            quantity: None,
            executed_quantity: None,
            limit_price: None,
            routing: None,
            updated_at: None,
        }
    }

    /// Set the status.
    #[must_use]
    pub const fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the executed quantity.
    #[must_use]
    pub const fn with_executed_quantity(mut self, quantity: Decimal) -> Self {
        self.executed_quantity = Some(quantity);
        self
    }

    /// Set the routing.
    #[must_use]
    pub fn with_routing(mut self, routing: OrderRouting) -> Self {
        self.routing = Some(routing);
        self
    }
}

impl KeyedRecord for Order {
    type Key = OrderKey;

    fn key(&self) -> OrderKey {
        OrderKey::new(self.order_id.clone(), self.account_code.clone())
    }
}

impl ReconcilableRecord for Order {
    type Data = Self;
    type Change = OrderChange;
    type Scope = AccountCode;
    type Field = OrderField;

    const ENTITY: &'static str = "order";

    fn data_key(data: &Self) -> OrderKey {
        data.key()
    }

    fn change_key(change: &OrderChange) -> OrderKey {
        OrderKey::new(change.order_id.clone(), change.account_code.clone())
    }

    fn from_data(data: Self) -> Self {
        data
    }

    fn scope(&self) -> AccountCode {
        self.account_code.clone()
    }

    fn apply_change(&mut self, change: OrderChange) -> Vec<OrderField> {
        assert!(
            change.account_code == self.account_code,
            "order {} update for account {} does not match account {}",
            self.order_id,
            change.account_code,
            self.account_code
        );

        let mut changed = Vec::new();
        update_field(&mut self.status, change.status, OrderField::Status, &mut changed);
        update_field(&mut self.quantity, change.quantity, OrderField::Quantity, &mut changed);
        update_field(
            &mut self.executed_quantity,
            change.executed_quantity,
            OrderField::ExecutedQuantity,
            &mut changed,
        );
        update_field(
            &mut self.limit_price,
            change.limit_price,
            OrderField::LimitPrice,
            &mut changed,
        );

        if let Some(routing) = change.routing {
            if self.routing.route != routing.route {
                changed.push(OrderField::Route);
            }
            if self.routing.trigger != routing.trigger {
                changed.push(OrderField::Trigger);
            }
            if self.routing.currency != routing.currency {
                changed.push(OrderField::Currency);
            }
            self.routing = routing;
        }

        update_field(
            &mut self.updated_at,
            change.updated_at,
            OrderField::UpdatedAt,
            &mut changed,
        );
        changed
    }
}
