//! Application Services
//!
//! - [`SubscriptionDataItem`]: subscription lifecycle and correctness
//! - [`RecordListDataItem`]: AURC reconciliation into a keyed record list
//! - [`FeedSession`]: data item registry and message routing

mod message;
mod reconciliation;
mod session;
mod subscription;

pub use message::{DataMessage, DataMessagePayload, RecordPayload};
pub use reconciliation::{
    BalancesDataItem, DuplicateAddPolicy, HoldingsDataItem, OrdersDataItem, RecordChange,
    RecordListDataItem, ScanDescriptorsDataItem, SymbolsDataItem, TradesDataItem,
    WatchmakerEntriesDataItem,
};
pub use session::{FeedDataItem, FeedSession};
pub use subscription::{
    CorrectnessChange, DataItemId, RequestNr, SubscriptionDataItem, SubscriptionRequest,
    SubscriptionState,
};
