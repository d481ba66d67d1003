//! Data Messages
//!
//! Typed messages produced by the (external) wire decoder. Each carries
//! the data item id and request number it answers, and either a control
//! payload or an ordered batch of AURC change records for one entity type.

use super::subscription::{DataItemId, RequestNr};
use crate::domain::aurc::{ChangeRecord, ReconcilableRecord};
use crate::domain::entities::{
    Balance, Holding, Order, ScanDescriptor, TradableSymbol, Trade, WatchmakerEntry,
};

/// Message payload.
#[derive(Debug, Clone)]
pub enum DataMessagePayload {
    /// The initial data set is complete.
    Synchronised,
    /// The server rejected or dropped the subscription.
    SubscriptionError {
        /// Server error text.
        error: String,
    },
    /// Order changes.
    Orders(Vec<ChangeRecord<Order>>),
    /// Holding changes.
    Holdings(Vec<ChangeRecord<Holding>>),
    /// Balance changes.
    Balances(Vec<ChangeRecord<Balance>>),
    /// Trade changes.
    Trades(Vec<ChangeRecord<Trade>>),
    /// Symbol changes.
    Symbols(Vec<ChangeRecord<TradableSymbol>>),
    /// Scan descriptor changes.
    ScanDescriptors(Vec<ChangeRecord<ScanDescriptor>>),
    /// Watch-list entry changes.
    WatchmakerEntries(Vec<ChangeRecord<WatchmakerEntry>>),
}

impl DataMessagePayload {
    /// Payload name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Synchronised => "synchronised",
            Self::SubscriptionError { .. } => "subscription_error",
            Self::Orders(_) => "orders",
            Self::Holdings(_) => "holdings",
            Self::Balances(_) => "balances",
            Self::Trades(_) => "trades",
            Self::Symbols(_) => "symbols",
            Self::ScanDescriptors(_) => "scan_descriptors",
            Self::WatchmakerEntries(_) => "watchmaker_entries",
        }
    }
}

/// A decoded message for one data item.
#[derive(Debug, Clone)]
pub struct DataMessage {
    /// Data item the message is for.
    pub data_item_id: DataItemId,
    /// Request number the message answers.
    pub data_item_request_nr: RequestNr,
    /// Payload.
    pub payload: DataMessagePayload,
}

impl DataMessage {
    /// Create a message.
    #[must_use]
    pub const fn new(
        data_item_id: DataItemId,
        data_item_request_nr: RequestNr,
        payload: DataMessagePayload,
    ) -> Self {
        Self {
            data_item_id,
            data_item_request_nr,
            payload,
        }
    }
}

/// Extraction of an entity's change batch from a payload.
pub trait RecordPayload: ReconcilableRecord {
    /// Take the change batch if the payload carries this entity type,
    /// otherwise hand the payload back.
    ///
    /// # Errors
    ///
    /// Returns the payload unchanged when it is for another entity type.
    fn take_changes(
        payload: DataMessagePayload,
    ) -> Result<Vec<ChangeRecord<Self>>, DataMessagePayload>;
}

macro_rules! record_payload {
    ($record:ty, $variant:ident) => {
        impl RecordPayload for $record {
            fn take_changes(
                payload: DataMessagePayload,
            ) -> Result<Vec<ChangeRecord<Self>>, DataMessagePayload> {
                match payload {
                    DataMessagePayload::$variant(records) => Ok(records),
                    other => Err(other),
                }
            }
        }
    };
}

record_payload!(Order, Orders);
record_payload!(Holding, Holdings);
record_payload!(Balance, Balances);
record_payload!(Trade, Trades);
record_payload!(TradableSymbol, Symbols);
record_payload!(ScanDescriptor, ScanDescriptors);
record_payload!(WatchmakerEntry, WatchmakerEntries);
