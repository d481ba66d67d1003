//! Watchmaker Entries
//!
//! Members of a watch-list. A watch-list subscription covers one list, so
//! entries share a single implicit scope.

use serde::{Deserialize, Serialize};

use crate::domain::aurc::{ReconcilableRecord, update_field};
use crate::domain::catalog::MarketCode;
use crate::domain::record_list::KeyedRecord;

/// Field identifiers of [`WatchmakerEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WatchmakerField {
    /// Display position.
    Position,
    /// User note.
    Note,
}

/// One symbol in a watch-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchmakerEntry {
    /// Entry id, unique within the list.
    pub entry_id: String,
    /// Symbol code.
    pub code: String,
    /// Market.
    pub market_code: MarketCode,
    /// Display position within the list.
    pub position: u32,
    /// User note.
    pub note: String,
}

/// Partial update of a [`WatchmakerEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchmakerChange {
    /// Entry to update.
    pub entry_id: String,
    /// New display position.
    pub position: Option<u32>,
    /// New note.
    pub note: Option<String>,
}

impl KeyedRecord for WatchmakerEntry {
    type Key = String;

    fn key(&self) -> String {
        self.entry_id.clone()
    }
}

impl ReconcilableRecord for WatchmakerEntry {
    type Data = Self;
    type Change = WatchmakerChange;
    type Scope = ();
    type Field = WatchmakerField;

    const ENTITY: &'static str = "watchmaker_entry";

    fn data_key(data: &Self) -> String {
        data.entry_id.clone()
    }

    fn change_key(change: &WatchmakerChange) -> String {
        change.entry_id.clone()
    }

    fn from_data(data: Self) -> Self {
        data
    }

    fn scope(&self) {}

    fn apply_change(&mut self, change: WatchmakerChange) -> Vec<WatchmakerField> {
        let mut changed = Vec::new();
        update_field(&mut self.position, change.position, WatchmakerField::Position, &mut changed);
        update_field(&mut self.note, change.note, WatchmakerField::Note, &mut changed);
        changed
    }
}
