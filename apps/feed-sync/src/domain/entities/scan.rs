//! Scan Descriptors
//!
//! Saved scans belong to the signed-in user, so every descriptor lives in
//! one implicit scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::aurc::{ReconcilableRecord, update_field};
use crate::domain::record_list::KeyedRecord;

/// Field identifiers of [`ScanDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScanField {
    /// Display name.
    Name,
    /// Description text.
    Description,
    /// Edit permission.
    Writable,
    /// Version counter.
    Version,
    /// Last save time.
    LastSavedAt,
}

/// A saved scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDescriptor {
    /// Server scan id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Whether the user can edit the scan.
    pub writable: bool,
    /// Server version counter.
    pub version: u32,
    /// Last save time.
    pub last_saved_at: Option<DateTime<Utc>>,
}

/// Partial update of a [`ScanDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanChange {
    /// Scan to update.
    pub id: String,
    /// New display name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New edit permission.
    pub writable: Option<bool>,
    /// New version counter.
    pub version: Option<u32>,
    /// New last save time; `Some(None)` clears it.
    pub last_saved_at: Option<Option<DateTime<Utc>>>,
}

impl KeyedRecord for ScanDescriptor {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl ReconcilableRecord for ScanDescriptor {
    type Data = Self;
    type Change = ScanChange;
    type Scope = ();
    type Field = ScanField;

    const ENTITY: &'static str = "scan";

    fn data_key(data: &Self) -> String {
        data.id.clone()
    }

    fn change_key(change: &ScanChange) -> String {
        change.id.clone()
    }

    fn from_data(data: Self) -> Self {
        data
    }

    fn scope(&self) {}

    fn apply_change(&mut self, change: ScanChange) -> Vec<ScanField> {
        let mut changed = Vec::new();
        update_field(&mut self.name, change.name, ScanField::Name, &mut changed);
        update_field(
            &mut self.description,
            change.description,
            ScanField::Description,
            &mut changed,
        );
        update_field(&mut self.writable, change.writable, ScanField::Writable, &mut changed);
        update_field(&mut self.version, change.version, ScanField::Version, &mut changed);
        update_field(
            &mut self.last_saved_at,
            change.last_saved_at,
            ScanField::LastSavedAt,
            &mut changed,
        );
        changed
    }
}
