//! AURC Change Records
//!
//! Every streamed entity type is maintained with the same four-way change
//! taxonomy: Add, Update, Remove, Clear. A message carries an ordered batch
//! of these records and the order is significant (an Update may refer to a
//! record added earlier in the same batch).

use std::fmt;

use super::record_list::KeyedRecord;

// =============================================================================
// Reconcilable Record
// =============================================================================

/// A record type that can be maintained by AURC change batches.
pub trait ReconcilableRecord: KeyedRecord + Sized {
    /// Full payload carried by an Add.
    type Data: fmt::Debug;
    /// Partial payload carried by an Update.
    type Change: fmt::Debug;
    /// Owning scope a Clear applies to (account, market, or `()`).
    type Scope: Clone + PartialEq + fmt::Debug;
    /// Field identifier reported in record change notifications.
    type Field: Copy + PartialEq + fmt::Debug;

    /// Entity name used in logs and anomaly reports.
    const ENTITY: &'static str;

    /// Map key of an Add payload.
    fn data_key(data: &Self::Data) -> Self::Key;

    /// Map key of an Update payload.
    fn change_key(change: &Self::Change) -> Self::Key;

    /// Build a record from an Add payload.
    fn from_data(data: Self::Data) -> Self;

    /// Owning scope of this record.
    fn scope(&self) -> Self::Scope;

    /// Apply a partial payload field by field.
    ///
    /// Returns the identifiers of the fields whose value changed, in the
    /// order they were applied.
    fn apply_change(&mut self, change: Self::Change) -> Vec<Self::Field>;
}

/// Set `slot` to `value` if present and different, recording `field`.
pub fn update_field<T: PartialEq, F>(
    slot: &mut T,
    value: Option<T>,
    field: F,
    changed: &mut Vec<F>,
) {
    if let Some(value) = value
        && *slot != value
    {
        *slot = value;
        changed.push(field);
    }
}

// =============================================================================
// Change Records
// =============================================================================

/// Scope of a Clear record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope<S> {
    /// Only records owned by this scope.
    Scope(S),
    /// Every record in the collection.
    All,
}

impl<S: PartialEq> ClearScope<S> {
    /// Whether a record owned by `scope` is covered.
    pub fn covers(&self, scope: &S) -> bool {
        match self {
            Self::Scope(s) => s == scope,
            Self::All => true,
        }
    }
}

/// One AURC change record.
#[derive(Debug, Clone)]
pub enum ChangeRecord<R: ReconcilableRecord> {
    /// Add a record.
    Add(R::Data),
    /// Update fields of an existing record.
    Update(R::Change),
    /// Remove a record by key.
    Remove(R::Key),
    /// Remove all records of a scope.
    Clear(ClearScope<R::Scope>),
}

impl<R: ReconcilableRecord> ChangeRecord<R> {
    /// Tag name for logging.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Add(_) => "Add",
            Self::Update(_) => "Update",
            Self::Remove(_) => "Remove",
            Self::Clear(_) => "Clear",
        }
    }
}

// =============================================================================
// Data Anomalies
// =============================================================================

/// Inconsistency in a change batch received from the server.
///
/// Anomalies are logged and counted; processing of the batch continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataAnomaly {
    /// Add for a key already in the collection.
    #[error("duplicate {entity} add for key {key}")]
    DuplicateAdd {
        /// Entity name.
        entity: &'static str,
        /// Offending map key.
        key: String,
    },

    /// Update for a key not in the collection.
    #[error("{entity} update for unknown key {key}")]
    UpdateUnknownKey {
        /// Entity name.
        entity: &'static str,
        /// Offending map key.
        key: String,
    },

    /// Remove for a key not in the collection.
    #[error("{entity} remove for unknown key {key}")]
    RemoveUnknownKey {
        /// Entity name.
        entity: &'static str,
        /// Offending map key.
        key: String,
    },

    /// Remove or Clear of a record a consumer still holds locked. The
    /// record is removed and its locks are dropped.
    #[error("{entity} record {key} removed while locked")]
    RemoveLocked {
        /// Entity name.
        entity: &'static str,
        /// Locked map key.
        key: String,
    },
}

impl DataAnomaly {
    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateAdd { .. } => "AURC_DUPLICATE_ADD",
            Self::UpdateUnknownKey { .. } => "AURC_UPDATE_UNKNOWN_KEY",
            Self::RemoveUnknownKey { .. } => "AURC_REMOVE_UNKNOWN_KEY",
            Self::RemoveLocked { .. } => "AURC_REMOVE_LOCKED",
        }
    }

    /// Entity the anomaly was reported for.
    #[must_use]
    pub const fn entity(&self) -> &'static str {
        match self {
            Self::DuplicateAdd { entity, .. }
            | Self::UpdateUnknownKey { entity, .. }
            | Self::RemoveUnknownKey { entity, .. }
            | Self::RemoveLocked { entity, .. } => entity,
        }
    }
}
