//! Record List Data Item (AURC reconciliation)
//!
//! A subscription that owns a [`KeyedRecordList`] and applies AURC change
//! batches to it.
//!
//! # Batching
//!
//! A batch is scanned left to right. Consecutive Adds of new keys form a
//! pending run that is inserted with a single `Insert(start, count)`
//! notification when the run ends (at an Update, Remove, Clear, a duplicate
//! Add, or the end of the batch). Appends compose, so deferring them is
//! safe; the other record kinds do not and flush the run first.
//!
//! # Anomalies
//!
//! A duplicate Add or an Update/Remove for an unknown key is a server data
//! anomaly: it is logged with a stable code, counted, reported to the
//! diagnostics sink, and the batch continues. A Remove or Clear that hits a
//! record a consumer holds locked still removes it (the server owns the
//! data) and is reported the same way.
//!
//! # Resubscription
//!
//! A new request number supersedes everything received for the old one.
//! The list is emptied in the same transaction, so the snapshot that
//! answers the new request rebuilds it from scratch.
//!
//! # Notifications
//!
//! List and record changes are queued during the update transaction and
//! delivered in order when the outermost transaction ends, followed by the
//! correctness change (and a `Usable`/`Unusable` list change when
//! usability flips).

use std::collections::HashSet;
use std::sync::Arc;

use super::message::{DataMessage, DataMessagePayload, RecordPayload};
use super::subscription::{
    CorrectnessChange, DataItemId, RequestNr, SubscriptionDataItem, SubscriptionRequest,
};
use crate::domain::aurc::{ChangeRecord, ClearScope, DataAnomaly, ReconcilableRecord};
use crate::domain::connection::DiagnosticsSink;
use crate::domain::correctness::{Badness, Correctness};
use crate::domain::entities::{
    Balance, Holding, Order, ScanDescriptor, TradableSymbol, Trade, WatchmakerEntry,
};
use crate::domain::notify::MultiEvent;
use crate::domain::record_list::{KeyedRecord, KeyedRecordList, ListChange};

// =============================================================================
// Types
// =============================================================================

/// What to do with an Add for a key already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateAddPolicy {
    /// Keep the existing record and drop the duplicate.
    #[default]
    Drop,
    /// Replace the existing record with the duplicate's payload.
    Overwrite,
}

/// Field-level change of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange<R: ReconcilableRecord> {
    /// Key of the record.
    pub key: R::Key,
    /// Index of the record when the change was applied.
    pub index: usize,
    /// Changed fields in the order they were applied.
    pub fields: Vec<R::Field>,
}

#[derive(Debug)]
enum PendingNotification<R: ReconcilableRecord> {
    List(ListChange),
    Record(RecordChange<R>),
}

/// Orders data item.
pub type OrdersDataItem = RecordListDataItem<Order>;
/// Holdings data item.
pub type HoldingsDataItem = RecordListDataItem<Holding>;
/// Balances data item.
pub type BalancesDataItem = RecordListDataItem<Balance>;
/// Trades data item.
pub type TradesDataItem = RecordListDataItem<Trade>;
/// Tradable symbols data item.
pub type SymbolsDataItem = RecordListDataItem<TradableSymbol>;
/// Scan descriptors data item.
pub type ScanDescriptorsDataItem = RecordListDataItem<ScanDescriptor>;
/// Watch-list entries data item.
pub type WatchmakerEntriesDataItem = RecordListDataItem<WatchmakerEntry>;

// =============================================================================
// Record List Data Item
// =============================================================================

/// Subscription owning a list of records maintained by AURC batches.
pub struct RecordListDataItem<R: ReconcilableRecord> {
    subscription: SubscriptionDataItem,
    records: KeyedRecordList<R>,
    duplicate_add_policy: DuplicateAddPolicy,
    pending: Vec<PendingNotification<R>>,
    list_changed: MultiEvent<ListChange>,
    record_changed: MultiEvent<RecordChange<R>>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    anomaly_count: u64,
}

impl<R: ReconcilableRecord> std::fmt::Debug for RecordListDataItem<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordListDataItem")
            .field("entity", &R::ENTITY)
            .field("subscription", &self.subscription)
            .field("len", &self.records.len())
            .field("anomaly_count", &self.anomaly_count)
            .finish_non_exhaustive()
    }
}

impl<R: ReconcilableRecord> RecordListDataItem<R> {
    /// Create an inactive item with an empty list.
    #[must_use]
    pub fn new(data_item_id: DataItemId, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            subscription: SubscriptionDataItem::new(data_item_id),
            records: KeyedRecordList::new(),
            duplicate_add_policy: DuplicateAddPolicy::default(),
            pending: Vec::new(),
            list_changed: MultiEvent::new(),
            record_changed: MultiEvent::new(),
            diagnostics,
            anomaly_count: 0,
        }
    }

    /// Set the duplicate Add policy.
    #[must_use]
    pub const fn with_duplicate_add_policy(mut self, policy: DuplicateAddPolicy) -> Self {
        self.duplicate_add_policy = policy;
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Underlying subscription.
    #[must_use]
    pub const fn subscription(&self) -> &SubscriptionDataItem {
        &self.subscription
    }

    /// Data item id.
    #[must_use]
    pub const fn data_item_id(&self) -> DataItemId {
        self.subscription.data_item_id()
    }

    /// The records.
    #[must_use]
    pub const fn records(&self) -> &KeyedRecordList<R> {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record with `key`.
    #[must_use]
    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.records.get_by_key(key)
    }

    /// Published badness.
    #[must_use]
    pub const fn badness(&self) -> &Badness {
        self.subscription.badness()
    }

    /// Published correctness.
    #[must_use]
    pub const fn correctness(&self) -> Correctness {
        self.subscription.correctness()
    }

    /// Whether consumers may display the list.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.subscription.is_usable()
    }

    /// Data anomalies seen so far.
    #[must_use]
    pub const fn anomaly_count(&self) -> u64 {
        self.anomaly_count
    }

    /// List change event.
    #[must_use]
    pub const fn list_changed(&self) -> &MultiEvent<ListChange> {
        &self.list_changed
    }

    /// Record change event.
    #[must_use]
    pub const fn record_changed(&self) -> &MultiEvent<RecordChange<R>> {
        &self.record_changed
    }

    /// Correctness change event.
    #[must_use]
    pub const fn correctness_changed(&self) -> &MultiEvent<CorrectnessChange> {
        self.subscription.correctness_changed()
    }

    /// Lock a record against removal. Returns `false` if not present.
    pub fn lock(&mut self, key: &R::Key) -> bool {
        self.records.lock(key)
    }

    /// Release a record lock.
    pub fn unlock(&mut self, key: &R::Key) {
        self.records.unlock(key);
    }

    // -------------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------------

    /// Open an update transaction.
    pub fn begin_update(&mut self) {
        self.subscription.begin_update();
    }

    /// Close an update transaction. The outermost end delivers queued
    /// notifications, then any correctness change.
    pub fn end_update(&mut self) {
        if !self.subscription.leave_update() {
            return;
        }

        for notification in std::mem::take(&mut self.pending) {
            match notification {
                PendingNotification::List(change) => self.list_changed.notify(&change),
                PendingNotification::Record(change) => self.record_changed.notify(&change),
            }
        }

        if let Some(change) = self.subscription.publish_correctness()
            && change.usable_changed
        {
            self.list_changed
                .notify(&ListChange::usability(change.usable, self.records.len()));
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Subscribe. Returns the request to send when the feed is online.
    pub fn activate(&mut self) -> Option<SubscriptionRequest> {
        self.begin_update();
        let previous = self.subscription.request_nr();
        let request = self.subscription.activate();
        self.discard_superseded(previous);
        self.end_update();
        request
    }

    /// Unsubscribe and drop every record.
    pub fn deactivate(&mut self) {
        self.begin_update();
        let locked = self.clear_all();
        if !locked.is_empty() {
            tracing::warn!(
                data_item_id = self.data_item_id(),
                locked = locked.len(),
                "Deactivated with locked records"
            );
        }
        self.subscription.deactivate();
        self.end_update();
    }

    /// Record the feed going online or offline.
    ///
    /// Coming back online resubscribes; records of the previous request are
    /// dropped and the new snapshot replaces them.
    pub fn set_feed_online(&mut self, online: bool) -> Option<SubscriptionRequest> {
        self.begin_update();
        let previous = self.subscription.request_nr();
        let request = self.subscription.set_feed_online(online);
        self.discard_superseded(previous);
        self.end_update();
        request
    }

    /// Record that the feed has been finalised.
    pub fn set_feed_finalised(&mut self) {
        self.begin_update();
        self.subscription.set_feed_finalised();
        self.end_update();
    }

    /// Set the badness of a dependency.
    pub fn set_dependency_badness(&mut self, dependency: &str, badness: Badness) {
        self.begin_update();
        self.subscription.set_dependency_badness(dependency, badness);
        self.end_update();
    }

    /// Remove a dependency.
    pub fn remove_dependency(&mut self, dependency: &str) {
        self.begin_update();
        self.subscription.remove_dependency(dependency);
        self.end_update();
    }

    fn discard_superseded(&mut self, previous: RequestNr) {
        let request_nr = self.subscription.request_nr();
        if request_nr == previous || self.records.is_empty() {
            return;
        }
        let count = self.records.len();
        let locked = self.clear_all();
        tracing::debug!(
            data_item_id = self.data_item_id(),
            request_nr,
            count,
            locked = locked.len(),
            "Dropped records of superseded request"
        );
    }

    // -------------------------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------------------------

    /// Apply an ordered batch of change records.
    ///
    /// # Panics
    ///
    /// Panics if called outside an update transaction.
    pub fn apply_change_batch(&mut self, records: Vec<ChangeRecord<R>>) {
        assert!(
            self.subscription.in_update(),
            "{} change batch applied outside an update transaction",
            R::ENTITY
        );

        let mut run: Vec<R> = Vec::new();
        let mut run_keys: HashSet<R::Key> = HashSet::new();

        for record in records {
            match record {
                ChangeRecord::Add(data) => {
                    let key = R::data_key(&data);
                    if !self.records.contains_key(&key) && !run_keys.contains(&key) {
                        run_keys.insert(key);
                        run.push(R::from_data(data));
                        continue;
                    }
                    self.flush_run(&mut run, &mut run_keys);
                    self.duplicate_add(key, data);
                }
                ChangeRecord::Update(change) => {
                    self.flush_run(&mut run, &mut run_keys);
                    self.update(change);
                }
                ChangeRecord::Remove(key) => {
                    self.flush_run(&mut run, &mut run_keys);
                    self.remove(&key);
                }
                ChangeRecord::Clear(scope) => {
                    self.flush_run(&mut run, &mut run_keys);
                    self.clear(&scope);
                }
            }
        }

        self.flush_run(&mut run, &mut run_keys);
        debug_assert!(self.records.is_consistent());
    }

    fn flush_run(&mut self, run: &mut Vec<R>, run_keys: &mut HashSet<R::Key>) {
        if run.is_empty() {
            return;
        }
        let count = run.len();
        let start = self.records.insert_range(std::mem::take(run));
        run_keys.clear();
        self.queue_list_change(ListChange::insert(start, count));
    }

    fn duplicate_add(&mut self, key: R::Key, data: R::Data) {
        self.anomaly(DataAnomaly::DuplicateAdd {
            entity: R::ENTITY,
            key: key.to_string(),
        });

        if self.duplicate_add_policy == DuplicateAddPolicy::Overwrite
            && let Some(index) = self.records.index_of(&key)
        {
            self.records.replace_at(index, R::from_data(data));
            self.queue_list_change(ListChange::replace(index, 1));
        }
    }

    fn update(&mut self, change: R::Change) {
        let key = R::change_key(&change);
        let Some((index, record)) = self.records.get_mut_by_key(&key) else {
            self.anomaly(DataAnomaly::UpdateUnknownKey {
                entity: R::ENTITY,
                key: key.to_string(),
            });
            return;
        };

        let fields = record.apply_change(change);
        assert!(
            record.key() == key,
            "{} update changed the key of record {key}",
            R::ENTITY
        );
        if !fields.is_empty() {
            self.pending
                .push(PendingNotification::Record(RecordChange { key, index, fields }));
        }
    }

    fn remove(&mut self, key: &R::Key) {
        let Some(index) = self.records.index_of(key) else {
            self.anomaly(DataAnomaly::RemoveUnknownKey {
                entity: R::ENTITY,
                key: key.to_string(),
            });
            return;
        };

        self.queue_list_change(ListChange::remove(index, 1));
        let (_, locked) = self.records.evict_at(index);
        if locked {
            self.removed_locked(key);
        }
    }

    fn clear(&mut self, scope: &ClearScope<R::Scope>) {
        let whole_list = match scope {
            ClearScope::All => true,
            ClearScope::Scope(s) => self.records.iter().all(|r| r.scope() == *s),
        };

        let locked = if whole_list {
            self.clear_all()
        } else {
            let (runs, locked) = self.records.evict_where(|r| scope.covers(&r.scope()));
            for (start, count) in runs {
                self.queue_list_change(ListChange::remove(start, count));
            }
            locked
        };
        for key in &locked {
            self.removed_locked(key);
        }
    }

    /// Empty the list. Returns the keys that were still locked.
    fn clear_all(&mut self) -> Vec<R::Key> {
        let (count, locked) = self.records.evict_all();
        if count > 0 {
            self.queue_list_change(ListChange::clear(count));
        }
        locked
    }

    fn removed_locked(&mut self, key: &R::Key) {
        self.anomaly(DataAnomaly::RemoveLocked {
            entity: R::ENTITY,
            key: key.to_string(),
        });
    }

    fn queue_list_change(&mut self, change: ListChange) {
        let change = change.for_usability(self.subscription.is_usable());
        self.pending.push(PendingNotification::List(change));
    }

    fn anomaly(&mut self, anomaly: DataAnomaly) {
        self.anomaly_count += 1;
        tracing::error!(
            code = anomaly.code(),
            entity = anomaly.entity(),
            data_item_id = self.subscription.data_item_id(),
            anomaly = %anomaly,
            "Data anomaly in change batch"
        );
        self.diagnostics.data_anomaly(&anomaly);
    }
}

impl<R: RecordPayload> RecordListDataItem<R> {
    /// Process a decoded message for this item.
    ///
    /// Messages answering an earlier request are discarded. Returns whether
    /// the message was applied.
    ///
    /// # Panics
    ///
    /// Panics if the message is addressed to another data item or carries
    /// changes for another entity type.
    pub fn process_message(&mut self, message: DataMessage) -> bool {
        assert!(
            message.data_item_id == self.data_item_id(),
            "message for data item {} routed to {} item {}",
            message.data_item_id,
            R::ENTITY,
            self.data_item_id()
        );

        if !self.subscription.is_current_request(message.data_item_request_nr) {
            tracing::debug!(
                data_item_id = message.data_item_id,
                request_nr = message.data_item_request_nr,
                current = self.subscription.request_nr(),
                kind = message.payload.kind(),
                "Discarding message for stale request"
            );
            return false;
        }

        self.begin_update();
        match message.payload {
            DataMessagePayload::Synchronised => self.subscription.set_synchronised(),
            DataMessagePayload::SubscriptionError { error } => self.subscription.set_error(error),
            payload => match R::take_changes(payload) {
                Ok(records) => self.apply_change_batch(records),
                Err(other) => panic!(
                    "{} payload routed to {} data item {}",
                    other.kind(),
                    R::ENTITY,
                    self.data_item_id()
                ),
            },
        }
        self.end_update();
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
