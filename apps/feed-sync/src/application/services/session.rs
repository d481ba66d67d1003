//! Feed Session
//!
//! Registry of the data items open on one feed. Routes decoded messages to
//! their item by data item id and fans connection online/offline changes
//! out to every item.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use super::message::{DataMessage, RecordPayload};
use super::reconciliation::{DuplicateAddPolicy, RecordListDataItem};
use super::subscription::{DataItemId, SubscriptionRequest};
use crate::domain::connection::{DiagnosticsSink, EngineOutput};

/// Type-erased data item owned by a [`FeedSession`].
pub trait FeedDataItem: Any {
    /// Data item id.
    fn data_item_id(&self) -> DataItemId;

    /// Process a message addressed to this item.
    fn process_message(&mut self, message: DataMessage) -> bool;

    /// Record the feed going online or offline.
    fn set_feed_online(&mut self, online: bool) -> Option<SubscriptionRequest>;

    /// Record that the feed has been finalised.
    fn set_feed_finalised(&mut self);

    /// Unsubscribe and drop all data.
    fn deactivate(&mut self);

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<R: RecordPayload + 'static> FeedDataItem for RecordListDataItem<R> {
    fn data_item_id(&self) -> DataItemId {
        Self::data_item_id(self)
    }

    fn process_message(&mut self, message: DataMessage) -> bool {
        Self::process_message(self, message)
    }

    fn set_feed_online(&mut self, online: bool) -> Option<SubscriptionRequest> {
        Self::set_feed_online(self, online)
    }

    fn set_feed_finalised(&mut self) {
        Self::set_feed_finalised(self);
    }

    fn deactivate(&mut self) {
        Self::deactivate(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Data items open on one feed connection.
pub struct FeedSession {
    items: HashMap<DataItemId, Box<dyn FeedDataItem>>,
    next_id: DataItemId,
    online: bool,
    finalised: bool,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl std::fmt::Debug for FeedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSession")
            .field("items", &self.items.len())
            .field("next_id", &self.next_id)
            .field("online", &self.online)
            .field("finalised", &self.finalised)
            .finish_non_exhaustive()
    }
}

impl FeedSession {
    /// Create an empty, offline session.
    #[must_use]
    pub fn new(diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            items: HashMap::new(),
            next_id: 1,
            online: false,
            finalised: false,
            diagnostics,
        }
    }

    /// Whether the feed is online.
    #[must_use]
    pub const fn is_online(&self) -> bool {
        self.online
    }

    /// Number of open items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no item is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Open and activate a record list item.
    ///
    /// Returns the new item's id and the subscribe request to send, if the
    /// feed is online.
    pub fn open<R: RecordPayload + 'static>(
        &mut self,
        policy: DuplicateAddPolicy,
    ) -> (DataItemId, Option<SubscriptionRequest>) {
        let id = self.next_id;
        self.next_id += 1;

        let mut item = RecordListDataItem::<R>::new(id, Arc::clone(&self.diagnostics))
            .with_duplicate_add_policy(policy);
        if self.finalised {
            item.set_feed_finalised();
        } else if self.online {
            item.set_feed_online(true);
        }
        let request = item.activate();

        tracing::debug!(data_item_id = id, entity = R::ENTITY, "Opened data item");
        self.items.insert(id, Box::new(item));
        (id, request)
    }

    /// Deactivate and drop an item. Returns `false` if it was not open.
    pub fn close(&mut self, id: DataItemId) -> bool {
        let Some(mut item) = self.items.remove(&id) else {
            return false;
        };
        item.deactivate();
        tracing::debug!(data_item_id = id, "Closed data item");
        true
    }

    /// The item with `id`, if it is open and holds `R` records.
    #[must_use]
    pub fn item<R: RecordPayload + 'static>(&self, id: DataItemId) -> Option<&RecordListDataItem<R>> {
        self.items
            .get(&id)
            .and_then(|item| item.as_any().downcast_ref())
    }

    /// Mutable access to the item with `id`.
    pub fn item_mut<R: RecordPayload + 'static>(
        &mut self,
        id: DataItemId,
    ) -> Option<&mut RecordListDataItem<R>> {
        self.items
            .get_mut(&id)
            .and_then(|item| item.as_any_mut().downcast_mut())
    }

    /// Deliver a message to its item. Messages for closed items are dropped.
    pub fn route(&mut self, message: DataMessage) -> bool {
        let Some(item) = self.items.get_mut(&message.data_item_id) else {
            tracing::debug!(
                data_item_id = message.data_item_id,
                kind = message.payload.kind(),
                "Dropping message for unknown data item"
            );
            return false;
        };
        item.process_message(message)
    }

    /// Apply a connection engine output. Returns the subscribe requests to
    /// send when the feed came back online.
    pub fn apply_engine_output(&mut self, output: &EngineOutput) -> Vec<SubscriptionRequest> {
        match output {
            EngineOutput::CameOnline => self.set_online(true),
            EngineOutput::WentOffline => self.set_online(false),
            EngineOutput::Finalised => {
                self.finalised = true;
                self.online = false;
                for item in self.items.values_mut() {
                    item.set_feed_finalised();
                }
                Vec::new()
            }
            EngineOutput::Action(_)
            | EngineOutput::StateChanged { .. }
            | EngineOutput::Reconnecting(_)
            | EngineOutput::AccessTokenRequested => Vec::new(),
        }
    }

    fn set_online(&mut self, online: bool) -> Vec<SubscriptionRequest> {
        self.online = online;
        let mut requests: Vec<SubscriptionRequest> = self
            .items
            .values_mut()
            .filter_map(|item| item.set_feed_online(online))
            .collect();
        requests.sort_by_key(|r| r.data_item_id);
        requests
    }
}
