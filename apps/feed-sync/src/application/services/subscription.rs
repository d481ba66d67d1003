//! Subscription Data Item
//!
//! Wraps one server subscription. Tracks the request number used to
//! correlate responses, the subscription state, whether the feed is online
//! and the badness of any dependencies, and derives the correctness shown
//! to consumers.
//!
//! # Update Transactions
//!
//! Mutations happen between [`SubscriptionDataItem::begin_update`] and
//! [`SubscriptionDataItem::end_update`]. Transactions nest; only the
//! outermost end publishes a correctness change, so consumers never observe
//! an intermediate value.

use serde::Serialize;

use crate::domain::correctness::{Badness, BadnessReason, Correctness};
use crate::domain::notify::MultiEvent;

/// Identifier of a data item, assigned by the client.
pub type DataItemId = u64;

/// Request number of a subscription; bumped on every (re)subscribe.
pub type RequestNr = u32;

/// State of the server subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SubscriptionState {
    /// Not subscribed.
    #[default]
    Inactive,
    /// Subscribe sent, waiting for the initial data set.
    AwaitingSynchronisation,
    /// Initial data set received.
    Synchronised,
    /// Server reported an error.
    Error,
}

/// Subscribe request the host must send to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionRequest {
    /// Data item the subscription belongs to.
    pub data_item_id: DataItemId,
    /// Request number responses will carry.
    pub request_nr: RequestNr,
}

/// Published correctness of a data item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectnessChange {
    /// Effective badness.
    pub badness: Badness,
    /// Correctness implied by the badness.
    pub correctness: Correctness,
    /// Whether the data can be displayed.
    pub usable: bool,
    /// Whether `usable` flipped with this change.
    pub usable_changed: bool,
}

/// One server subscription.
#[derive(Debug)]
pub struct SubscriptionDataItem {
    data_item_id: DataItemId,
    request_nr: RequestNr,
    state: SubscriptionState,
    feed_online: bool,
    feed_finalised: bool,
    error_text: String,
    dependencies: Vec<(String, Badness)>,
    update_depth: u32,
    published: Badness,
    usable: bool,
    correctness_changed: MultiEvent<CorrectnessChange>,
}

impl SubscriptionDataItem {
    /// Create an inactive item.
    #[must_use]
    pub fn new(data_item_id: DataItemId) -> Self {
        Self {
            data_item_id,
            request_nr: 0,
            state: SubscriptionState::Inactive,
            feed_online: false,
            feed_finalised: false,
            error_text: String::new(),
            dependencies: Vec::new(),
            update_depth: 0,
            published: Badness::new(BadnessReason::Inactive),
            usable: false,
            correctness_changed: MultiEvent::new(),
        }
    }

    /// Data item id.
    #[must_use]
    pub const fn data_item_id(&self) -> DataItemId {
        self.data_item_id
    }

    /// Current request number.
    #[must_use]
    pub const fn request_nr(&self) -> RequestNr {
        self.request_nr
    }

    /// Subscription state.
    #[must_use]
    pub const fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Whether the feed is online.
    #[must_use]
    pub const fn is_feed_online(&self) -> bool {
        self.feed_online
    }

    /// Published badness.
    #[must_use]
    pub const fn badness(&self) -> &Badness {
        &self.published
    }

    /// Published correctness.
    #[must_use]
    pub const fn correctness(&self) -> Correctness {
        self.published.correctness()
    }

    /// Whether consumers may display the data.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.usable
    }

    /// Whether an update transaction is open.
    #[must_use]
    pub const fn in_update(&self) -> bool {
        self.update_depth > 0
    }

    /// Correctness change event.
    #[must_use]
    pub const fn correctness_changed(&self) -> &MultiEvent<CorrectnessChange> {
        &self.correctness_changed
    }

    /// Whether a message with `request_nr` belongs to the current request.
    #[must_use]
    pub const fn is_current_request(&self, request_nr: RequestNr) -> bool {
        request_nr == self.request_nr
    }

    // -------------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------------

    /// Open an update transaction.
    pub fn begin_update(&mut self) {
        self.update_depth += 1;
    }

    /// Close an update transaction, publishing any correctness change when
    /// the outermost transaction ends.
    ///
    /// # Panics
    ///
    /// Panics if no transaction is open.
    pub fn end_update(&mut self) -> Option<CorrectnessChange> {
        if self.leave_update() {
            self.publish_correctness()
        } else {
            None
        }
    }

    /// Decrement the transaction depth. Returns `true` when the outermost
    /// transaction ended.
    pub(super) fn leave_update(&mut self) -> bool {
        assert!(
            self.update_depth > 0,
            "data item {} end_update without begin_update",
            self.data_item_id
        );
        self.update_depth -= 1;
        self.update_depth == 0
    }

    /// Publish the effective badness if it changed.
    pub(super) fn publish_correctness(&mut self) -> Option<CorrectnessChange> {
        let badness = self.effective_badness();
        if badness == self.published {
            return None;
        }

        let usable = badness.is_usable();
        let change = CorrectnessChange {
            correctness: badness.correctness(),
            badness: badness.clone(),
            usable,
            usable_changed: usable != self.usable,
        };
        tracing::debug!(
            data_item_id = self.data_item_id,
            correctness = %change.correctness,
            badness = %change.badness,
            usable,
            "Data item correctness changed"
        );

        self.published = badness;
        self.usable = usable;
        self.correctness_changed.notify(&change);
        Some(change)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Subscribe. Returns the request to send when the feed is online.
    pub fn activate(&mut self) -> Option<SubscriptionRequest> {
        self.begin_update();
        let request = self.next_request();
        self.end_update();
        request
    }

    /// Unsubscribe.
    pub fn deactivate(&mut self) {
        self.begin_update();
        self.state = SubscriptionState::Inactive;
        self.error_text.clear();
        self.end_update();
    }

    /// Record the feed going online or offline.
    ///
    /// Coming back online re-subscribes an active item with a new request
    /// number; responses to the old request are then discarded.
    pub fn set_feed_online(&mut self, online: bool) -> Option<SubscriptionRequest> {
        self.begin_update();
        self.feed_online = online;
        let request = if online && self.state != SubscriptionState::Inactive {
            self.next_request()
        } else {
            None
        };
        self.end_update();
        request
    }

    /// Record that the feed has been finalised and will not recover.
    pub fn set_feed_finalised(&mut self) {
        self.begin_update();
        self.feed_online = false;
        self.feed_finalised = true;
        self.end_update();
    }

    /// The initial data set has been received.
    pub fn set_synchronised(&mut self) {
        self.begin_update();
        if self.state == SubscriptionState::AwaitingSynchronisation {
            self.state = SubscriptionState::Synchronised;
        }
        self.end_update();
    }

    /// The server reported an error for the subscription.
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.begin_update();
        self.state = SubscriptionState::Error;
        self.error_text = error.into();
        tracing::warn!(
            data_item_id = self.data_item_id,
            error = %self.error_text,
            "Subscription error"
        );
        self.end_update();
    }

    /// Set the badness of a dependency, keyed by a caller-chosen name.
    pub fn set_dependency_badness(&mut self, dependency: &str, badness: Badness) {
        self.begin_update();
        match self.dependencies.iter_mut().find(|(name, _)| name == dependency) {
            Some((_, slot)) => *slot = badness,
            None => self.dependencies.push((dependency.to_string(), badness)),
        }
        self.end_update();
    }

    /// Remove a dependency.
    pub fn remove_dependency(&mut self, dependency: &str) {
        self.begin_update();
        self.dependencies.retain(|(name, _)| name != dependency);
        self.end_update();
    }

    fn next_request(&mut self) -> Option<SubscriptionRequest> {
        self.request_nr = self.request_nr.wrapping_add(1);
        self.state = SubscriptionState::AwaitingSynchronisation;
        self.error_text.clear();
        self.feed_online.then_some(SubscriptionRequest {
            data_item_id: self.data_item_id,
            request_nr: self.request_nr,
        })
    }

    /// Badness of the subscription itself, ignoring dependencies.
    #[must_use]
    pub fn own_badness(&self) -> Badness {
        if self.feed_finalised {
            return Badness::new(BadnessReason::FeedFinalised);
        }
        match self.state {
            SubscriptionState::Inactive => Badness::new(BadnessReason::Inactive),
            _ if !self.feed_online => Badness::new(BadnessReason::ConnectionOffline),
            SubscriptionState::AwaitingSynchronisation => {
                Badness::new(BadnessReason::Synchronising)
            }
            SubscriptionState::Synchronised => Badness::NOT_BAD,
            SubscriptionState::Error => {
                Badness::with_extra(BadnessReason::SubscriptionError, self.error_text.clone())
            }
        }
    }

    /// Own badness merged with every dependency.
    #[must_use]
    pub fn effective_badness(&self) -> Badness {
        self.dependencies
            .iter()
            .fold(self.own_badness(), |acc, (_, dep)| acc.merge(dep.clone()))
    }
}
