//! Correctness Lattice
//!
//! Every stateful collection and subscription reports how far its data can
//! be trusted. The value is one of four levels, ordered from best to worst:
//!
//! ```text
//! Good < Usable < Suspect < Error
//! ```
//!
//! Merging two values keeps the worse one, so `Good` is the identity element.
//! A [`Badness`] pairs a reason code with free text and carries the
//! correctness implied by its reason.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Correctness
// =============================================================================

/// Four-level correctness of a collection or subscription.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Correctness {
    /// Data is complete and current.
    #[default]
    Good,
    /// Data can be shown but may be incomplete.
    Usable,
    /// Data cannot be relied upon (offline, resynchronising).
    Suspect,
    /// Data is known to be wrong or missing.
    Error,
}

impl Correctness {
    /// Merge two values, keeping the worse one.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }

    /// Merge any number of values. An empty iterator yields `Good`.
    #[must_use]
    pub fn merge_all(values: impl IntoIterator<Item = Self>) -> Self {
        values.into_iter().fold(Self::Good, Self::merge)
    }

    /// Whether consumers may display data with this correctness.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Good | Self::Usable)
    }

    /// Upper-case name used in logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Good => "GOOD",
            Self::Usable => "USABLE",
            Self::Suspect => "SUSPECT",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Correctness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Badness
// =============================================================================

/// Reason a collection or subscription is not fully `Good`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BadnessReason {
    /// Nothing is wrong.
    #[default]
    NotBad,
    /// Subscription has not been activated.
    Inactive,
    /// Feed connection is offline.
    ConnectionOffline,
    /// Subscription request sent, waiting for the initial data set.
    Synchronising,
    /// Data set received but some dependent data is still arriving.
    PartiallySynchronised,
    /// Server reported an error for the subscription.
    SubscriptionError,
    /// Server sent data that could not be reconciled.
    DataError,
    /// Feed connection has been finalised and will not recover.
    FeedFinalised,
}

impl BadnessReason {
    /// Correctness implied by this reason.
    #[must_use]
    pub const fn correctness(self) -> Correctness {
        match self {
            Self::NotBad => Correctness::Good,
            Self::PartiallySynchronised => Correctness::Usable,
            Self::Inactive | Self::ConnectionOffline | Self::Synchronising => {
                Correctness::Suspect
            }
            Self::SubscriptionError | Self::DataError | Self::FeedFinalised => Correctness::Error,
        }
    }

    /// Human-readable description for display.
    #[must_use]
    pub const fn display(self) -> &'static str {
        match self {
            Self::NotBad => "",
            Self::Inactive => "Inactive",
            Self::ConnectionOffline => "Connection offline",
            Self::Synchronising => "Synchronising",
            Self::PartiallySynchronised => "Partially synchronised",
            Self::SubscriptionError => "Subscription error",
            Self::DataError => "Data error",
            Self::FeedFinalised => "Feed closed",
        }
    }
}

/// Reason-coded explanation of why data is not fully `Good`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Badness {
    /// Reason code.
    pub reason: BadnessReason,
    /// Free-text detail (server error text, etc.).
    pub extra: String,
}

impl Badness {
    /// The identity badness.
    pub const NOT_BAD: Self = Self {
        reason: BadnessReason::NotBad,
        extra: String::new(),
    };

    /// Create a badness with no extra text.
    #[must_use]
    pub const fn new(reason: BadnessReason) -> Self {
        Self {
            reason,
            extra: String::new(),
        }
    }

    /// Create a badness with extra text.
    #[must_use]
    pub fn with_extra(reason: BadnessReason, extra: impl Into<String>) -> Self {
        Self {
            reason,
            extra: extra.into(),
        }
    }

    /// Correctness implied by the reason.
    #[must_use]
    pub const fn correctness(&self) -> Correctness {
        self.reason.correctness()
    }

    /// Whether this badness still allows display.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.correctness().is_usable()
    }

    /// Whether nothing is wrong.
    #[must_use]
    pub const fn is_good(&self) -> bool {
        matches!(self.reason, BadnessReason::NotBad)
    }

    /// Merge two badness values, keeping the one with the worse correctness.
    ///
    /// Ties keep `self`.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if other.correctness() > self.correctness() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Badness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extra.is_empty() {
            f.write_str(self.reason.display())
        } else {
            write!(f, "{}: {}", self.reason.display(), self.extra)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
