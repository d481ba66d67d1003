//! Domain Layer - Core synchronisation types and state machines.
//!
//! Pure types with no I/O: the correctness lattice, the keyed record list,
//! AURC change records, the streamed entities and the connection state
//! engine.

/// AURC change records and the reconcilable record contract.
pub mod aurc;

/// Accounts registry and market/account codes.
pub mod catalog;

/// Feed connection state engine.
pub mod connection;

/// Correctness lattice and badness.
pub mod correctness;

/// Streamed entity records.
pub mod entities;

/// Multicast event registry.
pub mod notify;

/// Indexed, map-keyed record collection.
pub mod record_list;
