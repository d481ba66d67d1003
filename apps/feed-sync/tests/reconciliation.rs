//! Reconciliation Integration Tests
//!
//! Drives data items through a feed session with decoded messages and
//! checks the resulting list, notifications and anomaly reporting.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use proptest::prelude::*;
use rust_decimal_macros::dec;

use feed_sync::application::services::{OrdersDataItem, RecordChange, RecordPayload};
use feed_sync::domain::connection::{DiagnosticsSink, NoopDiagnostics};
use feed_sync::domain::entities::{
    Order, OrderChange, OrderField, OrderKey, OrderRoute, OrderRouting, OrderSide, OrderStatus,
    OrderTrigger, SymbolKey, TradableSymbol, WatchmakerEntry,
};
use feed_sync::{
    AccountCode, ChangeRecord, ClearScope, DataAnomaly, DataMessage, DataMessagePayload,
    DuplicateAddPolicy, EngineOutput, FeedSession, ListChange, ListChangeKind, MarketCode,
};

// =============================================================================
// Helpers
// =============================================================================

#[derive(Default)]
struct AnomalyLog(Mutex<Vec<String>>);

impl DiagnosticsSink for AnomalyLog {
    fn data_anomaly(&self, anomaly: &DataAnomaly) {
        self.0.lock().push(anomaly.to_string());
    }
}

fn order(id: &str, account: &str) -> Order {
    let at = Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap();
    Order {
        order_id: id.to_string(),
        account_code: AccountCode::new(account),
        code: "CBA".to_string(),
        market_code: "ASX".into(),
        side: OrderSide::Sell,
        status: OrderStatus::Working,
        quantity: dec!(100),
        executed_quantity: dec!(0),
        limit_price: Some(dec!(101.25)),
        routing: OrderRouting {
            route: OrderRoute::BestMarket,
            trigger: OrderTrigger::Immediate,
            currency: "AUD".to_string(),
        },
        created_at: at,
        updated_at: at,
    }
}

struct Recorded {
    lists: Arc<Mutex<Vec<ListChange>>>,
    records: Arc<Mutex<Vec<RecordChange<Order>>>>,
}

fn record(item: &OrdersDataItem) -> Recorded {
    let lists = Arc::new(Mutex::new(Vec::new()));
    let records = Arc::new(Mutex::new(Vec::new()));
    let l = Arc::clone(&lists);
    item.list_changed().subscribe(move |c: &ListChange| l.lock().push(*c));
    let r = Arc::clone(&records);
    item.record_changed()
        .subscribe(move |c: &RecordChange<Order>| r.lock().push(c.clone()));
    Recorded { lists, records }
}

/// Session with one synchronised orders item. Returns the item id and the
/// request number in force.
fn synchronised_session(sink: Arc<dyn DiagnosticsSink>) -> (FeedSession, u64, u32) {
    let mut session = FeedSession::new(sink);
    session.apply_engine_output(&EngineOutput::CameOnline);
    let (id, request) = session.open::<Order>(DuplicateAddPolicy::Drop);
    let request_nr = request.unwrap().request_nr;
    assert!(session.route(DataMessage::new(id, request_nr, DataMessagePayload::Synchronised)));
    (session, id, request_nr)
}

fn orders(id: u64, request_nr: u32, batch: Vec<ChangeRecord<Order>>) -> DataMessage {
    DataMessage::new(id, request_nr, DataMessagePayload::Orders(batch))
}

fn symbol(code: &str, market: &str) -> TradableSymbol {
    TradableSymbol {
        code: code.to_string(),
        market_code: MarketCode::new(market),
        name: code.to_string(),
        exchange: market.to_string(),
        lot_size: dec!(1),
        tick_size: dec!(0.01),
        tradable: true,
    }
}

fn watch_entry(id: &str, position: u32) -> WatchmakerEntry {
    WatchmakerEntry {
        entry_id: id.to_string(),
        code: "BHP".to_string(),
        market_code: "ASX".into(),
        position,
        note: String::new(),
    }
}

/// Opens and synchronises an item for `R`. Returns its id and request number.
fn open_synchronised<R: RecordPayload + 'static>(
    session: &mut FeedSession,
) -> (u64, u32) {
    let (id, request) = session.open::<R>(DuplicateAddPolicy::Drop);
    let request_nr = request.unwrap().request_nr;
    assert!(session.route(DataMessage::new(id, request_nr, DataMessagePayload::Synchronised)));
    (id, request_nr)
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn add_add_update_inserts_once_then_changes_one_field() {
    let (mut session, id, nr) = synchronised_session(Arc::new(NoopDiagnostics));
    let recorded = record(session.item::<Order>(id).unwrap());

    session.route(orders(
        id,
        nr,
        vec![
            ChangeRecord::Add(order("1", "A1")),
            ChangeRecord::Add(order("2", "A1")),
            ChangeRecord::Update(OrderChange::new("1", "A1").with_status(OrderStatus::Filled)),
        ],
    ));

    let item = session.item::<Order>(id).unwrap();
    assert_eq!(item.len(), 2);
    assert_eq!(
        item.get(&OrderKey::new("1", "A1")).map(|o| o.status),
        Some(OrderStatus::Filled)
    );
    assert_eq!(*recorded.lists.lock(), vec![ListChange::insert(0, 2)]);

    let records = recorded.records.lock();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, OrderKey::new("1", "A1"));
    assert_eq!(records[0].index, 0);
    assert_eq!(records[0].fields, vec![OrderField::Status]);
}

#[test]
fn remove_of_unknown_key_is_a_data_error_only() {
    let log = Arc::new(AnomalyLog::default());
    let (mut session, id, nr) = synchronised_session(log.clone());
    session.route(orders(id, nr, vec![ChangeRecord::Add(order("1", "A1"))]));
    let recorded = record(session.item::<Order>(id).unwrap());

    session.route(orders(
        id,
        nr,
        vec![ChangeRecord::Remove(OrderKey::new("99", "A1"))],
    ));

    let item = session.item::<Order>(id).unwrap();
    assert_eq!(item.len(), 1);
    assert_eq!(item.anomaly_count(), 1);
    assert_eq!(*log.0.lock(), vec!["order remove for unknown key 99|A1".to_string()]);
    assert!(recorded.lists.lock().is_empty());
    assert!(recorded.records.lock().is_empty());
}

#[test]
fn clear_of_empty_scope_is_silent() {
    let (mut session, id, nr) = synchronised_session(Arc::new(NoopDiagnostics));
    session.route(orders(
        id,
        nr,
        vec![
            ChangeRecord::Add(order("1", "A1")),
            ChangeRecord::Add(order("2", "B2")),
        ],
    ));
    let recorded = record(session.item::<Order>(id).unwrap());

    let clear_a1 = || ChangeRecord::Clear(ClearScope::Scope(AccountCode::new("A1")));
    session.route(orders(id, nr, vec![clear_a1()]));
    session.route(orders(id, nr, vec![clear_a1()]));

    assert_eq!(*recorded.lists.lock(), vec![ListChange::remove(0, 1)]);
    assert_eq!(session.item::<Order>(id).unwrap().len(), 1);
}

#[test]
fn reconnect_resubscribes_and_ignores_old_responses() {
    let (mut session, id, nr) = synchronised_session(Arc::new(NoopDiagnostics));
    session.route(orders(id, nr, vec![ChangeRecord::Add(order("1", "A1"))]));
    let recorded = record(session.item::<Order>(id).unwrap());

    session.apply_engine_output(&EngineOutput::WentOffline);
    let requests = session.apply_engine_output(&EngineOutput::CameOnline);
    assert_eq!(requests.len(), 1);
    let new_nr = requests[0].request_nr;
    assert!(new_nr > nr);

    assert!(!session.route(orders(id, nr, vec![ChangeRecord::Add(order("2", "A1"))])));
    assert!(session.route(orders(
        id,
        new_nr,
        vec![ChangeRecord::Add(order("3", "A1"))],
    )));
    session.route(DataMessage::new(id, new_nr, DataMessagePayload::Synchronised));

    let kinds: Vec<ListChangeKind> = recorded.lists.lock().iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ListChangeKind::Unusable,
            ListChangeKind::PreUsableClear,
            ListChangeKind::PreUsableAdd,
            ListChangeKind::Usable,
        ]
    );
    let item = session.item::<Order>(id).unwrap();
    assert!(item.is_usable());
    assert!(item.get(&OrderKey::new("3", "A1")).is_some());
    assert_eq!(item.len(), 1);
}

#[test]
fn resubscribe_snapshot_replaces_records_deleted_while_offline() {
    let log = Arc::new(AnomalyLog::default());
    let (mut session, id, nr) = synchronised_session(log.clone());
    session.route(orders(
        id,
        nr,
        vec![
            ChangeRecord::Add(order("1", "A1")),
            ChangeRecord::Add(order("2", "A1")),
        ],
    ));
    let recorded = record(session.item::<Order>(id).unwrap());

    session.apply_engine_output(&EngineOutput::WentOffline);
    let requests = session.apply_engine_output(&EngineOutput::CameOnline);
    let new_nr = requests[0].request_nr;
    session.route(orders(id, new_nr, vec![ChangeRecord::Add(order("1", "A1"))]));
    session.route(DataMessage::new(id, new_nr, DataMessagePayload::Synchronised));

    let item = session.item::<Order>(id).unwrap();
    assert!(item.is_usable());
    assert_eq!(item.len(), 1);
    assert!(item.get(&OrderKey::new("2", "A1")).is_none());
    assert_eq!(item.anomaly_count(), 0);
    assert!(log.0.lock().is_empty());
    assert_eq!(
        *recorded.lists.lock(),
        vec![
            ListChange::usability(false, 2),
            ListChange::clear(2).for_usability(false),
            ListChange::insert(0, 1).for_usability(false),
            ListChange::usability(true, 1),
        ]
    );
}

#[test]
fn symbol_clear_for_one_market_keeps_other_markets() {
    let mut session = FeedSession::new(Arc::new(NoopDiagnostics));
    session.apply_engine_output(&EngineOutput::CameOnline);
    let (id, nr) = open_synchronised::<TradableSymbol>(&mut session);
    let symbols = |batch| DataMessage::new(id, nr, DataMessagePayload::Symbols(batch));
    session.route(symbols(vec![
        ChangeRecord::Add(symbol("BHP", "ASX")),
        ChangeRecord::Add(symbol("AAPL", "NASDAQ")),
        ChangeRecord::Add(symbol("CBA", "ASX")),
    ]));
    let lists = Arc::new(Mutex::new(Vec::new()));
    let l = Arc::clone(&lists);
    session
        .item::<TradableSymbol>(id)
        .unwrap()
        .list_changed()
        .subscribe(move |c: &ListChange| l.lock().push(*c));

    session.route(symbols(vec![ChangeRecord::Clear(ClearScope::Scope(
        MarketCode::new("ASX"),
    ))]));

    let item = session.item::<TradableSymbol>(id).unwrap();
    assert_eq!(item.len(), 1);
    assert!(
        item.get(&SymbolKey {
            code: "AAPL".to_string(),
            market_code: MarketCode::new("NASDAQ"),
        })
        .is_some()
    );
    assert_eq!(
        *lists.lock(),
        vec![ListChange::remove(2, 1), ListChange::remove(0, 1)]
    );
}

#[test]
fn watchmaker_scoped_clear_empties_the_list() {
    let mut session = FeedSession::new(Arc::new(NoopDiagnostics));
    session.apply_engine_output(&EngineOutput::CameOnline);
    let (id, nr) = open_synchronised::<WatchmakerEntry>(&mut session);
    let entries = |batch| DataMessage::new(id, nr, DataMessagePayload::WatchmakerEntries(batch));
    session.route(entries(vec![
        ChangeRecord::Add(watch_entry("w-1", 0)),
        ChangeRecord::Add(watch_entry("w-2", 1)),
    ]));
    let lists = Arc::new(Mutex::new(Vec::new()));
    let l = Arc::clone(&lists);
    session
        .item::<WatchmakerEntry>(id)
        .unwrap()
        .list_changed()
        .subscribe(move |c: &ListChange| l.lock().push(*c));

    session.route(entries(vec![ChangeRecord::Clear(ClearScope::Scope(()))]));
    session.route(entries(vec![ChangeRecord::Clear(ClearScope::Scope(()))]));

    assert_eq!(session.item::<WatchmakerEntry>(id).unwrap().len(), 0);
    assert_eq!(*lists.lock(), vec![ListChange::clear(2)]);
}

#[test]
fn subscription_error_makes_item_unusable() {
    let (mut session, id, nr) = synchronised_session(Arc::new(NoopDiagnostics));

    session.route(DataMessage::new(
        id,
        nr,
        DataMessagePayload::SubscriptionError {
            error: "not permitted".to_string(),
        },
    ));

    let item = session.item::<Order>(id).unwrap();
    assert!(!item.is_usable());
    assert_eq!(item.badness().extra, "not permitted");
}

// =============================================================================
// Properties
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Add(u8, bool),
    Update(u8, bool),
    Remove(u8, bool),
    ClearAccount(bool),
    ClearAll,
}

fn account(first: bool) -> &'static str {
    if first { "A1" } else { "B2" }
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..8, any::<bool>()).prop_map(|(k, a)| Op::Add(k, a)),
        2 => (0u8..8, any::<bool>()).prop_map(|(k, a)| Op::Update(k, a)),
        2 => (0u8..8, any::<bool>()).prop_map(|(k, a)| Op::Remove(k, a)),
        1 => any::<bool>().prop_map(Op::ClearAccount),
        1 => Just(Op::ClearAll),
    ]
}

fn to_record(op: &Op) -> ChangeRecord<Order> {
    match op {
        Op::Add(k, a) => ChangeRecord::Add(order(&k.to_string(), account(*a))),
        Op::Update(k, a) => ChangeRecord::Update(
            OrderChange::new(k.to_string(), account(*a)).with_status(OrderStatus::PartiallyFilled),
        ),
        Op::Remove(k, a) => ChangeRecord::Remove(OrderKey::new(k.to_string(), account(*a))),
        Op::ClearAccount(a) => ChangeRecord::Clear(ClearScope::Scope(AccountCode::new(account(*a)))),
        Op::ClearAll => ChangeRecord::Clear(ClearScope::All),
    }
}

/// Net record count implied by a list change.
fn delta(change: &ListChange) -> i64 {
    let count = i64::try_from(change.count).unwrap();
    match change.kind {
        ListChangeKind::Insert | ListChangeKind::PreUsableAdd => count,
        ListChangeKind::Remove | ListChangeKind::Clear | ListChangeKind::PreUsableClear => -count,
        ListChangeKind::Replace | ListChangeKind::Usable | ListChangeKind::Unusable => 0,
    }
}

proptest! {
    #[test]
    fn list_matches_model_after_every_batch(batches in prop::collection::vec(prop::collection::vec(op(), 0..12), 1..8)) {
        let (mut session, id, nr) = synchronised_session(Arc::new(NoopDiagnostics));
        let recorded = record(session.item::<Order>(id).unwrap());
        let mut model: HashSet<(u8, bool)> = HashSet::new();

        for batch in batches {
            for op in &batch {
                match op {
                    Op::Add(k, a) => { model.insert((*k, *a)); }
                    Op::Remove(k, a) => { model.remove(&(*k, *a)); }
                    Op::ClearAccount(a) => model.retain(|(_, acct)| acct != a),
                    Op::ClearAll => model.clear(),
                    Op::Update(..) => {}
                }
            }
            session.route(orders(id, nr, batch.iter().map(to_record).collect()));

            let item = session.item::<Order>(id).unwrap();
            prop_assert!(item.records().is_consistent());
            prop_assert_eq!(item.len(), model.len());

            let net: i64 = recorded.lists.lock().iter().map(delta).sum();
            prop_assert_eq!(net, i64::try_from(item.len()).unwrap());
        }
    }

    #[test]
    fn consecutive_adds_then_update_notify_once_each(count in 1usize..24, target in 0usize..24) {
        let (mut session, id, nr) = synchronised_session(Arc::new(NoopDiagnostics));
        let recorded = record(session.item::<Order>(id).unwrap());
        let target = target % count;

        let mut batch: Vec<ChangeRecord<Order>> = (0..count)
            .map(|i| ChangeRecord::Add(order(&i.to_string(), "A1")))
            .collect();
        batch.push(ChangeRecord::Update(
            OrderChange::new(target.to_string(), "A1").with_status(OrderStatus::Cancelled),
        ));
        session.route(orders(id, nr, batch));

        prop_assert_eq!(recorded.lists.lock().clone(), vec![ListChange::insert(0, count)]);
        let records = recorded.records.lock();
        prop_assert_eq!(records.len(), 1);
        prop_assert_eq!(records[0].index, target);
    }
}
