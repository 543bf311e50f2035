//! End-to-end reservation flow against the mock coordinator.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use surebet_reserve::allocation::adjustment::{adjust_real_balance, BetResult};
use surebet_reserve::allocation::waterfall::allocate;
use surebet_reserve::coordinator::{
    AdvisoryErrorCode, BetCommitRequest, FormKind, MockCoordinator, ReservationAdvisor,
    SettlementAuthority,
};
use surebet_reserve::error::CoordinatorError;
use surebet_reserve::feed::ReservedLedger;
use surebet_reserve::session::{ReservationSession, SessionCommand, SessionEvent, SessionHandle};
use tokio::sync::mpsc;

fn spawn_session(
    mock: Arc<MockCoordinator>,
) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
    let (session, handle, events) = ReservationSession::new(
        mock,
        "tenant-1".to_string(),
        "BRL".to_string(),
        FormKind::ArbitrageLeg,
        Duration::from_millis(500),
        None,
    );
    tokio::spawn(session.run());
    (handle, events)
}

async fn reserve(
    handle: &SessionHandle,
    events: &mut mpsc::Receiver<SessionEvent>,
    bookmaker: &str,
    stake: rust_decimal::Decimal,
) -> rust_decimal::Decimal {
    handle
        .send(SessionCommand::StakeChanged {
            bookmaker_id: bookmaker.to_string(),
            stake,
        })
        .await
        .unwrap();

    match events.recv().await.unwrap() {
        SessionEvent::Reserved {
            available_balance, ..
        } => available_balance,
        other => panic!("expected Reserved, got {other:?}"),
    }
}

fn bet(session_id: &str, bookmaker: &str, stake: rust_decimal::Decimal) -> BetCommitRequest {
    BetCommitRequest {
        session_id: session_id.to_string(),
        tenant_id: "tenant-1".to_string(),
        bookmaker_id: bookmaker.to_string(),
        stake,
        currency: "BRL".to_string(),
    }
}

/// Two sessions stake against the same bookmaker. The advisory view shows
/// the conflict but never blocks; the authoritative create-bet transaction
/// is what refuses the second stake once the ledger is short.
#[tokio::test(start_paused = true)]
async fn concurrent_sessions_and_authoritative_commit() {
    let mock = Arc::new(MockCoordinator::new());
    mock.set_balances("bk-1", dec!(100), dec!(0), dec!(0));

    let (handle_a, mut events_a) = spawn_session(mock.clone());
    let (handle_b, mut events_b) = spawn_session(mock.clone());

    let available_a = reserve(&handle_a, &mut events_a, "bk-1", dec!(60)).await;
    assert_eq!(available_a, dec!(100));

    // Session B sees A's reservation in its advisory view.
    let available_b = reserve(&handle_b, &mut events_b, "bk-1", dec!(50)).await;
    assert_eq!(available_b, dec!(40));

    // Both reservations coexist: advisory, not a lock.
    assert_eq!(mock.active_reservations(handle_a.session_id()).len(), 1);
    assert_eq!(mock.active_reservations(handle_b.session_id()).len(), 1);

    // A commits first and the ledger is debited.
    let receipt = mock
        .create_bet(bet(handle_a.session_id(), "bk-1", dec!(60)))
        .await
        .unwrap();
    assert_eq!(receipt.debited, dec!(60));
    assert_eq!(mock.ledger_balance("bk-1"), dec!(40));

    // B's commit fails the authoritative check with structured figures.
    let err = mock
        .create_bet(bet(handle_b.session_id(), "bk-1", dec!(50)))
        .await
        .unwrap_err();

    match err {
        CoordinatorError::Rejected {
            code,
            available,
            required,
            ..
        } => {
            assert_eq!(code, AdvisoryErrorCode::SaldoInsuficiente);
            assert_eq!(available, Some(dec!(40)));
            assert_eq!(required, Some(dec!(50)));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

/// Rapid stake edits on one session keep a single reservation row: the
/// debounce collapses them client-side and the upsert is keyed by
/// (bookmaker, session) at the coordinator.
#[tokio::test(start_paused = true)]
async fn single_reservation_per_session_and_bookmaker() {
    let mock = Arc::new(MockCoordinator::new());
    mock.set_balances("bk-1", dec!(500), dec!(0), dec!(0));

    let (handle, mut events) = spawn_session(mock.clone());

    reserve(&handle, &mut events, "bk-1", dec!(10)).await;
    reserve(&handle, &mut events, "bk-1", dec!(20)).await;
    reserve(&handle, &mut events, "bk-1", dec!(35)).await;

    let rows = mock.active_reservations(handle.session_id());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].stake, dec!(35));
}

/// Closing a form without saving releases the reservation.
#[tokio::test(start_paused = true)]
async fn close_without_save_releases() {
    let mock = Arc::new(MockCoordinator::new());
    mock.set_balances("bk-1", dec!(100), dec!(0), dec!(0));

    let (handle, mut events) = spawn_session(mock.clone());
    reserve(&handle, &mut events, "bk-1", dec!(40)).await;

    handle.send(SessionCommand::Close).await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::Cancelled
    ));
    assert!(mock.active_reservations(handle.session_id()).is_empty());

    // Cancel is idempotent at the coordinator.
    mock.cancel(handle.session_id()).await.unwrap();
}

/// Saving commits the reservation and closes the session; a repeated commit
/// for the same session is a no-op.
#[tokio::test(start_paused = true)]
async fn save_commits_idempotently() {
    let mock = Arc::new(MockCoordinator::new());
    mock.set_balances("bk-1", dec!(100), dec!(0), dec!(0));

    let (handle, mut events) = spawn_session(mock.clone());
    reserve(&handle, &mut events, "bk-1", dec!(30)).await;

    handle.send(SessionCommand::Save).await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::Committed
    ));
    assert!(mock.active_reservations(handle.session_id()).is_empty());

    mock.commit(handle.session_id()).await.unwrap();
    mock.commit(handle.session_id()).await.unwrap();
}

/// Feed events from other sessions build the reserved-by-others view; the
/// consumer's own events are discarded.
#[tokio::test(start_paused = true)]
async fn feed_builds_reserved_by_others_view() {
    let mock = Arc::new(MockCoordinator::new());
    mock.set_balances("bk-1", dec!(100), dec!(0), dec!(0));

    let mut feed = mock.feed_events();

    let (handle_a, mut events_a) = spawn_session(mock.clone());
    let (handle_b, mut events_b) = spawn_session(mock.clone());

    reserve(&handle_a, &mut events_a, "bk-1", dec!(60)).await;
    reserve(&handle_b, &mut events_b, "bk-1", dec!(25)).await;

    // Consume the feed from session B's perspective.
    let ledger = ReservedLedger::new(handle_b.session_id());
    ledger.apply(&feed.recv().await.unwrap());
    ledger.apply(&feed.recv().await.unwrap());

    assert_eq!(ledger.reserved_by_others("bk-1"), dec!(60));

    // A cancels; the view drops to zero.
    handle_a.send(SessionCommand::Close).await.unwrap();
    assert!(matches!(
        events_a.recv().await.unwrap(),
        SessionEvent::Cancelled
    ));
    ledger.apply(&feed.recv().await.unwrap());

    assert_eq!(ledger.reserved_by_others("bk-1"), dec!(0));
}

/// Waterfall preview over live advisory figures: tiers drain in order and
/// the shortfall is data, not an error.
#[tokio::test(start_paused = true)]
async fn waterfall_preview_over_advisory_view() {
    let mock = Arc::new(MockCoordinator::new());
    mock.set_balances("bk-1", dec!(100), dec!(0), dec!(0));

    let (handle_a, mut events_a) = spawn_session(mock.clone());
    let (handle_b, mut events_b) = spawn_session(mock.clone());

    reserve(&handle_a, &mut events_a, "bk-1", dec!(60)).await;
    let available_b = reserve(&handle_b, &mut events_b, "bk-1", dec!(100)).await;
    assert_eq!(available_b, dec!(40));

    // Session B previews its 100 stake against bonus 30, free-bet 20 and
    // the 40 the advisory view says is left.
    let allocation = allocate(dec!(100), dec!(30), dec!(20), available_b, true);
    assert_eq!(allocation.from_bonus, dec!(30));
    assert_eq!(allocation.from_free_bet, dec!(20));
    assert_eq!(allocation.from_real, dec!(40));
    assert_eq!(allocation.shortfall, dec!(10));
    assert!(!allocation.fully_covered);
}

/// Editing a saved bet adds the previous stake back before the preview when
/// the bet is open or lost, and leaves the balance alone when it settled
/// into it.
#[test]
fn edit_mode_adjustment_feeds_the_waterfall() {
    // Lost bet: stake 50 comes back, then the waterfall sees 250.
    let adjusted = adjust_real_balance(dec!(200), dec!(50), Some(BetResult::Red));
    assert_eq!(adjusted, dec!(250));

    let allocation = allocate(dec!(250), dec!(0), dec!(0), adjusted, false);
    assert!(allocation.fully_covered);

    // Won bet: payout already landed, no correction.
    let adjusted = adjust_real_balance(dec!(200), dec!(50), Some(BetResult::Green));
    assert_eq!(adjusted, dec!(200));
}
