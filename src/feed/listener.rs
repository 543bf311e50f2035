//! Reserved-balance view maintained from change feed events.

use std::collections::HashMap;
use std::time::Instant;

use dashmap::DashMap;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::coordinator::{FormKind, Reservation, ReservationStatus};
use crate::metrics;

/// Invalidation channel depth.
const INVALIDATION_BUFFER: usize = 256;

/// One reservation mutation from the change feed.
#[derive(Debug, Clone)]
pub struct FeedEvent {
    /// Reservation row id.
    pub reservation_id: String,
    /// Bookmaker the reservation targets.
    pub bookmaker_id: String,
    /// Tenant scope.
    pub tenant_id: String,
    /// Owning session.
    pub session_id: String,
    /// Reserved stake.
    pub stake: Decimal,
    /// Currency code, when the feed reports it.
    pub currency: Option<String>,
    /// Owning form kind, when the feed reports it.
    pub form_kind: Option<FormKind>,
    /// Expiry deadline stamped by the coordinator's TTL sweep. Carried
    /// through for display; clients never enforce it.
    pub expires_at: Option<OffsetDateTime>,
    /// Status after the mutation.
    pub status: ReservationStatus,
}

impl FeedEvent {
    /// Build an event from a reservation row.
    pub fn from_reservation(reservation: &Reservation) -> Self {
        Self {
            reservation_id: reservation.id.clone(),
            bookmaker_id: reservation.bookmaker_id.clone(),
            tenant_id: reservation.tenant_id.clone(),
            session_id: reservation.session_id.clone(),
            stake: reservation.stake,
            currency: Some(reservation.currency.clone()),
            form_kind: Some(reservation.form_kind),
            expires_at: Some(reservation.expires_at),
            status: reservation.status,
        }
    }
}

/// A bookmaker whose displayed balance should be recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    /// Bookmaker whose balance view changed.
    pub bookmaker_id: String,
}

/// Aggregate view over the tracked reservations, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LedgerStats {
    /// Number of bookmakers with at least one tracked reservation.
    pub bookmakers: usize,
    /// Sum of all tracked stakes.
    pub total_reserved: Decimal,
}

/// Per-bookmaker reserved-by-others view.
///
/// Events from the ledger's own session are discarded: the session loop
/// already knows its own reservation and must not double-count it.
#[derive(Debug)]
pub struct ReservedLedger {
    /// Session whose events are discarded.
    own_session_id: String,
    /// Bookmaker -> (reservation id -> stake) for active rows.
    reservations: DashMap<String, HashMap<String, Decimal>>,
    /// Balance invalidation fan-out.
    invalidations: broadcast::Sender<Invalidation>,
}

impl ReservedLedger {
    /// Create a ledger that ignores the given session's own events.
    pub fn new(own_session_id: impl Into<String>) -> Self {
        let (invalidations, _) = broadcast::channel(INVALIDATION_BUFFER);
        Self {
            own_session_id: own_session_id.into(),
            reservations: DashMap::new(),
            invalidations,
        }
    }

    /// Subscribe to balance invalidations.
    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.invalidations.subscribe()
    }

    /// Sum of other sessions' active reservations on a bookmaker.
    pub fn reserved_by_others(&self, bookmaker_id: &str) -> Decimal {
        self.reservations
            .get(bookmaker_id)
            .map(|rows| rows.values().copied().sum())
            .unwrap_or_default()
    }

    /// Number of bookmakers with at least one tracked reservation.
    pub fn tracked_bookmakers(&self) -> usize {
        self.reservations
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .count()
    }

    /// Aggregate stats for the status endpoint.
    pub fn stats(&self) -> LedgerStats {
        let total_reserved = self
            .reservations
            .iter()
            .map(|entry| entry.value().values().copied().sum::<Decimal>())
            .sum();

        LedgerStats {
            bookmakers: self.tracked_bookmakers(),
            total_reserved,
        }
    }

    /// Fold one feed event into the view.
    pub fn apply(&self, event: &FeedEvent) {
        metrics::inc_feed_events_received();

        if event.session_id == self.own_session_id {
            metrics::inc_feed_events_discarded();
            return;
        }

        let start = Instant::now();

        {
            let mut rows = self.reservations.entry(event.bookmaker_id.clone()).or_default();
            if event.status.is_active() {
                rows.insert(event.reservation_id.clone(), event.stake);
            } else {
                // Committed, cancelled and expired all stop counting.
                rows.remove(&event.reservation_id);
            }
        }

        metrics::record_feed_apply_latency(start);

        debug!(
            bookmaker = %event.bookmaker_id,
            reserved = %self.reserved_by_others(&event.bookmaker_id),
            status = %event.status,
            "Feed event applied"
        );

        // Nobody subscribed is fine.
        let _ = self.invalidations.send(Invalidation {
            bookmaker_id: event.bookmaker_id.clone(),
        });
    }

    /// Consume events from a feed socket until the channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<FeedEvent>) {
        while let Some(event) = events.recv().await {
            self.apply(&event);
        }
        info!("Feed channel closed, ledger stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn event(
        reservation_id: &str,
        bookmaker: &str,
        session: &str,
        stake: Decimal,
        status: ReservationStatus,
    ) -> FeedEvent {
        FeedEvent {
            reservation_id: reservation_id.to_string(),
            bookmaker_id: bookmaker.to_string(),
            tenant_id: "tenant-1".to_string(),
            session_id: session.to_string(),
            stake,
            currency: Some("BRL".to_string()),
            form_kind: Some(FormKind::Single),
            expires_at: None,
            status,
        }
    }

    #[test]
    fn active_events_accumulate_per_bookmaker() {
        let ledger = ReservedLedger::new("me");

        ledger.apply(&event("r1", "bk-1", "s-1", dec!(60), ReservationStatus::Active));
        ledger.apply(&event("r2", "bk-1", "s-2", dec!(25), ReservationStatus::Active));
        ledger.apply(&event("r3", "bk-2", "s-3", dec!(10), ReservationStatus::Active));

        assert_eq!(ledger.reserved_by_others("bk-1"), dec!(85));
        assert_eq!(ledger.reserved_by_others("bk-2"), dec!(10));
        assert_eq!(ledger.reserved_by_others("bk-3"), dec!(0));
        assert_eq!(ledger.tracked_bookmakers(), 2);
    }

    #[test]
    fn stake_update_replaces_not_adds() {
        let ledger = ReservedLedger::new("me");

        ledger.apply(&event("r1", "bk-1", "s-1", dec!(60), ReservationStatus::Active));
        ledger.apply(&event("r1", "bk-1", "s-1", dec!(45), ReservationStatus::Active));

        assert_eq!(ledger.reserved_by_others("bk-1"), dec!(45));
    }

    #[test]
    fn non_active_statuses_remove() {
        let ledger = ReservedLedger::new("me");

        ledger.apply(&event("r1", "bk-1", "s-1", dec!(60), ReservationStatus::Active));
        for status in [
            ReservationStatus::Committed,
            ReservationStatus::Cancelled,
            ReservationStatus::Expired,
        ] {
            ledger.apply(&event("r1", "bk-1", "s-1", dec!(60), ReservationStatus::Active));
            ledger.apply(&event("r1", "bk-1", "s-1", dec!(60), status));
            assert_eq!(ledger.reserved_by_others("bk-1"), dec!(0), "status {status:?}");
        }
    }

    #[test]
    fn own_session_events_are_discarded() {
        let ledger = ReservedLedger::new("me");

        ledger.apply(&event("r1", "bk-1", "me", dec!(60), ReservationStatus::Active));

        assert_eq!(ledger.reserved_by_others("bk-1"), dec!(0));
    }

    #[test]
    fn invalidation_names_the_bookmaker() {
        let ledger = ReservedLedger::new("me");
        let mut rx = ledger.subscribe();

        ledger.apply(&event("r1", "bk-7", "s-1", dec!(5), ReservationStatus::Active));

        assert_eq!(
            rx.try_recv().unwrap(),
            Invalidation {
                bookmaker_id: "bk-7".to_string()
            }
        );
    }

    #[test]
    fn stats_aggregate_all_bookmakers() {
        let ledger = ReservedLedger::new("me");

        ledger.apply(&event("r1", "bk-1", "s-1", dec!(60), ReservationStatus::Active));
        ledger.apply(&event("r2", "bk-2", "s-2", dec!(15), ReservationStatus::Active));

        let stats = ledger.stats();
        assert_eq!(stats.bookmakers, 2);
        assert_eq!(stats.total_reserved, dec!(75));
    }
}
