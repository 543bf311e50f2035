//! Mock coordinator for unit testing and simulation.
//!
//! This module provides an in-process coordinator that can be used in tests
//! without a remote service. It maintains reservation rows and a mock
//! ledger, emits change feed events, and enforces the commit-time balance
//! check the way the real authoritative transaction does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::error::CoordinatorError;
use crate::feed::FeedEvent;

use super::client::{ReservationAdvisor, SettlementAuthority};
use super::types::{
    AdvisoryErrorCode, AvailableBalance, BetCommitReceipt, BetCommitRequest, Reservation,
    ReservationStatus, UpsertRequest, UpsertResponse,
};

/// Reservation TTL stamped on mock rows. Expiry itself is a coordinator
/// sweep, which the mock does not run.
const MOCK_TTL: Duration = Duration::from_secs(90);

/// Tier balances held per mock bookmaker.
#[derive(Debug, Clone, Copy, Default)]
struct TierBalances {
    ledger: Decimal,
    bonus: Decimal,
    free_bet: Decimal,
}

/// Configuration for mock coordinator behavior.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Report the reservation feature as administratively disabled.
    pub disabled: bool,
    /// Whether the project is active (inactive rejects everything).
    pub project_active: bool,
    /// Whether to fail upsert requests at the transport level.
    pub fail_upsert: bool,
    /// Whether to fail commit requests.
    pub fail_commit: bool,
    /// Whether to fail cancel requests.
    pub fail_cancel: bool,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            project_active: true,
            fail_upsert: false,
            fail_commit: false,
            fail_cancel: false,
            latency_ms: 0,
        }
    }
}

/// In-process coordinator for testing.
#[derive(Debug)]
pub struct MockCoordinator {
    /// Mock configuration.
    config: MockConfig,
    /// Tier balances by bookmaker id.
    ledgers: Arc<Mutex<HashMap<String, TierBalances>>>,
    /// Reservation rows keyed by `(bookmaker_id, session_id)`.
    reservations: Arc<Mutex<HashMap<(String, String), Reservation>>>,
    /// Change feed fan-out.
    feed_tx: broadcast::Sender<FeedEvent>,
    /// Monotonic id source.
    next_id: AtomicU64,
    /// Number of upsert calls observed (including failed ones).
    upsert_calls: AtomicU64,
}

impl MockCoordinator {
    /// Create a new mock coordinator with default configuration.
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// Create a mock coordinator with custom configuration.
    pub fn with_config(config: MockConfig) -> Self {
        let (feed_tx, _) = broadcast::channel(256);
        Self {
            config,
            ledgers: Arc::new(Mutex::new(HashMap::new())),
            reservations: Arc::new(Mutex::new(HashMap::new())),
            feed_tx,
            next_id: AtomicU64::new(1),
            upsert_calls: AtomicU64::new(0),
        }
    }

    /// Set the tier balances for a bookmaker, creating it if needed.
    pub fn set_balances(
        &self,
        bookmaker_id: &str,
        ledger: Decimal,
        bonus: Decimal,
        free_bet: Decimal,
    ) {
        let mut ledgers = self.ledgers.lock().unwrap();
        ledgers.insert(
            bookmaker_id.to_string(),
            TierBalances {
                ledger,
                bonus,
                free_bet,
            },
        );
    }

    /// Subscribe to the mock change feed.
    pub fn feed_events(&self) -> broadcast::Receiver<FeedEvent> {
        self.feed_tx.subscribe()
    }

    /// Number of upsert calls observed so far.
    pub fn upsert_count(&self) -> u64 {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Current ledger balance of a bookmaker.
    pub fn ledger_balance(&self, bookmaker_id: &str) -> Decimal {
        self.ledgers
            .lock()
            .unwrap()
            .get(bookmaker_id)
            .map(|b| b.ledger)
            .unwrap_or_default()
    }

    /// Active reservations held by a session, across all bookmakers.
    pub fn active_reservations(&self, session_id: &str) -> Vec<Reservation> {
        self.reservations
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.session_id == session_id && r.status.is_active())
            .cloned()
            .collect()
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    fn emit(&self, reservation: &Reservation) {
        // Nobody listening is fine; the feed is advisory.
        let _ = self.feed_tx.send(FeedEvent::from_reservation(reservation));
    }

    fn reserved_excluding(&self, bookmaker_id: &str, session_id: &str) -> Decimal {
        self.reservations
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                r.bookmaker_id == bookmaker_id
                    && r.session_id != session_id
                    && r.status.is_active()
            })
            .map(|r| r.stake)
            .sum()
    }

    fn transition_session(&self, session_id: &str, status: ReservationStatus) {
        let mut rows = self.reservations.lock().unwrap();
        let mut changed = Vec::new();

        for reservation in rows.values_mut() {
            if reservation.session_id == session_id && reservation.status.is_active() {
                reservation.status = status;
                changed.push(reservation.clone());
            }
        }
        drop(rows);

        for reservation in &changed {
            self.emit(reservation);
        }
    }
}

impl Default for MockCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservationAdvisor for MockCoordinator {
    async fn upsert(&self, request: UpsertRequest) -> Result<UpsertResponse, CoordinatorError> {
        self.simulate_latency().await;
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        if self.config.fail_upsert {
            return Err(CoordinatorError::Rpc("mock upsert failure".to_string()));
        }

        if self.config.disabled {
            return Err(CoordinatorError::Disabled);
        }

        if !self.config.project_active {
            return Err(CoordinatorError::Rejected {
                code: AdvisoryErrorCode::ProjetoInativo,
                message: "project inactive".to_string(),
                available: None,
                required: None,
            });
        }

        let ledger = {
            let ledgers = self.ledgers.lock().unwrap();
            match ledgers.get(&request.bookmaker_id) {
                Some(balances) => balances.ledger,
                None => {
                    return Err(CoordinatorError::Rejected {
                        code: AdvisoryErrorCode::BookmakerNaoVinculada,
                        message: format!("bookmaker {} not linked", request.bookmaker_id),
                        available: None,
                        required: Some(request.stake),
                    })
                }
            }
        };

        let key = (request.bookmaker_id.clone(), request.session_id.clone());
        let reservation = {
            let mut rows = self.reservations.lock().unwrap();
            let row = rows.entry(key).or_insert_with(|| Reservation {
                id: format!("res-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
                bookmaker_id: request.bookmaker_id.clone(),
                tenant_id: request.tenant_id.clone(),
                session_id: request.session_id.clone(),
                stake: request.stake,
                currency: request.currency.clone(),
                form_kind: request.form_kind,
                status: ReservationStatus::Active,
                expires_at: OffsetDateTime::now_utc() + MOCK_TTL,
            });

            // A repeated stake for the same (bookmaker, session) updates
            // the row; a second active row is never created.
            row.stake = request.stake;
            row.status = ReservationStatus::Active;
            row.expires_at = OffsetDateTime::now_utc() + MOCK_TTL;
            row.clone()
        };

        self.emit(&reservation);

        let reserved = self.reserved_excluding(&request.bookmaker_id, &request.session_id);

        Ok(UpsertResponse {
            success: true,
            reservation_id: Some(reservation.id),
            available_balance: ledger - reserved,
            reserved_balance: reserved,
            ledger_balance: ledger,
            error_code: None,
            error_message: None,
        })
    }

    async fn commit(&self, session_id: &str) -> Result<(), CoordinatorError> {
        self.simulate_latency().await;

        if self.config.fail_commit {
            return Err(CoordinatorError::Rpc("mock commit failure".to_string()));
        }

        self.transition_session(session_id, ReservationStatus::Committed);
        Ok(())
    }

    async fn cancel(&self, session_id: &str) -> Result<(), CoordinatorError> {
        self.simulate_latency().await;

        if self.config.fail_cancel {
            return Err(CoordinatorError::Rpc("mock cancel failure".to_string()));
        }

        self.transition_session(session_id, ReservationStatus::Cancelled);
        Ok(())
    }

    async fn query_available(
        &self,
        bookmaker_id: &str,
        exclude_session_id: &str,
    ) -> Result<AvailableBalance, CoordinatorError> {
        self.simulate_latency().await;

        let ledger = self.ledger_balance(bookmaker_id);
        let reserved = self.reserved_excluding(bookmaker_id, exclude_session_id);

        Ok(AvailableBalance {
            ledger_balance: ledger,
            reserved_balance: reserved,
            available_balance: ledger - reserved,
        })
    }
}

impl SettlementAuthority for MockCoordinator {
    async fn create_bet(
        &self,
        request: BetCommitRequest,
    ) -> Result<BetCommitReceipt, CoordinatorError> {
        self.simulate_latency().await;

        if !self.config.project_active {
            return Err(CoordinatorError::Rejected {
                code: AdvisoryErrorCode::ProjetoInativo,
                message: "project inactive".to_string(),
                available: None,
                required: None,
            });
        }

        {
            let mut ledgers = self.ledgers.lock().unwrap();
            let balances = ledgers.get_mut(&request.bookmaker_id).ok_or_else(|| {
                CoordinatorError::Rejected {
                    code: AdvisoryErrorCode::BookmakerNaoVinculada,
                    message: format!("bookmaker {} not linked", request.bookmaker_id),
                    available: None,
                    required: Some(request.stake),
                }
            })?;

            // Authoritative check: the current ledger balance, never the
            // advisory reservation view.
            if request.stake > balances.ledger {
                return Err(CoordinatorError::Rejected {
                    code: AdvisoryErrorCode::SaldoInsuficiente,
                    message: "saldo insuficiente".to_string(),
                    available: Some(balances.ledger),
                    required: Some(request.stake),
                });
            }

            balances.ledger -= request.stake;
        }

        self.transition_session(&request.session_id, ReservationStatus::Committed);

        Ok(BetCommitReceipt {
            bet_id: format!("bet-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            debited: request.stake,
        })
    }
}
