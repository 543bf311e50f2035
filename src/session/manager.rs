//! Reservation session event loop.
//!
//! One tokio task per open form. Commands arrive on an mpsc channel and the
//! loop owns all session state, so the only suspension points are advisor
//! RPCs. The debounce is an explicit armed deadline consumed by `select!`:
//! rapid stake edits overwrite the pending value and only the latest one is
//! ever sent to the coordinator.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::coordinator::{FormKind, ReservationAdvisor, UpsertRequest, UpsertResponse};
use crate::error::{CoordinatorError, SessionError};
use crate::feed::Invalidation;
use crate::metrics;

use super::state::SessionState;

/// Command channel depth per session.
const COMMAND_BUFFER: usize = 32;

/// Commands accepted by a running session.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// The stake input changed (possibly to zero).
    StakeChanged {
        /// Bookmaker the form currently targets.
        bookmaker_id: String,
        /// New stake value.
        stake: Decimal,
    },
    /// The bookmaker selection was cleared or is about to change.
    BookmakerCleared,
    /// The form was saved; commit the reservation.
    Save,
    /// The form was closed without saving.
    Close,
}

/// Lifecycle events emitted by a session.
#[derive(Debug)]
pub enum SessionEvent {
    /// Upsert acknowledged; authoritative balances attached.
    Reserved {
        /// Row id at the coordinator.
        reservation_id: Option<String>,
        /// Ledger minus other sessions' reservations.
        available_balance: Decimal,
        /// Sum of other sessions' active reservations.
        reserved_balance: Decimal,
        /// Committed ledger balance.
        ledger_balance: Decimal,
    },
    /// Upsert refused or failed; the session waits for the next edit.
    ReserveFailed(CoordinatorError),
    /// Active reservations released.
    Cancelled,
    /// Reservations committed; the session is closed.
    Committed,
    /// Commit failed; the reservation stays active.
    CommitFailed(CoordinatorError),
}

/// A stake edit waiting out its debounce window.
#[derive(Debug, Clone)]
struct PendingStake {
    bookmaker_id: String,
    stake: Decimal,
    deadline: Instant,
}

/// Handle for sending commands to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Client-generated session id (uuid v4).
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send a command to the session.
    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed {
                session_id: self.session_id.clone(),
            })
    }
}

/// Per-form reservation session.
///
/// Construct with [`ReservationSession::new`], then drive with
/// `tokio::spawn(session.run())` and talk to it through the returned
/// [`SessionHandle`] and event receiver.
pub struct ReservationSession<A> {
    session_id: String,
    tenant_id: String,
    currency: String,
    form_kind: FormKind,
    advisor: Arc<A>,
    debounce: Duration,
    state: SessionState,
    /// Bookmaker of the currently acknowledged reservation, if any.
    reserved_bookmaker: Option<String>,
    pending: Option<PendingStake>,
    commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::Sender<SessionEvent>,
    invalidations: Option<broadcast::Sender<Invalidation>>,
}

impl<A: ReservationAdvisor> ReservationSession<A> {
    /// Create a session with a fresh uuid-v4 id.
    pub fn new(
        advisor: Arc<A>,
        tenant_id: String,
        currency: String,
        form_kind: FormKind,
        debounce: Duration,
        invalidations: Option<broadcast::Sender<Invalidation>>,
    ) -> (Self, SessionHandle, mpsc::Receiver<SessionEvent>) {
        let session_id = Uuid::new_v4().to_string();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(COMMAND_BUFFER);

        let handle = SessionHandle {
            session_id: session_id.clone(),
            commands: command_tx,
        };

        let session = Self {
            session_id,
            tenant_id,
            currency,
            form_kind,
            advisor,
            debounce,
            state: SessionState::Idle,
            reserved_bookmaker: None,
            pending: None,
            commands: command_rx,
            events: event_tx,
            invalidations,
        };

        (session, handle, event_rx)
    }

    /// Current state, for tests and diagnostics.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until it closes.
    pub async fn run(mut self) {
        info!(session = %self.session_id, "Session started");

        while !self.state.is_terminal() {
            // select! evaluates disabled branch expressions, so the deadline
            // needs a value even when nothing is armed.
            let deadline = self
                .pending
                .as_ref()
                .map(|p| p.deadline)
                .unwrap_or_else(far_future);

            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        // All handles dropped: treat as close-without-save.
                        None => self.close(false).await,
                    }
                }
                _ = sleep_until(deadline), if self.pending.is_some() => {
                    self.flush_pending().await;
                }
            }
        }

        info!(session = %self.session_id, "Session closed");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StakeChanged { bookmaker_id, stake } => {
                self.on_stake_changed(bookmaker_id, stake).await;
            }
            SessionCommand::BookmakerCleared => {
                self.pending = None;
                self.release().await;
                self.state = SessionState::Idle;
            }
            SessionCommand::Save => self.save().await,
            SessionCommand::Close => self.close(false).await,
        }
    }

    async fn on_stake_changed(&mut self, bookmaker_id: String, stake: Decimal) {
        // A session never holds reservations on two bookmakers: a switch
        // cancels the old one before the new debounce is armed.
        if self
            .reserved_bookmaker
            .as_deref()
            .is_some_and(|held| held != bookmaker_id)
        {
            self.release().await;
        }

        if stake <= Decimal::ZERO {
            self.pending = None;
            self.release().await;
            self.state = SessionState::Idle;
            return;
        }

        debug!(
            session = %self.session_id,
            bookmaker = %bookmaker_id,
            stake = %stake,
            "Debounce armed"
        );

        self.pending = Some(PendingStake {
            bookmaker_id,
            stake,
            deadline: Instant::now() + self.debounce,
        });
        self.state = SessionState::Pending;
    }

    /// Send the latest pending stake to the advisor.
    async fn flush_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        self.state = SessionState::Reserving;

        let request = UpsertRequest {
            bookmaker_id: pending.bookmaker_id.clone(),
            tenant_id: self.tenant_id.clone(),
            stake: pending.stake,
            currency: self.currency.clone(),
            session_id: self.session_id.clone(),
            form_kind: self.form_kind,
        };

        match self.advisor.upsert(request).await {
            Ok(response) => self.on_reserved(pending.bookmaker_id, response).await,
            Err(error) => {
                metrics::inc_advisory_errors();
                warn!(session = %self.session_id, error = %error, "Reservation upsert failed");
                let _ = self.events.send(SessionEvent::ReserveFailed(error)).await;
                // No retry timer: the next stake edit re-arms the debounce.
                self.state = SessionState::Pending;
            }
        }
    }

    async fn on_reserved(&mut self, bookmaker_id: String, response: UpsertResponse) {
        metrics::inc_reservations_upserted();
        self.invalidate(&bookmaker_id);
        self.reserved_bookmaker = Some(bookmaker_id);
        self.state = SessionState::Active;

        let _ = self
            .events
            .send(SessionEvent::Reserved {
                reservation_id: response.reservation_id,
                available_balance: response.available_balance,
                reserved_balance: response.reserved_balance,
                ledger_balance: response.ledger_balance,
            })
            .await;
    }

    /// Commit the session's reservations. Success closes the session.
    async fn save(&mut self) {
        // A stake edit still waiting out its debounce is flushed first so
        // the committed reservation reflects the latest value.
        if self.pending.is_some() {
            self.flush_pending().await;
        }

        self.state = SessionState::Committing;

        match self.advisor.commit(&self.session_id).await {
            Ok(()) => {
                metrics::inc_reservations_committed();
                if let Some(bookmaker) = self.reserved_bookmaker.take() {
                    self.invalidate(&bookmaker);
                }
                let _ = self.events.send(SessionEvent::Committed).await;
                self.state = SessionState::Closed;
            }
            Err(error) => {
                metrics::inc_advisory_errors();
                warn!(session = %self.session_id, error = %error, "Commit failed");
                let _ = self.events.send(SessionEvent::CommitFailed(error)).await;
                // An acknowledged reservation stays active until commit
                // succeeds; with nothing held the session waits for the
                // next edit like any other failed attempt.
                self.state = if self.reserved_bookmaker.is_some() {
                    SessionState::Active
                } else {
                    SessionState::Pending
                };
            }
        }
    }

    /// Best-effort cancel of the held reservation, if any.
    async fn release(&mut self) {
        let Some(bookmaker) = self.reserved_bookmaker.take() else {
            return;
        };

        self.state = SessionState::Cancelling;

        match self.advisor.cancel(&self.session_id).await {
            Ok(()) => {
                metrics::inc_reservations_cancelled();
                self.invalidate(&bookmaker);
                let _ = self.events.send(SessionEvent::Cancelled).await;
            }
            Err(error) => {
                // The coordinator TTL sweep is the safety net.
                metrics::inc_advisory_errors();
                warn!(session = %self.session_id, error = %error, "Cancel failed");
            }
        }
    }

    async fn close(&mut self, saved: bool) {
        self.pending = None;
        if !saved {
            self.release().await;
        }
        self.state = SessionState::Closed;
    }

    fn invalidate(&self, bookmaker_id: &str) {
        if let Some(tx) = &self.invalidations {
            let _ = tx.send(Invalidation {
                bookmaker_id: bookmaker_id.to_string(),
            });
        }
    }
}

/// A deadline that never fires within a process lifetime.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365)
}
