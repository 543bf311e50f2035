//! Reservation and balance types shared across the coordinator boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// Which kind of bet form owns a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FormKind {
    /// Single bet form.
    Single,
    /// Multiple (accumulator) form.
    Multiple,
    /// One leg of an arbitrage entry.
    ArbitrageLeg,
}

/// Lifecycle status of a reservation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReservationStatus {
    /// In-flight stake attempt, visible to other sessions.
    Active,
    /// Parent bet was persisted.
    Committed,
    /// Form abandoned or bookmaker switched.
    Cancelled,
    /// TTL elapsed without renewal (coordinator-side sweep).
    Expired,
}

impl ReservationStatus {
    /// Whether the reservation still holds advisory weight.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Active)
    }
}

/// One in-flight stake attempt, as stored by the coordinator.
///
/// At most one `active` row exists per `(bookmaker_id, session_id)` pair;
/// a new stake value updates the row instead of creating a second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Row id assigned by the coordinator.
    pub id: String,
    /// Bookmaker account the stake targets.
    pub bookmaker_id: String,
    /// Tenant (workspace) scope.
    pub tenant_id: String,
    /// Client-generated session id, stable for one open form.
    pub session_id: String,
    /// Requested stake.
    pub stake: Decimal,
    /// Currency code.
    pub currency: String,
    /// Owning form kind.
    pub form_kind: FormKind,
    /// Lifecycle status.
    pub status: ReservationStatus,
    /// Expiry deadline enforced by the coordinator's TTL sweep.
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
}

/// Per-bookmaker balance view.
///
/// The ledger owns the stored figures; `reserved_by_others` is derived from
/// the change feed and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BalanceSnapshot {
    /// Committed real-money balance.
    pub ledger_balance: Decimal,
    /// Promotional bonus credit.
    pub bonus_balance: Decimal,
    /// Free-bet credit.
    pub free_bet_balance: Decimal,
    /// Sum of other sessions' active reservations (advisory, derived).
    pub reserved_by_others: Decimal,
}

impl BalanceSnapshot {
    /// Ledger balance minus what other sessions are currently eyeing.
    pub fn available_balance(&self) -> Decimal {
        self.ledger_balance - self.reserved_by_others
    }
}

/// Structured error codes surfaced to the UI layer verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvisoryErrorCode {
    /// Reservations administratively disabled.
    Disabled,
    /// Transport-level RPC failure.
    RpcError,
    /// Coordinator-side exception.
    Exception,
    /// Insufficient ledger balance at the authoritative check.
    SaldoInsuficiente,
    /// Bookmaker not linked to the active project.
    BookmakerNaoVinculada,
    /// Project is inactive.
    ProjetoInativo,
}

impl AdvisoryErrorCode {
    /// Whether this code comes from the authoritative transaction rather
    /// than the advisory layer.
    pub fn is_authoritative(&self) -> bool {
        matches!(
            self,
            AdvisoryErrorCode::SaldoInsuficiente
                | AdvisoryErrorCode::BookmakerNaoVinculada
                | AdvisoryErrorCode::ProjetoInativo
        )
    }
}

/// Upsert request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertRequest {
    /// Bookmaker account to reserve against.
    pub bookmaker_id: String,
    /// Tenant scope.
    pub tenant_id: String,
    /// Requested stake.
    pub stake: Decimal,
    /// Currency code.
    pub currency: String,
    /// Owning session.
    pub session_id: String,
    /// Owning form kind.
    pub form_kind: FormKind,
}

/// Upsert response from the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertResponse {
    /// Whether the upsert was applied.
    pub success: bool,
    /// Row id of the (created or updated) reservation.
    pub reservation_id: Option<String>,
    /// Ledger balance minus other sessions' reservations.
    pub available_balance: Decimal,
    /// Sum of other sessions' active reservations.
    pub reserved_balance: Decimal,
    /// Committed ledger balance.
    pub ledger_balance: Decimal,
    /// Structured error code when `success` is false.
    pub error_code: Option<AdvisoryErrorCode>,
    /// Human-readable error message when `success` is false.
    pub error_message: Option<String>,
}

/// Simple acknowledgement for commit/cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    /// Whether the operation was applied (idempotent no-ops also succeed).
    pub success: bool,
}

/// Balance view returned by the `available_balance` query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AvailableBalance {
    /// Committed ledger balance.
    pub ledger_balance: Decimal,
    /// Sum of active reservations excluding the querying session.
    pub reserved_balance: Decimal,
    /// `ledger_balance - reserved_balance`.
    pub available_balance: Decimal,
}

/// Request body for the authoritative create-bet transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetCommitRequest {
    /// Session whose reservations become committed on success.
    pub session_id: String,
    /// Tenant scope.
    pub tenant_id: String,
    /// Bookmaker account the stake is taken from.
    pub bookmaker_id: String,
    /// Stake to debit.
    pub stake: Decimal,
    /// Currency code.
    pub currency: String,
}

/// Receipt from a successful create-bet transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetCommitReceipt {
    /// Id of the persisted bet.
    pub bet_id: String,
    /// Amount debited from the ledger.
    pub debited: Decimal,
}

/// Response body for the create-bet transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetCommitResponse {
    /// Whether the bet was persisted.
    pub success: bool,
    /// Id of the persisted bet on success.
    pub bet_id: Option<String>,
    /// Structured error code on rejection.
    pub error_code: Option<AdvisoryErrorCode>,
    /// Human-readable rejection message.
    pub error_message: Option<String>,
    /// Ledger balance at the time of the check, when reported.
    pub available_balance: Option<Decimal>,
    /// Balance the bet required, when reported.
    pub required_balance: Option<Decimal>,
}
