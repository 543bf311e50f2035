//! Coordinator RPC client and the advisory/authoritative trait seam.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::CoordinatorError;
use crate::metrics;

use super::types::{
    AckResponse, AdvisoryErrorCode, AvailableBalance, BetCommitReceipt, BetCommitRequest,
    BetCommitResponse, UpsertRequest, UpsertResponse,
};

/// Advisory reservation operations.
///
/// Implementations only improve conflict visibility; nothing here is a lock,
/// and every call may fail without corrupting state.
pub trait ReservationAdvisor: Send + Sync {
    /// Create or update the caller's reservation for a bookmaker.
    fn upsert(
        &self,
        request: UpsertRequest,
    ) -> impl Future<Output = Result<UpsertResponse, CoordinatorError>> + Send;

    /// Convert the session's active reservations to `committed`. Idempotent.
    fn commit(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<(), CoordinatorError>> + Send;

    /// Convert the session's active reservations to `cancelled`. Idempotent.
    fn cancel(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<(), CoordinatorError>> + Send;

    /// Query the balance view for a bookmaker, excluding one session's own
    /// reservations.
    fn query_available(
        &self,
        bookmaker_id: &str,
        exclude_session_id: &str,
    ) -> impl Future<Output = Result<AvailableBalance, CoordinatorError>> + Send;
}

/// The authoritative atomic create-bet transaction.
///
/// This is the sole point of truth: it re-validates the stake against the
/// current ledger balance, not the advisory reservation view.
pub trait SettlementAuthority: Send + Sync {
    /// Persist the bet, debiting the ledger, or reject with structured
    /// figures.
    fn create_bet(
        &self,
        request: BetCommitRequest,
    ) -> impl Future<Output = Result<BetCommitReceipt, CoordinatorError>> + Send;
}

/// HTTP client for the coordinator RPC endpoints.
#[derive(Debug, Clone)]
pub struct HttpCoordinator {
    /// HTTP client for RPC requests.
    http: reqwest::Client,
    /// Base URL of the coordinator.
    base_url: String,
}

impl HttpCoordinator {
    /// Create a new coordinator client from config with tuned HTTP settings.
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(std::time::Duration::from_millis(500))
            .tcp_nodelay(true)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(config.http_pool_size)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .expect("failed to create HTTP client");

        Self {
            http,
            base_url: config.coordinator_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get the coordinator base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST an RPC call and decode the response body.
    async fn rpc<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        operation: &'static str,
        body: &B,
    ) -> Result<T, CoordinatorError> {
        let url = format!("{}/rpc/{}", self.base_url, operation);
        let start = std::time::Instant::now();

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CoordinatorError::Rpc(e.to_string()))?;

        metrics::record_rpc_latency(start, operation);

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CoordinatorError::Rpc(format!("HTTP {status} - {text}")));
        }

        response
            .json()
            .await
            .map_err(|e| CoordinatorError::InvalidResponse(e.to_string()))
    }
}

/// Map a failed upsert response to the matching error.
fn map_upsert_failure(request: &UpsertRequest, response: &UpsertResponse) -> CoordinatorError {
    let message = response
        .error_message
        .clone()
        .unwrap_or_else(|| "upsert refused".to_string());

    match response.error_code {
        Some(AdvisoryErrorCode::Disabled) => CoordinatorError::Disabled,
        Some(AdvisoryErrorCode::RpcError) => CoordinatorError::Rpc(message),
        Some(AdvisoryErrorCode::Exception) | None => CoordinatorError::Exception(message),
        Some(code) => CoordinatorError::Rejected {
            code,
            message,
            available: Some(response.available_balance),
            required: Some(request.stake),
        },
    }
}

/// Map a failed create-bet response to the matching error.
fn map_commit_failure(response: &BetCommitResponse) -> CoordinatorError {
    let message = response
        .error_message
        .clone()
        .unwrap_or_else(|| "bet refused".to_string());

    match response.error_code {
        Some(AdvisoryErrorCode::Disabled) => CoordinatorError::Disabled,
        Some(AdvisoryErrorCode::RpcError) => CoordinatorError::Rpc(message),
        Some(AdvisoryErrorCode::Exception) | None => CoordinatorError::Exception(message),
        Some(code) => CoordinatorError::Rejected {
            code,
            message,
            available: response.available_balance,
            required: response.required_balance,
        },
    }
}

impl ReservationAdvisor for HttpCoordinator {
    #[instrument(skip(self, request), fields(bookmaker = %request.bookmaker_id, session = %request.session_id))]
    async fn upsert(&self, request: UpsertRequest) -> Result<UpsertResponse, CoordinatorError> {
        let response: UpsertResponse = self.rpc("reserve_stake", &request).await?;

        if !response.success {
            warn!(code = ?response.error_code, "Reservation upsert refused");
            return Err(map_upsert_failure(&request, &response));
        }

        debug!(
            reservation_id = ?response.reservation_id,
            available = %response.available_balance,
            "Reservation upserted"
        );

        Ok(response)
    }

    #[instrument(skip(self))]
    async fn commit(&self, session_id: &str) -> Result<(), CoordinatorError> {
        let ack: AckResponse = self
            .rpc("commit_reservations", &serde_json::json!({ "session_id": session_id }))
            .await?;

        if !ack.success {
            return Err(CoordinatorError::Exception(
                "commit not acknowledged".to_string(),
            ));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn cancel(&self, session_id: &str) -> Result<(), CoordinatorError> {
        let ack: AckResponse = self
            .rpc("cancel_reservations", &serde_json::json!({ "session_id": session_id }))
            .await?;

        if !ack.success {
            return Err(CoordinatorError::Exception(
                "cancel not acknowledged".to_string(),
            ));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_available(
        &self,
        bookmaker_id: &str,
        exclude_session_id: &str,
    ) -> Result<AvailableBalance, CoordinatorError> {
        self.rpc(
            "available_balance",
            &serde_json::json!({
                "bookmaker_id": bookmaker_id,
                "exclude_session_id": exclude_session_id,
            }),
        )
        .await
    }
}

impl SettlementAuthority for HttpCoordinator {
    #[instrument(skip(self, request), fields(bookmaker = %request.bookmaker_id, stake = %request.stake))]
    async fn create_bet(
        &self,
        request: BetCommitRequest,
    ) -> Result<BetCommitReceipt, CoordinatorError> {
        let response: BetCommitResponse = self.rpc("create_bet", &request).await?;

        if !response.success {
            warn!(code = ?response.error_code, "Bet rejected by authoritative check");
            return Err(map_commit_failure(&response));
        }

        let bet_id = response
            .bet_id
            .ok_or_else(|| CoordinatorError::InvalidResponse("missing bet_id".to_string()))?;

        Ok(BetCommitReceipt {
            bet_id,
            debited: request.stake,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::FormKind;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn test_config() -> Config {
        Config {
            coordinator_url: "https://coordinator.test/".to_string(),
            feed_ws_url: "wss://feed.test".to_string(),
            tenant_id: "tenant-1".to_string(),
            currency: "BRL".to_string(),
            debounce_ms: 500,
            http_timeout_ms: 2000,
            http_pool_size: 10,
            ws_reconnect_max_delay_s: 30,
            ws_heartbeat_interval_s: 30,
            port: 8080,
            rust_log: "info".to_string(),
            verbose: false,
        }
    }

    fn test_request() -> UpsertRequest {
        UpsertRequest {
            bookmaker_id: "bk-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            stake: dec!(50),
            currency: "BRL".to_string(),
            session_id: "session-1".to_string(),
            form_kind: FormKind::Single,
        }
    }

    fn refused_response(code: Option<AdvisoryErrorCode>) -> UpsertResponse {
        UpsertResponse {
            success: false,
            reservation_id: None,
            available_balance: dec!(40),
            reserved_balance: dec!(60),
            ledger_balance: dec!(100),
            error_code: code,
            error_message: Some("refused".to_string()),
        }
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = HttpCoordinator::new(&test_config());
        assert_eq!(client.base_url(), "https://coordinator.test");
    }

    #[test]
    fn upsert_failure_maps_disabled() {
        let err = map_upsert_failure(
            &test_request(),
            &refused_response(Some(AdvisoryErrorCode::Disabled)),
        );
        assert!(matches!(err, CoordinatorError::Disabled));
    }

    #[test]
    fn upsert_failure_maps_authoritative_rejection() {
        let err = map_upsert_failure(
            &test_request(),
            &refused_response(Some(AdvisoryErrorCode::SaldoInsuficiente)),
        );

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
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn upsert_failure_without_code_is_exception() {
        let err = map_upsert_failure(&test_request(), &refused_response(None));
        assert!(matches!(err, CoordinatorError::Exception(_)));
    }

    #[test]
    fn commit_failure_carries_figures() {
        let response = BetCommitResponse {
            success: false,
            bet_id: None,
            error_code: Some(AdvisoryErrorCode::SaldoInsuficiente),
            error_message: Some("saldo insuficiente".to_string()),
            available_balance: Some(dec!(40)),
            required_balance: Some(dec!(50)),
        };

        match map_commit_failure(&response) {
            CoordinatorError::Rejected {
                available, required, ..
            } => {
                assert_eq!(available, Some(dec!(40)));
                assert_eq!(required, Some(dec!(50)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejection_figures_are_decimals() {
        // Guard against accidental float plumbing at the boundary.
        let response = refused_response(Some(AdvisoryErrorCode::ProjetoInativo));
        assert_eq!(response.available_balance, Decimal::new(40, 0));
    }
}
