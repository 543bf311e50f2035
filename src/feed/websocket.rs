//! WebSocket client for the tenant-scoped reservation change feed.
//!
//! Features:
//! - Automatic reconnection with exponential backoff
//! - Heartbeat/ping-pong handling
//! - Staleness detection from message timestamps

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::FeedError;
use crate::metrics;

use super::listener::FeedEvent;

/// Reservation row as it appears on the wire. Money fields arrive as
/// strings and are parsed into `Decimal`.
#[derive(Debug, Clone, Deserialize)]
pub struct WireReservation {
    /// Reservation row id.
    pub id: String,
    /// Bookmaker the reservation targets.
    pub bookmaker_id: String,
    /// Tenant scope.
    pub tenant_id: String,
    /// Owning session.
    pub session_id: String,
    /// Stake as string.
    pub stake: String,
    /// Currency code.
    pub currency: Option<String>,
    /// Owning form kind as string.
    pub form_kind: Option<String>,
    /// Expiry deadline as unix seconds.
    pub expires_at: Option<i64>,
    /// Status as string.
    pub status: String,
}

impl WireReservation {
    /// Parse stake to Decimal.
    pub fn stake_decimal(&self) -> Option<Decimal> {
        self.stake.parse().ok()
    }

    /// Convert to a feed event, dropping unparseable rows. The optional
    /// fields degrade to `None` instead of dropping the whole mutation.
    pub fn into_event(self) -> Option<FeedEvent> {
        let stake = self.stake_decimal()?;
        let status = self.status.parse().ok()?;
        let form_kind = self.form_kind.as_deref().and_then(|v| v.parse().ok());
        let expires_at = self
            .expires_at
            .and_then(|ts| time::OffsetDateTime::from_unix_timestamp(ts).ok());

        Some(FeedEvent {
            reservation_id: self.id,
            bookmaker_id: self.bookmaker_id,
            tenant_id: self.tenant_id,
            session_id: self.session_id,
            stake,
            currency: self.currency,
            form_kind,
            expires_at,
            status,
        })
    }
}

/// Subscription message for the tenant scope.
#[derive(Debug, Serialize)]
struct SubscribeMessage {
    /// Message type.
    #[serde(rename = "type")]
    msg_type: String,
    /// Tenant to subscribe to.
    tenant_id: String,
}

/// Reconnection configuration for the feed socket.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_s: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_s: 30,
            backoff_multiplier: 2.0,
            heartbeat_interval_s: 30,
        }
    }
}

impl ReconnectConfig {
    /// Create from config values.
    pub fn from_config(max_delay_s: u64, heartbeat_interval_s: u64) -> Self {
        Self {
            max_delay_s,
            heartbeat_interval_s,
            ..Default::default()
        }
    }

    /// Calculate next delay with exponential backoff.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let max_delay_ms = self.max_delay_s * 1000;
        let clamped_ms = delay_ms.min(max_delay_ms as f64) as u64;
        Duration::from_millis(clamped_ms)
    }
}

/// Manages the change feed WebSocket connection.
pub struct FeedSocket {
    /// WebSocket base URL.
    ws_url: String,
    /// Tenant whose reservation mutations to subscribe to.
    tenant_id: String,
    /// Reconnection configuration.
    reconnect_config: ReconnectConfig,
    /// Connection state (atomic for thread safety).
    connected: Arc<AtomicBool>,
    /// Reconnection attempt counter.
    reconnect_attempts: Arc<AtomicU64>,
    /// Last successful message timestamp.
    last_message_time: Arc<std::sync::RwLock<Option<Instant>>>,
}

impl FeedSocket {
    /// Create a new feed socket.
    pub fn new(ws_url: String, tenant_id: String) -> Self {
        Self::with_reconnect_config(ws_url, tenant_id, ReconnectConfig::default())
    }

    /// Create with custom reconnection config.
    pub fn with_reconnect_config(
        ws_url: String,
        tenant_id: String,
        config: ReconnectConfig,
    ) -> Self {
        Self {
            ws_url,
            tenant_id,
            reconnect_config: config,
            connected: Arc::new(AtomicBool::new(false)),
            reconnect_attempts: Arc::new(AtomicU64::new(0)),
            last_message_time: Arc::new(std::sync::RwLock::new(None)),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Get reconnection attempt count.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Check if connection appears stale (no messages in two heartbeat
    /// intervals).
    pub fn is_stale(&self) -> bool {
        if let Ok(time) = self.last_message_time.read() {
            if let Some(last) = *time {
                return last.elapsed()
                    > Duration::from_secs(self.reconnect_config.heartbeat_interval_s * 2);
            }
        }
        // No messages received yet - not stale
        false
    }

    /// Run the WebSocket connection, yielding feed events.
    pub async fn run(
        &self,
    ) -> Result<impl futures::Stream<Item = FeedEvent> + '_, FeedError> {
        let url = format!("{}/ws/reservations", self.ws_url.trim_end_matches('/'));

        info!(url = %url, tenant = %self.tenant_id, "Connecting to change feed");

        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;

        self.connected.store(true, Ordering::SeqCst);
        self.reconnect_attempts.store(0, Ordering::SeqCst);

        let (mut write, read) = ws_stream.split();

        let subscribe_msg = SubscribeMessage {
            msg_type: "RESERVATIONS".to_string(),
            tenant_id: self.tenant_id.clone(),
        };

        let msg_json = serde_json::to_string(&subscribe_msg)
            .map_err(|e| FeedError::SendFailed(e.to_string()))?;

        write
            .send(Message::Text(msg_json))
            .await
            .map_err(|e| FeedError::SendFailed(e.to_string()))?;

        info!(tenant = %self.tenant_id, "Subscribed to reservation feed");

        let connected = self.connected.clone();
        let last_msg_time = self.last_message_time.clone();

        let stream = read.filter_map(move |msg| {
            let connected = connected.clone();
            let last_msg_time = last_msg_time.clone();

            async move {
                // Update last message time on any message
                if let Ok(mut time) = last_msg_time.write() {
                    *time = Some(Instant::now());
                }

                match msg {
                    Ok(Message::Text(text)) => {
                        let events = Self::parse_message(&text);
                        if events.is_empty() {
                            None
                        } else {
                            Some(events)
                        }
                    }
                    Ok(Message::Ping(_)) => {
                        debug!("Received ping");
                        // Note: tungstenite auto-responds to pings
                        None
                    }
                    Ok(Message::Pong(_)) => {
                        debug!("Received pong");
                        None
                    }
                    Ok(Message::Close(frame)) => {
                        warn!(frame = ?frame, "Feed connection closed");
                        connected.store(false, Ordering::SeqCst);
                        None
                    }
                    Ok(_) => None,
                    Err(e) => {
                        error!(error = %e, "Feed WebSocket error");
                        connected.store(false, Ordering::SeqCst);
                        None
                    }
                }
            }
        });

        Ok(stream.map(futures::stream::iter).flatten())
    }

    /// Run with automatic reconnection on disconnect.
    /// Returns a channel receiver that yields feed events.
    pub async fn run_with_reconnect(self: Arc<Self>) -> mpsc::Receiver<FeedEvent> {
        let (tx, rx) = mpsc::channel(1000);

        let ws = self;

        tokio::spawn(async move {
            let mut attempt = 0u32;

            loop {
                info!(attempt = attempt, "Attempting feed connection");

                match ws.run().await {
                    Ok(stream) => {
                        attempt = 0; // Reset on successful connection

                        let mut stream = Box::pin(stream);

                        while let Some(event) = stream.next().await {
                            if tx.send(event).await.is_err() {
                                info!("Channel closed, stopping feed");
                                return;
                            }
                        }

                        warn!("Feed stream ended, will reconnect");
                    }
                    Err(e) => {
                        error!(error = %e, attempt = attempt, "Feed connection failed");
                    }
                }

                let delay = ws.reconnect_config.next_delay(attempt);
                ws.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                metrics::inc_feed_reconnects();

                info!(delay_ms = delay.as_millis(), "Reconnecting after delay");
                tokio::time::sleep(delay).await;

                attempt = attempt.saturating_add(1);
            }
        });

        rx
    }

    /// Parse a feed message. Messages can be a single mutation or an array;
    /// unparseable rows are dropped, parseable neighbors survive.
    fn parse_message(text: &str) -> Vec<FeedEvent> {
        let rows: Vec<WireReservation> = if text.starts_with('[') {
            serde_json::from_str(text).unwrap_or_default()
        } else {
            match serde_json::from_str(text) {
                Ok(row) => vec![row],
                Err(_) => Vec::new(),
            }
        };

        rows.into_iter().filter_map(WireReservation::into_event).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{FormKind, ReservationStatus};
    use rust_decimal_macros::dec;

    #[test]
    fn wire_reservation_parses_to_event() {
        let row = WireReservation {
            id: "res-1".to_string(),
            bookmaker_id: "bk-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            session_id: "s-1".to_string(),
            stake: "62.50".to_string(),
            currency: Some("BRL".to_string()),
            form_kind: Some("arbitrage-leg".to_string()),
            expires_at: Some(1_700_000_000),
            status: "active".to_string(),
        };

        let event = row.into_event().unwrap();
        assert_eq!(event.stake, dec!(62.50));
        assert_eq!(event.status, ReservationStatus::Active);
        assert_eq!(event.currency.as_deref(), Some("BRL"));
        assert_eq!(event.form_kind, Some(FormKind::ArbitrageLeg));
        assert_eq!(
            event.expires_at.map(|t| t.unix_timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn unparseable_rows_are_dropped() {
        let bad_stake = WireReservation {
            id: "res-1".to_string(),
            bookmaker_id: "bk-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            session_id: "s-1".to_string(),
            stake: "not-a-number".to_string(),
            currency: None,
            form_kind: None,
            expires_at: None,
            status: "active".to_string(),
        };
        assert!(bad_stake.into_event().is_none());

        let bad_status = WireReservation {
            id: "res-1".to_string(),
            bookmaker_id: "bk-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            session_id: "s-1".to_string(),
            stake: "10".to_string(),
            currency: None,
            form_kind: None,
            expires_at: None,
            status: "unknown".to_string(),
        };
        assert!(bad_status.into_event().is_none());
    }

    #[test]
    fn optional_fields_degrade_without_dropping_the_row() {
        let unknown_kind = WireReservation {
            id: "res-1".to_string(),
            bookmaker_id: "bk-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            session_id: "s-1".to_string(),
            stake: "10".to_string(),
            currency: None,
            form_kind: Some("mystery".to_string()),
            expires_at: None,
            status: "active".to_string(),
        };

        let event = unknown_kind.into_event().unwrap();
        assert_eq!(event.form_kind, None);
        assert_eq!(event.expires_at, None);
        assert_eq!(event.stake, dec!(10));
    }

    #[test]
    fn parse_message_handles_single_and_array() {
        let single = r#"{"id":"r1","bookmaker_id":"bk-1","tenant_id":"t","session_id":"s-1","stake":"10","status":"active"}"#;
        let events = FeedSocket::parse_message(single);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reservation_id, "r1");

        let array = r#"[
            {"id":"r1","bookmaker_id":"bk-1","tenant_id":"t","session_id":"s-1","stake":"10","status":"active"},
            {"id":"r2","bookmaker_id":"bk-2","tenant_id":"t","session_id":"s-2","stake":"20","status":"cancelled"}
        ]"#;
        let events = FeedSocket::parse_message(array);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].reservation_id, "r2");
        assert_eq!(events[1].status, ReservationStatus::Cancelled);
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(FeedSocket::parse_message("not json").is_empty());
        assert!(FeedSocket::parse_message("{}").is_empty());
    }

    #[test]
    fn reconnect_backoff_grows_and_clamps() {
        let config = ReconnectConfig::default();
        assert_eq!(config.next_delay(0), Duration::from_millis(1000));
        assert_eq!(config.next_delay(1), Duration::from_millis(2000));
        assert_eq!(config.next_delay(2), Duration::from_millis(4000));
        assert_eq!(config.next_delay(10), Duration::from_secs(30));
    }
}
