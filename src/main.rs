//! Balance reservation engine entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use rust_decimal_macros::dec;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use surebet_reserve::allocation::waterfall::allocate;
use surebet_reserve::api::{create_router, AppState};
use surebet_reserve::config::Config;
use surebet_reserve::coordinator::{
    BetCommitRequest, FormKind, HttpCoordinator, MockCoordinator, ReservationAdvisor,
    SettlementAuthority,
};
use surebet_reserve::error::CoordinatorError;
use surebet_reserve::feed::{FeedSocket, ReconnectConfig, ReservedLedger};
use surebet_reserve::metrics;
use surebet_reserve::session::{ReservationSession, SessionCommand, SessionEvent};
use surebet_reserve::utils::shutdown_signal;

/// Advisory stake reservation engine for multi-tenant arbitrage bookkeeping.
#[derive(Parser, Debug)]
#[command(name = "surebet-reserve")]
#[command(about = "Advisory stake reservations and waterfall allocation for arbitrage bookkeeping")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port for health/metrics.
    #[arg(short, long, default_value = "8080")]
    port: u16,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the feed monitor with the HTTP API (default).
    Run {
        /// HTTP server port for health/metrics.
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Probe this bookmaker's available balance at startup.
        #[arg(long)]
        probe_bookmaker: Option<String>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Test the change feed connection (diagnostic).
    FeedTest,

    /// Run two concurrent mock sessions to demonstrate conflict visibility.
    Simulate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("surebet_reserve=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Initialize metrics
    metrics::init_metrics();

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::Run {
            port,
            probe_bookmaker,
        }) => cmd_run(port, probe_bookmaker).await,
        Some(Command::FeedTest) => cmd_feed_test().await,
        Some(Command::Simulate) => cmd_simulate().await,
        None => cmd_run(args.port, None).await,
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("SUREBET RESERVE - CONFIGURATION CHECK");
    println!("======================================================================");

    // Load configuration
    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    // Validate configuration
    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    // Show configuration summary
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Coordinator URL: {}", config.coordinator_url);
    println!("  Feed WS URL: {}", config.feed_ws_url);
    println!("  Tenant: {}", config.tenant_id);
    println!("  Currency: {}", config.currency);
    println!("  Debounce: {}ms", config.debounce_ms);
    println!("  HTTP timeout: {}ms", config.http_timeout_ms);
    println!(
        "  Feed reconnect max delay: {}s / heartbeat: {}s",
        config.ws_reconnect_max_delay_s, config.ws_heartbeat_interval_s
    );
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Run the feed monitor and HTTP API.
async fn cmd_run(port: u16, probe_bookmaker: Option<String>) -> anyhow::Result<()> {
    // Load configuration
    info!("Loading configuration...");
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!("Configuration loaded successfully");
    info!("Tenant: {}", config.tenant_id);
    info!("Coordinator: {}", config.coordinator_url);

    // Install Prometheus exporter for the /metrics endpoint
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;

    // Create app state
    let app_state = AppState::new().with_metrics_handle(metrics_handle);
    *app_state.tenant_id.write().await = Some(config.tenant_id.clone());

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());

    // Spawn HTTP server
    let _server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    // Optional startup probe against the coordinator
    let advisor = HttpCoordinator::new(&config);
    if let Some(bookmaker_id) = probe_bookmaker {
        match advisor.query_available(&bookmaker_id, "startup-probe").await {
            Ok(balance) => {
                info!(
                    bookmaker = %bookmaker_id,
                    ledger = %balance.ledger_balance,
                    reserved = %balance.reserved_balance,
                    available = %balance.available_balance,
                    "Startup balance probe"
                );
            }
            Err(e) => warn!(bookmaker = %bookmaker_id, error = %e, "Startup probe failed"),
        }
    }

    // The monitor holds no reservations of its own, so a fresh id means
    // nothing on the feed is discarded as own-session.
    let monitor_id = uuid::Uuid::new_v4().to_string();
    let ledger = Arc::new(ReservedLedger::new(monitor_id));
    *app_state.ledger.write().await = Some(ledger.clone());

    // Connect the change feed with auto-reconnect
    let reconnect_config = ReconnectConfig::from_config(
        config.ws_reconnect_max_delay_s,
        config.ws_heartbeat_interval_s,
    );
    let ws = Arc::new(FeedSocket::with_reconnect_config(
        config.feed_ws_url.clone(),
        config.tenant_id.clone(),
        reconnect_config,
    ));

    let mut feed_rx = ws.clone().run_with_reconnect().await;
    app_state.set_ready(true);

    info!("Feed monitor started");

    loop {
        tokio::select! {
            event = feed_rx.recv() => {
                match event {
                    Some(event) => ledger.apply(&event),
                    None => {
                        error!("Feed channel closed, shutting down");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_secs(30)) => {
                if ws.is_stale() {
                    warn!(
                        reconnects = ws.reconnect_attempts(),
                        "Feed looks stale, reconnect loop will recover"
                    );
                }
                let stats = ledger.stats();
                info!(
                    bookmakers = stats.bookmakers,
                    total_reserved = %stats.total_reserved,
                    "Ledger snapshot"
                );
            }
        }
    }

    Ok(())
}

/// Test the change feed connection.
async fn cmd_feed_test() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("SUREBET RESERVE - FEED TEST");
    println!("======================================================================");

    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    println!("\n1. Connecting to change feed...");
    let ws = FeedSocket::new(config.feed_ws_url.clone(), config.tenant_id.clone());

    let stream = ws.run().await?;
    let mut stream = Box::pin(stream);
    println!("   Connected!");

    println!("\n2. Waiting for reservation events (10 seconds)...");
    let start = Instant::now();
    let mut event_count = 0u32;

    while start.elapsed() < Duration::from_secs(10) {
        tokio::select! {
            Some(event) = stream.next() => {
                event_count += 1;
                println!(
                    "   [{:.1}s] {} on {}: stake {} ({})",
                    start.elapsed().as_secs_f64(),
                    event.reservation_id,
                    event.bookmaker_id,
                    event.stake,
                    event.status,
                );
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }

    println!("\n======================================================================");
    println!("FEED TEST COMPLETE");
    println!("  Events received: {}", event_count);
    println!(
        "  Connection status: {}",
        if ws.is_connected() { "Connected" } else { "Disconnected" }
    );
    println!("======================================================================");

    Ok(())
}

/// Demonstrate two concurrent sessions against the mock coordinator.
async fn cmd_simulate() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("SUREBET RESERVE - TWO-SESSION SIMULATION");
    println!("======================================================================");

    let mock = Arc::new(MockCoordinator::new());
    mock.set_balances("bk-alpha", dec!(100), dec!(30), dec!(20));

    println!("\nBookmaker bk-alpha: ledger 100, bonus 30, free-bet 20");

    let spawn = |mock: Arc<MockCoordinator>| {
        let (session, handle, events) = ReservationSession::new(
            mock,
            "tenant-demo".to_string(),
            "BRL".to_string(),
            FormKind::ArbitrageLeg,
            Duration::from_millis(50),
            None,
        );
        tokio::spawn(session.run());
        (handle, events)
    };

    // Session A reserves 60
    println!("\n1. Session A reserves a stake of 60...");
    let (handle_a, mut events_a) = spawn(mock.clone());
    handle_a
        .send(SessionCommand::StakeChanged {
            bookmaker_id: "bk-alpha".to_string(),
            stake: dec!(60),
        })
        .await?;

    if let Some(SessionEvent::Reserved {
        available_balance, ..
    }) = events_a.recv().await
    {
        println!("   Reserved. Session A sees available: {}", available_balance);
    }

    // Session B sees A's reservation
    println!("\n2. Session B reserves a stake of 50 on the same bookmaker...");
    let (handle_b, mut events_b) = spawn(mock.clone());
    handle_b
        .send(SessionCommand::StakeChanged {
            bookmaker_id: "bk-alpha".to_string(),
            stake: dec!(50),
        })
        .await?;

    if let Some(SessionEvent::Reserved {
        available_balance,
        reserved_balance,
        ..
    }) = events_b.recv().await
    {
        println!(
            "   Reserved. Session B sees available: {} (others hold {})",
            available_balance, reserved_balance
        );
        println!("   Advisory only: both reservations coexist.");
    }

    // Waterfall preview for session B
    println!("\n3. Waterfall preview for session B's stake of 50:");
    let allocation = allocate(dec!(50), dec!(30), dec!(20), dec!(40), true);
    println!(
        "   bonus {} + free-bet {} + real {} (shortfall {})",
        allocation.from_bonus,
        allocation.from_free_bet,
        allocation.from_real,
        allocation.shortfall
    );

    // Session A commits first
    println!("\n4. Session A saves its bet (stake 60)...");
    let receipt = mock
        .create_bet(BetCommitRequest {
            session_id: handle_a.session_id().to_string(),
            tenant_id: "tenant-demo".to_string(),
            bookmaker_id: "bk-alpha".to_string(),
            stake: dec!(60),
            currency: "BRL".to_string(),
        })
        .await?;
    println!(
        "   Committed bet {} (debited {}). Ledger now: {}",
        receipt.bet_id,
        receipt.debited,
        mock.ledger_balance("bk-alpha")
    );

    // Session B's commit fails the authoritative check
    println!("\n5. Session B saves its bet (stake 50)...");
    match mock
        .create_bet(BetCommitRequest {
            session_id: handle_b.session_id().to_string(),
            tenant_id: "tenant-demo".to_string(),
            bookmaker_id: "bk-alpha".to_string(),
            stake: dec!(50),
            currency: "BRL".to_string(),
        })
        .await
    {
        Err(CoordinatorError::Rejected {
            code,
            available,
            required,
            ..
        }) => {
            println!("   REJECTED: {}", code);
            println!(
                "   Authoritative check: available {:?}, required {:?}",
                available, required
            );
            println!("   The advisory reservation never guaranteed the funds.");
        }
        Ok(receipt) => println!("   Unexpectedly committed: {:?}", receipt),
        Err(e) => println!("   Failed: {}", e),
    }

    handle_a.send(SessionCommand::Close).await.ok();
    handle_b.send(SessionCommand::Close).await.ok();

    println!("\n======================================================================");
    println!("SIMULATION COMPLETE");
    println!("======================================================================");

    Ok(())
}
