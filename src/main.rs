//! Bitarena Match Server
//!
//! Local runner: in-memory storage and a dry-run ledger, one match of each
//! game type with scripted inputs. Stops on Ctrl+C or when every match has
//! ended.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use bitarena::core::Vec2;
use bitarena::game::{PlayerInput, ProjectileInput, TerritoryInput};
use bitarena::server::{ChannelBroadcaster, Collaborators, GameServer};
use bitarena::settlement::DryRunLedger;
use bitarena::storage::InMemoryStore;
use bitarena::{ServerConfig, TICK_RATE, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Bitarena Server v{}", VERSION);
    info!("Tick rate: {} Hz (simulation step {} Hz)", config.tick_rate, TICK_RATE);

    let store = Arc::new(InMemoryStore::new());
    let broadcaster = Arc::new(ChannelBroadcaster::new(256));
    let server = Arc::new(GameServer::new(
        config,
        Collaborators {
            ledger: Arc::new(DryRunLedger::new()),
            store: store.clone(),
            log: store.clone(),
            broadcaster,
        },
    ));

    let runner = server.clone();
    let server_handle = tokio::spawn(async move { runner.run().await });

    // Demo matches
    let duel_id = Uuid::new_v4().to_string();
    let duel_players = vec!["0xa11ce".to_string(), "0xb0b".to_string()];
    store.register_ledger_match(duel_id.clone(), 1);
    server
        .create_match(&duel_id, "ProjectileDuel", duel_players.clone(), None)
        .await?;

    let painters_id = Uuid::new_v4().to_string();
    let painters: Vec<String> = (1..=4).map(|i| format!("0xp{}", i)).collect();
    store.register_ledger_match(painters_id.clone(), 2);
    server
        .create_match(&painters_id, "GravityPainters", painters.clone(), None)
        .await?;

    for player in &painters {
        let input = PlayerInput::Territory(TerritoryInput {
            emitting: Some(true),
            ..Default::default()
        });
        server.submit_input(&painters_id, player, input).await;
    }

    // Scripted duel: both players fire along the diagonal
    let aims = [Vec2::new(1.0, 0.75).normalize(), Vec2::new(-1.0, -0.75).normalize()];
    let mut script = tokio::time::interval(Duration::from_millis(250));
    let mut progress = tokio::time::interval(Duration::from_secs(10));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = script.tick() => {
                for (player, aim) in duel_players.iter().zip(aims) {
                    let input = PlayerInput::Projectile(ProjectileInput {
                        shoot: true,
                        aim: Some(aim),
                        ..Default::default()
                    });
                    server.submit_input(&duel_id, player, input).await;
                }
            }
            _ = progress.tick() => {
                let active = server.active_matches().await;
                info!("{} matches active", active.len());
                if active.is_empty() {
                    info!("All matches complete");
                    break;
                }
            }
            _ = &mut shutdown => break,
        }
    }

    server.shutdown();
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server error: {}", e),
        Err(e) => error!("Server task failed: {}", e),
    }

    for id in [&duel_id, &painters_id] {
        match store.settlement(id) {
            Some(record) => info!(
                match_id = %id,
                status = ?record.status,
                digest = %hex::encode(record.digest),
                "Settlement"
            ),
            None => info!(match_id = %id, "Not settled"),
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
