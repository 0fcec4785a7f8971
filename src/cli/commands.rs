use std::time::Duration;

use tracing::{info, warn};

use crate::config::engine::EngineConfig;
use crate::scheduler::Engine;
use crate::simulation::Simulation;
use crate::simulation::entropy::SineEntropy;
use crate::simulation::snapshot::Snapshot;

/// Run the simulation: create the engine, start the loops, log snapshots
/// until Ctrl-C or the time limit, then stop and print the final state.
pub async fn run_simulation(
    config: EngineConfig,
    seconds: Option<u64>,
    interval_ms: u64,
) -> Result<(), String> {
    if interval_ms == 0 {
        return Err("--interval-ms must be > 0".to_string());
    }

    let engine = Engine::create(config)?;
    engine.start();

    // 1. Set up shutdown signals
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let deadline = async {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    info!(
        interval_ms,
        ?seconds,
        "Simulation running (Ctrl-C to stop)"
    );

    // 2. Periodic snapshot logging
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let snapshot = engine.snapshot();
                match serde_json::to_string(&snapshot) {
                    Ok(json) => info!(tick = snapshot.tick, snapshot = %json, "Snapshot"),
                    Err(e) => warn!(error = %e, "Cannot serialize snapshot"),
                }
            }
            _ = &mut deadline => {
                info!("Time limit reached");
                break;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // 3. Graceful shutdown
    engine.stop().await;
    let last = engine.snapshot();
    info!(state = %describe(&last), "Final state");
    let json = serde_json::to_string_pretty(&last)
        .map_err(|e| format!("Cannot serialize final snapshot: {}", e))?;
    println!("{}", json);
    Ok(())
}

/// Build a world without scheduling anything and print what it looks like.
pub fn summary(config: &EngineConfig) -> Result<(), String> {
    config.validate()?;
    let sim = Simulation::new(config.size, config.wall_policy, Box::new(SineEntropy::new()))?;
    println!("{}", render_summary(&sim));
    Ok(())
}

fn render_summary(sim: &Simulation) -> String {
    let size = sim.grid.size();
    let cells = (size as usize) * (size as usize);
    let blocked = sim.grid.blocked_count();

    let mut out = String::new();
    out.push_str(&format!("=== Run {} ===\n", sim.run_id()));
    out.push_str(&format!("Seed: {}\n", sim.seed));
    out.push_str(&format!("Grid: {}x{} ({} cells)\n", size, size, cells));
    out.push_str(&format!(
        "Blocked: {} ({:.1}%)\n",
        blocked,
        blocked as f64 / cells as f64 * 100.0
    ));
    out.push_str(&format!("NPCs: {}\n", sim.npcs.len()));
    out.push_str(&format!("Items: {}\n", sim.items.len()));
    out.push_str(&format!(
        "Player: {} at ({}, {}) hp {}\n",
        sim.player.id, sim.player.x, sim.player.y, sim.player.health
    ));
    out.push('\n');
    out.push_str(&sim.grid.render());
    out
}

/// Compact one-line form of a snapshot for human-readable logs.
pub fn describe(snapshot: &Snapshot) -> String {
    format!(
        "t={} seed={} rule={}#{} player=({}, {}) hp={} score={} npcs={} items={} faults={}",
        snapshot.tick,
        snapshot.seed,
        snapshot.rule.name(),
        snapshot.rule.generation(),
        snapshot.player.x,
        snapshot.player.y,
        snapshot.player.health,
        snapshot.player.score,
        snapshot.npcs.len(),
        snapshot.item_count,
        snapshot.faults
    )
}
