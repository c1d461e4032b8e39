//! Lobby Simulator CLI Tool
//!
//! Runs a complete match in-process with no broker: players enter the queue,
//! a room forms (backfilled with bots when short), heroes get picked, and the
//! phase scheduler drives rounds until one seat survives. Useful for watching
//! the full lifecycle and for smoke-testing rule changes.
//!
//! Usage:
//!   cargo run --bin lobby-sim -- --players 3
//!   cargo run --bin lobby-sim -- --players 8 --prep-seconds 1 --confirm-heroes

use anyhow::{anyhow, Result};
use clap::Parser;
use std::time::Duration;

use arena_lobby::config::AppConfig;
use arena_lobby::service::AppState;
use arena_lobby::types::{GamePhase, RoomStatus};

#[derive(Parser)]
#[command(name = "lobby-sim")]
#[command(about = "Run a complete auto-battler match in-process, no broker required")]
struct Cli {
    /// Human players to enqueue (bots fill the rest of the room)
    #[arg(short, long, default_value = "1")]
    players: usize,

    /// Rating for every simulated player
    #[arg(short, long, default_value = "1500.0")]
    rating: f64,

    /// Preparation phase length in seconds
    #[arg(long, default_value = "2")]
    prep_seconds: u64,

    /// Hero selection deadline in seconds
    #[arg(long, default_value = "2")]
    selection_seconds: u64,

    /// Confirm heroes for the humans instead of waiting for the deadline
    #[arg(long)]
    confirm_heroes: bool,

    /// Give up if the match has not finished after this many seconds
    #[arg(long, default_value = "120")]
    timeout_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::default();
    config.matchmaking.backfill_delay_seconds = 0;
    config.rules.preparation_seconds = cli.prep_seconds;
    config.rules.selection_deadline_seconds = cli.selection_seconds;
    if cli.players == 0 || cli.players > config.rules.room_size {
        return Err(anyhow!(
            "players must be between 1 and {}",
            config.rules.room_size
        ));
    }

    let app = AppState::standalone(config.clone())
        .map_err(|e| anyhow!("failed to build service: {}", e))?;

    println!("Queueing {} player(s) at rating {:.0}...", cli.players, cli.rating);
    for i in 0..cli.players {
        app.enqueue(format!("player_{}", i), format!("Player {}", i), cli.rating)
            .await?;
    }

    // Drive ticks by hand until a room forms; a full bucket matches at once,
    // a short one backfills (threshold is zeroed above)
    let room_id = loop {
        if let Some(room_id) = app.tick().await? {
            break room_id;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    };

    let room = app.get_room(&room_id).await?;
    println!(
        "Room {} formed: {} seats ({} human, {} bot)",
        room_id,
        room.seats.len(),
        room.seats.iter().filter(|s| s.occupant.is_human()).count(),
        room.seats.iter().filter(|s| s.occupant.is_bot()).count(),
    );

    if cli.confirm_heroes {
        for seat in &room.seats {
            if !seat.occupant.is_human() {
                continue;
            }
            let hero = seat
                .hero_candidates
                .first()
                .ok_or_else(|| anyhow!("seat {} has no candidates", seat.occupant.id()))?;
            app.confirm_hero(&room_id, seat.occupant.id(), hero).await?;
            println!("  {} picked {}", seat.display_name, hero);
        }
        println!("Bots pick at the {}s deadline", cli.selection_seconds);
    } else {
        println!("Waiting {}s for the selection deadline...", cli.selection_seconds);
    }

    // Watch the match play out
    let deadline = tokio::time::Instant::now() + Duration::from_secs(cli.timeout_seconds);
    let mut last_round = 0;
    let mut last_phase: Option<GamePhase> = None;
    loop {
        if tokio::time::Instant::now() >= deadline {
            return Err(anyhow!("match did not finish within the timeout"));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let room = app.get_room(&room_id).await?;
        if room.status == RoomStatus::Finished {
            println!("\nMatch finished after {} round(s)", room.round);
            match &room.winner {
                Some(winner) => {
                    let name = room
                        .seats
                        .iter()
                        .find(|s| s.occupant.id() == *winner)
                        .map(|s| s.display_name.as_str())
                        .unwrap_or(winner.as_str());
                    println!("Winner: {} ({})", name, winner);
                }
                None => println!("No winner recorded"),
            }
            break;
        }

        if room.round != last_round || room.phase != last_phase {
            last_round = room.round;
            last_phase = room.phase;
            if let Some(phase) = room.phase {
                let alive = room.seats.iter().filter(|s| !s.eliminated).count();
                println!(
                    "  round {:>2} {:?}: {} seat(s) alive",
                    room.round, phase, alive
                );
            }
        }
    }

    let stats = app.queue_stats();
    println!(
        "\nStats: {} queued, {} rooms formed ({} backfilled), {} bots provisioned",
        stats.players_queued, stats.rooms_formed, stats.rooms_backfilled,
        stats.bots_provisioned
    );
    Ok(())
}
