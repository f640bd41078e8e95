//! Battle Simulator CLI Tool
//!
//! In-process simulation driver for the matchmaking core: queues synthetic
//! players, runs scanner passes, completes the resulting battles and
//! prints the final rating table. Useful for eyeballing matcher behavior
//! without a broker or HTTP client.
//!
//! Usage:
//!   cargo run --bin battle-sim -- --help
//!   cargo run --bin battle-sim simulate --players 8 --rounds 3
//!   cargo run --bin battle-sim demo

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::sync::Arc;
use trade_arena::amqp::publisher::MockEventPublisher;
use trade_arena::matcher::{JoinOutcome, MatchScanner, MatcherConfig};
use trade_arena::queue::InMemoryQueueStore;
use trade_arena::rating::elo::{EloCalculator, EloSettings};
use trade_arena::rating::store::{InMemoryRatingStore, RatingStore};
use trade_arena::rating::updater::RatingUpdater;
use trade_arena::session::{InMemorySessionStore, SessionStore};
use trade_arena::types::{BattleResults, GameMode, SessionId, UserId};

#[derive(Parser)]
#[command(name = "battle-sim")]
#[command(about = "In-process simulation driver for trade-arena matchmaking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a pool of synthetic players and battle them over several rounds
    Simulate {
        /// Number of synthetic players
        #[arg(short, long, default_value = "8")]
        players: usize,
        /// Number of queue-and-battle rounds
        #[arg(short, long, default_value = "3")]
        rounds: usize,
        /// Game mode (sprint, standard or marathon)
        #[arg(short, long, default_value = "standard")]
        mode: String,
    },
    /// Walk two players through a single battle step by step
    Demo,
}

/// One in-process matchmaking system
struct Simulation {
    scanner: Arc<MatchScanner>,
    updater: RatingUpdater,
    ratings: Arc<InMemoryRatingStore>,
    sessions: Arc<InMemorySessionStore>,
}

impl Simulation {
    fn new() -> Result<Self> {
        let queue = Arc::new(InMemoryQueueStore::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let ratings = Arc::new(InMemoryRatingStore::default());
        let publisher = Arc::new(MockEventPublisher::new());
        let metrics = Arc::new(trade_arena::metrics::MetricsCollector::default());

        let scanner = Arc::new(MatchScanner::with_metrics(
            queue,
            sessions.clone(),
            publisher.clone(),
            MatcherConfig::default(),
            metrics.clone(),
        ));
        let updater = RatingUpdater::new(
            ratings.clone(),
            sessions.clone(),
            publisher,
            EloCalculator::new(EloSettings::default())?,
            metrics,
        );

        Ok(Self {
            scanner,
            updater,
            ratings,
            sessions,
        })
    }

    /// Queue every player, collecting sessions created by immediate
    /// pairing, then sweep the stragglers with scanner passes
    async fn queue_and_pair(&self, user_ids: &[UserId], mode: GameMode) -> Result<Vec<SessionId>> {
        let mut session_ids = Vec::new();

        for user_id in user_ids {
            let rating = self.ratings.get_or_create(user_id)?.rating(mode);
            let outcome = self
                .scanner
                .join_queue(user_id, user_id, mode, rating)
                .await?;
            if let JoinOutcome::Matched { session, .. } = outcome {
                session_ids.push(session.id);
            }
        }

        // Whatever immediate pairing left behind is picked up here
        let report = self.scanner.scan().await?;
        if report.paired > 0 {
            println!("  scan paired {} additional battles", report.paired);
        }

        Ok(session_ids)
    }

    /// Complete a battle with deterministic results: the lower-ranked
    /// participant stages an upset every third battle
    async fn complete(&self, session_id: SessionId, battle_index: usize) -> Result<()> {
        let session = self
            .sessions
            .get(session_id)?
            .ok_or_else(|| anyhow::anyhow!("session {} vanished", session_id))?;

        let [first, second] = &session.participants;
        let upset = battle_index % 3 == 2;
        let first_is_favorite = first.starting_rating >= second.starting_rating;
        let first_wins = first_is_favorite != upset;

        let results = HashMap::from([
            (
                first.user_id.clone(),
                synthetic_results(if first_wins { 11_200.0 } else { 9_800.0 }),
            ),
            (
                second.user_id.clone(),
                synthetic_results(if first_wins { 9_800.0 } else { 11_200.0 }),
            ),
        ]);

        let (completed, changes) = self.updater.complete_battle(session_id, results).await?;
        let winner = completed.winner.as_deref().unwrap_or("draw");
        let deltas: Vec<String> = changes
            .iter()
            .map(|c| format!("{} {:+}", c.user_id, c.delta))
            .collect();
        println!(
            "  battle {}: {} vs {} -> {} [{}]",
            battle_index,
            first.user_id,
            second.user_id,
            winner,
            deltas.join(", ")
        );

        Ok(())
    }

    fn print_rating_table(&self, user_ids: &[UserId], mode: GameMode) -> Result<()> {
        println!("\nFinal ratings ({}):", mode);
        println!("{:<12} {:>7} {:>6} {:>6} {:>6} {:>7}", "player", "rating", "won", "lost", "drawn", "streak");

        let mut rows = Vec::new();
        for user_id in user_ids {
            if let Some(record) = self.ratings.get(user_id)? {
                let stats = record.mode_stats(mode);
                rows.push((
                    user_id.clone(),
                    record.rating(mode),
                    stats.wins,
                    stats.losses,
                    stats.draws,
                    record.win_streak,
                ));
            }
        }
        rows.sort_by_key(|row| std::cmp::Reverse(row.1));

        for (user_id, rating, wins, losses, draws, streak) in rows {
            println!(
                "{:<12} {:>7} {:>6} {:>6} {:>6} {:>7}",
                user_id, rating, wins, losses, draws, streak
            );
        }

        Ok(())
    }
}

fn synthetic_results(final_value: f64) -> BattleResults {
    BattleResults {
        final_value,
        return_pct: (final_value - 10_000.0) / 10_000.0 * 100.0,
        trade_count: 5,
        max_drawdown_pct: 3.2,
    }
}

async fn run_simulation(players: usize, rounds: usize, mode: GameMode) -> Result<()> {
    if players < 2 {
        anyhow::bail!("Need at least 2 players to simulate battles");
    }

    let sim = Simulation::new()?;

    // Deterministic spread of user names; ratings start equal and diverge
    // as rounds play out
    let user_ids: Vec<UserId> = (0..players).map(|i| format!("trader-{:02}", i)).collect();

    let mut battle_index = 0;
    for round in 0..rounds {
        println!("Round {}:", round + 1);
        let session_ids = sim.queue_and_pair(&user_ids, mode).await?;

        // Also complete battles created by the sweep scan
        let mut all_sessions = session_ids;
        for user_id in &user_ids {
            if let Some(entry) = sim.scanner.queue_status(user_id).await? {
                if let Some(session_id) = entry.matched_session {
                    if !all_sessions.contains(&session_id) {
                        all_sessions.push(session_id);
                    }
                }
            }
            // Clear matched entries so the next round can re-queue
            sim.scanner.leave_queue(user_id).await?;
        }

        for session_id in all_sessions {
            sim.complete(session_id, battle_index).await?;
            battle_index += 1;
        }
    }

    sim.print_rating_table(&user_ids, mode)?;

    let stats = sim.scanner.get_stats().await?;
    println!(
        "\nScanner: {} queued, {} matched, {} pairs, {} scans",
        stats.players_queued, stats.players_matched, stats.pairs_created, stats.scans_completed
    );

    Ok(())
}

async fn run_demo() -> Result<()> {
    let sim = Simulation::new()?;

    println!("1. alice joins the standard queue");
    let outcome = sim
        .scanner
        .join_queue("alice", "Alice", GameMode::Standard, 1200)
        .await?;
    println!("   -> {:?}", matches!(outcome, JoinOutcome::Queued(_)));

    println!("2. bob joins and is paired immediately");
    let outcome = sim
        .scanner
        .join_queue("bob", "Bob", GameMode::Standard, 1250)
        .await?;
    let session_id = match outcome {
        JoinOutcome::Matched { session, .. } => {
            println!("   -> session {} created", session.id);
            session.id
        }
        JoinOutcome::Queued(_) => anyhow::bail!("expected an immediate match"),
    };

    println!("3. alice outperforms and the battle completes");
    let results = HashMap::from([
        ("alice".to_string(), synthetic_results(11_500.0)),
        ("bob".to_string(), synthetic_results(10_100.0)),
    ]);
    let (session, changes) = sim.updater.complete_battle(session_id, results).await?;
    println!("   -> winner: {:?}", session.winner);
    for change in changes {
        println!(
            "   -> {}: {} -> {} ({:+})",
            change.user_id, change.old_rating, change.new_rating, change.delta
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Simulate {
            players,
            rounds,
            mode,
        } => {
            let mode: GameMode = mode.parse()?;
            run_simulation(players, rounds, mode).await
        }
        Commands::Demo => run_demo().await,
    }
}
