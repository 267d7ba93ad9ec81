//! Aviastar demo binary
//!
//! Runs a few crash rounds against in-memory ledgers with simulated players
//! who cash out at random targets, then prints the engine metrics.

use aviastar::common::types::{format_amount, Multiplier, UserId};
use aviastar::config::ConfigLoader;
use aviastar::in_memory::{InMemoryBalances, InMemoryBets, TracingNotifier};
use aviastar::{CrashGameService, MetricsSnapshot, RoundEvent};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "aviastar")]
#[command(about = "Aviastar crash game simulator", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Number of rounds to play
    #[arg(long, default_value = "5")]
    rounds: u32,

    /// Number of simulated players
    #[arg(long, default_value = "4")]
    players: u32,

    /// Starting balance of every player, in cents
    #[arg(long, default_value = "100000")]
    balance: u64,

    /// Seed for crash points and player behaviour
    #[arg(long)]
    seed: Option<u64>,

    /// Tick every 20ms instead of the configured interval
    #[arg(long)]
    fast: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Summary {
    metrics: MetricsSnapshot,
    balances: Vec<(UserId, u64)>,
    leaderboard: Vec<(UserId, u64)>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match args.config {
        Some(ref path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;
    if args.fast {
        config.game.tick_interval_ms = 20;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("aviastar={}", config.logging.level).into()),
        )
        .init();

    let seed = args.seed.unwrap_or_else(rand::random);
    info!("Simulating {} rounds with {} players (seed {})", args.rounds, args.players, seed);

    let players: Vec<UserId> = (1..=args.players as UserId).collect();
    let balances = Arc::new(InMemoryBalances::with_balances(
        players.iter().map(|&user_id| (user_id, args.balance)),
    ));
    let bets = Arc::new(InMemoryBets::new());

    let service = CrashGameService::builder()
        .with_config(config)
        .with_seed(seed)
        .with_balances(balances.clone())
        .with_bets(bets.clone())
        .with_notifier(Arc::new(TracingNotifier))
        .build()?;

    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..args.rounds {
        play_round(&service, &balances, &players, &mut rng).await;
    }

    service.shutdown().await;

    let summary = Summary {
        metrics: service.metrics(),
        balances: players
            .iter()
            .map(|&user_id| (user_id, balances.get(user_id).unwrap_or(0)))
            .collect(),
        leaderboard: bets.leaderboard(3),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

/// Place a bet for every funded player, then cash out each one when the
/// multiplier reaches their target. Returns once the round has settled.
async fn play_round(service: &CrashGameService, balances: &InMemoryBalances, players: &[UserId], rng: &mut StdRng) {
    let mut events = service.subscribe();
    let (min_bet, max_bet) = (service.config().game.min_bet, service.config().game.max_bet);
    let mut targets: HashMap<UserId, Multiplier> = HashMap::new();
    let mut round_id = None;

    for &user_id in players {
        let available = balances.get(user_id).unwrap_or(0);
        if available < min_bet {
            continue;
        }

        let amount = rng.gen_range(min_bet..=max_bet.min(available)) / 100 * 100;
        match service.place_bet(user_id, amount.max(min_bet)).await {
            Ok(placed) => {
                round_id = Some(placed.round_id);
                targets.insert(user_id, Multiplier::from_hundredths(rng.gen_range(110..=300)));
            }
            Err(e) => warn!("User {} could not bet: {}", user_id, e),
        }
    }

    let Some(round_id) = round_id else {
        warn!("Nobody could afford a bet");
        return;
    };

    loop {
        match events.recv().await {
            Ok(RoundEvent::MultiplierAdvanced { multiplier, .. }) => {
                let ready: Vec<UserId> = targets
                    .iter()
                    .filter(|(_, target)| **target <= multiplier)
                    .map(|(user_id, _)| *user_id)
                    .collect();

                for user_id in ready {
                    targets.remove(&user_id);
                    if let Err(e) = service.cash_out(user_id).await {
                        warn!("User {} missed the cash-out: {}", user_id, e);
                    }
                }
            }
            Ok(RoundEvent::RoundSettled { round_id: settled }) if settled == round_id => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Skipped {} round events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_summary(summary: &Summary) {
    let metrics = &summary.metrics;
    println!("Rounds played:   {}", metrics.rounds_crashed);
    println!("Bets placed:     {}", metrics.bets_admitted);
    println!("Cash-outs:       {}", metrics.cashouts);
    println!("Losses:          {}", metrics.losses);
    println!("Total wagered:   {}", format_amount(metrics.total_wagered));
    println!("Total paid out:  {}", format_amount(metrics.total_paid_out));
    println!("House edge:      {:.2}%", metrics.house_edge() * 100.0);

    println!();
    println!("Balances:");
    for (user_id, balance) in &summary.balances {
        println!("  user {:>3}: {}", user_id, format_amount(*balance));
    }

    println!();
    println!("Top winners:");
    for (rank, (user_id, total_won)) in summary.leaderboard.iter().enumerate() {
        println!("  {}. user {}: {}", rank + 1, user_id, format_amount(*total_won));
    }
}
