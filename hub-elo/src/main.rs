#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

use core::time::Duration;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use hub_elo::api::FaceitClient;
use hub_elo::balance::{find_balanced_teams, rated_pool};
use hub_elo::config::{Cli, Command, IngestConfig};
use hub_elo::persist::{load_snapshot, save_snapshot, snapshot_path};
use hub_elo::persist::HubSnapshot;
use hub_elo::stats::{
    average_performance_actual, elo_high_scores, elo_leaderboard, matches_with_player, scoreboard,
};
use hub_elo::task::{IngestRequest, TaskRegistry, TaskState};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _guard = common::init_tracing(env!("CARGO_PKG_NAME"));

    let Cli {
        command,
        data_dir,
        metrics_addr,
    } = Cli::parse();
    if let Some(addr) = metrics_addr {
        common::init_metrics(addr)?;
    }

    match command {
        Command::Fetch { ingest } => run_ingest(&data_dir, &ingest, false).await,
        Command::Update { ingest } => run_ingest(&data_dir, &ingest, true).await,
        Command::Show {
            hub_id,
            top,
            hi_scores,
            match_id,
            player,
        } => {
            let snapshot = load_snapshot(&snapshot_path(&data_dir, &hub_id))?;
            match (match_id, player) {
                (Some(match_id), _) => show_match(&snapshot, &match_id),
                (None, Some(player)) => show_player(&snapshot, &player, top),
                (None, None) => {
                    show_leaderboard(&snapshot, top, hi_scores);
                    Ok(())
                }
            }
        }
        Command::Balance {
            hub_id,
            players,
            team_size,
            top,
        } => balance(&data_dir, &hub_id, &players, team_size, top),
    }
}

async fn run_ingest(
    data_dir: &Path,
    config: &IngestConfig,
    incremental: bool,
) -> anyhow::Result<()> {
    let source = FaceitClient::from_env()?;
    let hub_id = config.hub_id.as_str();

    let request = if incremental {
        let path = snapshot_path(data_dir, hub_id);
        let snapshot = load_snapshot(&path)
            .with_context(|| format!("No usable snapshot for hub {hub_id}, run fetch first"))?;
        IngestRequest::Incremental(snapshot.data)
    } else {
        IngestRequest::Full
    };

    let registry = TaskRegistry::new(source, config.settings());
    let task_id = registry.submit(hub_id, request)?;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
        )?
        .progress_chars("##-"),
    );
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        interval.tick().await;
        let status = registry.poll(task_id)?;
        bar.set_length(status.total as u64);
        bar.set_position(status.progress as u64);
        bar.set_message(format!("{:?}", status.phase));
        if matches!(status.state, TaskState::Finished | TaskState::Failed(_)) {
            break;
        }
    }
    bar.finish_and_clear();

    let outcome = registry.take_result(task_id).await?;
    let path = save_snapshot(data_dir, hub_id, &outcome.data)?;
    info!(
        players = outcome.data.players.len(),
        matches = outcome.data.matches.len(),
        "{}",
        outcome.message
    );
    println!("{}, saved to {}", outcome.summary(), path.display());
    Ok(())
}

fn show_leaderboard(snapshot: &HubSnapshot, top: usize, hi_scores: bool) {
    let rows = if hi_scores {
        elo_high_scores(&snapshot.data.players)
    } else {
        elo_leaderboard(&snapshot.data.players)
    };

    println!(
        "Hub {} - {} matches, snapshot from {}",
        snapshot.hub_id,
        snapshot.data.match_list.len(),
        snapshot.saved_at
    );
    if let Some(actual) = average_performance_actual(&snapshot.data.matches) {
        println!("Average performance: {actual:.3}");
    }
    for row in rows.iter().take(top) {
        println!("{:>4}  {:>6.0}  {}", row.rank, row.elo, row.name);
    }
}

fn show_match(snapshot: &HubSnapshot, match_id: &str) -> anyhow::Result<()> {
    let record = snapshot
        .data
        .matches
        .get(match_id)
        .with_context(|| format!("Match {match_id} is not in the snapshot"))?;
    let board = scoreboard(record, &snapshot.data.players);

    println!(
        "{} on {}: {} - {}",
        board.match_id, board.map, board.team_one_score, board.team_two_score
    );
    for (elo, rows) in [
        (board.team_one_elo, &board.team_one),
        (board.team_two_elo, &board.team_two),
    ] {
        println!("  team elo {elo:.0}");
        for row in rows {
            let kills = row.stats.get("Kills").copied().unwrap_or_default();
            let deaths = row.stats.get("Deaths").copied().unwrap_or_default();
            match row.elo {
                Some(change) => println!(
                    "    {:<20} {kills:>3}/{deaths:<3} {:>6.0} {:+6.1}",
                    row.name, change.elo, change.elo_change
                ),
                None => println!("    {:<20} {kills:>3}/{deaths:<3}      -", row.name),
            }
        }
    }
    Ok(())
}

fn show_player(snapshot: &HubSnapshot, player: &str, top: usize) -> anyhow::Result<()> {
    let player_id = snapshot
        .name_lookup
        .get(player)
        .map_or(player, String::as_str);
    let record = snapshot
        .data
        .players
        .get(player_id)
        .with_context(|| format!("Player {player} is not in the snapshot"))?;

    println!(
        "{} - elo {:.0} after {} matches",
        record.name,
        record.elo,
        record.matches_played()
    );
    let played = matches_with_player(
        &snapshot.data.matches,
        &snapshot.data.match_list,
        player_id,
    );
    for match_id in played.iter().rev().take(top) {
        let Some(change) = snapshot
            .data
            .matches
            .get(*match_id)
            .and_then(|record| record.player_elo_data.get(player_id))
        else {
            continue;
        };
        println!("  {match_id}  {:>6.0} {:+6.1}", change.elo, change.elo_change);
    }
    Ok(())
}

fn balance(
    data_dir: &Path,
    hub_id: &str,
    players: &[String],
    team_size: usize,
    top: usize,
) -> anyhow::Result<()> {
    let snapshot = load_snapshot(&snapshot_path(data_dir, hub_id))?;
    let player_ids = players
        .iter()
        .map(|player| {
            snapshot.name_lookup.get(player).cloned().unwrap_or_else(|| {
                if !snapshot.data.players.contains_key(player) {
                    warn!("Unknown player {player}, using the default rating");
                }
                player.clone()
            })
        })
        .collect::<Vec<_>>();

    let pool = rated_pool(&snapshot.data.players, &player_ids)
        .into_iter()
        .map(|(id, elo)| {
            let name = snapshot
                .data
                .players
                .get(&id)
                .map_or(id, |player| player.name.clone());
            (name, elo)
        })
        .collect::<Vec<_>>();

    for (i, split) in find_balanced_teams(&pool, team_size, top)?.iter().enumerate() {
        println!(
            "#{}  difference {:.1}\n    {}\n    {}",
            i + 1,
            split.elo_difference,
            split.team_one.join(", "),
            split.team_two.join(", ")
        );
    }
    Ok(())
}
