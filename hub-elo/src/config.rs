use crate::api::DEFAULT_PAGE_SIZE;
use crate::balance::{DEFAULT_TEAM_SIZE, DEFAULT_TOP_K};
use crate::elo::PerformanceFormula;
use crate::ingest::{DiffStrategy, IngestSettings};
use clap::{Args, Parser, Subcommand};
use common::RetryPolicy;
use core::net::SocketAddr;
use core::time::Duration;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory hub snapshots are read from and written to.
    #[arg(long, env = "HUB_ELO_DATA_DIR", default_value = ".", global = true)]
    pub data_dir: PathBuf,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "METRICS_ADDR", global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build a hub's ratings from its whole match history.
    Fetch {
        #[command(flatten)]
        ingest: IngestConfig,
    },
    /// Apply matches played since the hub's last snapshot.
    Update {
        #[command(flatten)]
        ingest: IngestConfig,
    },
    /// Print the rating leaderboard of a saved hub.
    Show {
        #[arg(long, env = "HUB_ID")]
        hub_id: String,

        /// Number of rows to print.
        #[arg(long, default_value_t = 20)]
        top: usize,

        /// Rank by best rating ever held instead of current rating.
        #[arg(long)]
        hi_scores: bool,

        /// Print the scoreboard of this match instead of the leaderboard.
        #[arg(long = "match", conflicts_with = "player")]
        match_id: Option<String>,

        /// Print the matches of this player (nickname or id) instead of the leaderboard.
        #[arg(long)]
        player: Option<String>,
    },
    /// Suggest even teams for a set of players of a saved hub.
    Balance {
        #[arg(long, env = "HUB_ID")]
        hub_id: String,

        /// Player nicknames or ids.
        #[arg(required = true, num_args = 2..)]
        players: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_TEAM_SIZE)]
        team_size: usize,

        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top: usize,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    #[arg(long, env = "HUB_ID")]
    pub hub_id: String,

    #[arg(long, env = "MATCH_OFFSET", default_value_t = 0)]
    pub offset: usize,

    #[arg(long, env = "MATCH_LIMIT", default_value_t = 10_000)]
    pub limit: usize,

    /// Capped at 200 by the listing endpoint.
    #[arg(long, env, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    #[arg(long, env, default_value_t = 5)]
    pub page_retries: u32,

    #[arg(long, env, default_value_t = 1000)]
    pub retry_base_delay_ms: u64,

    #[arg(long, env, value_enum, default_value_t = DiffStrategy::Count)]
    pub diff_strategy: DiffStrategy,
}

impl IngestConfig {
    #[must_use]
    pub fn settings(&self) -> IngestSettings {
        IngestSettings {
            offset: self.offset,
            limit: self.limit,
            page_size: self.page_size,
            retry: RetryPolicy::new(
                self.page_retries,
                Duration::from_millis(self.retry_base_delay_ms),
            ),
            diff_strategy: self.diff_strategy,
            formula: PerformanceFormula::default(),
        }
    }
}
