use crate::elo::RatingLookup;
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

/// Splits are enumerated exhaustively, so the pool has to stay small.
pub const MAX_POOL_SIZE: usize = 16;
pub const DEFAULT_TEAM_SIZE: usize = 5;
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("Team size must be at least 1")]
    EmptyTeams,
    #[error("Expected {expected} players for two teams, got {actual}")]
    WrongPoolSize { expected: usize, actual: usize },
    #[error("Pool of {0} players exceeds the maximum of {max}", max = MAX_POOL_SIZE)]
    PoolTooLarge(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamSplit {
    pub team_one: Vec<String>,
    pub team_two: Vec<String>,
    /// Distance of team one's rating sum from half the pool's total.
    pub elo_difference: f64,
}

/// Returns the `top_k` most even two-team splits of `pool`, most even first.
///
/// Every `C(n, team_size)` selection for team one is scored, so mirrored
/// splits both appear. Equal scores keep enumeration order.
pub fn find_balanced_teams(
    pool: &[(String, f64)],
    team_size: usize,
    top_k: usize,
) -> Result<Vec<TeamSplit>, BalanceError> {
    if team_size == 0 {
        return Err(BalanceError::EmptyTeams);
    }
    if pool.len() > MAX_POOL_SIZE {
        return Err(BalanceError::PoolTooLarge(pool.len()));
    }
    if pool.len() != team_size * 2 {
        return Err(BalanceError::WrongPoolSize {
            expected: team_size * 2,
            actual: pool.len(),
        });
    }

    let half = pool.iter().map(|(_, elo)| elo).sum::<f64>() / 2.0;
    let mut splits = (0..pool.len())
        .combinations(team_size)
        .map(|team_one| {
            let sum = team_one.iter().map(|&i| pool[i].1).sum::<f64>();
            ((sum - half).abs(), team_one)
        })
        .collect_vec();
    splits.sort_by(|(a, _), (b, _)| a.total_cmp(b));

    Ok(splits
        .into_iter()
        .take(top_k)
        .map(|(elo_difference, team_one)| {
            let (team_one, team_two): (Vec<_>, Vec<_>) = pool
                .iter()
                .enumerate()
                .partition(|(i, _)| team_one.contains(i));
            TeamSplit {
                team_one: team_one.into_iter().map(|(_, (name, _))| name.clone()).collect(),
                team_two: team_two.into_iter().map(|(_, (name, _))| name.clone()).collect(),
                elo_difference,
            }
        })
        .collect())
}

/// Pairs each player with their current rating.
pub fn rated_pool(ratings: &impl RatingLookup, players: &[String]) -> Vec<(String, f64)> {
    players
        .iter()
        .map(|player| (player.clone(), ratings.rating(player)))
        .collect()
}
