use crate::types::{DEFAULT_RATING, PlayerStore, ROUNDS_KEY, Stat, StatMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Rating spread at which a team's win reward hits the floor or ceiling.
pub const MAX_ALLOWED_DIFFERENCE: f64 = 400.0;
pub const MAX_TEAM_REWARD: f64 = 245.0;
pub const MIN_TEAM_REWARD: f64 = 5.0;
pub const STANDARD_TEAM_REWARD: f64 = (MAX_TEAM_REWARD + MIN_TEAM_REWARD) / 2.0;
pub const REWARD_SCALING: f64 = (STANDARD_TEAM_REWARD - MIN_TEAM_REWARD) / MAX_ALLOWED_DIFFERENCE;

/// Expected performance of a player rated exactly at the match baseline.
pub const PERFORMANCE_AVERAGE: f64 = 1.0;
/// 400 above the baseline raises the target by 50%, 400 below lowers it by 50%.
pub const MAX_TARGET_ELO_DIFF: f64 = 400.0;
pub const MIN_PERFORMANCE_RATIO: f64 = 0.5;
pub const MAX_PERFORMANCE_RATIO: f64 = 1.5;

/// Read-only access to current ratings. Unknown players are at [`DEFAULT_RATING`].
pub trait RatingLookup {
    fn rating(&self, player_id: &str) -> f64;
}

impl RatingLookup for PlayerStore {
    fn rating(&self, player_id: &str) -> f64 {
        self.get(player_id).map_or(DEFAULT_RATING, |player| player.elo)
    }
}

impl RatingLookup for HashMap<String, f64> {
    fn rating(&self, player_id: &str) -> f64 {
        self.get(player_id).copied().unwrap_or(DEFAULT_RATING)
    }
}

/// How a player's single-match performance scalar is derived from their stats.
///
/// Switching formulas part way through a hub's history makes old and new
/// rating changes incomparable, so pick one per hub and keep it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceFormula {
    /// `0.3591*KPR - 0.5329*DPR + 0.2372*impact + 0.1587`.
    #[default]
    LinearRating,
    /// The raw K/R ratio.
    KillsPerRound,
}

impl PerformanceFormula {
    #[must_use]
    pub fn performance_actual(self, stats: &StatMap) -> f64 {
        let get = |key: &str| stats.get(key).copied().unwrap_or_default();
        match self {
            PerformanceFormula::KillsPerRound => get(Stat::KrRatio.key()),
            PerformanceFormula::LinearRating => {
                let rounds = get(ROUNDS_KEY);
                let per_round = |value: f64| if rounds > 0.0 { value / rounds } else { 0.0 };
                let kpr = per_round(get(Stat::Kills.key()));
                let dpr = per_round(get(Stat::Deaths.key()));
                let apr = per_round(get(Stat::Assists.key()));
                let impact = 2.13 * kpr + 0.42 * apr - 0.41;
                0.3591 * kpr - 0.5329 * dpr + 0.2372 * impact + 0.1587
            }
        }
    }
}

/// Per-player rating outcome of one match, stored on the match record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerEloChange {
    /// Rating before the match.
    pub elo: f64,
    pub elo_change: f64,
    pub performance_target: f64,
    pub performance_actual: f64,
}

/// Team-level values computed once per match from pre-match ratings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchElo {
    pub match_elo: f64,
    pub team_one_elo: f64,
    pub team_two_elo: f64,
    /// Per-player share of the team's win reward.
    pub team_one_elo_win: f64,
    pub team_two_elo_win: f64,
}

impl MatchElo {
    pub fn new(team_one: &[String], team_two: &[String], ratings: &impl RatingLookup) -> Self {
        let all = team_one.iter().chain(team_two);
        let match_elo = mean(all.map(|p| ratings.rating(p))).unwrap_or(DEFAULT_RATING);
        let team_one_elo = mean(team_one.iter().map(|p| ratings.rating(p))).unwrap_or(match_elo);
        let team_two_elo = mean(team_two.iter().map(|p| ratings.rating(p))).unwrap_or(match_elo);
        Self {
            match_elo,
            team_one_elo,
            team_two_elo,
            team_one_elo_win: team_elo_win(team_one_elo, match_elo, team_one.len()),
            team_two_elo_win: team_elo_win(team_two_elo, match_elo, team_two.len()),
        }
    }
}

/// Win reward per player: teams below the baseline stand to gain more.
#[must_use]
pub fn team_elo_win(team_elo: f64, match_elo: f64, team_size: usize) -> f64 {
    let reward = (STANDARD_TEAM_REWARD - REWARD_SCALING * (team_elo - match_elo))
        .clamp(MIN_TEAM_REWARD, MAX_TEAM_REWARD);
    reward / team_size.max(1) as f64
}

#[must_use]
pub fn performance_target(player_elo: f64, match_elo: f64) -> f64 {
    let diff = (player_elo - match_elo).clamp(-MAX_TARGET_ELO_DIFF, MAX_TARGET_ELO_DIFF);
    PERFORMANCE_AVERAGE * (1.0 + diff / (MAX_TARGET_ELO_DIFF * 2.0))
}

/// Always within `[MIN_PERFORMANCE_RATIO, MAX_PERFORMANCE_RATIO]`, NaN included.
#[must_use]
pub fn performance_ratio(actual: f64, target: f64, balancer: f64) -> f64 {
    let ratio = actual / (target * balancer);
    if ratio.is_nan() {
        MIN_PERFORMANCE_RATIO
    } else {
        ratio.clamp(MIN_PERFORMANCE_RATIO, MAX_PERFORMANCE_RATIO)
    }
}

/// Signed rating change. Losers with a good ratio lose less than poor ones.
#[must_use]
pub fn elo_change(ratio: f64, won: bool, own_elo_win: f64, opposing_elo_win: f64) -> f64 {
    if won {
        ratio * own_elo_win
    } else {
        -(ratio - 2.0).abs() * opposing_elo_win
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatedMatch {
    pub elo: MatchElo,
    pub changes: BTreeMap<String, PlayerEloChange>,
}

/// Computes every participant's rating change for one match.
///
/// All values derive from the ratings in `ratings` at call time; nothing is
/// written back.
pub fn rate_match(
    team_one: &[String],
    team_two: &[String],
    winner: u8,
    player_stats: &BTreeMap<String, StatMap>,
    ratings: &impl RatingLookup,
    formula: PerformanceFormula,
) -> RatedMatch {
    let elo = MatchElo::new(team_one, team_two, ratings);
    let empty = StatMap::new();

    let mut changes = BTreeMap::new();
    for (team_no, roster) in [(1u8, team_one), (2u8, team_two)] {
        let (own_win, opposing_win) = if team_no == 1 {
            (elo.team_one_elo_win, elo.team_two_elo_win)
        } else {
            (elo.team_two_elo_win, elo.team_one_elo_win)
        };

        let performances = roster
            .iter()
            .map(|player| {
                let rating = ratings.rating(player);
                let stats = player_stats.get(player).unwrap_or(&empty);
                (
                    player,
                    rating,
                    performance_target(rating, elo.match_elo),
                    formula.performance_actual(stats),
                )
            })
            .collect::<Vec<_>>();

        let balancer = mean(performances.iter().map(|(_, _, target, actual)| actual / target))
            .filter(|b| b.is_finite() && *b > 0.0)
            .unwrap_or(1.0);

        for (player, rating, target, actual) in performances {
            let ratio = performance_ratio(actual, target, balancer);
            changes.insert(
                player.clone(),
                PlayerEloChange {
                    elo: rating,
                    elo_change: elo_change(ratio, winner == team_no, own_win, opposing_win),
                    performance_target: target,
                    performance_actual: actual,
                },
            );
        }
    }

    RatedMatch { elo, changes }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn stats(kills: f64, deaths: f64, assists: f64, rounds: f64) -> StatMap {
        StatMap::from([
            ("Kills".to_string(), kills),
            ("Deaths".to_string(), deaths),
            ("Assists".to_string(), assists),
            (ROUNDS_KEY.to_string(), rounds),
            ("K/R Ratio".to_string(), kills / rounds),
        ])
    }

    #[test]
    fn even_teams_get_mid_band_reward() {
        let ratings = HashMap::from([
            ("a".to_string(), 1000.0),
            ("b".to_string(), 1000.0),
            ("c".to_string(), 1000.0),
            ("d".to_string(), 1000.0),
        ]);
        let elo = MatchElo::new(&ids(&["a", "b"]), &ids(&["c", "d"]), &ratings);

        assert_relative_eq!(elo.match_elo, 1000.0);
        assert_relative_eq!(elo.team_one_elo_win, 62.5);
        assert_relative_eq!(elo.team_two_elo_win, 62.5);
    }

    #[test]
    fn weaker_team_earns_more_for_a_win() {
        let ratings = HashMap::from([
            ("a".to_string(), 1200.0),
            ("b".to_string(), 1200.0),
            ("c".to_string(), 800.0),
            ("d".to_string(), 800.0),
        ]);
        let elo = MatchElo::new(&ids(&["a", "b"]), &ids(&["c", "d"]), &ratings);

        assert_relative_eq!(elo.team_one_elo, 1200.0);
        assert_relative_eq!(elo.team_two_elo, 800.0);
        // 125 -/+ 0.3 * 200, split over two players
        assert_relative_eq!(elo.team_one_elo_win, 32.5);
        assert_relative_eq!(elo.team_two_elo_win, 92.5);
    }

    #[test]
    fn team_reward_is_clamped() {
        for team_size in 1..=5 {
            let n = team_size as f64;
            for diff in [-100_000.0, -1000.0, 0.0, 1000.0, 100_000.0] {
                let reward = team_elo_win(1000.0 + diff, 1000.0, team_size);
                assert!(reward >= MIN_TEAM_REWARD / n - 1e-9);
                assert!(reward <= MAX_TEAM_REWARD / n + 1e-9);
            }
        }
        assert_relative_eq!(team_elo_win(-1e9, 0.0, 5), 49.0);
        assert_relative_eq!(team_elo_win(1e9, 0.0, 5), 1.0);
    }

    #[test]
    fn target_is_clamped_to_half_and_one_and_a_half() {
        assert_relative_eq!(performance_target(1000.0, 1000.0), 1.0);
        assert_relative_eq!(performance_target(1200.0, 1000.0), 1.25);
        assert_relative_eq!(performance_target(5000.0, 1000.0), 1.5);
        assert_relative_eq!(performance_target(-5000.0, 1000.0), 0.5);
    }

    #[test]
    fn ratio_is_clamped_for_pathological_inputs() {
        for actual in [-10.0, -0.1, 0.0, 0.4, 1.0, 7.0, f64::INFINITY, f64::NAN] {
            for balancer in [1.0, 0.0, -2.0] {
                let ratio = performance_ratio(actual, 1.0, balancer);
                assert!(
                    (MIN_PERFORMANCE_RATIO..=MAX_PERFORMANCE_RATIO).contains(&ratio),
                    "actual {actual} balancer {balancer} gave {ratio}"
                );
            }
        }
    }

    #[test]
    fn losses_are_asymmetric() {
        assert_relative_eq!(elo_change(1.5, false, 0.0, 20.0), -10.0);
        assert_relative_eq!(elo_change(0.5, false, 0.0, 20.0), -30.0);
        assert_relative_eq!(elo_change(1.2, true, 25.0, 0.0), 30.0);
    }

    #[test]
    fn linear_rating_formula() {
        let s = stats(20.0, 10.0, 5.0, 20.0);
        let kpr: f64 = 1.0;
        let dpr: f64 = 0.5;
        let apr: f64 = 0.25;
        let impact = 2.13 * kpr + 0.42 * apr - 0.41;
        let expected = 0.3591 * kpr - 0.5329 * dpr + 0.2372 * impact + 0.1587;
        assert_relative_eq!(PerformanceFormula::LinearRating.performance_actual(&s), expected);
        assert_relative_eq!(PerformanceFormula::KillsPerRound.performance_actual(&s), 1.0);
    }

    #[test]
    fn zero_rounds_do_not_divide_by_zero() {
        let actual =
            PerformanceFormula::LinearRating.performance_actual(&stats(3.0, 2.0, 1.0, 0.0));
        assert!(actual.is_finite());
    }

    #[test]
    fn identical_performances_get_full_reward() {
        let team_one = ids(&["a", "b"]);
        let team_two = ids(&["c", "d"]);
        let player_stats = ["a", "b", "c", "d"]
            .iter()
            .map(|p| (p.to_string(), stats(18.0, 16.0, 4.0, 24.0)))
            .collect();
        let rated = rate_match(
            &team_one,
            &team_two,
            1,
            &player_stats,
            &HashMap::<String, f64>::new(),
            PerformanceFormula::LinearRating,
        );

        // balancer re-centres everybody to a ratio of exactly one
        assert_relative_eq!(rated.changes["a"].elo_change, 62.5);
        assert_relative_eq!(rated.changes["b"].elo_change, 62.5);
        assert_relative_eq!(rated.changes["c"].elo_change, -62.5);
        assert_relative_eq!(rated.changes["d"].elo_change, -62.5);
        assert_relative_eq!(rated.changes["a"].elo, DEFAULT_RATING);
    }

    #[test]
    fn better_performer_gains_more_within_a_team() {
        let team_one = ids(&["a", "b"]);
        let team_two = ids(&["c", "d"]);
        let mut player_stats: BTreeMap<String, StatMap> = ["c", "d"]
            .iter()
            .map(|p| (p.to_string(), stats(15.0, 18.0, 3.0, 24.0)))
            .collect();
        player_stats.insert("a".to_string(), stats(28.0, 12.0, 6.0, 24.0));
        player_stats.insert("b".to_string(), stats(14.0, 17.0, 2.0, 24.0));

        let rated = rate_match(
            &team_one,
            &team_two,
            1,
            &player_stats,
            &HashMap::<String, f64>::new(),
            PerformanceFormula::LinearRating,
        );

        assert!(rated.changes["a"].elo_change > rated.changes["b"].elo_change);
        assert!(rated.changes["b"].elo_change > 0.0);
        assert!(rated.changes["c"].elo_change < 0.0);
    }

    #[test]
    fn missing_team_member_stats_still_produce_a_change() {
        let rated = rate_match(
            &ids(&["a"]),
            &ids(&["b"]),
            2,
            &BTreeMap::new(),
            &HashMap::<String, f64>::new(),
            PerformanceFormula::KillsPerRound,
        );
        // zero actuals fall back to an un-balanced ratio, clamped to the floor
        assert_relative_eq!(rated.changes["a"].elo_change, -1.5 * 125.0);
        assert_relative_eq!(rated.changes["b"].elo_change, 0.5 * 125.0);
    }
}
