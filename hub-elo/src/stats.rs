use crate::elo::PlayerEloChange;
use crate::types::{MatchRecord, MatchStore, PlayerRecord, PlayerStore, Stat, StatLine, StatMap};
use itertools::Itertools;
use serde::Serialize;

impl PlayerRecord {
    /// The player's last `n` stat lines, oldest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> &[StatLine] {
        &self.stats[self.stats.len().saturating_sub(n)..]
    }

    /// Values of `stat` over the last `n` matches, optionally divided by each
    /// match's round count. Matches with no rounds are reported as zero.
    #[must_use]
    pub fn stats_last_n(&self, n: usize, stat: Stat, per_round: bool) -> Vec<f64> {
        self.recent(n)
            .iter()
            .map(|line| {
                let value = line.get(stat);
                match (per_round, line.rounds) {
                    (false, _) => value,
                    (true, 0) => 0.0,
                    (true, rounds) => value / f64::from(rounds),
                }
            })
            .collect()
    }

    /// Mean of `stat` over the last `n` matches, or per round over their total
    /// round count. `None` when there is nothing to average over.
    #[must_use]
    pub fn avg_last_n(&self, n: usize, stat: Stat, per_round: bool) -> Option<f64> {
        let recent = self.recent(n);
        let total = recent.iter().map(|line| line.get(stat)).sum::<f64>();
        let denominator = if per_round {
            recent.iter().map(|line| f64::from(line.rounds)).sum::<f64>()
        } else {
            recent.len() as f64
        };
        (denominator > 0.0).then(|| total / denominator)
    }

    /// `sum(numerator) / sum(denominator)` over the last `n` matches.
    #[must_use]
    pub fn stat_ratio_last_n(&self, n: usize, numerator: Stat, denominator: Stat) -> Option<f64> {
        let recent = self.recent(n);
        let top = recent.iter().map(|line| line.get(numerator)).sum::<f64>();
        let bottom = recent.iter().map(|line| line.get(denominator)).sum::<f64>();
        (bottom != 0.0).then(|| top / bottom)
    }

    /// Least-squares projection of the next value of `stat`, fitted over the
    /// last `n` matches numbered from one.
    #[must_use]
    pub fn linear_trend(&self, n: usize, stat: Stat, per_round: bool) -> Option<f64> {
        let series = self.stats_last_n(n, stat, per_round);
        let count = series.len() as f64;
        match series.len() {
            0 => None,
            1 => series.first().copied(),
            _ => {
                let mean_x = (count + 1.0) / 2.0;
                let mean_y = series.iter().sum::<f64>() / count;
                let (covariance, variance) = series.iter().enumerate().fold(
                    (0.0, 0.0),
                    |(cov, var), (i, y)| {
                        let dx = (i + 1) as f64 - mean_x;
                        (cov + dx * (y - mean_y), var + dx * dx)
                    },
                );
                let slope = covariance / variance;
                Some(mean_y + slope * (count + 1.0 - mean_x))
            }
        }
    }

    /// Highest rating the player has reached after any match.
    #[must_use]
    pub fn peak_elo(&self) -> Option<f64> {
        self.elo_history.iter().copied().reduce(f64::max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub player_id: String,
    pub name: String,
    pub elo: f64,
}

/// Players ranked by current rating, highest first.
#[must_use]
pub fn elo_leaderboard(players: &PlayerStore) -> Vec<LeaderboardRow> {
    ranked(players.values().map(|player| (player, player.elo)))
}

/// Players ranked by the best rating they ever held. Players with no
/// matches are left out.
#[must_use]
pub fn elo_high_scores(players: &PlayerStore) -> Vec<LeaderboardRow> {
    ranked(
        players
            .values()
            .filter_map(|player| Some((player, player.peak_elo()?))),
    )
}

fn ranked<'a>(rows: impl Iterator<Item = (&'a PlayerRecord, f64)>) -> Vec<LeaderboardRow> {
    // id order first, so ties resolve the same way on every run
    rows.sorted_by(|(a, _), (b, _)| a.player_id.cmp(&b.player_id))
        .sorted_by(|(_, a), (_, b)| b.total_cmp(a))
        .enumerate()
        .map(|(i, (player, elo))| LeaderboardRow {
            rank: i + 1,
            player_id: player.player_id.clone(),
            name: player.name.clone(),
            elo,
        })
        .collect()
}

/// Orders the given players by their average of `stat` over the last `n`
/// matches, or by `stat / denominator` when one is given. Highest first;
/// players without a value are omitted.
#[must_use]
pub fn order_players_by_stat(
    players: &PlayerStore,
    player_ids: &[String],
    n: usize,
    stat: Stat,
    denominator: Option<Stat>,
) -> Vec<(String, f64)> {
    player_ids
        .iter()
        .filter_map(|id| {
            let player = players.get(id)?;
            let value = match denominator {
                Some(denominator) => player.stat_ratio_last_n(n, stat, denominator),
                None => player.avg_last_n(n, stat, false),
            }?;
            Some((id.clone(), value))
        })
        .sorted_by(|(_, a), (_, b)| b.total_cmp(a))
        .collect()
}

/// Mean performance actual over every rated player-match. `None` when no
/// match has been rated.
#[must_use]
pub fn average_performance_actual(matches: &MatchStore) -> Option<f64> {
    let (sum, count) = matches
        .values()
        .flat_map(|record| record.player_elo_data.values())
        .fold((0.0, 0usize), |(sum, count), change| {
            (sum + change.performance_actual, count + 1)
        });
    (count > 0).then(|| sum / count as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreboardRow {
    pub player_id: String,
    pub name: String,
    pub stats: StatMap,
    pub elo: Option<PlayerEloChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scoreboard {
    pub match_id: String,
    pub map: String,
    pub team_one_score: u32,
    pub team_two_score: u32,
    pub team_one_elo: f64,
    pub team_two_elo: f64,
    pub team_one: Vec<ScoreboardRow>,
    pub team_two: Vec<ScoreboardRow>,
}

/// Per-team rows for one match, names resolved against the player store.
#[must_use]
pub fn scoreboard(record: &MatchRecord, players: &PlayerStore) -> Scoreboard {
    let rows = |roster: &[String]| {
        roster
            .iter()
            .map(|id| ScoreboardRow {
                player_id: id.clone(),
                name: players.get(id).map_or_else(|| id.clone(), |p| p.name.clone()),
                stats: record.player_stats.get(id).cloned().unwrap_or_default(),
                elo: record.player_elo_data.get(id).copied(),
            })
            .collect::<Vec<_>>()
    };
    Scoreboard {
        match_id: record.match_id.clone(),
        map: record.map.clone(),
        team_one_score: record.team_one_score,
        team_two_score: record.team_two_score,
        team_one_elo: record.team_one_elo,
        team_two_elo: record.team_two_elo,
        team_one: rows(&record.team_one),
        team_two: rows(&record.team_two),
    }
}

/// Ids from `match_list` the player took part in, in list order.
#[must_use]
pub fn matches_with_player<'a>(
    matches: &MatchStore,
    match_list: &'a [String],
    player_id: &str,
) -> Vec<&'a String> {
    match_list
        .iter()
        .filter(|id| {
            matches
                .get(*id)
                .is_some_and(|record| record.players().any(|p| p == player_id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn player(id: &str, kills_and_rounds: &[(f64, u32)]) -> PlayerRecord {
        let mut player = PlayerRecord::new(id);
        for (i, (kills, rounds)) in kills_and_rounds.iter().enumerate() {
            let stats = StatMap::from([
                ("Kills".to_string(), *kills),
                ("Deaths".to_string(), 10.0),
            ]);
            player
                .stats
                .push(StatLine::from_stats(&format!("m{i}"), "de_nuke", *rounds, &stats));
            player.elo += kills - 10.0;
            player.elo_history.push(player.elo);
        }
        player
    }

    #[test]
    fn averages_use_most_recent_matches() {
        let p = player("a", &[(30.0, 30), (10.0, 20), (20.0, 20)]);

        assert_relative_eq!(p.avg_last_n(2, Stat::Kills, false).unwrap(), 15.0);
        assert_relative_eq!(p.avg_last_n(2, Stat::Kills, true).unwrap(), 0.75);
        assert_relative_eq!(p.avg_last_n(100, Stat::Kills, false).unwrap(), 20.0);
        assert_eq!(p.stats_last_n(2, Stat::Kills, true), vec![0.5, 1.0]);
        assert_eq!(PlayerRecord::new("b").avg_last_n(5, Stat::Kills, false), None);
    }

    #[test]
    fn ratio_guards_zero_denominator() {
        let p = player("a", &[(20.0, 20), (10.0, 20)]);
        assert_relative_eq!(p.stat_ratio_last_n(2, Stat::Kills, Stat::Deaths).unwrap(), 1.5);
        assert_eq!(p.stat_ratio_last_n(2, Stat::Kills, Stat::Assists), None);
    }

    #[test]
    fn linear_trend_projects_next_value() {
        let p = player("a", &[(10.0, 20), (12.0, 20), (14.0, 20), (16.0, 20)]);
        assert_relative_eq!(p.linear_trend(4, Stat::Kills, false).unwrap(), 18.0);
        assert_relative_eq!(p.linear_trend(1, Stat::Kills, false).unwrap(), 16.0);
        assert_eq!(PlayerRecord::new("b").linear_trend(4, Stat::Kills, false), None);
    }

    #[test]
    fn leaderboards_rank_descending() {
        let mut players = PlayerStore::new();
        players.insert("a".to_string(), player("a", &[(30.0, 20), (0.0, 20)]));
        players.insert("b".to_string(), player("b", &[(15.0, 20)]));
        players.insert("c".to_string(), PlayerRecord::new("c"));

        let current = elo_leaderboard(&players);
        assert_eq!(
            current.iter().map(|r| r.player_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(current[0].rank, 1);
        assert_relative_eq!(current[0].elo, 1010.0);
        assert_relative_eq!(current[2].elo, 1000.0);

        let peaks = elo_high_scores(&players);
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].player_id, "a");
        assert_relative_eq!(peaks[0].elo, 1020.0);
    }

    #[test]
    fn average_actual_is_none_when_empty() {
        assert_eq!(average_performance_actual(&MatchStore::new()), None);
    }

    #[test]
    fn orders_players_by_stat() {
        let mut players = PlayerStore::new();
        players.insert("a".to_string(), player("a", &[(10.0, 20)]));
        players.insert("b".to_string(), player("b", &[(25.0, 20)]));
        let ids = ["a", "b", "missing"].map(String::from);

        let by_kills = order_players_by_stat(&players, &ids, 5, Stat::Kills, None);
        assert_eq!(by_kills, vec![("b".to_string(), 25.0), ("a".to_string(), 10.0)]);

        let by_kd = order_players_by_stat(&players, &ids, 5, Stat::Kills, Some(Stat::Deaths));
        assert_eq!(by_kd[0], ("b".to_string(), 2.5));
    }

    fn record(match_id: &str, team_one: &[&str], team_two: &[&str]) -> MatchRecord {
        let ids = |names: &[&str]| names.iter().map(ToString::to_string).collect::<Vec<_>>();
        MatchRecord {
            match_id: match_id.to_string(),
            game_mode: "5v5".to_string(),
            map: "de_inferno".to_string(),
            number_of_rounds: 24,
            team_one_score: 13,
            team_two_score: 11,
            team_one: ids(team_one),
            team_two: ids(team_two),
            winner: 1,
            player_stats: team_one
                .iter()
                .chain(team_two)
                .map(|id| (id.to_string(), StatMap::from([("Kills".to_string(), 20.0)])))
                .collect(),
            player_elo_data: team_one
                .iter()
                .chain(team_two)
                .map(|id| {
                    let change = PlayerEloChange {
                        elo: 1000.0,
                        elo_change: 25.0,
                        performance_target: 1.0,
                        performance_actual: 1.0,
                    };
                    (id.to_string(), change)
                })
                .collect(),
            match_elo: 1000.0,
            team_one_elo: 2000.0,
            team_two_elo: 2000.0,
        }
    }

    #[test]
    fn scoreboard_tolerates_dropouts_and_unrated_players() {
        let mut players = PlayerStore::new();
        let mut a = PlayerRecord::new("a");
        a.name = "alice".to_string();
        players.insert("a".to_string(), a);

        let mut game = record("m1", &["a", "b"], &["c", "d"]);
        // c left before the end: listed on the roster, no stats and no rating
        game.player_stats.remove("c");
        game.player_elo_data.remove("c");
        game.team_two.push("e".to_string());

        let board = scoreboard(&game, &players);

        assert_eq!(board.match_id, "m1");
        assert_eq!((board.team_one_score, board.team_two_score), (13, 11));
        assert_eq!(board.team_one[0].name, "alice");
        // names fall back to the id when the player store lacks the player
        assert_eq!(board.team_one[1].name, "b");
        assert_eq!(board.team_two.len(), 3);
        let dropout = &board.team_two[0];
        assert_eq!(dropout.player_id, "c");
        assert!(dropout.stats.is_empty());
        assert_eq!(dropout.elo, None);
        assert_relative_eq!(board.team_one[0].elo.unwrap().elo_change, 25.0);
        assert_eq!(board.team_two[2].elo, None);
    }

    #[test]
    fn matches_with_player_keeps_list_order() {
        let matches = MatchStore::from([
            ("m1".to_string(), record("m1", &["a", "b"], &["c", "d"])),
            ("m2".to_string(), record("m2", &["c", "b"], &["e", "f"])),
            ("m3".to_string(), record("m3", &["d", "e"], &["a", "f"])),
        ]);
        let list = ["m1", "m2", "unplayed", "m3"].map(String::from);

        assert_eq!(matches_with_player(&matches, &list, "a"), vec!["m1", "m3"]);
        assert_eq!(matches_with_player(&matches, &list, "b"), vec!["m1", "m2"]);
        assert!(matches_with_player(&matches, &list, "nobody").is_empty());
    }
}
