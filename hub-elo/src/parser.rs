use crate::types::{RawMatch, RawTeam, ROUNDS_KEY, StatMap, winner_from_scores};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Typed view of one match payload, ready for the rating engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMatch {
    pub match_id: String,
    pub game_mode: String,
    pub map: String,
    pub number_of_rounds: u32,
    pub team_one_score: u32,
    pub team_two_score: u32,
    pub team_one: Vec<String>,
    pub team_two: Vec<String>,
    /// Player id to the nickname shown in this match.
    pub nicknames: HashMap<String, String>,
    pub player_stats: BTreeMap<String, StatMap>,
}

impl ParsedMatch {
    #[must_use]
    pub fn winner(&self) -> u8 {
        winner_from_scores(self.team_one_score, self.team_two_score)
    }

    pub fn players(&self) -> impl Iterator<Item = &String> {
        self.team_one.iter().chain(self.team_two.iter())
    }
}

/// Extracts match metadata and per-player stats from a raw payload.
///
/// Returns `None` when there is no payload (the match was never played or the
/// fetch failed) or when it does not contain two teams. Rosters are taken as
/// they are; a team may have fewer than five players after an abandon.
#[must_use]
pub fn parse_match(match_id: &str, raw: Option<&RawMatch>) -> Option<ParsedMatch> {
    let Some(raw) = raw else {
        debug!(match_id, "No payload for match");
        return None;
    };
    let [team_one, team_two, ..] = raw.teams.as_slice() else {
        debug!(match_id, teams = raw.teams.len(), "Match payload has fewer than two teams");
        return None;
    };

    let number_of_rounds = raw.round_stats.rounds;
    let map = raw
        .round_stats
        .map
        .rsplit('/')
        .next()
        .unwrap_or(&raw.round_stats.map)
        .to_string();

    let mut nicknames = HashMap::new();
    let mut player_stats = BTreeMap::new();
    for team in [team_one, team_two] {
        for player in &team.players {
            let mut stats: StatMap = player
                .player_stats
                .iter()
                .map(|(key, value)| (key.clone(), value.0))
                .collect();
            stats.insert(ROUNDS_KEY.to_string(), f64::from(number_of_rounds));
            player_stats.insert(player.player_id.clone(), stats);
            nicknames.insert(player.player_id.clone(), player.nickname.clone());
        }
    }

    Some(ParsedMatch {
        match_id: match_id.to_string(),
        game_mode: raw.game_mode.clone(),
        map,
        number_of_rounds,
        team_one_score: team_one.team_stats.final_score,
        team_two_score: team_two.team_stats.final_score,
        team_one: roster(team_one),
        team_two: roster(team_two),
        nicknames,
        player_stats,
    })
}

fn roster(team: &RawTeam) -> Vec<String> {
    team.players.iter().map(|p| p.player_id.clone()).collect()
}
