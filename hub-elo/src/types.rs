use crate::elo::PlayerEloChange;
use serde::{Deserialize, Serialize};
use serde_aux::field_attributes::deserialize_number_from_string;
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_RATING: f64 = 1000.0;

/// Key added to every per-player stat map, equal to the match round count.
pub const ROUNDS_KEY: &str = "Number of Rounds";

pub type PlayerStore = HashMap<String, PlayerRecord>;
pub type MatchStore = HashMap<String, MatchRecord>;
pub type StatMap = BTreeMap<String, f64>;

// Raw FACEIT payloads. Every number arrives as a string.

#[derive(Debug, Clone, Deserialize)]
pub struct HubMatchesPage {
    #[serde(default)]
    pub items: Vec<HubMatchItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubMatchItem {
    pub match_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchStatsResponse {
    #[serde(default)]
    pub rounds: Vec<RawMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMatch {
    pub game_mode: String,
    pub round_stats: RawRoundStats,
    pub teams: Vec<RawTeam>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRoundStats {
    #[serde(rename = "Rounds", deserialize_with = "deserialize_number_from_string")]
    pub rounds: u32,
    #[serde(rename = "Map")]
    pub map: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTeam {
    pub team_stats: RawTeamStats,
    #[serde(default)]
    pub players: Vec<RawPlayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTeamStats {
    #[serde(
        rename = "Final Score",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub final_score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPlayer {
    pub player_id: String,
    pub nickname: String,
    #[serde(default)]
    pub player_stats: BTreeMap<String, StatValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatValue(#[serde(deserialize_with = "deserialize_number_from_string")] pub f64);

/// The fixed per-match counters tracked in every player's stat series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    Kills,
    Deaths,
    Assists,
    Headshots,
    HeadshotsPercent,
    KdRatio,
    KrRatio,
    Mvps,
    TripleKills,
    QuadroKills,
    PentaKills,
    Result,
    Rounds,
}

impl Stat {
    pub const ALL: [Stat; 13] = [
        Stat::Kills,
        Stat::Deaths,
        Stat::Assists,
        Stat::Headshots,
        Stat::HeadshotsPercent,
        Stat::KdRatio,
        Stat::KrRatio,
        Stat::Mvps,
        Stat::TripleKills,
        Stat::QuadroKills,
        Stat::PentaKills,
        Stat::Result,
        Stat::Rounds,
    ];

    /// Name of the stat as it appears in FACEIT payloads.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Stat::Kills => "Kills",
            Stat::Deaths => "Deaths",
            Stat::Assists => "Assists",
            Stat::Headshots => "Headshots",
            Stat::HeadshotsPercent => "Headshots %",
            Stat::KdRatio => "K/D Ratio",
            Stat::KrRatio => "K/R Ratio",
            Stat::Mvps => "MVPs",
            Stat::TripleKills => "Triple Kills",
            Stat::QuadroKills => "Quadro Kills",
            Stat::PentaKills => "Penta Kills",
            Stat::Result => "Result",
            Stat::Rounds => ROUNDS_KEY,
        }
    }

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stat| stat.key().eq_ignore_ascii_case(key))
    }
}

/// One entry of a player's stat series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    pub match_id: String,
    pub map: String,
    pub rounds: u32,
    pub kills: f64,
    pub deaths: f64,
    pub assists: f64,
    pub headshots: f64,
    pub headshots_percent: f64,
    pub kd_ratio: f64,
    pub kr_ratio: f64,
    pub mvps: f64,
    pub triple_kills: f64,
    pub quadro_kills: f64,
    pub penta_kills: f64,
    pub result: f64,
}

impl StatLine {
    /// Counters missing from `stats` are recorded as zero.
    #[must_use]
    pub fn from_stats(match_id: &str, map: &str, rounds: u32, stats: &StatMap) -> Self {
        let get = |stat: Stat| stats.get(stat.key()).copied().unwrap_or_default();
        Self {
            match_id: match_id.to_string(),
            map: map.to_string(),
            rounds,
            kills: get(Stat::Kills),
            deaths: get(Stat::Deaths),
            assists: get(Stat::Assists),
            headshots: get(Stat::Headshots),
            headshots_percent: get(Stat::HeadshotsPercent),
            kd_ratio: get(Stat::KdRatio),
            kr_ratio: get(Stat::KrRatio),
            mvps: get(Stat::Mvps),
            triple_kills: get(Stat::TripleKills),
            quadro_kills: get(Stat::QuadroKills),
            penta_kills: get(Stat::PentaKills),
            result: get(Stat::Result),
        }
    }

    #[must_use]
    pub fn get(&self, stat: Stat) -> f64 {
        match stat {
            Stat::Kills => self.kills,
            Stat::Deaths => self.deaths,
            Stat::Assists => self.assists,
            Stat::Headshots => self.headshots,
            Stat::HeadshotsPercent => self.headshots_percent,
            Stat::KdRatio => self.kd_ratio,
            Stat::KrRatio => self.kr_ratio,
            Stat::Mvps => self.mvps,
            Stat::TripleKills => self.triple_kills,
            Stat::QuadroKills => self.quadro_kills,
            Stat::PentaKills => self.penta_kills,
            Stat::Result => self.result,
            Stat::Rounds => f64::from(self.rounds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: String,
    pub name: String,
    pub stats: Vec<StatLine>,
    pub elo: f64,
    /// Rating after each match, oldest first. Always as long as `stats`.
    pub elo_history: Vec<f64>,
}

impl PlayerRecord {
    #[must_use]
    pub fn new(player_id: &str) -> Self {
        Self {
            player_id: player_id.to_string(),
            name: player_id.to_string(),
            stats: Vec::new(),
            elo: DEFAULT_RATING,
            elo_history: Vec::new(),
        }
    }

    #[must_use]
    pub fn matches_played(&self) -> usize {
        self.stats.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub game_mode: String,
    pub map: String,
    pub number_of_rounds: u32,
    pub team_one_score: u32,
    pub team_two_score: u32,
    pub team_one: Vec<String>,
    pub team_two: Vec<String>,
    /// 1 or 2; a tied score counts as a team one win.
    pub winner: u8,
    pub player_stats: BTreeMap<String, StatMap>,
    pub player_elo_data: BTreeMap<String, PlayerEloChange>,
    pub match_elo: f64,
    pub team_one_elo: f64,
    pub team_two_elo: f64,
}

impl MatchRecord {
    pub fn players(&self) -> impl Iterator<Item = &String> {
        self.team_one.iter().chain(self.team_two.iter())
    }
}

#[must_use]
pub fn winner_from_scores(team_one_score: u32, team_two_score: u32) -> u8 {
    1 + u8::from(team_two_score > team_one_score)
}

/// Everything one ingestion run reads and produces for a hub.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubData {
    pub players: PlayerStore,
    pub matches: MatchStore,
    /// Processed match ids, oldest first.
    pub match_list: Vec<String>,
}

impl HubData {
    /// Display name to player id, rebuilt from the player store.
    #[must_use]
    pub fn name_lookup(&self) -> HashMap<String, String> {
        self.players
            .values()
            .map(|player| (player.name.clone(), player.player_id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_keys_round_trip() {
        for stat in Stat::ALL {
            assert_eq!(Stat::from_key(stat.key()), Some(stat));
        }
        assert_eq!(Stat::from_key("k/r ratio"), Some(Stat::KrRatio));
        assert_eq!(Stat::from_key("ADR"), None);
    }

    #[test]
    fn ties_resolve_to_team_one() {
        assert_eq!(winner_from_scores(16, 14), 1);
        assert_eq!(winner_from_scores(15, 15), 1);
        assert_eq!(winner_from_scores(9, 13), 2);
    }

    #[test]
    fn raw_match_accepts_string_numbers() {
        let raw: RawMatch = serde_json::from_value(serde_json::json!({
            "game_mode": "5v5",
            "round_stats": { "Rounds": "24", "Map": "de_inferno", "Score": "13 / 11" },
            "teams": [
                {
                    "team_stats": { "Final Score": "13", "Team": "team_a" },
                    "players": [{
                        "player_id": "p1",
                        "nickname": "alpha",
                        "player_stats": { "Kills": "21", "K/R Ratio": "0.88" }
                    }]
                },
                { "team_stats": { "Final Score": 11 }, "players": [] }
            ]
        }))
        .unwrap();

        assert_eq!(raw.round_stats.rounds, 24);
        assert_eq!(raw.teams[0].team_stats.final_score, 13);
        assert_eq!(raw.teams[1].team_stats.final_score, 11);
        assert_eq!(raw.teams[0].players[0].player_stats["Kills"], StatValue(21.0));
    }

    #[test]
    fn stat_line_defaults_missing_counters() {
        let stats = StatMap::from([("Kills".to_string(), 17.0), ("Result".to_string(), 1.0)]);
        let line = StatLine::from_stats("m1", "de_nuke", 20, &stats);
        assert_eq!(line.get(Stat::Kills), 17.0);
        assert_eq!(line.get(Stat::Deaths), 0.0);
        assert_eq!(line.get(Stat::Rounds), 20.0);
    }

    #[test]
    fn name_lookup_uses_latest_names() {
        let mut data = HubData::default();
        let mut player = PlayerRecord::new("id-1");
        player.name = "newname".to_string();
        data.players.insert("id-1".to_string(), player);

        let lookup = data.name_lookup();
        assert_eq!(lookup.get("newname"), Some(&"id-1".to_string()));
    }
}
