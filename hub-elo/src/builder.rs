use crate::elo::{PerformanceFormula, rate_match};
use crate::parser::ParsedMatch;
use crate::types::{MatchRecord, MatchStore, PlayerRecord, PlayerStore, StatLine, StatMap};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The match id was already in the store; nothing was changed.
    Duplicate,
}

/// Folds one parsed match into the stores.
///
/// Ratings for the whole match are computed from pre-match values before any
/// player is touched, so roster order never influences the result.
pub fn apply_match(
    players: &mut PlayerStore,
    matches: &mut MatchStore,
    parsed: ParsedMatch,
    formula: PerformanceFormula,
) -> ApplyOutcome {
    if matches.contains_key(&parsed.match_id) {
        warn!(match_id = %parsed.match_id, "Match already applied, skipping");
        return ApplyOutcome::Duplicate;
    }

    for player_id in parsed.team_one.iter().chain(&parsed.team_two) {
        let player = players
            .entry(player_id.clone())
            .or_insert_with(|| PlayerRecord::new(player_id));
        if let Some(nickname) = parsed.nicknames.get(player_id) {
            player.name.clone_from(nickname);
        }
    }

    let rated = rate_match(
        &parsed.team_one,
        &parsed.team_two,
        parsed.winner(),
        &parsed.player_stats,
        &*players,
        formula,
    );

    let empty = StatMap::new();
    for player_id in parsed.team_one.iter().chain(&parsed.team_two) {
        let (Some(player), Some(change)) =
            (players.get_mut(player_id), rated.changes.get(player_id))
        else {
            continue;
        };
        let stats = parsed.player_stats.get(player_id).unwrap_or(&empty);
        player.stats.push(StatLine::from_stats(
            &parsed.match_id,
            &parsed.map,
            parsed.number_of_rounds,
            stats,
        ));
        player.elo += change.elo_change;
        player.elo_history.push(player.elo);
    }

    debug!(
        match_id = %parsed.match_id,
        match_elo = rated.elo.match_elo,
        players = rated.changes.len(),
        "Applied match"
    );

    let winner = parsed.winner();
    matches.insert(
        parsed.match_id.clone(),
        MatchRecord {
            match_id: parsed.match_id,
            game_mode: parsed.game_mode,
            map: parsed.map,
            number_of_rounds: parsed.number_of_rounds,
            team_one_score: parsed.team_one_score,
            team_two_score: parsed.team_two_score,
            team_one: parsed.team_one,
            team_two: parsed.team_two,
            winner,
            player_stats: parsed.player_stats,
            player_elo_data: rated.changes,
            match_elo: rated.elo.match_elo,
            team_one_elo: rated.elo.team_one_elo,
            team_two_elo: rated.elo.team_two_elo,
        },
    );
    ApplyOutcome::Applied
}
