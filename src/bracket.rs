// Single-elimination bracket: round-1 pairings supplied by an admin, later
// rounds derived by pairing consecutive winners once a round is fully decided.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BracketError {
    #[error("At least one matchup is required")]
    NoPairings,
    #[error("Team names must not be empty")]
    EmptyTeamName,
    #[error("Team '{0}' cannot play against itself")]
    SelfPairing(String),
    #[error("Team '{0}' appears in more than one matchup")]
    DuplicateTeam(String),
    #[error("Match {0} not found")]
    MatchNotFound(String),
    #[error("'{winner}' is not playing in match {match_id}")]
    InvalidWinner { match_id: String, winner: String },
    #[error("Match {0} already feeds a later round; its winner can no longer change")]
    WinnerLocked(String),
    #[error("Match {0} already has a winner")]
    MatchAlreadyDecided(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketMatch {
    pub match_id: String,
    pub team1: String,
    /// `None` is a bye.
    pub team2: Option<String>,
    pub winner: Option<String>,
}

impl BracketMatch {
    /// A bye is decided for `team1` as soon as it exists.
    fn new(match_id: String, team1: String, team2: Option<String>) -> Self {
        let winner = match team2 {
            None => Some(team1.clone()),
            Some(_) => None,
        };
        Self {
            match_id,
            team1,
            team2,
            winner,
        }
    }

    pub fn is_bye(&self) -> bool {
        self.team2.is_none()
    }

    pub fn involves(&self, team: &str) -> bool {
        self.team1 == team || self.team2.as_deref() == Some(team)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketRound {
    pub round_number: u32,
    pub matches: Vec<BracketMatch>,
}

impl BracketRound {
    pub fn is_complete(&self) -> bool {
        self.matches.iter().all(|m| m.winner.is_some())
    }
}

/// What a `record_winner` call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    /// False when the same winner was already recorded.
    pub changed: bool,
    pub rounds_created: usize,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bracket {
    pub bracket_id: String,
    pub rounds: Vec<BracketRound>,
}

/// Match identifiers are `R{round}-M{index}` with a 1-based, 3-digit index.
pub fn match_id(round_number: u32, index: usize) -> String {
    format!("R{round_number}-M{index:03}")
}

/// Bracket identifiers are `B{sequence}` with a 3-digit sequence.
pub fn bracket_id(sequence: i64) -> String {
    format!("B{sequence:03}")
}

impl Bracket {
    /// Build round 1 from ordered `(team1, team2-or-bye)` pairings.
    pub fn initialize(
        bracket_id: impl Into<String>,
        pairings: Vec<(String, Option<String>)>,
    ) -> Result<Self, BracketError> {
        validate_pairings(&pairings)?;

        let matches = pairings
            .into_iter()
            .enumerate()
            .map(|(i, (team1, team2))| BracketMatch::new(match_id(1, i + 1), team1, team2))
            .collect();

        let mut bracket = Self {
            bracket_id: bracket_id.into(),
            rounds: vec![BracketRound {
                round_number: 1,
                matches,
            }],
        };
        bracket.advance();
        Ok(bracket)
    }

    /// Locate a match by id as `(round index, match index)`.
    pub fn find_match(&self, match_id: &str) -> Option<(usize, usize)> {
        self.rounds.iter().enumerate().find_map(|(r, round)| {
            round
                .matches
                .iter()
                .position(|m| m.match_id == match_id)
                .map(|m| (r, m))
        })
    }

    pub fn get_match(&self, match_id: &str) -> Option<&BracketMatch> {
        self.find_match(match_id)
            .map(|(r, m)| &self.rounds[r].matches[m])
    }

    pub fn current_round(&self) -> Option<&BracketRound> {
        self.rounds.last()
    }

    /// The final round has a single decided match.
    pub fn is_finished(&self) -> bool {
        self.current_round()
            .is_some_and(|round| round.matches.len() == 1 && round.is_complete())
    }

    pub fn champion(&self) -> Option<&str> {
        if !self.is_finished() {
            return None;
        }
        self.current_round()
            .and_then(|round| round.matches[0].winner.as_deref())
    }

    /// Record `winner` for `match_id`, synthesizing following rounds when the
    /// containing round becomes fully decided.
    ///
    /// Re-submitting the same winner is a no-op, so retries never duplicate rounds.
    pub fn record_winner(
        &mut self,
        match_id: &str,
        winner: &str,
    ) -> Result<RecordOutcome, BracketError> {
        let (round_idx, match_idx) = self
            .find_match(match_id)
            .ok_or_else(|| BracketError::MatchNotFound(match_id.to_string()))?;
        let has_next_round = round_idx + 1 < self.rounds.len();
        let m = &self.rounds[round_idx].matches[match_idx];

        if !m.involves(winner) {
            return Err(BracketError::InvalidWinner {
                match_id: match_id.to_string(),
                winner: winner.to_string(),
            });
        }

        match m.winner.as_deref() {
            Some(current) if current == winner => {
                return Ok(RecordOutcome {
                    changed: false,
                    rounds_created: 0,
                    finished: self.is_finished(),
                });
            }
            Some(_) if has_next_round => {
                return Err(BracketError::WinnerLocked(match_id.to_string()));
            }
            _ => {}
        }

        self.rounds[round_idx].matches[match_idx].winner = Some(winner.to_string());
        let rounds_created = self.advance();
        Ok(RecordOutcome {
            changed: true,
            rounds_created,
            finished: self.is_finished(),
        })
    }

    /// Append rounds while the last round is complete and has more than one
    /// match. Returns how many rounds were created.
    fn advance(&mut self) -> usize {
        let mut created = 0;
        while let Some(next) = self.current_round().and_then(next_round) {
            tracing::debug!(
                bracket_id = %self.bracket_id,
                round = next.round_number,
                matches = next.matches.len(),
                "Synthesized bracket round"
            );
            self.rounds.push(next);
            created += 1;
        }
        created
    }
}

/// Pair consecutive winners of a complete round, in original match order.
/// An odd winner out gets a bye. Returns `None` when the round is undecided or
/// is the final.
fn next_round(round: &BracketRound) -> Option<BracketRound> {
    if round.matches.len() <= 1 || !round.is_complete() {
        return None;
    }
    let winners: Vec<String> = round
        .matches
        .iter()
        .filter_map(|m| m.winner.clone())
        .collect();

    let round_number = round.round_number + 1;
    let matches = winners
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| {
            BracketMatch::new(
                match_id(round_number, i + 1),
                pair[0].clone(),
                pair.get(1).cloned(),
            )
        })
        .collect();

    Some(BracketRound {
        round_number,
        matches,
    })
}

fn validate_pairings(pairings: &[(String, Option<String>)]) -> Result<(), BracketError> {
    if pairings.is_empty() {
        return Err(BracketError::NoPairings);
    }
    let mut seen: Vec<&str> = Vec::with_capacity(pairings.len() * 2);
    for (team1, team2) in pairings {
        if team1.trim().is_empty() || team2.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(BracketError::EmptyTeamName);
        }
        if team2.as_deref() == Some(team1.as_str()) {
            return Err(BracketError::SelfPairing(team1.clone()));
        }
        for team in std::iter::once(team1.as_str()).chain(team2.as_deref()) {
            if seen.contains(&team) {
                return Err(BracketError::DuplicateTeam(team.to_string()));
            }
            seen.push(team);
        }
    }
    Ok(())
}
