// Turn-based map-ban draft: two participants alternately remove titles from a
// pool until exactly one remains.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Map pool used when no `MAP_POOL` is configured.
pub const DEFAULT_TITLE_POOL: [&str; 7] = [
    "Ascent", "Pearl", "Split", "Haven", "Bind", "Breeze", "Icebox",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("A draft needs at least two distinct titles")]
    InvalidPool,
    #[error("Both participant slots are already taken")]
    AlreadyFull,
    #[error("Participant has already joined this draft")]
    DuplicateParticipant,
    #[error("Map selection has not started yet")]
    NotStarted,
    #[error("It is not your turn")]
    NotYourTurn,
    #[error("Title '{0}' is not part of the map pool")]
    UnknownTitle(String),
    #[error("Title '{0}' has already been banned")]
    TitleUnavailable(String),
    #[error("Map selection is already complete")]
    DraftComplete,
}

/// Result of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// First slot taken; waiting for an opponent.
    Waiting,
    /// Second slot taken; the first participant is on turn.
    Started,
}

/// Result of a successful ban.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanOutcome {
    Remaining(Vec<String>),
    Resolved(String),
}

/// One applied ban, kept for auditing the draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    pub participant: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSession {
    /// Full pool the session started with.
    pub pool: Vec<String>,
    /// Titles still in play, in pool order.
    pub candidates: Vec<String>,
    /// Index into `participants` of whoever bans next.
    pub turn_index: usize,
    pub participants: Vec<String>,
    pub started: bool,
    #[serde(default)]
    pub bans: Vec<Ban>,
}

impl DraftSession {
    pub fn new<I, S>(pool: I) -> Result<Self, DraftError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pool: Vec<String> = pool.into_iter().map(Into::into).collect();
        validate_pool(&pool)?;
        Ok(Self {
            candidates: pool.clone(),
            pool,
            turn_index: 0,
            participants: Vec::new(),
            started: false,
            bans: Vec::new(),
        })
    }

    /// Exactly one candidate left.
    pub fn is_complete(&self) -> bool {
        self.candidates.len() == 1
    }

    /// The surviving title once the draft is complete.
    pub fn resolved_title(&self) -> Option<&str> {
        if self.is_complete() {
            self.candidates.first().map(String::as_str)
        } else {
            None
        }
    }

    /// Participant expected to ban next, if the draft is running.
    pub fn current_participant(&self) -> Option<&str> {
        if !self.started || self.is_complete() {
            return None;
        }
        self.participants.get(self.turn_index).map(String::as_str)
    }

    pub fn has_participant(&self, participant: &str) -> bool {
        self.participants.iter().any(|p| p == participant)
    }

    /// Occupy the next free slot. The second distinct join starts the draft.
    pub fn join(&mut self, participant: &str) -> Result<JoinOutcome, DraftError> {
        if self.has_participant(participant) {
            return Err(DraftError::DuplicateParticipant);
        }
        if self.participants.len() >= 2 {
            return Err(DraftError::AlreadyFull);
        }
        self.participants.push(participant.to_string());
        if self.participants.len() == 2 {
            self.started = true;
            self.turn_index = 0;
            Ok(JoinOutcome::Started)
        } else {
            Ok(JoinOutcome::Waiting)
        }
    }

    /// Ban `title` on behalf of `participant`.
    ///
    /// All checks run before any field is touched, so a rejected ban leaves the
    /// session exactly as it was.
    pub fn select_title(
        &mut self,
        participant: &str,
        title: &str,
    ) -> Result<BanOutcome, DraftError> {
        if !self.started {
            return Err(DraftError::NotStarted);
        }
        if self.is_complete() {
            return Err(DraftError::DraftComplete);
        }
        if self.participants.get(self.turn_index).map(String::as_str) != Some(participant) {
            return Err(DraftError::NotYourTurn);
        }
        let Some(position) = self.candidates.iter().position(|c| c == title) else {
            if self.pool.iter().any(|t| t == title) {
                return Err(DraftError::TitleUnavailable(title.to_string()));
            }
            return Err(DraftError::UnknownTitle(title.to_string()));
        };

        let banned = self.candidates.remove(position);
        self.bans.push(Ban {
            participant: participant.to_string(),
            title: banned,
        });
        self.turn_index = 1 - self.turn_index;

        match self.resolved_title() {
            Some(remaining) => Ok(BanOutcome::Resolved(remaining.to_string())),
            None => Ok(BanOutcome::Remaining(self.candidates.clone())),
        }
    }

    /// Restore the full pool and free both slots so the session can be reused.
    pub fn reset(&mut self) {
        self.candidates = self.pool.clone();
        self.turn_index = 0;
        self.participants.clear();
        self.started = false;
        self.bans.clear();
    }
}

/// A pool must hold at least two titles and no duplicates.
pub fn validate_pool(pool: &[String]) -> Result<(), DraftError> {
    if pool.len() < 2 || pool.iter().any(|t| t.trim().is_empty()) {
        return Err(DraftError::InvalidPool);
    }
    for (i, title) in pool.iter().enumerate() {
        if pool[i + 1..].contains(title) {
            return Err(DraftError::InvalidPool);
        }
    }
    Ok(())
}
