// Rooms bind one bracket match to a map-ban draft followed by a side choice.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::draft::{BanOutcome, DraftError, DraftSession, JoinOutcome};

pub const ROOM_CODE_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error(transparent)]
    Draft(DraftError),
    #[error("Room is full")]
    RoomFull,
    #[error("Your team is already in this room")]
    AlreadyInRoom,
    #[error("Side can only be chosen after map selection is complete")]
    DraftNotComplete,
    #[error("It is not your turn to choose")]
    NotYourTurn,
    #[error("Choice must be attacking or defending, got '{0}'")]
    InvalidChoice(String),
    #[error("Side has already been chosen")]
    SideAlreadyChosen,
    #[error("Room winner is already recorded as '{0}'")]
    WinnerLocked(String),
}

impl From<DraftError> for RoomError {
    fn from(e: DraftError) -> Self {
        match e {
            DraftError::AlreadyFull => RoomError::RoomFull,
            DraftError::DuplicateParticipant => RoomError::AlreadyInRoom,
            other => RoomError::Draft(other),
        }
    }
}

/// Tactical orientation picked by the second participant after the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "attacker")]
    Attacking,
    #[serde(alias = "defender")]
    Defending,
}

impl Side {
    /// Accepts both the `attacking/defending` and `attacker/defender` spellings.
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attacking" | "attacker" => Some(Self::Attacking),
            "defending" | "defender" => Some(Self::Defending),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attacking => "attacking",
            Self::Defending => "defending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_code: String,
    /// Username of the admin or moderator who opened the room.
    pub admin: String,
    pub bracket_id: String,
    pub match_id: String,
    pub draft: DraftSession,
    pub selected_title: Option<String>,
    pub side_choice: Option<Side>,
    pub winner: Option<String>,
}

impl Room {
    pub fn new(
        room_code: String,
        admin: String,
        bracket_id: String,
        match_id: String,
        draft: DraftSession,
    ) -> Self {
        Self {
            room_code,
            admin,
            bracket_id,
            match_id,
            draft,
            selected_title: None,
            side_choice: None,
            winner: None,
        }
    }

    pub fn join(&mut self, team: &str) -> Result<JoinOutcome, RoomError> {
        Ok(self.draft.join(team)?)
    }

    /// Ban a title; the surviving title is stored on the room once the draft resolves.
    pub fn ban_title(&mut self, team: &str, title: &str) -> Result<BanOutcome, RoomError> {
        let outcome = self.draft.select_title(team, title)?;
        if let BanOutcome::Resolved(ref remaining) = outcome {
            self.selected_title = Some(remaining.clone());
        }
        Ok(outcome)
    }

    /// The second participant to join picks the side once the draft is over.
    pub fn select_side(&mut self, team: &str, choice: &str) -> Result<Side, RoomError> {
        if !self.draft.is_complete() {
            return Err(RoomError::DraftNotComplete);
        }
        if self.draft.participants.get(1).map(String::as_str) != Some(team) {
            return Err(RoomError::NotYourTurn);
        }
        let side =
            Side::from_str_name(choice).ok_or_else(|| RoomError::InvalidChoice(choice.into()))?;
        if self.side_choice.is_some() {
            return Err(RoomError::SideAlreadyChosen);
        }
        self.side_choice = Some(side);
        Ok(side)
    }

    /// Returns false when the same winner was already recorded.
    pub fn record_winner(&mut self, team: &str) -> Result<bool, RoomError> {
        match self.winner.as_deref() {
            Some(current) if current == team => Ok(false),
            Some(current) => Err(RoomError::WinnerLocked(current.to_string())),
            None => {
                self.winner = Some(team.to_string());
                Ok(true)
            }
        }
    }
}

/// Six-digit numeric code, easy to type in a lobby.
pub fn generate_room_code<R: Rng>(rng: &mut R) -> String {
    rng.gen_range(100_000..1_000_000u32).to_string()
}
