// Application error type and its HTTP rendering.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::bracket::BracketError;
use crate::draft::DraftError;
use crate::room::RoomError;

/// Machine-readable error category returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Unauthorized,
    Conflict,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    /// A unique value (username, email) is already taken.
    #[error("{0}")]
    Duplicate(String),
    #[error("The {0} was modified by another request; reload and try again")]
    StaleVersion(&'static str),
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error(transparent)]
    Bracket(#[from] BracketError),
    #[error(transparent)]
    Room(#[from] RoomError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// Malformed or mistyped request bodies are validation errors.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Conflict(_) | AppError::Duplicate(_) | AppError::StaleVersion(_) => {
                ErrorKind::Conflict
            }
            AppError::Draft(e) => draft_kind(e),
            AppError::Bracket(e) => match e {
                BracketError::MatchNotFound(_) => ErrorKind::NotFound,
                BracketError::WinnerLocked(_) | BracketError::MatchAlreadyDecided(_) => {
                    ErrorKind::Conflict
                }
                BracketError::NoPairings
                | BracketError::EmptyTeamName
                | BracketError::SelfPairing(_)
                | BracketError::DuplicateTeam(_)
                | BracketError::InvalidWinner { .. } => ErrorKind::Validation,
            },
            AppError::Room(e) => match e {
                RoomError::Draft(d) => draft_kind(d),
                RoomError::InvalidChoice(_) => ErrorKind::Validation,
                RoomError::RoomFull
                | RoomError::AlreadyInRoom
                | RoomError::DraftNotComplete
                | RoomError::NotYourTurn
                | RoomError::SideAlreadyChosen
                | RoomError::WinnerLocked(_) => ErrorKind::Conflict,
            },
            AppError::Database(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            // Turn and availability violations are plain client errors; lost
            // version races and taken unique values are 409.
            ErrorKind::Conflict => match self {
                AppError::StaleVersion(_) | AppError::Duplicate(_) => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            },
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn draft_kind(e: &DraftError) -> ErrorKind {
    match e {
        DraftError::InvalidPool | DraftError::UnknownTitle(_) => ErrorKind::Validation,
        DraftError::AlreadyFull
        | DraftError::DuplicateParticipant
        | DraftError::NotStarted
        | DraftError::NotYourTurn
        | DraftError::TitleUnavailable(_)
        | DraftError::DraftComplete => ErrorKind::Conflict,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = match kind {
            ErrorKind::Internal => {
                tracing::error!("Internal error: {self}");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };
        if let AppError::StaleVersion(entity) = &self {
            let entity: &str = entity;
            tracing::warn!(entity, "Rejected stale write");
            crate::metrics::STALE_WRITES_TOTAL
                .with_label_values(&[entity])
                .inc();
        }
        (
            self.status(),
            Json(json!({ "error": kind.as_str(), "message": message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_mapping() {
        let err = AppError::NotFound("Room");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Room not found");

        let err = AppError::from(BracketError::MatchNotFound("R1-M009".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_turn_errors_are_bad_request_conflicts() {
        let err = AppError::from(RoomError::from(DraftError::NotYourTurn));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = AppError::from(RoomError::RoomFull);
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_stale_version_is_409() {
        let err = AppError::StaleVersion("room");
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = AppError::Duplicate("Username or email already taken".into());
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_validation_mapping() {
        assert_eq!(
            AppError::from(DraftError::UnknownTitle("Lotus".into())).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AppError::from(RoomError::InvalidChoice("up".into())).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AppError::from(BracketError::NoPairings).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let err = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::Internal);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
