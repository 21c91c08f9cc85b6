// HTTP API routes (brackets, rooms, standalone drafts, teams, admin).

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Json, Path, Request, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::auth::{self, current_user, AuthUser, Claims, Role, UserPublic, MAX_TEAM_SIZE};
use crate::bracket::{Bracket, BracketError};
use crate::config::Config;
use crate::db::{is_unique_violation, Database, Versioned};
use crate::draft::{BanOutcome, DraftSession, JoinOutcome};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::room::{generate_room_code, Room};

/// Attempts at drawing an unused room code before giving up.
const ROOM_CODE_ATTEMPTS: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
        }
    }
}

// ── Request types ─────────────────────────────────────────────────────

/// `Json` body extractor whose rejections render as `validation` errors.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}

#[derive(Deserialize)]
pub struct InitializeBracketRequest {
    /// Each entry is `[team1, team2]`; a missing or null `team2` is a bye.
    pub matchups: Vec<Vec<Option<String>>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBracketRequest {
    pub bracket_id: String,
    pub match_id: String,
    pub winner_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub bracket_id: String,
    pub match_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCodeRequest {
    pub room_code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomBanRequest {
    pub room_code: String,
    pub title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideSelectRequest {
    pub room_code: String,
    pub choice: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetWinnerRequest {
    pub room_code: String,
    pub winner_username: String,
}

#[derive(Deserialize)]
pub struct SessionBanRequest {
    pub title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    pub team_name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

// ── Response views ────────────────────────────────────────────────────

/// A bracket plus its derived standing.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketView<'a> {
    #[serde(flatten)]
    pub bracket: &'a Bracket,
    pub finished: bool,
    pub champion: Option<&'a str>,
}

impl<'a> From<&'a Bracket> for BracketView<'a> {
    fn from(bracket: &'a Bracket) -> Self {
        Self {
            bracket,
            finished: bracket.is_finished(),
            champion: bracket.champion(),
        }
    }
}

/// A draft plus whose turn it is and the surviving title, if any.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftView<'a> {
    #[serde(flatten)]
    pub draft: &'a DraftSession,
    pub current_participant: Option<&'a str>,
    pub resolved_title: Option<&'a str>,
}

impl<'a> From<&'a DraftSession> for DraftView<'a> {
    fn from(draft: &'a DraftSession) -> Self {
        Self {
            draft,
            current_participant: draft.current_participant(),
            resolved_title: draft.resolved_title(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView<'a> {
    #[serde(flatten)]
    pub room: &'a Room,
    pub current_participant: Option<&'a str>,
}

impl<'a> From<&'a Room> for RoomView<'a> {
    fn from(room: &'a Room) -> Self {
        Self {
            room,
            current_participant: room.draft.current_participant(),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        // Accounts
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/profile/me", get(auth::me).put(auth::update_profile))
        .route("/profile/me/team", get(auth::my_team))
        .route("/team/create", post(create_team))
        .route("/admin/users/{username}/role", put(set_user_role))
        // Brackets
        .route("/bracket/initialize", post(initialize_bracket))
        .route("/bracket/update", post(update_bracket))
        .route(
            "/bracket/{bracket_id}",
            get(get_bracket).delete(delete_bracket),
        )
        .route("/bracket/{bracket_id}/rooms", get(list_bracket_rooms))
        // Rooms
        .route("/room/create", post(create_room))
        .route("/room/join", post(join_room))
        .route("/room/mapban", post(room_mapban))
        .route("/room/side-select", post(room_side_select))
        .route("/room/set-winner", post(room_set_winner))
        .route("/room/{room_code}", get(get_room))
        // Standalone drafts
        .route("/mapban/sessions", post(create_session))
        .route("/mapban/sessions/{id}", get(get_session))
        .route("/mapban/sessions/{id}/join", post(join_session))
        .route("/mapban/sessions/{id}/ban", post(session_ban))
        .route("/mapban/sessions/{id}/reset", post(reset_session))
        .with_state(state)
}

// ── Shared lookups ────────────────────────────────────────────────────

async fn load_bracket(state: &AppState, bracket_id: &str) -> AppResult<Versioned<Bracket>> {
    state
        .db
        .get_bracket(bracket_id)
        .await?
        .ok_or(AppError::NotFound("Bracket"))
}

async fn load_room(state: &AppState, room_code: &str) -> AppResult<Versioned<Room>> {
    state
        .db
        .get_room(room_code)
        .await?
        .ok_or(AppError::NotFound("Room"))
}

async fn load_session(state: &AppState, id: &str) -> AppResult<Versioned<DraftSession>> {
    state
        .db
        .get_draft_session(id)
        .await?
        .ok_or(AppError::NotFound("Draft session"))
}

/// Inside rooms a caller acts as their team.
async fn caller_team_name(state: &AppState, claims: &Claims) -> AppResult<String> {
    let user = current_user(state, claims).await?;
    state
        .db
        .get_team_for_user(&user)
        .await?
        .map(|team| team.team_name)
        .ok_or_else(|| AppError::Forbidden("You must belong to a team to take part in a room".into()))
}

async fn save_room(state: &AppState, room: &Room, version: i64) -> AppResult<()> {
    if state.db.save_room(room, version).await? {
        Ok(())
    } else {
        Err(AppError::StaleVersion("room"))
    }
}

async fn save_session(
    state: &AppState,
    id: &str,
    session: &DraftSession,
    version: i64,
) -> AppResult<()> {
    if state.db.save_draft_session(id, session, version).await? {
        Ok(())
    } else {
        Err(AppError::StaleVersion("draft session"))
    }
}

fn join_message(outcome: JoinOutcome) -> &'static str {
    match outcome {
        JoinOutcome::Waiting => "Successfully joined. Waiting for another participant.",
        JoinOutcome::Started => "Map selection started. Both participants have joined.",
    }
}

fn record_ban(scope: &str, outcome: &BanOutcome) {
    metrics::DRAFT_BANS_TOTAL.with_label_values(&[scope]).inc();
    if matches!(outcome, BanOutcome::Resolved(_)) {
        metrics::DRAFTS_RESOLVED_TOTAL
            .with_label_values(&[scope])
            .inc();
    }
}

// ── Bracket handlers ─────────────────────────────────────────────────

fn parse_matchups(
    matchups: Vec<Vec<Option<String>>>,
) -> AppResult<Vec<(String, Option<String>)>> {
    matchups
        .into_iter()
        .enumerate()
        .map(|(i, pair)| {
            let mut teams = pair.into_iter();
            let team1 = teams.next().flatten();
            let team2 = teams.next().flatten();
            match (team1, teams.next()) {
                (Some(team1), None) => Ok((team1, team2)),
                _ => Err(AppError::Validation(format!(
                    "Matchup {} must be [team1, team2] with team1 present",
                    i + 1
                ))),
            }
        })
        .collect()
}

async fn initialize_bracket(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    AppJson(req): AppJson<InitializeBracketRequest>,
) -> AppResult<impl IntoResponse> {
    claims.require_admin()?;
    let pairings = parse_matchups(req.matchups)?;
    // The id is assigned by the database when the bracket is stored.
    let bracket = Bracket::initialize(String::new(), pairings)?;
    let stored = state.db.insert_bracket(bracket).await?;

    metrics::BRACKETS_CREATED_TOTAL.inc();
    tracing::info!(
        bracket_id = %stored.value.bracket_id,
        matches = stored.value.rounds[0].matches.len(),
        admin = %claims.username,
        "Bracket initialized"
    );
    Ok((StatusCode::CREATED, Json(stored.value)))
}

async fn update_bracket(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    AppJson(req): AppJson<UpdateBracketRequest>,
) -> AppResult<impl IntoResponse> {
    claims.require_admin()?;
    let stored = load_bracket(&state, &req.bracket_id).await?;
    let mut bracket = stored.value;
    let outcome = bracket.record_winner(&req.match_id, &req.winner_name)?;

    if outcome.changed {
        if !state.db.save_bracket(&bracket, stored.version).await? {
            return Err(AppError::StaleVersion("bracket"));
        }
        metrics::BRACKET_ROUNDS_CREATED_TOTAL.inc_by(outcome.rounds_created as u64);
        tracing::info!(
            bracket_id = %bracket.bracket_id,
            match_id = %req.match_id,
            winner = %req.winner_name,
            rounds_created = outcome.rounds_created,
            finished = outcome.finished,
            "Bracket winner recorded"
        );
    }
    Ok(Json(json!(BracketView::from(&bracket))))
}

async fn get_bracket(
    AuthUser(_claims): AuthUser,
    State(state): State<AppState>,
    Path(bracket_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let bracket = load_bracket(&state, &bracket_id).await?.value;
    Ok(Json(json!(BracketView::from(&bracket))))
}

async fn list_bracket_rooms(
    AuthUser(_claims): AuthUser,
    State(state): State<AppState>,
    Path(bracket_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    load_bracket(&state, &bracket_id).await?;
    let rooms = state.db.list_rooms_for_bracket(&bracket_id).await?;
    let views: Vec<RoomView> = rooms.iter().map(RoomView::from).collect();
    Ok(Json(json!(views)))
}

async fn delete_bracket(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    Path(bracket_id): Path<String>,
) -> AppResult<StatusCode> {
    claims.require_admin()?;
    if !state.db.delete_bracket(&bracket_id).await? {
        return Err(AppError::NotFound("Bracket"));
    }
    tracing::info!(bracket_id = %bracket_id, admin = %claims.username, "Bracket deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── Room handlers ────────────────────────────────────────────────────

async fn create_room(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateRoomRequest>,
) -> AppResult<impl IntoResponse> {
    claims.require_elevated()?;
    let bracket = load_bracket(&state, &req.bracket_id).await?.value;
    let m = bracket
        .get_match(&req.match_id)
        .ok_or_else(|| BracketError::MatchNotFound(req.match_id.clone()))?;
    if m.winner.is_some() {
        return Err(BracketError::MatchAlreadyDecided(req.match_id.clone()).into());
    }
    let admin = current_user(&state, &claims).await?;

    for _ in 0..ROOM_CODE_ATTEMPTS {
        let room_code = generate_room_code(&mut rand::thread_rng());
        let room = Room::new(
            room_code.clone(),
            admin.username.clone(),
            bracket.bracket_id.clone(),
            req.match_id.clone(),
            DraftSession::new(state.config.map_pool.clone())?,
        );
        if state.db.insert_room(&room).await? {
            metrics::ROOMS_CREATED_TOTAL.inc();
            tracing::info!(
                room_code = %room_code,
                bracket_id = %room.bracket_id,
                match_id = %room.match_id,
                admin = %room.admin,
                "Room created"
            );
            return Ok((StatusCode::CREATED, Json(json!({ "roomCode": room_code }))));
        }
        tracing::debug!(room_code = %room_code, "Room code collision, retrying");
    }

    Err(AppError::Internal("Could not allocate a room code".into()))
}

async fn join_room(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    AppJson(req): AppJson<RoomCodeRequest>,
) -> AppResult<impl IntoResponse> {
    let stored = load_room(&state, &req.room_code).await?;
    let team = caller_team_name(&state, &claims).await?;

    let bracket = load_bracket(&state, &stored.value.bracket_id).await?.value;
    let playing = bracket
        .get_match(&stored.value.match_id)
        .is_some_and(|m| m.involves(&team));
    if !playing {
        return Err(AppError::Forbidden(
            "Your team is not playing in this match".into(),
        ));
    }

    let mut room = stored.value;
    let outcome = room.join(&team)?;
    save_room(&state, &room, stored.version).await?;

    tracing::info!(room_code = %room.room_code, team = %team, ?outcome, "Team joined room");
    Ok(Json(json!({ "message": join_message(outcome), "room": room })))
}

async fn room_mapban(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    AppJson(req): AppJson<RoomBanRequest>,
) -> AppResult<impl IntoResponse> {
    let stored = load_room(&state, &req.room_code).await?;
    let team = caller_team_name(&state, &claims).await?;

    let mut room = stored.value;
    let outcome = room.ban_title(&team, &req.title)?;
    save_room(&state, &room, stored.version).await?;
    record_ban("room", &outcome);

    let body = match outcome {
        BanOutcome::Remaining(titles) => json!({
            "message": "Title selected successfully",
            "remainingTitles": titles,
        }),
        BanOutcome::Resolved(title) => {
            tracing::info!(room_code = %room.room_code, title = %title, "Room draft resolved");
            json!({
                "message": format!("Selected map is: {title}"),
                "room": room,
            })
        }
    };
    Ok(Json(body))
}

async fn room_side_select(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    AppJson(req): AppJson<SideSelectRequest>,
) -> AppResult<impl IntoResponse> {
    let stored = load_room(&state, &req.room_code).await?;
    let team = caller_team_name(&state, &claims).await?;

    let mut room = stored.value;
    let side = room.select_side(&team, &req.choice)?;
    save_room(&state, &room, stored.version).await?;

    tracing::info!(room_code = %room.room_code, team = %team, side = side.as_str(), "Side chosen");
    Ok(Json(json!({
        "message": format!("{team} has chosen: {}", side.as_str()),
        "room": room,
    })))
}

async fn room_set_winner(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    AppJson(req): AppJson<SetWinnerRequest>,
) -> AppResult<impl IntoResponse> {
    claims.require_elevated()?;
    let stored_room = load_room(&state, &req.room_code).await?;

    let winner_user = state
        .db
        .get_user_by_username(&req.winner_username)
        .await?
        .ok_or(AppError::NotFound("Winner user"))?;
    let winner_team = state
        .db
        .get_team_for_user(&winner_user)
        .await?
        .ok_or(AppError::NotFound("Winner's team"))?
        .team_name;

    let stored_bracket = load_bracket(&state, &stored_room.value.bracket_id).await?;
    let mut room = stored_room.value;
    let mut bracket = stored_bracket.value;

    // Both documents are updated in memory first; any rejection leaves storage untouched.
    let room_changed = room.record_winner(&winner_team)?;
    let outcome = bracket.record_winner(&room.match_id, &winner_team)?;

    if room_changed || outcome.changed {
        let saved = state
            .db
            .save_room_and_bracket(
                &room,
                stored_room.version,
                &bracket,
                stored_bracket.version,
            )
            .await?;
        if !saved {
            return Err(AppError::StaleVersion("room"));
        }
        metrics::BRACKET_ROUNDS_CREATED_TOTAL.inc_by(outcome.rounds_created as u64);
        tracing::info!(
            room_code = %room.room_code,
            bracket_id = %bracket.bracket_id,
            match_id = %room.match_id,
            winner = %winner_team,
            rounds_created = outcome.rounds_created,
            finished = outcome.finished,
            "Room winner recorded"
        );
    }

    Ok(Json(json!({
        "message": "Room winner and bracket updated successfully",
        "room": room,
        "bracket": bracket,
    })))
}

async fn get_room(
    AuthUser(_claims): AuthUser,
    State(state): State<AppState>,
    Path(room_code): Path<String>,
) -> AppResult<impl IntoResponse> {
    let room = load_room(&state, &room_code).await?.value;
    Ok(Json(json!(RoomView::from(&room))))
}

// ── Standalone draft sessions ─────────────────────────────────────────

async fn create_session(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let id = uuid::Uuid::new_v4().to_string();
    let session = DraftSession::new(state.config.map_pool.clone())?;
    state
        .db
        .insert_draft_session(&id, claims.sub, &session)
        .await?;

    tracing::info!(session_id = %id, user = %claims.username, "Draft session created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "sessionId": id, "session": session })),
    ))
}

async fn get_session(
    AuthUser(_claims): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let session = load_session(&state, &id).await?.value;
    Ok(Json(json!(DraftView::from(&session))))
}

async fn join_session(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let stored = load_session(&state, &id).await?;
    let mut session = stored.value;
    let outcome = session.join(&claims.username)?;
    save_session(&state, &id, &session, stored.version).await?;

    Ok(Json(json!({
        "message": join_message(outcome),
        "session": session,
    })))
}

async fn session_ban(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(req): AppJson<SessionBanRequest>,
) -> AppResult<impl IntoResponse> {
    let stored = load_session(&state, &id).await?;
    let mut session = stored.value;
    let outcome = session.select_title(&claims.username, &req.title)?;
    save_session(&state, &id, &session, stored.version).await?;
    record_ban("session", &outcome);

    let body = match outcome {
        BanOutcome::Remaining(titles) => json!({
            "message": "Title selected successfully",
            "remainingTitles": titles,
        }),
        BanOutcome::Resolved(title) => {
            tracing::info!(session_id = %id, title = %title, "Draft session resolved");
            json!({
                "message": format!("Selected map is: {title}"),
                "session": session,
            })
        }
    };
    Ok(Json(body))
}

async fn reset_session(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let stored = load_session(&state, &id).await?;
    let mut session = stored.value;
    if !session.has_participant(&claims.username) {
        return Err(AppError::Forbidden(
            "Only a participant can reset this draft".into(),
        ));
    }
    session.reset();
    save_session(&state, &id, &session, stored.version).await?;

    Ok(Json(json!({ "message": "Draft reset", "session": session })))
}

// ── Teams & admin ─────────────────────────────────────────────────────

async fn create_team(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateTeamRequest>,
) -> AppResult<impl IntoResponse> {
    let user = current_user(&state, &claims).await?;
    if Role::from_str_name(&user.role) != Some(Role::Participant) {
        return Err(AppError::Forbidden(
            "Only participants can create teams".into(),
        ));
    }

    let team_name = req.team_name.trim();
    if team_name.is_empty() {
        return Err(AppError::Validation("teamName is required".into()));
    }
    if req.members.len() > MAX_TEAM_SIZE - 1 {
        return Err(AppError::Validation(format!(
            "Team cannot have more than {MAX_TEAM_SIZE} players"
        )));
    }
    if state.db.get_team_by_creator(user.id).await?.is_some() {
        return Err(AppError::Conflict("You have already created a team".into()));
    }

    let mut members: Vec<String> = req
        .members
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty() && *m != user.username)
        .map(str::to_string)
        .collect();
    members.push(user.username.clone());

    let team = match state.db.create_team(user.id, team_name, &members).await {
        Ok(team) => team,
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict("You have already created a team".into()));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(team_id = team.id, team = %team.team_name, creator = %user.username, "Team created");
    Ok((StatusCode::CREATED, Json(team)))
}

async fn set_user_role(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
    AppJson(req): AppJson<SetRoleRequest>,
) -> AppResult<Json<UserPublic>> {
    claims.require_admin()?;
    let role = Role::from_str_name(&req.role).ok_or_else(|| {
        AppError::Validation(format!(
            "role must be participant, moderator or admin, got '{}'",
            req.role
        ))
    })?;

    let user = state
        .db
        .set_user_role(&username, role.as_str())
        .await?
        .ok_or(AppError::NotFound("User"))?;

    tracing::info!(username = %user.username, role = role.as_str(), admin = %claims.username, "User role changed");
    Ok(Json(user.into()))
}
