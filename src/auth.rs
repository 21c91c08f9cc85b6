// Authentication: password hashing, JWT tokens, the request extractor, and
// the account/profile handlers.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::{AppJson, AppState};
use crate::db::{is_unique_violation, Team, User};
use crate::error::{AppError, AppResult};

/// Name of the cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "token";

/// Largest roster a team may have, creator included.
pub const MAX_TEAM_SIZE: usize = 5;

// ── Roles ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Participant,
    Moderator,
    Admin,
}

impl Role {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "participant" => Some(Self::Participant),
            "moderator" => Some(Self::Moderator),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    /// Admins and moderators run rooms.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Moderator | Self::Admin)
    }
}

// ── JWT ──────────────────────────────────────────────────────────────

fn jwt_secret() -> Vec<u8> {
    std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "tourney-dev-secret-change-in-production".to_string())
        .into_bytes()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: i64, // user id
    pub username: String,
    pub role: String,
    pub exp: usize, // expiry (unix timestamp)
}

impl Claims {
    /// Unknown role strings are treated as the least privileged role.
    pub fn role(&self) -> Role {
        Role::from_str_name(&self.role).unwrap_or(Role::Participant)
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.role() == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin access required".into()))
        }
    }

    pub fn require_elevated(&self) -> AppResult<()> {
        if self.role().is_elevated() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin or moderator access required".into()))
        }
    }
}

pub fn create_token(user_id: i64, username: &str, role: &str) -> Result<String, String> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(24))
        .ok_or("Token expiry overflow")?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role: role.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&jwt_secret()),
    )
    .map_err(|e| format!("Failed to create token: {e}"))
}

pub fn verify_token(token: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(&jwt_secret()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {e}"))
}

// ── Password hashing ─────────────────────────────────────────────────

pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| format!("Failed to hash password: {e}"))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| format!("Invalid password hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

// ── Axum extractor: AuthUser ─────────────────────────────────────────

/// The authenticated caller. The token is read from `Authorization: Bearer`
/// first, then from the `token` cookie.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| {
                CookieJar::from_headers(&parts.headers)
                    .get(TOKEN_COOKIE)
                    .map(|c| c.value().to_string())
            })
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

        verify_token(&token)
            .map(AuthUser)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))
    }
}

/// Load the caller's user row; a token for a deleted account is a 404.
pub async fn current_user(state: &AppState, claims: &Claims) -> AppResult<User> {
    state
        .db
        .get_user(claims.sub)
        .await?
        .ok_or(AppError::NotFound("User"))
}

fn token_cookie(token: String) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .http_only(true)
        .path("/")
        .build()
}

// ── Auth API handlers ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserPublic,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub team_id: Option<i64>,
    pub created_at: String,
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            team_id: user.team_id,
            created_at: user.created_at,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(req): AppJson<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let username = req.username.trim();
    let email = req.email.trim();
    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "username, email, and password are required".into(),
        ));
    }
    if username.len() < 3 || username.len() > 30 {
        return Err(AppError::Validation("username must be 3-30 characters".into()));
    }
    if req.password.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    let password_hash = hash_password(&req.password).map_err(AppError::Internal)?;
    // Signup never grants moderator; only configured usernames become admins.
    let role = if state.config.is_admin_username(username) {
        Role::Admin
    } else {
        Role::Participant
    };

    let user = match state
        .db
        .create_user(username, email, &password_hash, role.as_str())
        .await
    {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Duplicate("Username or email already taken".into()));
        }
        Err(e) => return Err(e.into()),
    };

    let token = create_token(user.id, &user.username, &user.role).map_err(AppError::Internal)?;
    tracing::info!(user_id = user.id, username = %user.username, role = %user.role, "User registered");

    Ok((
        StatusCode::CREATED,
        jar.add(token_cookie(token.clone())),
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let user = match (req.email.as_deref(), req.username.as_deref()) {
        (Some(email), _) => state.db.get_user_by_email(email.trim()).await?,
        (None, Some(username)) => state.db.get_user_by_username(username.trim()).await?,
        (None, None) => {
            return Err(AppError::Validation("email or username is required".into()));
        }
    };

    let invalid = || AppError::Unauthorized("Invalid credentials".into());
    let user = user.ok_or_else(invalid)?;
    if !verify_password(&req.password, &user.password_hash).map_err(AppError::Internal)? {
        return Err(invalid());
    }

    let token = create_token(user.id, &user.username, &user.role).map_err(AppError::Internal)?;
    Ok((
        jar.add(token_cookie(token.clone())),
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        jar.remove(Cookie::build(TOKEN_COOKIE).path("/")),
        Json(json!({ "message": "Logged out" })),
    )
}

// ── Profile handlers ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ProfileResponse {
    pub user: UserPublic,
    pub team: Option<Team>,
    /// Set when the username changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

pub async fn me(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<ProfileResponse>> {
    let user = current_user(&state, &claims).await?;
    let team = state.db.get_team_for_user(&user).await?;
    Ok(Json(ProfileResponse {
        user: user.into(),
        team,
        token: None,
    }))
}

pub async fn my_team(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Team>> {
    let user = current_user(&state, &claims).await?;
    state
        .db
        .get_team_for_user(&user)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Team"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub team_name: Option<String>,
    /// Positional: a non-empty entry replaces the member in that slot.
    pub team_members: Option<Vec<String>>,
}

/// Swap `old` for `new` in a roster, keeping its slot. If `new` is already
/// listed, `old` is just dropped.
pub fn rename_member(members: &[String], old: &str, new: &str) -> Vec<String> {
    if members.iter().any(|m| m == new) {
        return members.iter().filter(|m| *m != old).cloned().collect();
    }
    members
        .iter()
        .map(|m| if m == old { new.to_string() } else { m.clone() })
        .collect()
}

/// Apply positional roster edits, keeping the creator on the team.
pub fn merge_roster(
    current: &[String],
    edits: &[String],
    creator: &str,
) -> Result<Vec<String>, AppError> {
    if edits.len() > MAX_TEAM_SIZE {
        return Err(AppError::Validation(format!(
            "Team cannot have more than {MAX_TEAM_SIZE} members"
        )));
    }
    let mut members = current.to_vec();
    for (i, name) in edits.iter().enumerate() {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if i < members.len() {
            members[i] = name.to_string();
        } else {
            members.push(name.to_string());
        }
    }
    if !members.iter().any(|m| m == creator) {
        members.push(creator.to_string());
    }
    if members.len() > MAX_TEAM_SIZE {
        return Err(AppError::Validation(format!(
            "Team cannot have more than {MAX_TEAM_SIZE} members"
        )));
    }
    Ok(members)
}

pub async fn update_profile(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> AppResult<(CookieJar, Json<ProfileResponse>)> {
    let user = current_user(&state, &claims).await?;
    let non_empty = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let username = non_empty(&req.username);
    let email = non_empty(&req.email);
    let team_name = non_empty(&req.team_name);

    let renamed = username.as_deref().filter(|name| *name != user.username);

    // Team edits are checked before anything is written.
    let mut team_update = None;
    if team_name.is_some() || req.team_members.is_some() {
        let team = state
            .db
            .get_team_for_user(&user)
            .await?
            .ok_or(AppError::NotFound("Team"))?;
        if team.created_by != user.id {
            return Err(AppError::Forbidden(
                "Only the team creator can update the team".into(),
            ));
        }
        let creator = renamed.unwrap_or(&user.username);
        let roster = match renamed {
            Some(new) => rename_member(&team.members, &user.username, new),
            None => team.members.clone(),
        };
        let members = match req.team_members.as_deref() {
            Some(edits) => Some(merge_roster(&roster, edits, creator)?),
            None => renamed.map(|_| roster),
        };
        team_update = Some((team.id, members));
    } else if let Some(new) = renamed {
        if let Some(team) = state.db.get_team_by_creator(user.id).await? {
            team_update = Some((team.id, Some(rename_member(&team.members, &user.username, new))));
        }
    }

    let password_hash = match req.password.as_deref().filter(|p| !p.is_empty()) {
        Some(p) if p.len() < 8 => {
            return Err(AppError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }
        Some(p) => Some(hash_password(p).map_err(AppError::Internal)?),
        None => None,
    };

    let username_changed = renamed.is_some();
    let user = match state
        .db
        .update_user(
            user.id,
            username.as_deref(),
            email.as_deref(),
            password_hash.as_deref(),
        )
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => return Err(AppError::NotFound("User")),
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Duplicate("Username or email already taken".into()));
        }
        Err(e) => return Err(e.into()),
    };

    if let Some((team_id, members)) = team_update {
        state
            .db
            .update_team(team_id, team_name.as_deref(), members.as_deref())
            .await?;
    }

    // Session identity comes from the token, so a rename needs a fresh one.
    let (jar, token) = if username_changed {
        let token =
            create_token(user.id, &user.username, &user.role).map_err(AppError::Internal)?;
        tracing::info!(user_id = user.id, username = %user.username, "User renamed");
        (jar.add(token_cookie(token.clone())), Some(token))
    } else {
        (jar, None)
    };

    let team = state.db.get_team_for_user(&user).await?;
    Ok((
        jar,
        Json(ProfileResponse {
            user: user.into(),
            team,
            token,
        }),
    ))
}
