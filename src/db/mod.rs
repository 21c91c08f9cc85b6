// Database access layer (SQLite via sqlx).
//
// Brackets, rooms and standalone draft sessions are stored as JSON documents
// with an integer version. Every write is conditional on the version that was
// read, so concurrent read-modify-write cycles cannot overwrite each other.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use crate::bracket::{bracket_id, Bracket};
use crate::draft::DraftSession;
use crate::room::Room;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub team_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: i64,
    pub team_name: String,
    /// In-game names, creator included.
    pub members: Vec<String>,
    pub created_by: i64,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct TeamRow {
    id: i64,
    team_name: String,
    members: String,
    created_by: i64,
    created_at: String,
}

impl TryFrom<TeamRow> for Team {
    type Error = sqlx::Error;

    fn try_from(row: TeamRow) -> Result<Self, Self::Error> {
        Ok(Team {
            id: row.id,
            team_name: row.team_name,
            members: serde_json::from_str(&row.members)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// A stored document together with the version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub version: i64,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    document: String,
    version: i64,
}

impl DocumentRow {
    fn decode<T: DeserializeOwned>(self) -> Result<Versioned<T>, sqlx::Error> {
        let value =
            serde_json::from_str(&self.document).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Versioned {
            value,
            version: self.version,
        })
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// True when the error is a UNIQUE constraint violation.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

const USER_COLUMNS: &str = "id, username, email, password_hash, role, team_id, created_at";

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = if database_url.contains(":memory:") {
            // Each connection to an in-memory database is a separate database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(database_url).await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'participant',
                team_id INTEGER REFERENCES teams(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                team_name TEXT NOT NULL,
                members TEXT NOT NULL DEFAULT '[]',
                created_by INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS brackets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bracket_id TEXT NOT NULL UNIQUE,
                document TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rooms (
                room_code TEXT PRIMARY KEY,
                bracket_id TEXT NOT NULL,
                match_id TEXT NOT NULL,
                document TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS draft_sessions (
                id TEXT PRIMARY KEY,
                created_by INTEGER NOT NULL,
                document TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, password_hash, role) VALUES (?, ?, ?, ?) RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    /// Update the given profile fields; `None` leaves a field unchanged.
    pub async fn update_user(
        &self,
        id: i64,
        username: Option<&str>,
        email: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET username = COALESCE(?, username), email = COALESCE(?, email), password_hash = COALESCE(?, password_hash) WHERE id = ?",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_user(id).await
    }

    pub async fn set_user_role(
        &self,
        username: &str,
        role: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE username = ?")
            .bind(role)
            .bind(username)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_user_by_username(username).await
    }

    // ── Teams ─────────────────────────────────────────────────────────

    /// Create a team and link its creator to it.
    pub async fn create_team(
        &self,
        created_by: i64,
        team_name: &str,
        members: &[String],
    ) -> Result<Team, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, TeamRow>(
            "INSERT INTO teams (team_name, members, created_by) VALUES (?, ?, ?) RETURNING id, team_name, members, created_by, created_at",
        )
        .bind(team_name)
        .bind(encode(&members)?)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET team_id = ? WHERE id = ?")
            .bind(row.id)
            .bind(created_by)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Team::try_from(row)
    }

    pub async fn get_team(&self, id: i64) -> Result<Option<Team>, sqlx::Error> {
        sqlx::query_as::<_, TeamRow>(
            "SELECT id, team_name, members, created_by, created_at FROM teams WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Team::try_from)
        .transpose()
    }

    pub async fn get_team_by_creator(&self, user_id: i64) -> Result<Option<Team>, sqlx::Error> {
        sqlx::query_as::<_, TeamRow>(
            "SELECT id, team_name, members, created_by, created_at FROM teams WHERE created_by = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Team::try_from)
        .transpose()
    }

    /// The team a user is linked to, if any.
    pub async fn get_team_for_user(&self, user: &User) -> Result<Option<Team>, sqlx::Error> {
        match user.team_id {
            Some(team_id) => self.get_team(team_id).await,
            None => Ok(None),
        }
    }

    pub async fn update_team(
        &self,
        id: i64,
        team_name: Option<&str>,
        members: Option<&[String]>,
    ) -> Result<Option<Team>, sqlx::Error> {
        let members = members.map(encode).transpose()?;
        let result = sqlx::query(
            "UPDATE teams SET team_name = COALESCE(?, team_name), members = COALESCE(?, members) WHERE id = ?",
        )
        .bind(team_name)
        .bind(members)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_team(id).await
    }

    // ── Brackets ──────────────────────────────────────────────────────

    /// Store a freshly initialized bracket. The row id comes from AUTOINCREMENT,
    /// so a `B{n:03}` id is never handed out twice, even after a delete.
    pub async fn insert_bracket(
        &self,
        mut bracket: Bracket,
    ) -> Result<Versioned<Bracket>, sqlx::Error> {
        // Writing first takes the write lock up front; a leading read would
        // have to upgrade its lock and can fail with SQLITE_BUSY under contention.
        let mut tx = self.pool.begin().await?;
        let placeholder = format!("pending-{}", uuid::Uuid::new_v4());
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO brackets (bracket_id, document) VALUES (?, '{}') RETURNING id",
        )
        .bind(&placeholder)
        .fetch_one(&mut *tx)
        .await?;
        bracket.bracket_id = bracket_id(id);

        sqlx::query("UPDATE brackets SET bracket_id = ?, document = ? WHERE id = ?")
            .bind(&bracket.bracket_id)
            .bind(encode(&bracket)?)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Versioned {
            value: bracket,
            version: 1,
        })
    }

    pub async fn get_bracket(
        &self,
        bracket_id: &str,
    ) -> Result<Option<Versioned<Bracket>>, sqlx::Error> {
        sqlx::query_as::<_, DocumentRow>(
            "SELECT document, version FROM brackets WHERE bracket_id = ?",
        )
        .bind(bracket_id)
        .fetch_optional(&self.pool)
        .await?
        .map(DocumentRow::decode)
        .transpose()
    }

    /// Returns false when the stored version no longer matches `expected_version`.
    pub async fn save_bracket(
        &self,
        bracket: &Bracket,
        expected_version: i64,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let saved = update_bracket(&mut tx, bracket, expected_version).await?;
        if saved {
            tx.commit().await?;
        }
        Ok(saved)
    }

    /// Delete a bracket and every room that points at it.
    pub async fn delete_bracket(&self, bracket_id: &str) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM brackets WHERE bracket_id = ?")
            .bind(bracket_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM rooms WHERE bracket_id = ?")
            .bind(bracket_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Rooms ─────────────────────────────────────────────────────────

    /// Insert a new room. Returns false if the room code is already taken.
    pub async fn insert_room(&self, room: &Room) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO rooms (room_code, bracket_id, match_id, document) VALUES (?, ?, ?, ?)",
        )
        .bind(&room.room_code)
        .bind(&room.bracket_id)
        .bind(&room.match_id)
        .bind(encode(room)?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get_room(&self, room_code: &str) -> Result<Option<Versioned<Room>>, sqlx::Error> {
        sqlx::query_as::<_, DocumentRow>("SELECT document, version FROM rooms WHERE room_code = ?")
            .bind(room_code)
            .fetch_optional(&self.pool)
            .await?
            .map(DocumentRow::decode)
            .transpose()
    }

    /// Rooms opened for a bracket, oldest first.
    pub async fn list_rooms_for_bracket(&self, bracket_id: &str) -> Result<Vec<Room>, sqlx::Error> {
        sqlx::query_as::<_, DocumentRow>(
            "SELECT document, version FROM rooms WHERE bracket_id = ? ORDER BY created_at, room_code",
        )
        .bind(bracket_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.decode().map(|stored: Versioned<Room>| stored.value))
        .collect()
    }

    /// Returns false when the stored version no longer matches `expected_version`.
    pub async fn save_room(&self, room: &Room, expected_version: i64) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let saved = update_room(&mut tx, room, expected_version).await?;
        if saved {
            tx.commit().await?;
        }
        Ok(saved)
    }

    /// Write a room and its bracket in one transaction. Nothing is committed
    /// unless both version checks pass.
    pub async fn save_room_and_bracket(
        &self,
        room: &Room,
        room_version: i64,
        bracket: &Bracket,
        bracket_version: i64,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        if !update_room(&mut tx, room, room_version).await? {
            return Ok(false);
        }
        if !update_bracket(&mut tx, bracket, bracket_version).await? {
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    // ── Standalone draft sessions ─────────────────────────────────────

    pub async fn insert_draft_session(
        &self,
        id: &str,
        created_by: i64,
        session: &DraftSession,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO draft_sessions (id, created_by, document) VALUES (?, ?, ?)")
            .bind(id)
            .bind(created_by)
            .bind(encode(session)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_draft_session(
        &self,
        id: &str,
    ) -> Result<Option<Versioned<DraftSession>>, sqlx::Error> {
        sqlx::query_as::<_, DocumentRow>(
            "SELECT document, version FROM draft_sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(DocumentRow::decode)
        .transpose()
    }

    /// Returns false when the stored version no longer matches `expected_version`.
    pub async fn save_draft_session(
        &self,
        id: &str,
        session: &DraftSession,
        expected_version: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE draft_sessions SET document = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(encode(session)?)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn update_bracket(
    tx: &mut Transaction<'_, Sqlite>,
    bracket: &Bracket,
    expected_version: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE brackets SET document = ?, version = version + 1 WHERE bracket_id = ? AND version = ?",
    )
    .bind(encode(bracket)?)
    .bind(&bracket.bracket_id)
    .bind(expected_version)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn update_room(
    tx: &mut Transaction<'_, Sqlite>,
    room: &Room,
    expected_version: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE rooms SET document = ?, version = version + 1 WHERE room_code = ? AND version = ?",
    )
    .bind(encode(room)?)
    .bind(&room.room_code)
    .bind(expected_version)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}
