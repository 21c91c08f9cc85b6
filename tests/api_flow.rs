// End-to-end tests driving the full router in-process against in-memory SQLite:
// accounts and teams, bracket progression, the room draft flow, and
// standalone draft sessions.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use tourney_backend::{app, config::Config, db::Database, metrics, AppState};

const PASSWORD: &str = "password123";

struct TestApp {
    router: Router,
}

async fn setup() -> TestApp {
    metrics::register_metrics();
    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        admin_usernames: vec!["admin".to_string()],
        ..Config::default()
    };
    let db = Database::new(&config.database_url).await.unwrap();
    let state = AppState::new(db, config);
    TestApp { router: app(state) }
}

impl TestApp {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.execute(request).await
    }

    async fn execute(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn register(&self, username: &str) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {username}: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    /// Register a captain and create their team; returns the captain's token.
    async fn captain(&self, username: &str, team_name: &str) -> String {
        let token = self.register(username).await;
        let (status, body) = self
            .send(
                "POST",
                "/team/create",
                Some(&token),
                Some(json!({ "teamName": team_name, "members": [] })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create team {team_name}: {body}");
        token
    }

    async fn initialize_bracket(&self, admin: &str, matchups: Value) -> Value {
        let (status, body) = self
            .send(
                "POST",
                "/bracket/initialize",
                Some(admin),
                Some(json!({ "matchups": matchups })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "initialize: {body}");
        body
    }

    async fn create_room(&self, token: &str, bracket_id: &str, match_id: &str) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/room/create",
            Some(token),
            Some(json!({ "bracketId": bracket_id, "matchId": match_id })),
        )
        .await
    }

    async fn ban(&self, token: &str, room_code: &str, title: &str) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/room/mapban",
            Some(token),
            Some(json!({ "roomCode": room_code, "title": title })),
        )
        .await
    }
}

// ── Accounts ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_and_metrics() {
    let app = setup().await;
    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = app.send("GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = setup().await;
    let (status, body) = app.send("GET", "/bracket/B001", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = app
        .send("GET", "/profile/me", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_login_and_cookie_auth() {
    let app = setup().await;
    let token = app.register("alice").await;
    assert!(!token.is_empty());

    let (status, body) = app
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "alice", "email": "other@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = app
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "bob", "email": "bob@example.com", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, _) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["role"], "participant");
    let token = body["token"].as_str().unwrap();

    let request = Request::builder()
        .uri("/profile/me")
        .header(header::COOKIE, format!("token={token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.execute(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert!(body["team"].is_null());
}

#[tokio::test]
async fn test_team_creation_and_profile_roster_edit() {
    let app = setup().await;
    let token = app.captain("cap1", "Red").await;

    let (status, _) = app
        .send(
            "POST",
            "/team/create",
            Some(&token),
            Some(json!({ "teamName": "Again", "members": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let other = app.register("cap2").await;
    let (status, body) = app
        .send(
            "POST",
            "/team/create",
            Some(&other),
            Some(json!({ "teamName": "Big", "members": ["a", "b", "c", "d", "e"] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = app
        .send(
            "PUT",
            "/profile/me",
            Some(&token),
            Some(json!({ "teamName": "Crimson", "teamMembers": ["p1", "p2"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app.send("GET", "/profile/me/team", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["teamName"], "Crimson");
    assert_eq!(body["members"], json!(["p1", "p2", "cap1"]));

    let (status, body) = app.send("GET", "/profile/me/team", Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_rename_reissues_token_and_updates_roster() {
    let app = setup().await;
    let old_token = app.captain("cap1", "Red").await;

    // Without a rename no new token is handed out.
    let (status, body) = app
        .send(
            "PUT",
            "/profile/me",
            Some(&old_token),
            Some(json!({ "email": "cap1@other.example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body.get("token").is_none());

    let request = Request::builder()
        .method("PUT")
        .uri("/profile/me")
        .header(header::AUTHORIZATION, format!("Bearer {old_token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "username": "captain1" }).to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    assert!(cookie.starts_with(&format!("token={token}")));
    assert_eq!(body["user"]["username"], "captain1");
    assert_eq!(body["team"]["members"], json!(["captain1"]));

    let (status, body) = app.send("GET", "/profile/me/team", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["members"], json!(["captain1"]));

    // Draft sessions see the new name.
    let (_, body) = app.send("POST", "/mapban/sessions", Some(&token), None).await;
    let id = body["sessionId"].as_str().unwrap().to_string();
    let (status, body) = app
        .send("POST", &format!("/mapban/sessions/{id}/join"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["session"]["participants"], json!(["captain1"]));
}

#[tokio::test]
async fn test_malformed_bodies_are_validation_errors() {
    let app = setup().await;
    let admin = app.register("admin").await;

    let (status, body) = app
        .send(
            "POST",
            "/bracket/initialize",
            Some(&admin),
            Some(json!({ "matchups": "nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = app
        .send(
            "POST",
            "/room/mapban",
            Some(&admin),
            Some(json!({ "roomCode": "123456" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.execute(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
}

#[tokio::test]
async fn test_admin_grants_moderator_role() {
    let app = setup().await;
    let admin = app.register("admin").await;
    let modr = app.register("mod").await;
    let bracket = app
        .initialize_bracket(&admin, json!([["T1", "T2"]]))
        .await;
    let bracket_id = bracket["bracketId"].as_str().unwrap();

    let (status, _) = app.create_room(&modr, bracket_id, "R1-M001").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            "PUT",
            "/admin/users/mod/role",
            Some(&modr),
            Some(json!({ "role": "admin" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(
            "PUT",
            "/admin/users/mod/role",
            Some(&admin),
            Some(json!({ "role": "moderator" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "moderator");

    // The role is carried in the token, so log in again to pick it up.
    let (_, body) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "mod", "password": PASSWORD })),
        )
        .await;
    let modr = body["token"].as_str().unwrap().to_string();
    let (status, body) = app.create_room(&modr, bracket_id, "R1-M001").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["roomCode"].as_str().unwrap().len(), 6);
}

// ── Brackets ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bracket_progression_over_http() {
    let app = setup().await;
    let admin = app.register("admin").await;
    let player = app.register("player").await;

    let bracket = app
        .initialize_bracket(&admin, json!([["T1", "T2"], ["T3", "T4"]]))
        .await;
    assert_eq!(bracket["bracketId"], "B001");
    assert_eq!(bracket["rounds"][0]["matches"][1]["matchId"], "R1-M002");

    let update = |match_id: &str, winner: &str| {
        json!({ "bracketId": "B001", "matchId": match_id, "winnerName": winner })
    };

    let (status, _) = app
        .send("POST", "/bracket/update", Some(&player), Some(update("R1-M001", "T1")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send("POST", "/bracket/update", Some(&admin), Some(update("R1-M001", "T1")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rounds"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .send("POST", "/bracket/update", Some(&admin), Some(update("R1-M002", "T4")))
        .await;
    assert_eq!(status, StatusCode::OK);
    let rounds = body["rounds"].as_array().unwrap();
    assert_eq!(rounds.len(), 2);
    assert_eq!(
        rounds[1]["matches"],
        json!([{ "matchId": "R2-M001", "team1": "T1", "team2": "T4", "winner": null }])
    );

    // Resubmission does not duplicate the round.
    let (status, body) = app
        .send("POST", "/bracket/update", Some(&admin), Some(update("R1-M002", "T4")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rounds"].as_array().unwrap().len(), 2);

    // Round 2 exists, so round-1 results are locked.
    let (status, body) = app
        .send("POST", "/bracket/update", Some(&admin), Some(update("R1-M001", "T2")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "conflict");

    let (status, body) = app
        .send("POST", "/bracket/update", Some(&admin), Some(update("R9-M001", "T1")))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = app.send("GET", "/bracket/B001", Some(&player), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rounds"].as_array().unwrap().len(), 2);
    assert_eq!(body["finished"], false);
    assert_eq!(body["champion"], Value::Null);

    let (status, body) = app
        .send("POST", "/bracket/update", Some(&admin), Some(update("R2-M001", "T4")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["finished"], true);
    assert_eq!(body["champion"], "T4");

    let (status, _) = app.send("DELETE", "/bracket/B001", Some(&player), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send("DELETE", "/bracket/B001", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send("GET", "/bracket/B001", Some(&player), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bracket_initialize_validation() {
    let app = setup().await;
    let admin = app.register("admin").await;

    for matchups in [json!([]), json!([["T1", "T1"]]), json!([["T1", "T2"], ["T2", "T3"]])] {
        let (status, body) = app
            .send(
                "POST",
                "/bracket/initialize",
                Some(&admin),
                Some(json!({ "matchups": matchups })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{matchups}");
        assert_eq!(body["error"], "validation");
    }
}

// ── Rooms ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_room_for_missing_match_creates_nothing() {
    let app = setup().await;
    let admin = app.register("admin").await;
    app.initialize_bracket(&admin, json!([["T1", "T2"]])).await;

    let (status, body) = app.create_room(&admin, "B001", "R1-M404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = app.create_room(&admin, "B404", "R1-M001").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.send("GET", "/bracket/B001/rooms", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_room_rejected_for_bye_match() {
    let app = setup().await;
    let admin = app.register("admin").await;
    let bracket = app
        .initialize_bracket(&admin, json!([["T1", "T2"], ["T3", null]]))
        .await;
    assert_eq!(bracket["rounds"][0]["matches"][1]["winner"], "T3");

    let (status, body) = app.create_room(&admin, "B001", "R1-M002").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_full_room_flow() {
    let app = setup().await;
    let admin = app.register("admin").await;
    let cap1 = app.captain("cap1", "T1").await;
    let cap2 = app.captain("cap2", "T2").await;
    let cap3 = app.captain("cap3", "T3").await;

    app.initialize_bracket(&admin, json!([["T1", "T2"], ["T3", "T4"]]))
        .await;
    let (status, body) = app.create_room(&admin, "B001", "R1-M001").await;
    assert_eq!(status, StatusCode::CREATED);
    let code = body["roomCode"].as_str().unwrap().to_string();

    let api = &app;
    let join = |token: &str| {
        let token = token.to_string();
        let code = code.clone();
        async move {
            api.send(
                "POST",
                "/room/join",
                Some(&token),
                Some(json!({ "roomCode": code })),
            )
            .await
        }
    };

    // T3 is not playing this match.
    let (status, _) = join(&cap3).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = join(&cap1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["room"]["draft"]["started"], false);

    let (status, body) = join(&cap1).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "conflict");

    // Banning before the opponent arrives is rejected.
    let (status, _) = app.ban(&cap1, &code, "Ascent").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = join(&cap2).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["room"]["draft"]["started"], true);
    assert_eq!(body["room"]["draft"]["participants"], json!(["T1", "T2"]));

    let (status, body) = app
        .send("GET", &format!("/room/{code}"), Some(&cap2), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentParticipant"], "T1");

    let (status, body) = app.send("GET", "/bracket/B001/rooms", Some(&cap3), None).await;
    assert_eq!(status, StatusCode::OK);
    let rooms = body.as_array().unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["roomCode"], code.as_str());
    assert_eq!(rooms[0]["currentParticipant"], "T1");

    let (status, body) = app.ban(&cap2, &code, "Ascent").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "conflict");

    let (status, body) = app.ban(&cap1, &code, "Lotus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let bans = [
        (&cap1, "Ascent"),
        (&cap2, "Pearl"),
        (&cap1, "Split"),
        (&cap2, "Haven"),
        (&cap1, "Bind"),
    ];
    for (i, (token, title)) in bans.iter().enumerate() {
        let (status, body) = app.ban(token, &code, title).await;
        assert_eq!(status, StatusCode::OK, "{title}: {body}");
        assert_eq!(body["remainingTitles"].as_array().unwrap().len(), 6 - i);
    }

    // Side selection waits for the draft to finish.
    let (status, _) = app
        .send(
            "POST",
            "/room/side-select",
            Some(&cap2),
            Some(json!({ "roomCode": code, "choice": "attacking" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.ban(&cap2, &code, "Breeze").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Selected map is: Icebox");
    assert_eq!(body["room"]["selectedTitle"], "Icebox");

    let (status, _) = app.ban(&cap1, &code, "Icebox").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "POST",
            "/room/side-select",
            Some(&cap1),
            Some(json!({ "roomCode": code, "choice": "attacking" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            "POST",
            "/room/side-select",
            Some(&cap2),
            Some(json!({ "roomCode": code, "choice": "sideways" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = app
        .send(
            "POST",
            "/room/side-select",
            Some(&cap2),
            Some(json!({ "roomCode": code, "choice": "defender" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["room"]["sideChoice"], "defending");

    let set_winner = |username: &str| json!({ "roomCode": code, "winnerUsername": username });

    let (status, _) = app
        .send("POST", "/room/set-winner", Some(&cap1), Some(set_winner("cap1")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send("POST", "/room/set-winner", Some(&admin), Some(set_winner("cap1")))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["room"]["winner"], "T1");
    assert_eq!(body["bracket"]["rounds"][0]["matches"][0]["winner"], "T1");
    assert_eq!(body["bracket"]["rounds"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .send("POST", "/room/set-winner", Some(&admin), Some(set_winner("cap1")))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send("POST", "/room/set-winner", Some(&admin), Some(set_winner("cap2")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "conflict");

    let (status, body) = app
        .send("GET", &format!("/room/{code}"), Some(&cap3), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["winner"], "T1");

    let (status, _) = app
        .send("GET", "/room/000000", Some(&cap3), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_room_winner_not_in_match_leaves_state_unchanged() {
    let app = setup().await;
    let admin = app.register("admin").await;
    app.captain("cap3", "T3").await;
    app.initialize_bracket(&admin, json!([["T1", "T2"], ["T3", "T4"]]))
        .await;
    let (_, body) = app.create_room(&admin, "B001", "R1-M001").await;
    let code = body["roomCode"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(
            "POST",
            "/room/set-winner",
            Some(&admin),
            Some(json!({ "roomCode": code, "winnerUsername": "cap3" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (_, room) = app
        .send("GET", &format!("/room/{code}"), Some(&admin), None)
        .await;
    assert!(room["winner"].is_null());
    let (_, bracket) = app.send("GET", "/bracket/B001", Some(&admin), None).await;
    assert!(bracket["rounds"][0]["matches"][0]["winner"].is_null());

    let (status, _) = app
        .send(
            "POST",
            "/room/set-winner",
            Some(&admin),
            Some(json!({ "roomCode": code, "winnerUsername": "ghost" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Standalone draft sessions ────────────────────────────────────────

#[tokio::test]
async fn test_standalone_session_flow() {
    let app = setup().await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let carol = app.register("carol").await;

    let (status, body) = app.send("POST", "/mapban/sessions", Some(&alice), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["sessionId"].as_str().unwrap().to_string();
    let base = format!("/mapban/sessions/{id}");

    let (status, _) = app.send("POST", &format!("{base}/join"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.send("POST", &format!("{base}/join"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["started"], true);
    let (status, _) = app.send("POST", &format!("{base}/join"), Some(&carol), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let api = &app;
    let ban = |token: &str, title: &str| {
        let token = token.to_string();
        let uri = format!("{base}/ban");
        let body = json!({ "title": title });
        async move { api.send("POST", &uri, Some(&token), Some(body)).await }
    };

    let (status, _) = ban(&bob, "Ascent").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.send("GET", &base, Some(&carol), None).await;
    assert_eq!(body["currentParticipant"], "alice");
    assert_eq!(body["resolvedTitle"], Value::Null);

    let order = ["Ascent", "Pearl", "Split", "Haven", "Bind", "Breeze"];
    let mut last = Value::Null;
    for (i, title) in order.iter().enumerate() {
        let token = if i % 2 == 0 { &alice } else { &bob };
        let (status, body) = ban(token, title).await;
        assert_eq!(status, StatusCode::OK, "{title}: {body}");
        last = body;
    }
    assert_eq!(last["message"], "Selected map is: Icebox");
    assert_eq!(last["session"]["candidates"], json!(["Icebox"]));

    let (status, _) = app.send("POST", &format!("{base}/reset"), Some(&carol), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send("POST", &format!("{base}/reset"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["candidates"].as_array().unwrap().len(), 7);
    assert_eq!(body["session"]["participants"], json!([]));

    let (status, body) = app.send("GET", &base, Some(&carol), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["started"], false);

    let (status, _) = app
        .send("GET", "/mapban/sessions/unknown", Some(&carol), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
