//! Integration tests for the flood relief backend.

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::models::PrincipalMetadata;
use crate::{create_router, AppState};

const ADMIN_EMAIL: &str = "admin@relief.test";
const PASSWORD: &str = "correct-horse-42";
const ZONE: &str = "137:1005";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Arc<Repository>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some("test-api-key".to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        // Create config
        let config = Config {
            api_psk: psk.clone(),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            session_ttl_hours: 1,
            zone_cell_degrees: 0.1,
            bootstrap_admin_email: Some(ADMIN_EMAIL.to_string()),
        };

        let state = AppState {
            repo: repo.clone(),
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            repo,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let resp = request.send().await.unwrap();
        let status = resp.status();
        let body = resp.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        self.send(self.client.get(self.url(path)).bearer_auth(token))
            .await
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.post(self.url(path)).bearer_auth(token).json(&body))
            .await
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.put(self.url(path)).bearer_auth(token).json(&body))
            .await
    }

    async fn delete(&self, token: &str, path: &str) -> (StatusCode, Value) {
        self.send(self.client.delete(self.url(path)).bearer_auth(token))
            .await
    }

    /// Sign up and sign in, returning (token, profile id).
    async fn account(&self, role: &str, email: &str) -> (String, String) {
        let (status, body) = self
            .send(self.client.post(self.url("/api/auth/signup")).json(&json!({
                "email": email,
                "password": PASSWORD,
                "role": role,
                "name": format!("{} user", role)
            })))
            .await;
        assert_eq!(status, StatusCode::OK, "signup failed: {}", body);

        let (status, body) = self
            .send(self.client.post(self.url("/api/auth/signin")).json(&json!({
                "email": email,
                "password": PASSWORD,
                "role": role
            })))
            .await;
        assert_eq!(status, StatusCode::OK, "signin failed: {}", body);

        (
            body["data"]["token"].as_str().unwrap().to_string(),
            body["data"]["profile"]["id"].as_str().unwrap().to_string(),
        )
    }

    async fn admin(&self) -> String {
        self.account("admin", ADMIN_EMAIL).await.0
    }

    /// Register an organization and return (token, organization id) without review.
    async fn registered_org(&self, email: &str) -> (String, String) {
        let (token, _) = self.account("organization", email).await;
        let (status, body) = self
            .post(
                &token,
                "/api/organizations",
                json!({
                    "name": "River Rescue",
                    "email": email,
                    "phone": "020000000",
                    "address": "1 Harbour Rd",
                    "representativeName": "Somchai",
                    "representativePosition": "Director"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {}", body);
        (token, body["data"]["id"].as_str().unwrap().to_string())
    }

    /// An approved organization serving the test zone.
    async fn approved_org(&self, admin: &str, email: &str) -> (String, String) {
        let (token, org_id) = self.registered_org(email).await;
        let (status, _) = self
            .post(admin, &format!("/api/organizations/{}/approve", org_id), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = self
            .put(
                &token,
                &format!("/api/organizations/{}/zones", org_id),
                json!({ "zones": [ZONE] }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        (token, org_id)
    }

    /// An active team with a freshly signed-up leader. Returns (team id, leader token).
    async fn team_with_leader(&self, org_token: &str, org_id: &str, tag: &str) -> (String, String) {
        let (status, body) = self
            .post(
                org_token,
                "/api/teams",
                json!({ "organizationId": org_id, "name": format!("Team {}", tag) }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create team failed: {}", body);
        let team_id = body["data"]["id"].as_str().unwrap().to_string();

        let (leader_token, leader_id) = self
            .account("rescuer", &format!("leader-{}@relief.test", tag))
            .await;
        let (status, _) = self
            .post(
                org_token,
                &format!("/api/teams/{}/members", team_id),
                json!({ "userId": leader_id, "isLeader": true }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        (team_id, leader_token)
    }

    async fn file_request(&self, victim_token: &str) -> String {
        let (status, body) = self
            .post(victim_token, "/api/requests", request_payload())
            .await;
        assert_eq!(status, StatusCode::OK, "create request failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn request_status(&self, token: &str, id: &str) -> String {
        let (_, body) = self.get(token, &format!("/api/requests/{}", id)).await;
        body["data"]["status"].as_str().unwrap().to_string()
    }
}

fn request_payload() -> Value {
    json!({
        "location": { "lat": 13.76, "lng": 100.53, "address": "12 Canal St" },
        "needs": { "food": true, "water": true },
        "peopleCount": 4,
        "details": "Ground floor flooded",
        "images": ["https://img.example/1.jpg"]
    })
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_psk_is_required_when_configured() {
    let fixture = TestFixture::new().await;

    // Client without the default header
    let resp = Client::new()
        .get(fixture.url("/api/revision"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = Client::new()
        .get(fixture.url("/api/revision"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture
        .client
        .get(fixture.url("/api/revision"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_session_required() {
    let fixture = TestFixture::with_psk(None).await;

    let (status, body) = fixture
        .send(fixture.client.get(fixture.url("/api/requests")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = fixture.get("not-a-token", "/api/auth/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_out_revokes_token() {
    let fixture = TestFixture::new().await;
    let (token, profile_id) = fixture.account("victim", "v@relief.test").await;

    let (status, body) = fixture.get(&token, "/api/auth/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], profile_id.as_str());
    assert_eq!(body["data"]["role"], "victim");

    let (status, _) = fixture.post(&token, "/api/auth/signout", json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = fixture.get(&token, "/api/auth/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_up_rules() {
    let fixture = TestFixture::new().await;
    let signup = |email: &str, password: &str, role: &str| {
        fixture.client.post(fixture.url("/api/auth/signup")).json(&json!({
            "email": email,
            "password": password,
            "role": role,
            "name": "Someone"
        }))
    };

    let (status, body) = fixture.send(signup("a@relief.test", "short", "victim")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = fixture.send(signup("sneaky@relief.test", PASSWORD, "admin")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = fixture.send(signup("b@relief.test", PASSWORD, "victim")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = fixture.send(signup("B@Relief.test", PASSWORD, "victim")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_sign_in_role_mismatch_issues_no_session() {
    let fixture = TestFixture::new().await;
    fixture.account("rescuer", "r@relief.test").await;

    let (status, body) = fixture
        .send(fixture.client.post(fixture.url("/api/auth/signin")).json(&json!({
            "email": "r@relief.test",
            "password": PASSWORD,
            "role": "organization"
        })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["data"].is_null());

    let (status, _) = fixture
        .send(fixture.client.post(fixture.url("/api/auth/signin")).json(&json!({
            "email": "r@relief.test",
            "password": "wrong-password"
        })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_profile_is_repaired_once() {
    let fixture = TestFixture::new().await;

    // A principal created without its profile row
    let hash = crate::auth::hash_password(PASSWORD).unwrap();
    let principal = fixture
        .repo
        .create_principal(
            "orphan@relief.test",
            &hash,
            &PrincipalMetadata {
                role: Some("rescuer".to_string()),
                name: None,
            },
        )
        .await
        .unwrap();
    assert!(fixture.repo.get_profile(&principal.id).await.unwrap().is_none());

    let signin = || {
        fixture.client.post(fixture.url("/api/auth/signin")).json(&json!({
            "email": "orphan@relief.test",
            "password": PASSWORD
        }))
    };
    let (first, second) = tokio::join!(fixture.send(signin()), fixture.send(signin()));
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);

    let a = &first.1["data"]["profile"];
    let b = &second.1["data"]["profile"];
    assert_eq!(a["role"], "rescuer");
    assert_eq!(a["name"], "User");
    assert_eq!(a["createdAt"], b["createdAt"]);
}

#[tokio::test]
async fn test_profile_update() {
    let fixture = TestFixture::new().await;
    let (token, _) = fixture.account("victim", "p@relief.test").await;

    let (status, body) = fixture
        .put(&token, "/api/profile", json!({ "name": "Nok", "phone": "0811111111" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Nok");
    assert_eq!(body["data"]["role"], "victim");

    let (status, _) = fixture.put(&token, "/api/profile", json!({ "name": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_request_validation_errors() {
    let fixture = TestFixture::new().await;
    let (victim, _) = fixture.account("victim", "v@relief.test").await;

    let mut zero_people = request_payload();
    zero_people["peopleCount"] = json!(0);
    let mut unpicked = request_payload();
    unpicked["location"] = json!({ "lat": 0.0, "lng": 0.0, "address": "Somewhere" });
    let mut no_needs = request_payload();
    no_needs["needs"] = json!({});
    let mut vague_other = request_payload();
    vague_other["needs"] = json!({ "other": true });

    for payload in [zero_people, unpicked, no_needs, vague_other] {
        let (status, body) = fixture.post(&victim, "/api/requests", payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    // Only victims file requests
    let (rescuer, _) = fixture.account("rescuer", "r@relief.test").await;
    let (status, _) = fixture.post(&rescuer, "/api/requests", request_payload()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_request_assigns_owner_and_zone() {
    let fixture = TestFixture::new().await;
    let (victim, victim_id) = fixture.account("victim", "v@relief.test").await;

    let mut payload = request_payload();
    payload["userId"] = json!("someone-else");
    let (status, body) = fixture.post(&victim, "/api/requests", payload).await;
    assert_eq!(status, StatusCode::OK);

    let data = &body["data"];
    assert_eq!(data["userId"], victim_id.as_str());
    assert_eq!(data["status"], "pending");
    assert_eq!(data["zone"], ZONE);
    assert_eq!(data["images"][0], "https://img.example/1.jpg");
}

#[tokio::test]
async fn test_victim_isolation() {
    let fixture = TestFixture::new().await;
    let (alice, _) = fixture.account("victim", "alice@relief.test").await;
    let (bob, _) = fixture.account("victim", "bob@relief.test").await;

    let request_id = fixture.file_request(&alice).await;

    let (status, body) = fixture
        .get(&bob, &format!("/api/requests/{}", request_id))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = fixture.get(&bob, "/api/requests/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = fixture.get(&bob, "/api/requests").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    let (_, body) = fixture.get(&alice, "/api/requests").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_victim_edits_and_cancels_only_while_pending() {
    let fixture = TestFixture::new().await;
    let (victim, _) = fixture.account("victim", "v@relief.test").await;
    let request_id = fixture.file_request(&victim).await;

    let (status, body) = fixture
        .put(
            &victim,
            &format!("/api/requests/{}", request_id),
            json!({ "location": { "lat": 13.86, "lng": 100.53, "address": "Upstairs" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["zone"], "138:1005");

    let path = format!("/api/requests/{}/status", request_id);
    let (status, body) = fixture.post(&victim, &path, json!({ "status": "cancelled" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");

    let (status, body) = fixture.post(&victim, &path, json!({ "status": "cancelled" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

    let (status, _) = fixture
        .put(&victim, &format!("/api/requests/{}", request_id), json!({ "peopleCount": 2 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_rejected_organization_cannot_form_teams() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin().await;
    let (org, org_id) = fixture.registered_org("org@relief.test").await;

    let reject_path = format!("/api/organizations/{}/reject", org_id);
    let (status, _) = fixture.post(&admin, &reject_path, json!({ "reason": " " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = fixture
        .post(&admin, &reject_path, json!({ "reason": "Missing registration papers" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "rejected");
    assert_eq!(body["data"]["rejectionReason"], "Missing registration papers");

    let (status, body) = fixture
        .post(&org, "/api/teams", json!({ "organizationId": org_id, "name": "Boats" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    // Owner resubmits, admin approves, teams are now allowed
    let (status, body) = fixture
        .post(&org, &format!("/api/organizations/{}/resubmit", org_id), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"]["rejectionReason"].is_null());

    let (status, body) = fixture
        .post(&admin, &format!("/api/organizations/{}/approve", org_id), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isVerified"], true);

    let (status, _) = fixture
        .post(&org, "/api/teams", json!({ "organizationId": org_id, "name": "Boats" }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_only_admin_reviews_organizations() {
    let fixture = TestFixture::new().await;
    let (org, org_id) = fixture.registered_org("org@relief.test").await;

    let (status, _) = fixture
        .post(&org, &format!("/api/organizations/{}/approve", org_id), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = fixture.admin().await;
    let (_, body) = fixture.get(&admin, "/api/organizations?status=pending").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_single_leader_after_promotion() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin().await;
    let (org, org_id) = fixture.approved_org(&admin, "org@relief.test").await;
    let (team_id, _) = fixture.team_with_leader(&org, &org_id, "a").await;

    let (_, newcomer) = fixture.account("rescuer", "newcomer@relief.test").await;
    let (status, body) = fixture
        .post(
            &org,
            &format!("/api/teams/{}/members", team_id),
            json!({ "userId": newcomer, "isLeader": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let team = &body["data"];
    assert_eq!(team["leaderId"], newcomer.as_str());
    let leaders: Vec<&Value> = team["members"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["isLeader"] == true)
        .collect();
    assert_eq!(leaders.len(), 1);
    assert_eq!(leaders[0]["userId"], newcomer.as_str());

    // Removing the leader leaves the team leaderless
    let (status, body) = fixture
        .delete(&org, &format!("/api/teams/{}/members/{}", team_id, newcomer))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["leaderId"].is_null());
}

#[tokio::test]
async fn test_only_rescuers_join_teams() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin().await;
    let (org, org_id) = fixture.approved_org(&admin, "org@relief.test").await;
    let (team_id, _) = fixture.team_with_leader(&org, &org_id, "a").await;
    let (_, victim_id) = fixture.account("victim", "v@relief.test").await;

    let path = format!("/api/teams/{}/members", team_id);
    let (status, _) = fixture
        .post(&org, &path, json!({ "userId": victim_id, "isLeader": false }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = fixture
        .post(&org, &path, json!({ "userId": "nobody", "isLeader": false }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_full_mission_lifecycle() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin().await;
    let (victim, _) = fixture.account("victim", "v@relief.test").await;
    let request_id = fixture.file_request(&victim).await;

    let (org, org_id) = fixture.approved_org(&admin, "org@relief.test").await;
    let (team_id, leader) = fixture.team_with_leader(&org, &org_id, "a").await;

    // The organization sees the request in its zone
    let (_, body) = fixture
        .get(&org, &format!("/api/requests?organizationId={}&zone={}", org_id, ZONE))
        .await;
    assert_eq!(body["data"][0]["id"], request_id.as_str());
    let (_, body) = fixture
        .get(&org, &format!("/api/organizations/{}/zones/summary", org_id))
        .await;
    assert_eq!(body["data"][0]["pending"], 1);

    let (status, body) = fixture
        .post(
            &org,
            "/api/missions",
            json!({ "teamId": team_id, "requestIds": [request_id] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "create mission failed: {}", body);
    let mission_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "preparing");
    assert_eq!(fixture.request_status(&victim, &request_id).await, "reserved");

    let status_path = format!("/api/missions/{}/status", mission_id);
    let (status, _) = fixture.post(&leader, &status_path, json!({ "status": "on_way" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fixture.request_status(&victim, &request_id).await, "in_progress");

    let (status, _) = fixture.post(&leader, &status_path, json!({ "status": "arrived" })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = fixture
        .post(&org, &status_path, json!({ "status": "completed" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let mission = &body["data"];
    assert_eq!(mission["status"], "completed");
    assert!(mission["startTime"].is_string());
    assert!(mission["endTime"].is_string());
    let history = mission["statusUpdates"].as_array().unwrap();
    let statuses: Vec<&str> = history.iter().map(|u| u["status"].as_str().unwrap()).collect();
    assert_eq!(statuses, vec!["preparing", "on_way", "arrived", "completed"]);
    let stamps: Vec<&str> = history.iter().map(|u| u["timestamp"].as_str().unwrap()).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

    assert_eq!(fixture.request_status(&victim, &request_id).await, "completed");

    // The victim sees the mission that served them
    let (_, body) = fixture.get(&victim, &format!("/api/missions/{}", mission_id)).await;
    assert_eq!(body["data"]["id"], mission_id.as_str());

    // Nothing moves after a terminal state
    let (status, _) = fixture.post(&leader, &status_path, json!({ "status": "completed" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_mission_cannot_skip_states() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin().await;
    let (victim, _) = fixture.account("victim", "v@relief.test").await;
    let request_id = fixture.file_request(&victim).await;
    let (org, org_id) = fixture.approved_org(&admin, "org@relief.test").await;
    let (team_id, leader) = fixture.team_with_leader(&org, &org_id, "a").await;

    let (_, body) = fixture
        .post(&org, "/api/missions", json!({ "teamId": team_id, "requestIds": [request_id] }))
        .await;
    let mission_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .post(
            &leader,
            &format!("/api/missions/{}/status", mission_id),
            json!({ "status": "completed" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

    let (_, body) = fixture.get(&org, &format!("/api/missions/{}", mission_id)).await;
    assert_eq!(body["data"]["status"], "preparing");
    assert_eq!(body["data"]["statusUpdates"].as_array().unwrap().len(), 1);
    assert_eq!(fixture.request_status(&victim, &request_id).await, "reserved");
}

#[tokio::test]
async fn test_non_leader_cannot_advance_mission() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin().await;
    let (victim, _) = fixture.account("victim", "v@relief.test").await;
    let request_id = fixture.file_request(&victim).await;
    let (org, org_id) = fixture.approved_org(&admin, "org@relief.test").await;
    let (team_id, _) = fixture.team_with_leader(&org, &org_id, "a").await;

    let (member, member_id) = fixture.account("rescuer", "member@relief.test").await;
    fixture
        .post(
            &org,
            &format!("/api/teams/{}/members", team_id),
            json!({ "userId": member_id, "isLeader": false }),
        )
        .await;

    let (_, body) = fixture
        .post(&org, "/api/missions", json!({ "teamId": team_id, "requestIds": [request_id] }))
        .await;
    let mission_id = body["data"]["id"].as_str().unwrap().to_string();

    // Members can see the mission but only the leader drives it
    let (status, _) = fixture.get(&member, &format!("/api/missions/{}", mission_id)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = fixture
        .post(
            &member,
            &format!("/api/missions/{}/status", mission_id),
            json!({ "status": "on_way" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admins observe but never drive
    let (status, _) = fixture
        .post(
            &admin,
            &format!("/api/requests/{}/status", request_id),
            json!({ "status": "in_progress" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_concurrent_missions_for_the_same_request() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin().await;
    let (victim, _) = fixture.account("victim", "v@relief.test").await;
    let shared = fixture.file_request(&victim).await;
    let only_a = fixture.file_request(&victim).await;
    let only_b = fixture.file_request(&victim).await;

    let (org, org_id) = fixture.approved_org(&admin, "org@relief.test").await;
    let (team_a, _) = fixture.team_with_leader(&org, &org_id, "a").await;
    let (team_b, _) = fixture.team_with_leader(&org, &org_id, "b").await;

    let (a, b) = tokio::join!(
        fixture.post(
            &org,
            "/api/missions",
            json!({ "teamId": team_a, "requestIds": [only_a, shared] }),
        ),
        fixture.post(
            &org,
            "/api/missions",
            json!({ "teamId": team_b, "requestIds": [shared, only_b] }),
        ),
    );

    let (winner, loser, loser_only) = match (a.0, b.0) {
        (StatusCode::OK, StatusCode::CONFLICT) => (a.1, b.1, &only_b),
        (StatusCode::CONFLICT, StatusCode::OK) => (b.1, a.1, &only_a),
        other => panic!("expected one success and one conflict, got {:?}", other),
    };

    assert_eq!(winner["data"]["status"], "preparing");
    assert_eq!(loser["error"]["code"], "CONFLICT");
    let contested: Vec<&str> = loser["error"]["details"]["requestIds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(contested, vec![shared.as_str()]);

    // The losing mission left nothing behind
    assert_eq!(fixture.request_status(&victim, loser_only).await, "pending");
    assert_eq!(fixture.request_status(&victim, &shared).await, "reserved");
    let (_, body) = fixture.get(&org, "/api/missions").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_mission_preconditions() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin().await;
    let (victim, _) = fixture.account("victim", "v@relief.test").await;
    let request_id = fixture.file_request(&victim).await;
    let (org, org_id) = fixture.approved_org(&admin, "org@relief.test").await;
    let (team_id, _) = fixture.team_with_leader(&org, &org_id, "a").await;

    let create = |body: Value| fixture.post(&org, "/api/missions", body);

    let (status, _) = create(json!({ "teamId": team_id, "requestIds": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        create(json!({ "teamId": team_id, "requestIds": [request_id, request_id] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = create(json!({ "teamId": team_id, "requestIds": ["missing"] })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A leaderless team cannot take missions
    let (_, body) = fixture
        .post(&org, "/api/teams", json!({ "organizationId": org_id, "name": "Spare" }))
        .await;
    let spare = body["data"]["id"].as_str().unwrap().to_string();
    let (status, _) = create(json!({ "teamId": spare, "requestIds": [request_id] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Neither can an inactive one
    fixture
        .put(&org, &format!("/api/teams/{}", team_id), json!({ "isActive": false }))
        .await;
    let (status, _) = create(json!({ "teamId": team_id, "requestIds": [request_id] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Another organization cannot reach requests outside its zones
    let (other, other_id) = fixture.registered_org("other@relief.test").await;
    fixture
        .post(&admin, &format!("/api/organizations/{}/approve", other_id), json!({}))
        .await;
    let (other_team, _) = fixture.team_with_leader(&other, &other_id, "z").await;
    let (status, _) = fixture
        .post(
            &other,
            "/api/missions",
            json!({ "teamId": other_team, "requestIds": [request_id] }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(fixture.request_status(&victim, &request_id).await, "pending");
}

#[tokio::test]
async fn test_cancel_mission_releases_requests() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin().await;
    let (victim, _) = fixture.account("victim", "v@relief.test").await;
    let request_id = fixture.file_request(&victim).await;
    let (org, org_id) = fixture.approved_org(&admin, "org@relief.test").await;
    let (team_id, _) = fixture.team_with_leader(&org, &org_id, "a").await;

    let (_, body) = fixture
        .post(&org, "/api/missions", json!({ "teamId": team_id, "requestIds": [request_id] }))
        .await;
    let mission_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .post(
            &org,
            &format!("/api/missions/{}/cancel", mission_id),
            json!({ "reason": "Road closed" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["data"]["cancelReason"], "Road closed");
    assert_eq!(fixture.request_status(&victim, &request_id).await, "pending");

    // Cancelled is terminal
    let (status, _) = fixture
        .post(
            &org,
            &format!("/api/missions/{}/cancel", mission_id),
            json!({ "reason": "again" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // The released request can be assigned again
    let (status, _) = fixture
        .post(&org, "/api/missions", json!({ "teamId": team_id, "requestIds": [request_id] }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_revision_increments_on_writes() {
    let fixture = TestFixture::new().await;

    let (_, body) = fixture
        .send(fixture.client.get(fixture.url("/api/revision")))
        .await;
    let before = body["data"]["revisionId"].as_i64().unwrap();

    let (victim, _) = fixture.account("victim", "v@relief.test").await;
    let (_, body) = fixture.post(&victim, "/api/requests", request_payload()).await;
    let after = body["revisionId"].as_i64().unwrap();
    assert!(after > before);

    // Reads do not move the counter
    let (_, body) = fixture.get(&victim, "/api/requests").await;
    assert_eq!(body["revisionId"].as_i64().unwrap(), after);
}

#[tokio::test]
async fn test_requests_are_reserved_only_through_missions() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin().await;
    let (victim, _) = fixture.account("victim", "v@relief.test").await;
    let request_id = fixture.file_request(&victim).await;
    let (org, org_id) = fixture.approved_org(&admin, "org@relief.test").await;
    let (team_id, _) = fixture.team_with_leader(&org, &org_id, "a").await;
    let status_path = format!("/api/requests/{}/status", request_id);

    let (status, body) = fixture
        .post(&org, &status_path, json!({ "status": "reserved" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    assert_eq!(fixture.request_status(&victim, &request_id).await, "pending");

    // The request is still free for a mission
    let (status, body) = fixture
        .post(
            &org,
            "/api/missions",
            json!({ "teamId": team_id, "requestIds": [request_id] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "create mission failed: {}", body);
    assert_eq!(fixture.request_status(&victim, &request_id).await, "reserved");

    // Another organization serving the zone cannot drive it forward
    let (rival, _) = fixture.approved_org(&admin, "rival@relief.test").await;
    let (status, _) = fixture
        .post(&rival, &status_path, json!({ "status": "in_progress" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(fixture.request_status(&victim, &request_id).await, "reserved");

    // The organization running the mission can
    let (status, body) = fixture
        .post(&org, &status_path, json!({ "status": "in_progress" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "in_progress");
}

#[tokio::test]
async fn test_request_transitions_by_organization_and_rescuers() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin().await;
    let (victim, _) = fixture.account("victim", "v@relief.test").await;
    let assigned = fixture.file_request(&victim).await;
    let waiting = fixture.file_request(&victim).await;
    let (org, org_id) = fixture.approved_org(&admin, "org@relief.test").await;
    let (team_a, leader_a) = fixture.team_with_leader(&org, &org_id, "a").await;
    let (_, leader_b) = fixture.team_with_leader(&org, &org_id, "b").await;

    let (status, _) = fixture
        .post(
            &org,
            "/api/missions",
            json!({ "teamId": team_a, "requestIds": [assigned] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let assigned_path = format!("/api/requests/{}/status", assigned);
    let waiting_path = format!("/api/requests/{}/status", waiting);

    // Reverse and skipping moves leave the stored state alone
    let (status, body) = fixture
        .post(&org, &assigned_path, json!({ "status": "pending" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
    assert_eq!(fixture.request_status(&victim, &assigned).await, "reserved");

    let (status, _) = fixture
        .post(&org, &waiting_path, json!({ "status": "completed" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(fixture.request_status(&victim, &waiting).await, "pending");

    // A rescuer of another team has no hold on the request
    let (status, _) = fixture
        .post(&leader_b, &assigned_path, json!({ "status": "in_progress" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Rescuers never cancel
    let (status, _) = fixture
        .post(&leader_a, &assigned_path, json!({ "status": "cancelled" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(fixture.request_status(&victim, &assigned).await, "reserved");

    let (status, body) = fixture
        .post(&leader_a, &assigned_path, json!({ "status": "in_progress" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "in_progress");
}

#[tokio::test]
async fn test_zone_listing_is_scoped_to_the_owner() {
    let fixture = TestFixture::new().await;
    let admin = fixture.admin().await;
    let (victim, _) = fixture.account("victim", "v@relief.test").await;
    let served = fixture.file_request(&victim).await;

    let mut payload = request_payload();
    payload["location"] = json!({ "lat": 18.79, "lng": 98.98, "address": "3 Hill Rd" });
    let (status, body) = fixture.post(&victim, "/api/requests", payload).await;
    assert_eq!(status, StatusCode::OK);
    let unserved = body["data"]["id"].as_str().unwrap().to_string();
    assert_ne!(body["data"]["zone"], ZONE);

    let (org, org_id) = fixture.approved_org(&admin, "org@relief.test").await;
    let (other, _) = fixture.approved_org(&admin, "other@relief.test").await;

    let (status, body) = fixture
        .get(&org, &format!("/api/requests?organizationId={}", org_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![served.as_str()]);
    assert!(!ids.contains(&unserved.as_str()));

    let (status, _) = fixture
        .get(&org, &format!("/api/requests?organizationId={}&zone=999:999", org_id))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = fixture
        .get(&other, &format!("/api/requests?organizationId={}", org_id))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
