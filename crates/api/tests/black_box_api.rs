use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{COOKIE, SET_COOKIE};
use rostergate_api::app::AppServices;
use rostergate_api::config::{ApiConfig, BootstrapAdmin};
use rostergate_infra::{IdentityProvider, InMemoryDocumentStore, LocalIdentityConfig, LocalIdentityProvider};
use serde_json::{Value, json};

const ADMIN_EMAIL: &str = "admin@club.test";
const ADMIN_PASSWORD: &str = "admin-pass";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let config = ApiConfig {
            bootstrap_admin: Some(BootstrapAdmin {
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
            }),
            ..test_config()
        };
        let app = rostergate_api::app::build_app(&config)
            .await
            .expect("failed to build app");
        Self::serve(app).await
    }

    /// A server whose identity provider stays reachable, for minting id
    /// tokens and identities without an account record.
    async fn spawn_with_identity() -> (Self, Arc<LocalIdentityProvider>) {
        let config = test_config();
        let store = Arc::new(InMemoryDocumentStore::new());
        let identity = Arc::new(LocalIdentityProvider::new(
            LocalIdentityConfig {
                secret: config.session_secret.clone(),
                hash_cost: config.password_hash_cost,
            },
            store.clone(),
        ));
        let services = AppServices::new(&config, store, identity.clone());
        services
            .directory
            .seed_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .expect("failed to seed admin");
        let app = rostergate_api::app::router(Arc::new(services));
        (Self::serve(app).await, identity)
    }

    async fn serve(app: axum::Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str, session: Option<&str>) -> reqwest::Response {
        let mut req = self.client.get(self.url(path));
        if let Some(session) = session {
            req = req.header(COOKIE, session);
        }
        req.send().await.unwrap()
    }

    async fn send_json(&self, method: reqwest::Method, path: &str, session: Option<&str>, body: Value) -> reqwest::Response {
        let mut req = self.client.request(method, self.url(path)).json(&body);
        if let Some(session) = session {
            req = req.header(COOKIE, session);
        }
        req.send().await.unwrap()
    }

    async fn post(&self, path: &str, session: Option<&str>, body: Value) -> reqwest::Response {
        self.send_json(reqwest::Method::POST, path, session, body).await
    }

    /// Log in and return the `session=...` pair to replay as a Cookie header.
    async fn login(&self, email: &str, password: &str) -> String {
        let res = self
            .post("/api/auth/login", None, json!({ "email": email, "password": password }))
            .await;
        assert_eq!(res.status(), StatusCode::OK, "login failed for {email}");
        session_pair(&res).expect("login did not set a session cookie")
    }

    async fn register(&self, email: &str) -> String {
        let res = self
            .post(
                "/api/auth/register",
                None,
                json!({
                    "email": email,
                    "password": "player-pass",
                    "displayName": "Pat Player",
                    "phone": "9876543210",
                    "jerseyNumber": 7,
                    "dateOfBirth": "1990-01-01"
                }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["success"], true);
        body["uid"].as_str().unwrap().to_string()
    }

    async fn approve(&self, admin: &str, uid: &str) {
        let res = self
            .post(
                "/api/users/approve",
                Some(admin),
                json!({ "userId": uid, "action": "approve" }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn test_config() -> ApiConfig {
    ApiConfig {
        password_hash_cost: 4,
        session_secret: "test-secret".to_string(),
        ..ApiConfig::default()
    }
}

fn set_cookie(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session="))
        .map(str::to_string)
}

fn session_pair(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.get("/api/health", None).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn registration_waits_for_approval_before_login() {
    let srv = TestServer::spawn().await;
    let uid = srv.register("pat@club.test").await;

    let res = srv
        .post("/api/auth/login", None, json!({ "email": "pat@club.test", "password": "player-pass" }))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(session_pair(&res).is_none());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "account_pending");

    let admin = srv.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    srv.approve(&admin, &uid).await;

    let session = srv.login("pat@club.test", "player-pass").await;
    let res = srv.get("/api/user", Some(&session)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["uid"], uid.as_str());
    assert_eq!(me["approvalStatus"], "approved");
    assert_eq!(me["jerseyNumber"], 7);
    assert!(me.get("roles").is_none());
    assert!(me.get("emailVerified").is_none());
}

#[tokio::test]
async fn invalid_registration_reports_every_field() {
    let srv = TestServer::spawn().await;
    let res = srv
        .post(
            "/api/auth/register",
            None,
            json!({
                "email": "not-an-email",
                "password": "123",
                "phone": "12345",
                "jerseyNumber": 100,
                "dateOfBirth": "01/01/1990"
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_failed");
    assert!(body["details"].as_array().unwrap().len() >= 5);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let srv = TestServer::spawn().await;
    srv.register("dup@club.test").await;
    let res = srv
        .post(
            "/api/auth/register",
            None,
            json!({
                "email": "dup@club.test",
                "password": "player-pass",
                "phone": "9876543210",
                "dateOfBirth": "1990-01-01"
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn non_admin_cannot_assign_roles() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let uid = srv.register("pat@club.test").await;
    srv.approve(&admin, &uid).await;
    let player = srv.login("pat@club.test", "player-pass").await;

    let res = srv
        .post(
            "/api/users/roles",
            Some(&player),
            json!({ "userId": uid, "roles": ["admin"] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let res = srv.get(&format!("/api/users/{uid}"), Some(&admin)).await;
    let record: Value = res.json().await.unwrap();
    assert_eq!(record["roles"], json!(["player"]));
}

#[tokio::test]
async fn admin_assigns_roles_with_audit_trail() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let uid = srv.register("pat@club.test").await;
    srv.approve(&admin, &uid).await;

    let res = srv
        .post(
            "/api/users/roles",
            Some(&admin),
            json!({ "userId": uid, "roles": ["player", "selector"] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["assignedRoles"], json!(["player", "selector"]));

    let res = srv
        .post(
            "/api/users/roles",
            Some(&admin),
            json!({ "userId": uid, "roles": ["wizard"] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_role");

    let res = srv
        .get(&format!("/api/admin/users/{uid}/assignments?activeOnly=true"), Some(&admin))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let history: Value = res.json().await.unwrap();
    let roles: Vec<&str> = history["assignments"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["role"].as_str())
        .collect();
    assert!(roles.contains(&"selector"));

    let res = srv
        .send_json(
            reqwest::Method::DELETE,
            "/api/users/roles",
            Some(&admin),
            json!({ "userId": uid, "role": "selector" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["removedRole"], "selector");
}

#[tokio::test]
async fn only_the_owner_or_an_admin_updates_a_profile() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let a = srv.register("a@club.test").await;
    let b = srv.register("b@club.test").await;
    srv.approve(&admin, &a).await;
    srv.approve(&admin, &b).await;
    let session_a = srv.login("a@club.test", "player-pass").await;
    let session_b = srv.login("b@club.test", "player-pass").await;

    let res = srv
        .send_json(
            reqwest::Method::PUT,
            &format!("/api/users/{a}"),
            Some(&session_b),
            json!({ "jerseyNumber": 10 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let before: Value = srv.get("/api/user", Some(&session_a)).await.json().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let res = srv
        .send_json(
            reqwest::Method::PUT,
            &format!("/api/users/{a}"),
            Some(&session_a),
            json!({ "jerseyNumber": 10 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let after: Value = res.json().await.unwrap();
    assert_eq!(after["jerseyNumber"], 10);

    let parse = |v: &Value| v["updatedAt"].as_str().unwrap().parse::<DateTime<Utc>>().unwrap();
    assert!(parse(&after) > parse(&before));

    let res = srv
        .send_json(
            reqwest::Method::PUT,
            &format!("/api/users/{a}"),
            Some(&session_a),
            json!({ "roles": ["admin"] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized_fields");
}

#[tokio::test]
async fn third_parties_see_public_profiles_only() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let a = srv.register("a@club.test").await;
    let b = srv.register("b@club.test").await;
    srv.approve(&admin, &a).await;
    let session_a = srv.login("a@club.test", "player-pass").await;

    // `b` is still pending, so invisible to `a`.
    let res = srv.get(&format!("/api/users/{b}"), Some(&session_a)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    srv.approve(&admin, &b).await;
    let res = srv.get(&format!("/api/users/{b}"), Some(&session_a)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let view: Value = res.json().await.unwrap();
    assert_eq!(view.as_object().unwrap().len(), 5);
    assert!(view.get("email").is_none());

    let res = srv.get("/api/users", Some(&session_a)).await;
    let listing: Value = res.json().await.unwrap();
    assert!(listing.get("pagination").is_none());

    let res = srv.get("/api/users?status=pending", Some(&admin)).await;
    let listing: Value = res.json().await.unwrap();
    assert!(listing["pagination"]["total"].is_number());
}

#[tokio::test]
async fn revoked_approval_denies_the_next_request() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let uid = srv.register("pat@club.test").await;
    srv.approve(&admin, &uid).await;
    let session = srv.login("pat@club.test", "player-pass").await;

    assert_eq!(srv.get("/api/user", Some(&session)).await.status(), StatusCode::OK);

    let res = srv
        .post(
            "/api/users/approve",
            Some(&admin),
            json!({ "userId": uid, "action": "reject", "reason": "left the club" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.get("/api/user", Some(&session)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "account_rejected");
    assert_eq!(body["rejectionReason"], "left the club");
}

#[tokio::test]
async fn verify_reports_validity() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let credential = admin.trim_start_matches("session=").to_string();

    let res = srv
        .post("/api/auth/verify", None, json!({ "sessionCookie": credential }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["user"]["roles"], json!(["admin"]));

    let res = srv
        .post("/api/auth/verify", None, json!({ "sessionCookie": "garbage" }))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["valid"], false);
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let res = srv.post("/api/auth/logout", Some(&admin), json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let cleared = res
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with("session=") && v.contains("Max-Age=0"));
    assert!(cleared);

    let res = srv.get("/api/user", Some(&admin)).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["reason"], "revoked");
}

#[tokio::test]
async fn id_token_is_exchanged_for_a_session_cookie() {
    let (srv, identity) = TestServer::spawn_with_identity().await;
    let id_token = identity.sign_in_with_password(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();

    let res = srv.post("/api/auth/session", None, json!({ "idToken": id_token })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = set_cookie(&res).expect("session cookie");
    for attribute in ["HttpOnly", "SameSite=Lax", "Path=/", "Max-Age=432000"] {
        assert!(cookie.contains(attribute), "{attribute} missing from {cookie}");
    }
    let session = session_pair(&res).unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["user"]["roles"], json!(["admin"]));

    assert_eq!(srv.get("/api/user", Some(&session)).await.status(), StatusCode::OK);

    let res = srv
        .send_json(reqwest::Method::DELETE, "/api/auth/session", Some(&session), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let cleared = set_cookie(&res).expect("cleared cookie");
    assert!(cleared.contains("Max-Age=0"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn session_creation_status_contract() {
    let (srv, identity) = TestServer::spawn_with_identity().await;

    let res = srv.post("/api/auth/session", None, json!({ "idToken": "garbage" })).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&res).is_none());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "auth_invalid_or_expired");

    let res = srv.post("/api/auth/session", None, json!({})).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "auth_missing_credential");

    srv.register("pending@club.test").await;
    let id_token = identity.sign_in_with_password("pending@club.test", "player-pass").await.unwrap();
    let res = srv.post("/api/auth/session", None, json!({ "idToken": id_token })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(set_cookie(&res).is_none());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "account_pending");
}

#[tokio::test]
async fn identity_without_account_record_is_not_found() {
    let (srv, identity) = TestServer::spawn_with_identity().await;
    identity.create_user("ghost@club.test", "ghost-pass").await.unwrap();
    let id_token = identity.sign_in_with_password("ghost@club.test", "ghost-pass").await.unwrap();

    let res = srv.post("/api/auth/session", None, json!({ "idToken": id_token })).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "account_not_found");

    let cookie = identity
        .create_session_cookie(&id_token, Duration::from_secs(3600))
        .await
        .unwrap();
    let res = srv.post("/api/auth/verify", None, json!({ "sessionCookie": cookie })).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "account_not_found");
    assert_eq!(body["valid"], false);

    // Behind the middleware the same credential is a failed authentication.
    let res = srv.get("/api/user", Some(&format!("session={cookie}"))).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ownership_is_decided_before_the_body_is_parsed() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let a = srv.register("a@club.test").await;
    let b = srv.register("b@club.test").await;
    srv.approve(&admin, &a).await;
    srv.approve(&admin, &b).await;
    let session_a = srv.login("a@club.test", "player-pass").await;
    let session_b = srv.login("b@club.test", "player-pass").await;

    let res = srv
        .send_json(
            reqwest::Method::PUT,
            &format!("/api/users/{a}"),
            Some(&session_b),
            json!({ "favouriteColour": "red" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let res = srv
        .send_json(
            reqwest::Method::PUT,
            &format!("/api/users/{a}"),
            Some(&session_a),
            json!({ "favouriteColour": "red" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
