use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use billforge_api::app::{self, AppServices};
use billforge_core::{ProfileId, UserId};
use billforge_infra::{seed, AppConfig, ProfileStore};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over a seeded in-memory store, on an ephemeral port.
        let config = AppConfig::for_tests(JWT_SECRET);
        let services = Arc::new(
            app::services::build_services(&config)
                .await
                .expect("failed to build services"),
        );
        let app = app::router(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            client: reqwest::Client::new(),
            handle,
        }
    }

    /// Create a user holding the named seeded profile and return a token for it.
    async fn user_with_profile(&self, email: &str, profile: &str) -> (UserId, String) {
        let store = &self.services.profiles;
        let profile = store.find_profile_by_name(profile).await.unwrap().unwrap();
        let user = store.create_user(email, Some(profile.id)).await.unwrap();
        (user.id, mint_jwt(JWT_SECRET, user.id))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, user: UserId) -> String {
    let now = Utc::now();
    let claims = json!({
        "sub": user,
        "iat": now.timestamp(),
        "exp": (now + ChronoDuration::minutes(10)).timestamp(),
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn error_code(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    for path in ["/me", "/products", "/invoices", "/company", "/admin/profiles"] {
        let res = srv.client.get(srv.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "GET {path}");
    }

    // A token signed with another secret is the same as no token.
    let forged = mint_jwt("not-the-secret", UserId::new());
    let res = srv.get("/products", &forged).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "unauthenticated");
}

#[tokio::test]
async fn role_gates_collection_routes() {
    let srv = TestServer::spawn().await;
    let (_, viewer) = srv.user_with_profile("viewer@example.com", seed::VIEWER_PROFILE).await;

    let res = srv.get("/products", &viewer).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .post("/products", &viewer, json!({ "name": "Widget", "unit_price_cents": 1000 }))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "forbidden");

    // A user without any profile gets nothing.
    let nobody = srv.services.profiles.create_user("nobody@example.com", None).await.unwrap();
    let token = mint_jwt(JWT_SECRET, nobody.id);
    let res = srv.get("/products", &token).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn records_are_private_to_their_owner() {
    let srv = TestServer::spawn().await;
    let (_, ana) = srv.user_with_profile("ana@example.com", seed::ACCOUNTANT_PROFILE).await;
    let (_, bo) = srv.user_with_profile("bo@example.com", seed::ACCOUNTANT_PROFILE).await;

    let res = srv
        .post("/clients", &ana, json!({ "name": "Acme", "email": "billing@acme.test" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    let path = format!("/clients/{id}");

    assert_eq!(srv.get(&path, &ana).await.status(), StatusCode::OK);

    // Bo holds client:* but does not own the record.
    assert_eq!(srv.get(&path, &bo).await.status(), StatusCode::FORBIDDEN);
    let res = srv.put(&path, &bo, json!({ "name": "Hijacked" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(srv.delete(&path, &bo).await.status(), StatusCode::FORBIDDEN);

    // Listing only shows your own records.
    let mine: Value = srv.get("/clients", &bo).await.json().await.unwrap();
    assert_eq!(mine.as_array().unwrap().len(), 0);
    let mine: Value = srv.get("/clients", &ana).await.json().await.unwrap();
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let res = srv.put(&path, &ana, json!({ "name": "Acme Corp" })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = res.json().await.unwrap();
    assert_eq!(updated["name"], "Acme Corp");

    assert_eq!(srv.delete(&path, &ana).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(srv.get(&path, &ana).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admins_bypass_ownership() {
    let srv = TestServer::spawn().await;
    let (_, ana) = srv.user_with_profile("ana@example.com", seed::ACCOUNTANT_PROFILE).await;
    let (_, root) = srv.user_with_profile("root@example.com", seed::ADMIN_PROFILE).await;

    let created: Value = srv
        .post("/clients", &ana, json!({ "name": "Acme" }))
        .await
        .json()
        .await
        .unwrap();
    let path = format!("/clients/{}", created["id"].as_str().unwrap());

    assert_eq!(srv.get(&path, &root).await.status(), StatusCode::OK);
    assert_eq!(srv.delete(&path, &root).await.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn invoice_lifecycle_create_finalize() {
    let srv = TestServer::spawn().await;
    let (_, ana) = srv.user_with_profile("ana@example.com", seed::ACCOUNTANT_PROFILE).await;
    let (_, viewer) = srv.user_with_profile("viewer@example.com", seed::VIEWER_PROFILE).await;

    let client: Value = srv
        .post("/clients", &ana, json!({ "name": "Acme" }))
        .await
        .json()
        .await
        .unwrap();

    let res = srv
        .post(
            "/invoices",
            &ana,
            json!({
                "client_id": client["id"],
                "lines": [
                    { "description": "Consulting", "quantity": 2, "unit_price_cents": 50_000, "vat_rate": 2000 }
                ]
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let invoice: Value = res.json().await.unwrap();
    assert_eq!(invoice["status"], "draft");
    assert_eq!(invoice["totals"]["ttc_cents"], 120_000);
    let path = format!("/invoices/{}/finalize", invoice["id"].as_str().unwrap());

    // Viewers may look at invoices but not finalize them.
    let res = srv.post(&path, &viewer, json!({})).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv.post(&path, &ana, json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let finalized: Value = res.json().await.unwrap();
    assert_eq!(finalized["status"], "final");

    let res = srv.post(&path, &ana, json!({})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invoices_must_bill_your_own_client() {
    let srv = TestServer::spawn().await;
    let (_, ana) = srv.user_with_profile("ana@example.com", seed::ACCOUNTANT_PROFILE).await;
    let (_, bo) = srv.user_with_profile("bo@example.com", seed::ACCOUNTANT_PROFILE).await;

    let client: Value = srv
        .post("/clients", &ana, json!({ "name": "Acme" }))
        .await
        .json()
        .await
        .unwrap();

    let res = srv
        .post("/invoices", &bo, json!({ "client_id": client["id"], "lines": [] }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "validation_error");
}

#[tokio::test]
async fn admin_area_requires_superadmin() {
    let srv = TestServer::spawn().await;
    let (_, accountant) = srv.user_with_profile("acc@example.com", seed::ACCOUNTANT_PROFILE).await;
    let (_, root) = srv.user_with_profile("root@example.com", seed::ADMIN_PROFILE).await;

    let res = srv.get("/admin/profiles", &accountant).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv.get("/admin/profiles", &root).await;
    assert_eq!(res.status(), StatusCode::OK);
    let profiles: Value = res.json().await.unwrap();
    assert_eq!(profiles.as_array().unwrap().len(), 3);

    let res = srv.get("/admin/permissions", &root).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn role_changes_apply_without_waiting_for_the_cache() {
    let srv = TestServer::spawn().await;
    let (_, root) = srv.user_with_profile("root@example.com", seed::ADMIN_PROFILE).await;
    let (ana_id, ana) = srv.user_with_profile("ana@example.com", seed::VIEWER_PROFILE).await;
    let product = json!({ "name": "Widget", "unit_price_cents": 1000 });

    // Warm the cache with the viewer profile.
    assert_eq!(srv.post("/products", &ana, product.clone()).await.status(), StatusCode::FORBIDDEN);

    let res = srv
        .post("/admin/profiles", &root, json!({ "name": "catalog-editor" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let editor: Value = res.json().await.unwrap();
    let editor_id = editor["id"].as_str().unwrap().to_string();

    let res = srv
        .put(
            &format!("/admin/profiles/{editor_id}/permissions"),
            &root,
            json!({ "permissions": ["product:*"] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .put(
            &format!("/admin/users/{ana_id}/profile"),
            &root,
            json!({ "profile_id": editor_id }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    assert_eq!(srv.post("/products", &ana, product.clone()).await.status(), StatusCode::CREATED);

    // Narrow the profile; every holder is affected on the next request.
    let res = srv
        .put(
            &format!("/admin/profiles/{editor_id}/permissions"),
            &root,
            json!({ "permissions": ["product:list", "product:view"] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(srv.post("/products", &ana, product).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(srv.get("/products", &ana).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn profile_admin_rules() {
    let srv = TestServer::spawn().await;
    let (_, root) = srv.user_with_profile("root@example.com", seed::ADMIN_PROFILE).await;

    let viewer = srv
        .services
        .profiles
        .find_profile_by_name(seed::VIEWER_PROFILE)
        .await
        .unwrap()
        .unwrap();
    let res = srv.delete(&format!("/admin/profiles/{}", viewer.id), &root).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "cannot_delete_system_profile");

    let res = srv
        .post("/admin/profiles", &root, json!({ "name": seed::VIEWER_PROFILE }))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(res).await, "name_already_exists");

    let created: Value = srv
        .post("/admin/profiles", &root, json!({ "name": "temp" }))
        .await
        .json()
        .await
        .unwrap();
    let temp_id = created["id"].as_str().unwrap().to_string();

    let res = srv
        .put(
            &format!("/admin/profiles/{temp_id}/permissions"),
            &root,
            json!({ "permissions": ["spaceship:fly"] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "unknown_permission");

    let res = srv
        .post(
            "/admin/users",
            &root,
            json!({ "email": "holder@example.com", "profile_id": temp_id }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let holder: Value = res.json().await.unwrap();

    let res = srv.delete(&format!("/admin/profiles/{temp_id}"), &root).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(res).await, "profile_has_users");

    let res = srv
        .put(
            &format!("/admin/users/{}/profile", holder["id"].as_str().unwrap()),
            &root,
            json!({ "profile_id": null }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.delete(&format!("/admin/profiles/{temp_id}"), &root).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn user_creation_with_unknown_profile_leaves_no_user() {
    let srv = TestServer::spawn().await;
    let (_, root) = srv.user_with_profile("root@example.com", seed::ADMIN_PROFILE).await;
    let body = json!({ "email": "new@example.com", "profile_id": ProfileId::new() });

    let res = srv.post("/admin/users", &root, body.clone()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(res).await, "not_found");

    let users: Value = srv.get("/admin/users", &root).await.json().await.unwrap();
    let emails: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|user| user["email"].as_str())
        .collect();
    assert!(!emails.contains(&"new@example.com"));

    // A corrected retry goes through instead of hitting the duplicate-email check.
    let viewer = srv
        .services
        .profiles
        .find_profile_by_name(seed::VIEWER_PROFILE)
        .await
        .unwrap()
        .unwrap();
    let res = srv
        .post(
            "/admin/users",
            &root,
            json!({ "email": "new@example.com", "profile_id": viewer.id }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["profile_id"], json!(viewer.id));
}

#[tokio::test]
async fn explain_reports_why() {
    let srv = TestServer::spawn().await;
    let (_, root) = srv.user_with_profile("root@example.com", seed::ADMIN_PROFILE).await;
    let (_, ana) = srv.user_with_profile("ana@example.com", seed::ACCOUNTANT_PROFILE).await;
    let (bo_id, _) = srv.user_with_profile("bo@example.com", seed::ACCOUNTANT_PROFILE).await;

    let client: Value = srv
        .post("/clients", &ana, json!({ "name": "Acme" }))
        .await
        .json()
        .await
        .unwrap();

    let res = srv
        .get(
            &format!("/admin/authz/explain?user_id={bo_id}&resource_type=product&action=create"),
            &root,
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let decision: Value = res.json().await.unwrap();
    assert_eq!(decision["granted"], false);
    assert_eq!(decision["denial"], "missing_permission");
    assert_eq!(decision["profile"]["name"], seed::ACCOUNTANT_PROFILE);

    let res = srv
        .get(
            &format!(
                "/admin/authz/explain?user_id={bo_id}&resource_type=client&action=view&record_id={}",
                client["id"].as_str().unwrap()
            ),
            &root,
        )
        .await;
    let decision: Value = res.json().await.unwrap();
    assert_eq!(decision["granted"], false);
    assert_eq!(decision["denial"], "policy_denied");
}

#[tokio::test]
async fn company_settings_are_per_user() {
    let srv = TestServer::spawn().await;
    let (_, root) = srv.user_with_profile("root@example.com", seed::ADMIN_PROFILE).await;
    let (_, viewer) = srv.user_with_profile("viewer@example.com", seed::VIEWER_PROFILE).await;

    assert_eq!(srv.get("/company", &root).await.status(), StatusCode::NOT_FOUND);

    let res = srv
        .put("/company", &root, json!({ "legal_name": "Billforge SAS", "address": "1 rue de Paris" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.get("/company", &root).await;
    assert_eq!(res.status(), StatusCode::OK);
    let settings: Value = res.json().await.unwrap();
    assert_eq!(settings["legal_name"], "Billforge SAS");

    let res = srv.put("/company", &viewer, json!({ "legal_name": "Nope" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(srv.get("/company", &viewer).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn capabilities_follow_the_profile() {
    let srv = TestServer::spawn().await;
    let (_, viewer) = srv.user_with_profile("viewer@example.com", seed::VIEWER_PROFILE).await;

    let res = srv.get("/me/capabilities", &viewer).await;
    assert_eq!(res.status(), StatusCode::OK);
    let caps: Value = res.json().await.unwrap();
    assert_eq!(caps["product"]["list"], true);
    assert_eq!(caps["product"]["create"], false);
    assert_eq!(caps["invoice"]["finalize"], false);

    let me: Value = srv.get("/me", &viewer).await.json().await.unwrap();
    assert_eq!(me["profile"]["name"], seed::VIEWER_PROFILE);
    assert_eq!(me["profile"]["has_wildcard"], false);
}
