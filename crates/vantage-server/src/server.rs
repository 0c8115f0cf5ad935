use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use vantage_auth::AuthGate;
use vantage_pipeline::{EventIngestor, ScoringEngine};
use vantage_store::{SessionRepo, Store};

use crate::{auth, health, track, visitors};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Shared application state passed to Axum handlers.
///
/// Every component receives its dependencies here, at construction;
/// nothing reaches for a global connection handle.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AuthGate>,
    pub ingestor: Arc<EventIngestor>,
    pub sessions: SessionRepo,
    pub scoring: Arc<ScoringEngine>,
    pub store: Store,
}

/// Build the Axum router with all routes.
///
/// CORS is open by design — tracking snippets run on arbitrary
/// third-party origins — and the permissive layer answers every
/// preflight OPTIONS with 200.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/track", post(track::post_track).get(track::get_track))
        .route("/auth/login", post(auth::login))
        .route("/visitors", get(visitors::list_visitors))
        .route("/visitors/{session_id}", get(visitors::get_visitor))
        .route("/health", get(health::health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create and start the server. Returns a handle that keeps it alive.
pub async fn start(config: ServerConfig, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "Vantage server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()` — dropping it does not stop the server,
/// but it exposes the bound port for callers that asked for port 0.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use vantage_auth::{hash_password, TokenConfig};
    use vantage_core::scope::TenantScope;
    use vantage_pipeline::{ScoringConfig, SessionCorrelator};
    use vantage_store::{Role, SubscriptionStatus, TenantRepo, TenantRow, UserRepo};

    fn make_state() -> (AppState, TenantRepo) {
        let store = Store::in_memory().unwrap();
        let tenants = TenantRepo::new(store.clone());
        let users = UserRepo::new(store.clone());
        let sessions = SessionRepo::new(store.clone());

        let token_config = TokenConfig {
            secret: "test-secret".to_string(),
            ttl_secs: 3600,
        };
        let gate = Arc::new(AuthGate::new(users, tenants.clone(), token_config));
        let correlator = SessionCorrelator::new(sessions.clone());
        let ingestor = Arc::new(EventIngestor::new(tenants.clone(), correlator));
        let scoring = Arc::new(ScoringEngine::new(ScoringConfig::default()));

        (
            AppState {
                gate,
                ingestor,
                sessions,
                scoring,
                store,
            },
            tenants,
        )
    }

    /// Seed a tenant with one user (`a@x.com` / `correct`).
    fn seed_tenant(
        state: &AppState,
        tenants: &TenantRepo,
        name: &str,
        site_key: &str,
        status: SubscriptionStatus,
    ) -> TenantRow {
        let tenant = tenants.create(name, site_key, 0, 0).unwrap();
        let scope = TenantScope::try_new(tenant.id.clone()).unwrap();
        let users = UserRepo::new(state.store.clone());
        let hash = hash_password("correct").unwrap();
        users.create(&scope, "a@x.com", &hash, Role::Admin).unwrap();
        tenants.set_status(&tenant.id, status).unwrap();
        tenants.get(&tenant.id).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn urlencode(s: &str) -> String {
        s.bytes()
            .map(|b| {
                if b.is_ascii_alphanumeric() || b == b'-' || b == b'.' || b == b'_' {
                    (b as char).to_string()
                } else {
                    format!("%{b:02X}")
                }
            })
            .collect()
    }

    async fn login_token(router: &Router, tenant_id: Option<&str>) -> String {
        let mut body = serde_json::json!({ "email": "a@x.com", "password": "correct" });
        if let Some(id) = tenant_id {
            body["tenantId"] = serde_json::Value::String(id.to_string());
        }
        let resp = router
            .clone()
            .oneshot(json_request("POST", "/auth/login", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        body_json(resp).await["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (state, _) = make_state();
        let router = build_router(state);

        let resp = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn post_track_acknowledges_event() {
        let (state, tenants) = make_state();
        seed_tenant(&state, &tenants, "Acme", "site_acme", SubscriptionStatus::Active);
        let router = build_router(state);

        let resp = router
            .oneshot(json_request(
                "POST",
                "/track",
                serde_json::json!({
                    "event": "pageview",
                    "customerId": "site_acme",
                    "domain": "example.com",
                    "url": "/pricing",
                    "userAgent": "Mozilla/5.0"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["event"], "pageview");
        assert_eq!(body["customerId"], "site_acme");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn post_track_without_event_name_is_400() {
        let (state, tenants) = make_state();
        seed_tenant(&state, &tenants, "Acme", "site_acme", SubscriptionStatus::Active);
        let router = build_router(state);

        let resp = router
            .oneshot(json_request(
                "POST",
                "/track",
                serde_json::json!({ "customerId": "site_acme" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn beacon_always_returns_pixel() {
        let (state, tenants) = make_state();
        seed_tenant(&state, &tenants, "Acme", "site_acme", SubscriptionStatus::Active);
        let router = build_router(state);

        // Valid beacon
        let data = urlencode(r#"{"event":"pageview","customerId":"site_acme"}"#);
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/track?data={data}"))
                    .header(header::USER_AGENT, "Mozilla/5.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/gif");
        let bytes = axum::body::to_bytes(resp.into_body(), 1_000).await.unwrap();
        assert_eq!(&bytes[0..6], b"GIF89a");

        // Garbage beacon still gets the pixel (fire-and-forget)
        let resp = router
            .oneshot(
                Request::builder()
                    .uri("/track?data=garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/gif");
    }

    #[tokio::test]
    async fn login_succeeds_with_correct_credentials() {
        let (state, tenants) = make_state();
        let tenant = seed_tenant(&state, &tenants, "Acme", "site_acme", SubscriptionStatus::Active);
        let router = build_router(state);

        let resp = router
            .oneshot(json_request(
                "POST",
                "/auth/login",
                serde_json::json!({ "email": "a@x.com", "password": "correct" }),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["user"]["email"], "a@x.com");
        assert_eq!(body["tenant"]["id"], tenant.id.as_str());
        assert_eq!(body["expiresIn"], 3600);
        assert!(body["token"].is_string());
        // The credential hash must never appear in the response.
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["user"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_identical() {
        let (state, tenants) = make_state();
        seed_tenant(&state, &tenants, "Acme", "site_acme", SubscriptionStatus::Active);
        let router = build_router(state);

        let wrong_password = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/login",
                serde_json::json!({ "email": "a@x.com", "password": "wrong" }),
            ))
            .await
            .unwrap();
        let unknown_email = router
            .oneshot(json_request(
                "POST",
                "/auth/login",
                serde_json::json!({ "email": "ghost@x.com", "password": "whatever" }),
            ))
            .await
            .unwrap();

        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(wrong_password).await, body_json(unknown_email).await);
    }

    #[tokio::test]
    async fn suspended_subscription_is_403_with_status_word() {
        let (state, tenants) = make_state();
        seed_tenant(&state, &tenants, "Acme", "site_acme", SubscriptionStatus::Suspended);
        let router = build_router(state);

        let resp = router
            .oneshot(json_request(
                "POST",
                "/auth/login",
                serde_json::json!({ "email": "a@x.com", "password": "correct" }),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body = body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("suspended"));
        assert!(body["details"].as_str().unwrap().contains("suspended"));
    }

    #[tokio::test]
    async fn login_without_credentials_is_400() {
        let (state, tenants) = make_state();
        seed_tenant(&state, &tenants, "Acme", "site_acme", SubscriptionStatus::Active);
        let router = build_router(state);

        let resp = router
            .oneshot(json_request(
                "POST",
                "/auth/login",
                serde_json::json!({ "email": "a@x.com" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn visitors_requires_a_token() {
        let (state, _) = make_state();
        let router = build_router(state);

        let resp = router
            .clone()
            .oneshot(Request::builder().uri("/visitors").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = router
            .oneshot(
                Request::builder()
                    .uri("/visitors")
                    .header(header::AUTHORIZATION, "Bearer garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn visitors_lists_sessions_with_scores() {
        let (state, tenants) = make_state();
        seed_tenant(&state, &tenants, "Acme", "site_acme", SubscriptionStatus::Active);
        let router = build_router(state);

        for event in ["pageview", "signup"] {
            let resp = router
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/track",
                    serde_json::json!({
                        "event": event,
                        "customerId": "site_acme",
                        "userAgent": "Mozilla/5.0"
                    }),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let token = login_token(&router, None).await;
        let resp = router
            .oneshot(
                Request::builder()
                    .uri("/visitors")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        let visitors = body["visitors"].as_array().unwrap();
        assert_eq!(visitors.len(), 1);
        assert_eq!(visitors[0]["eventCount"], 2);
        assert_eq!(visitors[0]["pageCount"], 1);
        assert_eq!(visitors[0]["isActive"], true);
        assert!(visitors[0]["score"]["value"].as_f64().unwrap() > 0.0);
        assert!(visitors[0]["score"]["bucket"].is_string());
    }

    #[tokio::test]
    async fn tenant_token_never_reads_another_tenants_sessions() {
        let (state, tenants) = make_state();
        seed_tenant(&state, &tenants, "Acme", "site_a", SubscriptionStatus::Active);
        let other = tenants.create("Rival", "site_b", 0, 0).unwrap();
        let sessions = state.sessions.clone();
        let router = build_router(state);

        // All traffic belongs to tenant B.
        let resp = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/track",
                serde_json::json!({
                    "event": "pageview",
                    "customerId": "site_b",
                    "userAgent": "Mozilla/5.0"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // Tenant A's token sees nothing of it.
        let token = login_token(&router, None).await;
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/visitors")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert!(body["visitors"].as_array().unwrap().is_empty());

        // Even a direct lookup of B's session id is a 404 under A's scope.
        let b_scope = TenantScope::try_new(other.id).unwrap();
        let b_sessions = sessions.list_recent(&b_scope, 10, 0).unwrap();
        let b_session_id = &b_sessions[0].id;

        let resp = router
            .oneshot(
                Request::builder()
                    .uri(format!("/visitors/{b_session_id}"))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn beacons_straddling_midnight_produce_two_sessions() {
        let (state, tenants) = make_state();
        seed_tenant(&state, &tenants, "Acme", "site_acme", SubscriptionStatus::Active);
        let router = build_router(state);

        for ts in ["2024-01-01T23:59:30Z", "2024-01-02T00:00:30Z"] {
            let data = urlencode(&format!(
                r#"{{"event":"pageview","customerId":"site_acme","timestamp":"{ts}"}}"#
            ));
            let resp = router
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/track?data={data}"))
                        .header(header::USER_AGENT, "Mozilla/5.0")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let token = login_token(&router, None).await;
        let resp = router
            .oneshot(
                Request::builder()
                    .uri("/visitors")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["visitors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn preflight_options_is_answered_with_open_cors() {
        let (state, _) = make_state();
        let router = build_router(state);

        let resp = router
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/track")
                    .header(header::ORIGIN, "https://thirdparty.example")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let (state, _) = make_state();
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Random port
        };

        let handle = start(config, state).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }
}
