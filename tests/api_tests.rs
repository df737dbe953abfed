//! End-to-end API tests driving the full router, middleware stack included,
//! through `tower::ServiceExt::oneshot`.
//!
//! Each test builds its own state and in-memory stores, so tests cannot
//! observe each other's rate limiter buckets or data.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use marquee::store::{PermissionStore as _, Stores};
use marquee::{AppState, Config, build_router};

/// Config with the limiter wide open, for tests that exercise everything
/// except admission control.
fn open_config() -> Config {
    Config {
        rate_limit_rps: 1000.0,
        rate_limit_burst: 1000,
        metrics_port: 0,
        ..Config::default()
    }
}

fn test_app(config: Config) -> (Router, AppState) {
    let state = AppState::new(Stores::in_memory(), config);
    let router = build_router(state.clone());
    (router, state)
}

fn request(method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };

    let mut req = builder.body(body).unwrap();

    // The limiter keys buckets by peer address, normally attached by the
    // connect-info make-service.
    let peer: SocketAddr = "203.0.113.10:40000".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));
    req
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();

    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, value)
}

/// Register a user and return `(user_id, activation_token)`.
async fn register(router: &Router, name: &str, email: &str, password: &str) -> (i64, String) {
    let (status, body) = send(
        router,
        request(
            "POST",
            "/v1/users",
            Some(json!({"name": name, "email": email, "password": password})),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

    let user_id = body["user"]["id"].as_i64().unwrap();
    let activation_token = body["activation_token"]["token"].as_str().unwrap().to_string();
    (user_id, activation_token)
}

async fn activate(router: &Router, activation_token: &str) {
    let (status, body) = send(
        router,
        request(
            "PUT",
            "/v1/users/activated",
            Some(json!({"token": activation_token})),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "activation failed: {body}");
    assert_eq!(body["user"]["activated"], json!(true));
}

async fn authentication_token(router: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        router,
        request(
            "POST",
            "/v1/tokens/authentication",
            Some(json!({"email": email, "password": password})),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "authentication failed: {body}");
    body["authentication_token"]["token"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Register, activate and authenticate a user, granting extra permissions.
async fn ready_user(
    router: &Router,
    state: &AppState,
    email: &str,
    extra_permissions: &[&str],
) -> String {
    let (user_id, activation_token) = register(router, "Ada Wong", email, "pa55word1234").await;
    activate(router, &activation_token).await;

    if !extra_permissions.is_empty() {
        state
            .stores
            .permissions
            .add_for_user(user_id, extra_permissions)
            .await
            .unwrap();
    }

    authentication_token(router, email, "pa55word1234").await
}

// =============================================================================
// Healthcheck and operational endpoints
// =============================================================================

#[tokio::test]
async fn test_healthcheck() {
    let (router, _state) = test_app(open_config());

    let (status, body) = send(&router, request("GET", "/v1/healthcheck", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("available"));
    assert_eq!(body["system_info"]["environment"], json!("development"));
}

#[tokio::test]
async fn test_metrics_snapshot_counts_requests() {
    let (router, _state) = test_app(open_config());

    send(&router, request("GET", "/v1/healthcheck", None, None)).await;
    send(&router, request("GET", "/v1/healthcheck", None, None)).await;

    let (status, body) = send(&router, request("GET", "/debug/metrics", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["total_requests_received"].as_u64().unwrap() >= 2);
    assert!(body["total_responses_sent"].as_u64().unwrap() >= 2);
}

// =============================================================================
// Authentication and authorization
// =============================================================================

#[tokio::test]
async fn test_anonymous_request_to_gated_route_is_401() {
    let (router, _state) = test_app(open_config());

    let (status, body) = send(&router, request("GET", "/v1/movies", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("authentication_required"));
}

#[tokio::test]
async fn test_inactive_user_is_403() {
    let (router, _state) = test_app(open_config());

    // Authenticated but never activated.
    let (_, _) = register(&router, "John Doe", "j.doe@mail.com", "pa55word1234").await;
    let token = authentication_token(&router, "j.doe@mail.com", "pa55word1234").await;

    let (status, body) = send(&router, request("GET", "/v1/movies", None, Some(&token))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], json!("inactive_account"));
}

#[tokio::test]
async fn test_activated_user_without_permission_is_403() {
    let (router, state) = test_app(open_config());

    // Default grant is movies:read only.
    let token = ready_user(&router, &state, "a.wong@mail.com", &[]).await;

    let (status, body) = send(
        &router,
        request(
            "POST",
            "/v1/movies",
            Some(json!({
                "title": "Casablanca",
                "year": 1942,
                "runtime": "102 mins",
                "genres": ["drama", "romance"],
            })),
            Some(&token),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], json!("not_permitted"));
}

#[tokio::test]
async fn test_activated_permissioned_user_is_200() {
    let (router, state) = test_app(open_config());
    let token = ready_user(&router, &state, "a.wong@mail.com", &[]).await;

    let (status, body) = send(&router, request("GET", "/v1/movies", None, Some(&token))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["movies"].is_array());
}

#[tokio::test]
async fn test_unknown_and_malformed_tokens_get_identical_rejections() {
    let (router, _state) = test_app(open_config());

    let unknown = "A".repeat(26);
    let (unknown_status, unknown_body) =
        send(&router, request("GET", "/v1/movies", None, Some(&unknown))).await;

    let mut req = Request::builder()
        .uri("/v1/movies")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let peer: SocketAddr = "203.0.113.10:40000".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));
    let (malformed_status, malformed_body) = send(&router, req).await;

    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, malformed_status);
    assert_eq!(unknown_body, malformed_body);
}

#[tokio::test]
async fn test_responses_vary_by_authorization() {
    let (router, _state) = test_app(open_config());

    let response = router
        .clone()
        .oneshot(request("GET", "/v1/healthcheck", None, None))
        .await
        .unwrap();

    let varies = response
        .headers()
        .get_all(header::VARY)
        .iter()
        .any(|v| v == "Authorization");
    assert!(varies);
}

// =============================================================================
// Movie CRUD
// =============================================================================

#[tokio::test]
async fn test_movie_crud_round_trip() {
    let (router, state) = test_app(open_config());
    let token = ready_user(&router, &state, "a.wong@mail.com", &["movies:write"]).await;

    // Create
    let (status, body) = send(
        &router,
        request(
            "POST",
            "/v1/movies",
            Some(json!({
                "title": "Casablanca",
                "year": 1942,
                "runtime": "102 mins",
                "genres": ["drama", "romance"],
            })),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    let id = body["movie"]["id"].as_i64().unwrap();
    assert_eq!(body["movie"]["version"], json!(1));
    assert_eq!(body["movie"]["runtime"], json!("102 mins"));

    // Show
    let (status, body) = send(
        &router,
        request("GET", &format!("/v1/movies/{id}"), None, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["movie"]["title"], json!("Casablanca"));

    // Partial update
    let (status, body) = send(
        &router,
        request(
            "PATCH",
            &format!("/v1/movies/{id}"),
            Some(json!({"year": 1943})),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["movie"]["year"], json!(1943));
    assert_eq!(body["movie"]["title"], json!("Casablanca"));
    assert_eq!(body["movie"]["version"], json!(2));

    // Delete
    let (status, _) = send(
        &router,
        request("DELETE", &format!("/v1/movies/{id}"), None, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Gone
    let (status, _) = send(
        &router,
        request("GET", &format!("/v1/movies/{id}"), None, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_movie_listing_with_filters() {
    let (router, state) = test_app(open_config());
    let token = ready_user(&router, &state, "a.wong@mail.com", &["movies:write"]).await;

    for (title, year, genres) in [
        ("Blade Runner", 1982, json!(["scifi"])),
        ("Brazil", 1985, json!(["scifi", "comedy"])),
        ("Amelie", 2001, json!(["comedy", "romance"])),
    ] {
        let (status, _) = send(
            &router,
            request(
                "POST",
                "/v1/movies",
                Some(json!({
                    "title": title,
                    "year": year,
                    "runtime": "100 mins",
                    "genres": genres,
                })),
                Some(&token),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(
        &router,
        request("GET", "/v1/movies?genres=scifi&sort=-year", None, Some(&token)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body["movies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Brazil", "Blade Runner"]);
    assert_eq!(body["metadata"]["total_records"], json!(2));
}

#[tokio::test]
async fn test_movie_validation_failure_is_422_with_fields() {
    let (router, state) = test_app(open_config());
    let token = ready_user(&router, &state, "a.wong@mail.com", &["movies:write"]).await;

    let (status, body) = send(
        &router,
        request(
            "POST",
            "/v1/movies",
            Some(json!({
                "title": "",
                "year": 1800,
                "runtime": "90 mins",
                "genres": [],
            })),
            Some(&token),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["title"].is_string());
    assert!(body["fields"]["year"].is_string());
    assert!(body["fields"]["genres"].is_string());
}

#[tokio::test]
async fn test_unknown_movie_is_404() {
    let (router, state) = test_app(open_config());
    let token = ready_user(&router, &state, "a.wong@mail.com", &[]).await;

    let (status, body) = send(&router, request("GET", "/v1/movies/999", None, Some(&token))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("not_found"));
}

// =============================================================================
// Users and tokens
// =============================================================================

#[tokio::test]
async fn test_duplicate_email_is_validation_failure() {
    let (router, _state) = test_app(open_config());

    register(&router, "Ada Wong", "a.wong@mail.com", "pa55word1234").await;

    let (status, body) = send(
        &router,
        request(
            "POST",
            "/v1/users",
            Some(json!({
                "name": "Impostor",
                "email": "a.wong@mail.com",
                "password": "pa55word1234",
            })),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["fields"]["email"],
        json!("a user with this email address already exists")
    );
}

#[tokio::test]
async fn test_activation_token_is_single_use() {
    let (router, _state) = test_app(open_config());

    let (_, activation_token) =
        register(&router, "Ada Wong", "a.wong@mail.com", "pa55word1234").await;
    activate(&router, &activation_token).await;

    // Activation revoked every activation token for the user.
    let (status, body) = send(
        &router,
        request(
            "PUT",
            "/v1/users/activated",
            Some(json!({"token": activation_token})),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["fields"]["token"],
        json!("invalid or expired activation token")
    );
}

#[tokio::test]
async fn test_wrong_password_and_unknown_email_both_401() {
    let (router, _state) = test_app(open_config());
    register(&router, "Ada Wong", "a.wong@mail.com", "pa55word1234").await;

    let (wrong_status, wrong_body) = send(
        &router,
        request(
            "POST",
            "/v1/tokens/authentication",
            Some(json!({"email": "a.wong@mail.com", "password": "not-the-password"})),
            None,
        ),
    )
    .await;

    let (unknown_status, unknown_body) = send(
        &router,
        request(
            "POST",
            "/v1/tokens/authentication",
            Some(json!({"email": "nobody@mail.com", "password": "not-the-password"})),
            None,
        ),
    )
    .await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_status, unknown_status);
    assert_eq!(wrong_body, unknown_body);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let (router, _state) = test_app(open_config());

    let (_, activation_token) =
        register(&router, "Ada Wong", "a.wong@mail.com", "pa55word1234").await;
    activate(&router, &activation_token).await;

    // Issue a reset token.
    let (status, body) = send(
        &router,
        request(
            "POST",
            "/v1/tokens/password-reset",
            Some(json!({"email": "a.wong@mail.com"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let reset_token = body["password_reset_token"]["token"]
        .as_str()
        .unwrap()
        .to_string();

    // Use it.
    let (status, _) = send(
        &router,
        request(
            "PUT",
            "/v1/users/password",
            Some(json!({"token": reset_token, "password": "brand-new-pa55word"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Old password no longer authenticates, the new one does.
    let (status, _) = send(
        &router,
        request(
            "POST",
            "/v1/tokens/authentication",
            Some(json!({"email": "a.wong@mail.com", "password": "pa55word1234"})),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    authentication_token(&router, "a.wong@mail.com", "brand-new-pa55word").await;
}

#[tokio::test]
async fn test_password_reset_requires_activated_account() {
    let (router, _state) = test_app(open_config());
    register(&router, "John Doe", "j.doe@mail.com", "pa55word1234").await;

    let (status, body) = send(
        &router,
        request(
            "POST",
            "/v1/tokens/password-reset",
            Some(json!({"email": "j.doe@mail.com"})),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["email"].is_string());
}

// =============================================================================
// Admission control
// =============================================================================

#[tokio::test]
async fn test_burst_is_admitted_then_429() {
    let config = Config {
        rate_limit_rps: 2.0,
        rate_limit_burst: 4,
        metrics_port: 0,
        ..Config::default()
    };
    let (router, _state) = test_app(config);

    for i in 0..4 {
        let (status, _) = send(&router, request("GET", "/v1/healthcheck", None, None)).await;
        assert_eq!(status, StatusCode::OK, "request {i} should be admitted");
    }

    let (status, body) = send(&router, request("GET", "/v1/healthcheck", None, None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["message"], json!("rate limit exceeded"));
}

#[tokio::test]
async fn test_rate_limit_is_per_client() {
    let config = Config {
        rate_limit_rps: 2.0,
        rate_limit_burst: 1,
        metrics_port: 0,
        ..Config::default()
    };
    let (router, _state) = test_app(config);

    // Exhaust the first client's bucket.
    let (status, _) = send(&router, request("GET", "/v1/healthcheck", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, request("GET", "/v1/healthcheck", None, None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // A different client is unaffected.
    let mut req = Request::builder()
        .uri("/v1/healthcheck")
        .body(Body::empty())
        .unwrap();
    let other: SocketAddr = "198.51.100.20:40000".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(other));
    let (status, _) = send(&router, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_disabled_limiter_admits_floods() {
    let config = Config {
        rate_limit_rps: 2.0,
        rate_limit_burst: 4,
        rate_limit_enabled: false,
        metrics_port: 0,
        ..Config::default()
    };
    let (router, _state) = test_app(config);

    for _ in 0..130 {
        let (status, _) = send(&router, request("GET", "/v1/healthcheck", None, None)).await;
        assert_eq!(status, StatusCode::OK);
    }
}
