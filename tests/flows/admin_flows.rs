#[path = "../common/mod.rs"]
mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{build_core, test_config};
use http_body_util::BodyExt;
use std::sync::Arc;
use tokio::sync::Notify;
use tower::ServiceExt;
use warden_dns_api::{create_router, AppState};
use warden_dns_domain::config::User;

async fn router_with_user(tmp: &std::path::Path) -> axum::Router {
    let mut config = test_config(tmp, vec!["127.0.0.1:1".to_string()]);
    config.users = vec![User {
        name: "u".into(),
        password: bcrypt::hash("p", 4).unwrap(),
    }];
    let core = build_core(config).await;
    create_router(AppState::new(core, Arc::new(Notify::new())))
}

fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn login_sets_session_cookie_and_gates_status() {
    let tmp = tempfile::tempdir().unwrap();
    let router = router_with_user(tmp.path()).await;

    // No cookie: refused.
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/control/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Login issues the cookie.
    let response = router
        .clone()
        .oneshot(json_post(
            "/control/login",
            serde_json::json!({ "name": "u", "password": "p" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("agh_session="));
    assert!(cookie.contains("HttpOnly"));
    let session_value = cookie
        .strip_prefix("agh_session=")
        .unwrap()
        .split(';')
        .next()
        .unwrap();
    assert_eq!(session_value.len(), 64);

    // The cookie opens the protected surface.
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/control/status")
                .header(header::COOKIE, format!("agh_session={session_value}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status["running"], true);
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let router = router_with_user(tmp.path()).await;

    let response = router
        .oneshot(json_post(
            "/control/login",
            serde_json::json!({ "name": "u", "password": "wrong" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn filtering_endpoints_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let router = router_with_user(tmp.path()).await;

    let login = router
        .clone()
        .oneshot(json_post(
            "/control/login",
            serde_json::json!({ "name": "u", "password": "p" }),
        ))
        .await
        .unwrap();
    let cookie = login
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    // Set user rules, then check a host against them.
    let response = router
        .clone()
        .oneshot({
            let mut request = json_post(
                "/control/filtering/set_rules",
                serde_json::json!({ "rules": ["||ads.example.com^"] }),
            );
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
            request
        })
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/control/filtering/check_host?name=ads.example.com")
                .header(header::COOKIE, cookie.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let check: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(check["reason"], "FilteredBlackList");
    assert_eq!(check["rule"], "||ads.example.com^");
}

#[tokio::test]
async fn blocked_services_validation() {
    let tmp = tempfile::tempdir().unwrap();
    let router = router_with_user(tmp.path()).await;

    let login = router
        .clone()
        .oneshot(json_post(
            "/control/login",
            serde_json::json!({ "name": "u", "password": "p" }),
        ))
        .await
        .unwrap();
    let cookie = login
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let mut request = json_post(
        "/control/blocked_services/set",
        serde_json::json!({ "ids": ["facebook", "not-a-service"] }),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut request = json_post(
        "/control/blocked_services/set",
        serde_json::json!({ "ids": ["facebook"] }),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
