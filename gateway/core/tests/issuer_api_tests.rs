// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local issuer HTTP surface, driven in-process through the router.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use capability_gateway_core::infrastructure::auth::issuer::{IssuerSettings, LocalTokenIssuer, TokenRequest};
use capability_gateway_core::presentation::issuer_api::issuer_router;

fn issuer() -> Arc<LocalTokenIssuer> {
    Arc::new(common::issuer_with(IssuerSettings::default()))
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn form(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_discovery_document_at_root_and_issuer_path() {
    let issuer = issuer();
    for uri in [
        "/.well-known/openid-configuration",
        "/oauth2/default/.well-known/openid-configuration",
    ] {
        let (status, body) = send(issuer_router(issuer.clone()), get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["issuer"], "http://localhost:9000/oauth2/default");
        assert_eq!(body["jwks_uri"], "http://localhost:9000/oauth2/default/v1/keys");
        assert!(body["grant_types_supported"]
            .as_array()
            .unwrap()
            .contains(&json!("urn:ietf:params:oauth:grant-type:token-exchange")));
    }
}

#[tokio::test]
async fn test_jwks_publishes_signing_key() {
    let issuer = issuer();
    let (status, body) = send(issuer_router(issuer.clone()), get("/oauth2/default/v1/keys")).await;
    assert_eq!(status, StatusCode::OK);
    let keys = body["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["kid"], issuer.kid());
    assert_eq!(keys[0]["kty"], "RSA");
    assert_eq!(keys[0]["alg"], "RS256");
}

#[tokio::test]
async fn test_password_grant_issues_verifiable_tokens() {
    let issuer = issuer();
    let (status, body) = send(
        issuer_router(issuer.clone()),
        form(
            "/oauth2/default/v1/token",
            "grant_type=password&username=admin%40local.test&scope=openid+profile",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["scope"], "openid profile");
    assert!(body["id_token"].is_string());

    let claims = issuer.verify_claims(body["access_token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.sub, "admin@local.test");
    assert_eq!(claims.groups, vec!["hr-platform-admins".to_string()]);
}

#[tokio::test]
async fn test_client_credentials_defaults_to_machine() {
    let issuer = issuer();
    let (status, body) = send(
        issuer_router(issuer.clone()),
        form(
            "/oauth2/default/v1/token",
            "grant_type=client_credentials&client_id=svc-new%40local.test",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expires_in"], 86400);
    assert!(body.get("id_token").is_none() || body["id_token"].is_null());
}

#[tokio::test]
async fn test_token_errors_follow_oauth_shape() {
    let issuer = issuer();

    let (status, body) = send(
        issuer_router(issuer.clone()),
        form("/oauth2/default/v1/token", "grant_type=authorization_code"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported_grant_type");

    let (status, body) = send(
        issuer_router(issuer.clone()),
        form("/oauth2/default/v1/token", "grant_type=password&username=nobody%40local.test"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_grant");

    let (status, body) = send(
        issuer_router(issuer),
        form("/oauth2/default/v1/token", "grant_type=password"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_token_exchange_grant() {
    let issuer = issuer();
    let subject = issuer
        .issue_token(TokenRequest::for_subject("user@local.test"))
        .unwrap();
    let body = format!(
        "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Atoken-exchange\
         &subject_token={subject}\
         &subject_token_type=urn%3Aietf%3Aparams%3Aoauth%3Atoken-type%3Aaccess_token"
    );
    let (status, response) = send(issuer_router(issuer.clone()), form("/oauth2/default/v1/token", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response["issued_token_type"],
        "urn:ietf:params:oauth:token-type:access_token"
    );
    assert!(response["expires_in"].as_i64().unwrap() <= 300);

    let claims = issuer
        .verify_claims(response["access_token"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.extra["acting_as"], "mcp-server");
    assert_eq!(claims.extra["scope"], "mcp:use");
}

#[tokio::test]
async fn test_introspect_then_revoke() {
    let issuer = issuer();
    let token = issuer
        .issue_token(TokenRequest::for_subject("user@local.test"))
        .unwrap();
    let token_form = format!("token={token}");

    let (status, body) = send(
        issuer_router(issuer.clone()),
        form("/oauth2/default/v1/introspect", &token_form),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], true);
    assert_eq!(body["sub"], "user@local.test");

    let (status, _) = send(
        issuer_router(issuer.clone()),
        form("/oauth2/default/v1/revoke", &token_form),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(
        issuer_router(issuer.clone()),
        form("/oauth2/default/v1/introspect", &token_form),
    )
    .await;
    assert_eq!(body, json!({ "active": false }));

    // Unknown tokens are accepted silently.
    let (status, _) = send(
        issuer_router(issuer),
        form("/oauth2/default/v1/revoke", "token=garbage"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_userinfo_requires_valid_bearer() {
    let issuer = issuer();
    let token = issuer
        .issue_token(TokenRequest::for_subject("user@local.test"))
        .unwrap();

    let request = Request::get("/oauth2/default/v1/userinfo")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(issuer_router(issuer.clone()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sub"], "user@local.test");
    assert_eq!(body["email"], "user@local.test");
    assert_eq!(body["groups"], json!(["employees"]));
    assert_eq!(body["principal_type"], "HUMAN");

    let response = issuer_router(issuer)
        .oneshot(get("/oauth2/default/v1/userinfo"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
}

#[tokio::test]
async fn test_test_routes_register_users_and_mint_tokens() {
    let issuer = issuer();

    let (status, body) = send(
        issuer_router(issuer.clone()),
        json_post(
            "/test/users",
            json!({
                "subject": "contractor@local.test",
                "principal_type": "HUMAN",
                "groups": ["contractors"],
                "email": "contractor@local.test"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "created");

    let (status, body) = send(issuer_router(issuer.clone()), get("/test/users/contractor@local.test")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["groups"], json!(["contractors"]));

    let (status, _) = send(issuer_router(issuer.clone()), get("/test/users/ghost@local.test")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        issuer_router(issuer.clone()),
        json_post(
            "/test/tokens",
            json!({
                "subject": "contractor@local.test",
                "ttl_seconds": 120,
                "additional_claims": { "department": "finance" }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let claims = issuer.verify_claims(body["access_token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.exp - claims.iat, 120);
    assert_eq!(claims.groups, vec!["contractors".to_string()]);
    assert_eq!(claims.extra["department"], "finance");
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(issuer_router(issuer()), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
