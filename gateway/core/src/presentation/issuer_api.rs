// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Local Issuer HTTP Surface
//!
//! OIDC discovery, JWKS, token, introspection, revocation and userinfo
//! endpoints for the [`LocalTokenIssuer`], mounted under the path of the
//! configured issuer URL (e.g. `/oauth2/default/v1/keys`). `/test/*` routes
//! register users and mint tokens directly for test setup.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::infrastructure::auth::issuer::{GrantError, LocalTokenIssuer, MockUser, TokenGrant, TokenRequest};

pub struct IssuerState {
    pub issuer: Arc<LocalTokenIssuer>,
}

/// Path component of the issuer URL, without a trailing slash.
pub fn issuer_path_prefix(issuer: &str) -> String {
    reqwest::Url::parse(issuer)
        .map(|url| url.path().trim_end_matches('/').to_string())
        .unwrap_or_default()
}

pub fn issuer_router(issuer: Arc<LocalTokenIssuer>) -> Router {
    let prefix = issuer_path_prefix(&issuer.settings().issuer);
    let state = Arc::new(IssuerState { issuer });

    let mut router = Router::new()
        .route("/.well-known/openid-configuration", get(openid_configuration))
        .route(&format!("{prefix}/v1/keys"), get(jwks))
        .route(&format!("{prefix}/v1/token"), post(token))
        .route(&format!("{prefix}/v1/introspect"), post(introspect))
        .route(&format!("{prefix}/v1/revoke"), post(revoke))
        .route(&format!("{prefix}/v1/userinfo"), get(userinfo))
        .route("/test/users", post(create_test_user))
        .route("/test/users/{subject}", get(get_test_user))
        .route("/test/tokens", post(create_test_token))
        .route("/health", get(health));
    if !prefix.is_empty() {
        router = router.route(
            &format!("{prefix}/.well-known/openid-configuration"),
            get(openid_configuration),
        );
    }
    router.with_state(state)
}

fn oauth_error(status: StatusCode, error: &str, description: impl Into<String>) -> Response {
    let body = Json(json!({ "error": error, "error_description": description.into() }));
    if status == StatusCode::UNAUTHORIZED {
        (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
    } else {
        (status, body).into_response()
    }
}

async fn openid_configuration(State(state): State<Arc<IssuerState>>) -> impl IntoResponse {
    Json(state.issuer.discovery_document())
}

async fn jwks(State(state): State<Arc<IssuerState>>) -> impl IntoResponse {
    Json(state.issuer.jwks())
}

async fn token(State(state): State<Arc<IssuerState>>, Form(grant): Form<TokenGrant>) -> Response {
    match state.issuer.handle_grant(grant) {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            warn!(error = err.error_code(), "Token request rejected: {}", err);
            let status = match &err {
                GrantError::UnknownUser(_) => StatusCode::UNAUTHORIZED,
                GrantError::Issuer(_) | GrantError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            oauth_error(status, err.error_code(), err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenForm {
    token: String,
}

async fn introspect(State(state): State<Arc<IssuerState>>, Form(form): Form<TokenForm>) -> impl IntoResponse {
    Json(state.issuer.introspect(&form.token))
}

/// Always 200, whether or not the token was known.
async fn revoke(State(state): State<Arc<IssuerState>>, Form(form): Form<TokenForm>) -> impl IntoResponse {
    state.issuer.revoke(&form.token);
    Json(json!({}))
}

async fn userinfo(State(state): State<Arc<IssuerState>>, headers: HeaderMap) -> Response {
    let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    else {
        return oauth_error(StatusCode::UNAUTHORIZED, "invalid_token", "missing bearer token");
    };
    match state.issuer.userinfo(token) {
        Ok(info) => Json(info).into_response(),
        Err(err) => oauth_error(StatusCode::UNAUTHORIZED, err.error_code(), err.to_string()),
    }
}

async fn create_test_user(State(state): State<Arc<IssuerState>>, Json(user): Json<MockUser>) -> impl IntoResponse {
    let subject = user.subject.clone();
    state.issuer.register_user(user);
    Json(json!({ "status": "created", "subject": subject }))
}

async fn get_test_user(State(state): State<Arc<IssuerState>>, Path(subject): Path<String>) -> Response {
    match state.issuer.user(&subject) {
        Some(user) => Json(json!({
            "subject": user.subject,
            "principal_type": user.principal_type,
            "groups": user.groups,
            "name": user.name,
            "email": user.email,
        }))
        .into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "detail": "User not found" }))).into_response(),
    }
}

async fn create_test_token(
    State(state): State<Arc<IssuerState>>,
    Json(request): Json<TokenRequest>,
) -> Response {
    match state.issuer.issue_token(request) {
        Ok(token) => Json(json!({ "access_token": token, "token_type": "Bearer" })).into_response(),
        Err(err) => oauth_error(StatusCode::INTERNAL_SERVER_ERROR, "server_error", err.to_string()),
    }
}

async fn health(State(state): State<Arc<IssuerState>>) -> impl IntoResponse {
    Json(json!({ "status": "healthy", "issuer": state.issuer.settings().issuer }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_from_issuer_url() {
        assert_eq!(issuer_path_prefix("http://localhost:9000/oauth2/default"), "/oauth2/default");
        assert_eq!(issuer_path_prefix("http://localhost:9000/oauth2/default/"), "/oauth2/default");
        assert_eq!(issuer_path_prefix("http://localhost:9000"), "");
        assert_eq!(issuer_path_prefix("not a url"), "");
    }
}
