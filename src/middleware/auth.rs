use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::collections::HashMap;

use crate::database::queries::UserQueries;
use crate::errors::{AppError, Result};
use crate::handlers::AppState;
use crate::models::{User, DEFAULT_QUOTA_SECONDS};
use crate::services::quota::QuotaLedger;

/// Verified identity as reported by the external identity provider.
#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
}

/// Token verification is delegated; implementations only translate a bearer
/// token into claims.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<TokenClaims>;
}

/// Production verifier: forwards the token to the identity provider's
/// userinfo endpoint.
pub struct IdentityProviderVerifier {
    client: reqwest::Client,
    userinfo_url: String,
}

impl IdentityProviderVerifier {
    pub fn new(userinfo_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            userinfo_url,
        }
    }
}

#[derive(Deserialize)]
struct UserInfo {
    sub: Option<String>,
    id: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

#[async_trait]
impl TokenVerifier for IdentityProviderVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("Identity provider unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Auth("Invalid or expired token".to_string()));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|_| AppError::Auth("Malformed identity response".to_string()))?;

        let subject = info
            .sub
            .or(info.id)
            .ok_or_else(|| AppError::Auth("Identity response missing subject".to_string()))?;
        let email = info
            .email
            .unwrap_or_else(|| format!("{}@unknown", subject));

        Ok(TokenClaims {
            subject,
            email,
            name: info.name,
        })
    }
}

/// Fixed token table, for local development and tests.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, TokenClaims>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, subject: &str, email: &str) -> Self {
        self.tokens.insert(
            token.to_string(),
            TokenClaims {
                subject: subject.to_string(),
                email: email.to_string(),
                name: None,
            },
        );
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AppError::Auth("Invalid or expired token".to_string()))
    }
}

/// Extractor that verifies the bearer token and upserts the corresponding
/// user row (first sign-in gets the free-plan defaults).
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::Auth("Authentication required".to_string()).into_response()
            })?;

        let claims = state
            .verifier
            .verify(token)
            .await
            .map_err(IntoResponse::into_response)?;

        let user = find_or_create_user(state, &claims)
            .await
            .map_err(IntoResponse::into_response)?;

        Ok(AuthenticatedUser(user))
    }
}

async fn find_or_create_user(state: &AppState, claims: &TokenClaims) -> Result<User> {
    if let Some(user) =
        UserQueries::find_by_external_id(state.database.pool(), &claims.subject).await?
    {
        return Ok(user);
    }

    tracing::info!(subject = %claims.subject, "provisioning user on first sign-in");
    UserQueries::create(
        state.database.pool(),
        &claims.subject,
        &claims.email,
        claims.name.as_deref(),
        DEFAULT_QUOTA_SECONDS,
        QuotaLedger::first_of_next_month(chrono::Utc::now()),
    )
    .await
}
