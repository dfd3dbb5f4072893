use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_sessions::Session;

use crate::AppState;

mod clients;
mod firebase;
mod oauth;
mod tokens;

pub use clients::{ClientProvider, Clients};
pub use firebase::FirebaseVerifier;
pub use tokens::SessionTokens;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/{provider}", get(oauth::login))
        .route("/lockin/{provider}", get(oauth::lockin))
        .route("/logout", get(oauth::logout))
        .route("/me", get(me))
}

/// The verified caller behind a socket or request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authentication error: No token provided")]
    MissingToken,
    #[error("Authentication error: Invalid token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

#[async_trait]
pub trait VerifyToken: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

pub type Verifier = Arc<dyn VerifyToken>;

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Finds the caller's ID token: `?token=`, then `Authorization: Bearer`, then the login session.
async fn find_token(parts: &mut Parts, state: &AppState) -> Option<String> {
    if let Ok(Query(TokenQuery { token: Some(token) })) = Query::<TokenQuery>::try_from_uri(&parts.uri) {
        if !token.is_empty() {
            return Some(token);
        }
    }

    let bearer = parts.headers.get(AUTHORIZATION)
        .and_then(|x| x.to_str().ok())
        .and_then(|x| x.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|x| !x.is_empty());
    if let Some(bearer) = bearer {
        return Some(bearer.to_owned());
    }

    let session = Session::from_request_parts(parts, state).await.ok()?;
    tokens::session_id_token(&session, &state.clients).await
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = find_token(parts, state).await else {
            return Err(AuthError::MissingToken);
        };

        state.verifier.verify(&token).await.inspect_err(|e| {
            tracing::warn!(error = %e, "token verification failed");
        })
    }
}

async fn me(identity: Identity) -> axum::Json<Identity> {
    axum::Json(identity)
}
