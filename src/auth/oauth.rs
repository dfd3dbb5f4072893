//! Server-side sign-in: provider OAuth2 + PKCE, then `signInWithIdp` for Firebase tokens.

use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::Redirect,
};
use oauth2::{url::Url, AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, Scope, TokenResponse};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{config::Config, session::{FIREBASE_TOKENS, PENDING_LOGIN}, AppResult, AppState};

use super::{clients::ClientProvider, tokens::{IdpResponse, SessionTokens}, Clients};

/// Redirect target for `return_url`: a local path, or a URL on one of the allowed origins.
/// Anything else lands on `/`.
pub(crate) fn safe_return_url(return_url: Option<&str>, config: &Config) -> String {
    let Some(return_url) = return_url else {
        return "/".to_owned();
    };

    if return_url.starts_with('/') && !return_url.starts_with("//") && !return_url.starts_with("/\\") {
        return return_url.to_owned();
    }

    let allowed = Url::parse(return_url).is_ok_and(|url| {
        let origin = url.origin().ascii_serialization();
        config.cors_origins.iter().any(|x| x.trim_end_matches('/') == origin)
    });
    if allowed {
        return_url.to_owned()
    } else {
        tracing::warn!(return_url, "rejected return url");
        "/".to_owned()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PendingLogin {
    provider: ClientProvider,
    csrf_state: String,
    pkce_verifier: String,
    return_url: String,
}

#[derive(Deserialize)]
pub(crate) struct ReturnQuery {
    return_url: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    Path(provider): Path<ClientProvider>,
    Query(ReturnQuery { return_url }): Query<ReturnQuery>,
    State(clients): State<Clients>,
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<Redirect> {
    let client = clients.get_client(provider)?;
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scopes(["openid", "email"].map(|x| Scope::new(x.to_owned())))
        .set_pkce_challenge(challenge)
        .url();

    session.insert(PENDING_LOGIN, PendingLogin {
        provider,
        csrf_state: csrf_state.secret().clone(),
        pkce_verifier: verifier.secret().clone(),
        return_url: safe_return_url(return_url.as_deref(), &config),
    }).await?;

    tracing::debug!(%provider, "starting oauth login");

    Ok(Redirect::to(authorize_url.as_str()))
}

#[derive(Deserialize)]
pub(crate) struct CallbackQuery {
    state: Option<String>,
    code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

/// OAuth callback: trades the provider code for Firebase tokens and keeps them in the session.
#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(CallbackQuery { state, code }): Query<CallbackQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Redirect> {
    let (Some(state), Some(code)) = (state, code) else {
        return Err("OAuth callback without state or code".into());
    };

    let Some(pending) = session.remove::<PendingLogin>(PENDING_LOGIN).await? else {
        return Err("no login in progress".into());
    };
    if pending.provider != provider || pending.csrf_state != state {
        return Err("OAuth state mismatch".into());
    }

    let token = clients.get_client(provider)?
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(PkceCodeVerifier::new(pending.pkce_verifier))
        .request_async(clients.http())
        .await?;

    let idp: IdpResponse = clients.http()
        .post(clients.idp_url()?)
        .json(&IdpRequest {
            post_body: format!("access_token={}&providerId={}", token.access_token().secret(), provider.id()),
            request_uri: "http://localhost/".to_owned(),
            return_idp_credential: true,
            return_secure_token: true,
        })
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    tracing::info!(%provider, uid = %idp.local_id, "logged in");

    session.cycle_id().await?;
    session.insert(FIREBASE_TOKENS, SessionTokens::from(idp)).await?;

    Ok(Redirect::to(&pending.return_url))
}

#[debug_handler(state = AppState)]
pub(crate) async fn logout(
    Query(ReturnQuery { return_url }): Query<ReturnQuery>,
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<Redirect> {
    session.flush().await?;
    Ok(Redirect::to(&safe_return_url(return_url.as_deref(), &config)))
}
