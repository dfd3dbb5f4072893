use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_sessions::Session;

use crate::session::FIREBASE_TOKENS;

use super::Clients;

/// Tokens are refreshed this many seconds before Firebase would reject them.
const EXPIRY_MARGIN: i64 = 60;

/// Firebase tokens kept in the login session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub id_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
}

impl SessionTokens {
    fn new(id_token: String, refresh_token: String, expires_in: &str) -> SessionTokens {
        let lifetime = expires_in.parse::<i64>().unwrap_or(3600);
        SessionTokens {
            id_token,
            refresh_token,
            expires_at: OffsetDateTime::now_utc().unix_timestamp() + lifetime,
        }
    }

    pub fn is_stale(&self, now: OffsetDateTime) -> bool {
        now.unix_timestamp() + EXPIRY_MARGIN >= self.expires_at
    }
}

/// `accounts:signInWithIdp` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdpResponse {
    pub(crate) local_id: String,
    pub(crate) id_token: String,
    pub(crate) refresh_token: String,
    pub(crate) expires_in: String,
}

impl From<IdpResponse> for SessionTokens {
    fn from(res: IdpResponse) -> SessionTokens {
        SessionTokens::new(res.id_token, res.refresh_token, &res.expires_in)
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

/// Secure token endpoint response; unlike the identity toolkit it answers in snake_case.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

async fn refresh(clients: &Clients, refresh_token: &str) -> anyhow::Result<SessionTokens> {
    let url = clients.refresh_url().ok_or_else(|| anyhow::anyhow!("FIREBASE_API_KEY not supplied"))?;
    let res: RefreshResponse = clients.http()
        .post(url)
        .json(&RefreshRequest { grant_type: "refresh_token", refresh_token })
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(SessionTokens::new(res.id_token, res.refresh_token, &res.expires_in))
}

/// The session's ID token, refreshed first when it is about to expire.
/// A failed refresh logs the user out of the session.
pub(crate) async fn session_id_token(session: &Session, clients: &Clients) -> Option<String> {
    let tokens: SessionTokens = session.get(FIREBASE_TOKENS).await.ok().flatten()?;
    if !tokens.is_stale(OffsetDateTime::now_utc()) {
        return Some(tokens.id_token);
    }

    match refresh(clients, &tokens.refresh_token).await {
        Ok(fresh) => {
            let id_token = fresh.id_token.clone();
            if let Err(e) = session.insert(FIREBASE_TOKENS, fresh).await {
                tracing::warn!(error = %e, "failed to store refreshed tokens");
            }
            tracing::debug!("refreshed session id token");
            Some(id_token)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to refresh session id token");
            let _ = session.remove::<SessionTokens>(FIREBASE_TOKENS).await;
            None
        }
    }
}
