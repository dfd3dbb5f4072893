use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{AuthError, Identity, VerifyToken};

const JWKS_URL: &str = "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Unknown `kid`s refetch the key set at most this often.
const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    email: Option<String>,
}

struct KeyCache {
    keys: JwkSet,
    fetched_at: Option<Instant>,
}

impl KeyCache {
    fn find(&self, kid: &str) -> Option<DecodingKey> {
        self.keys.find(kid).and_then(|jwk| DecodingKey::from_jwk(jwk).ok())
    }

    fn may_refetch(&self) -> bool {
        self.fetched_at.is_none_or(|at| at.elapsed() >= MIN_REFETCH_INTERVAL)
    }
}

/// Verifies Firebase ID tokens against Google's published signing keys.
pub struct FirebaseVerifier {
    project_id: String,
    jwks_url: String,
    http_client: reqwest::Client,
    cache: RwLock<KeyCache>,
}

impl FirebaseVerifier {
    pub fn new(project_id: impl Into<String>) -> FirebaseVerifier {
        FirebaseVerifier {
            project_id: project_id.into(),
            jwks_url: JWKS_URL.to_owned(),
            http_client: reqwest::Client::new(),
            cache: RwLock::new(KeyCache { keys: JwkSet { keys: vec![] }, fetched_at: None }),
        }
    }

    pub fn with_jwks_url(mut self, jwks_url: impl Into<String>) -> FirebaseVerifier {
        self.jwks_url = jwks_url.into();
        self
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        validation
    }

    async fn fetch_keys(&self) -> reqwest::Result<JwkSet> {
        self.http_client.get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Google rotates keys, so an unknown `kid` refetches the set unless
    /// a fetch was already attempted within [`MIN_REFETCH_INTERVAL`].
    async fn key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if let Some(key) = self.cache.read().await.find(kid) {
            return Ok(key);
        }

        // Concurrent misses queue here and see the first one's result.
        let mut cache = self.cache.write().await;
        if let Some(key) = cache.find(kid) {
            return Ok(key);
        }
        if !cache.may_refetch() {
            tracing::debug!(kid, "unknown key id, refetch throttled");
            return Err(AuthError::InvalidToken);
        }

        cache.fetched_at = Some(Instant::now());
        match self.fetch_keys().await {
            Ok(keys) => cache.keys = keys,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch signing keys");
                return Err(AuthError::InvalidToken);
            }
        }

        cache.find(kid).ok_or(AuthError::InvalidToken)
    }
}

fn identity_from_claims(Claims { sub, email }: Claims) -> Result<Identity, AuthError> {
    if sub.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    Ok(Identity { uid: sub, email: email.filter(|x| !x.is_empty()) })
}

#[async_trait]
impl VerifyToken for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::InvalidToken)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken);
        }
        let kid = header.kid.ok_or(AuthError::InvalidToken)?;

        let key = self.key(&kid).await?;
        let data = decode::<Claims>(token, &key, &self.validation()).map_err(|e| {
            tracing::debug!(error = %e, "rejected id token");
            AuthError::InvalidToken
        })?;

        identity_from_claims(data.claims)
    }
}
