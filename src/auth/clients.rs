use std::fmt;

use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::{Deserialize, Serialize};

use crate::{config::{Config, OAuthKeys}, AppResult};

type ProviderClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    /// Firebase provider id used with `signInWithIdp`.
    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    fn slug(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    fn endpoints(&self) -> (&str, &str) {
        use ClientProvider::*;
        match self {
            Google => ("https://accounts.google.com/o/oauth2/auth", "https://oauth2.googleapis.com/token"),
            Github => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// OAuth clients for the providers that have keys configured, plus the
/// Firebase REST endpoints the login flow talks to.
#[derive(Clone, Default)]
pub struct Clients {
    firebase_api_key: Option<String>,
    http_client: reqwest::Client,
    google_client: Option<ProviderClient>,
    github_client: Option<ProviderClient>,
}

fn build_client(provider: ClientProvider, keys: &OAuthKeys, public_url: &str) -> AppResult<ProviderClient> {
    let (auth_url, token_url) = provider.endpoints();

    Ok(
        BasicClient::new(ClientId::new(keys.client_id.clone()))
            .set_client_secret(ClientSecret::new(keys.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(auth_url.to_owned())?)
            .set_token_uri(TokenUrl::new(token_url.to_owned())?)
            .set_redirect_uri(RedirectUrl::new(format!("{public_url}/lockin/{}", provider.slug()))?)
    )
}

impl Clients {
    pub fn from_config(config: &Config) -> AppResult<Clients> {
        // Token endpoints must not be followed through redirects.
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let google_client = config.google.as_ref()
            .map(|keys| build_client(ClientProvider::Google, keys, &config.public_url))
            .transpose()?;
        let github_client = config.github.as_ref()
            .map(|keys| build_client(ClientProvider::Github, keys, &config.public_url))
            .transpose()?;

        Ok(
            Clients {
                firebase_api_key: config.firebase_api_key.clone(),
                http_client,
                google_client,
                github_client,
            }
        )
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<ProviderClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or(format!("OAuth provider {provider} keys not supplied").into())
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// `accounts:signInWithIdp`: provider access token in, Firebase tokens out.
    pub fn idp_url(&self) -> AppResult<String> {
        self.firebase_api_key.as_deref()
            .map(|key| format!("https://identitytoolkit.googleapis.com/v1/accounts:signInWithIdp?key={key}"))
            .ok_or("FIREBASE_API_KEY not supplied".into())
    }

    /// Secure token endpoint that trades a refresh token for a new ID token.
    pub fn refresh_url(&self) -> Option<String> {
        self.firebase_api_key.as_deref()
            .map(|key| format!("https://securetoken.googleapis.com/v1/token?key={key}"))
    }
}
