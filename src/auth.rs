//! Calendar authorization context.
//!
//! The pipeline never acquires or refreshes credentials; it receives an
//! [`AuthorizationContext`] from the caller and forwards it untouched to the
//! calendar client. Two convenience loaders cover the usual sources: the
//! process environment and a google-auth style `token.json`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// OAuth scope required to insert events.
pub const CALENDAR_EVENTS_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";

/// Default Google OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Opaque credential bundle for the calendar API.
///
/// Field names follow the `token.json` written by Google's auth libraries, so
/// an existing token file can be loaded as-is.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthorizationContext {
    /// Bearer access token.
    #[serde(alias = "access_token")]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_scopes() -> Vec<String> {
    vec![CALENDAR_EVENTS_SCOPE.to_string()]
}

/// Why an [`AuthorizationContext`] could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum AuthLoadError {
    #[error("Environment variable {0} is not set")]
    MissingVar(&'static str),
    #[error("Failed to read token file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid token file '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl AuthorizationContext {
    /// Context holding only an access token (tests, short-lived tokens).
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            refresh_token: None,
            token_uri: default_token_uri(),
            client_id: None,
            client_secret: None,
            scopes: default_scopes(),
        }
    }

    /// Build from `GOOGLE_ACCESS_TOKEN` and the optional
    /// `GOOGLE_REFRESH_TOKEN` / `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` /
    /// `GOOGLE_TOKEN_URI` variables.
    pub fn from_env() -> Result<Self, AuthLoadError> {
        let token = non_empty_var("GOOGLE_ACCESS_TOKEN")
            .ok_or(AuthLoadError::MissingVar("GOOGLE_ACCESS_TOKEN"))?;
        Ok(Self {
            token,
            refresh_token: non_empty_var("GOOGLE_REFRESH_TOKEN"),
            token_uri: non_empty_var("GOOGLE_TOKEN_URI").unwrap_or_else(default_token_uri),
            client_id: non_empty_var("GOOGLE_CLIENT_ID"),
            client_secret: non_empty_var("GOOGLE_CLIENT_SECRET"),
            scopes: default_scopes(),
        })
    }

    /// Load a google-auth `token.json`.
    pub fn from_token_file(path: impl AsRef<Path>) -> Result<Self, AuthLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| AuthLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| AuthLoadError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Access token to send as `Authorization: Bearer …`.
    pub fn access_token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for AuthorizationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationContext")
            .field("token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("scopes", &self.scopes)
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
