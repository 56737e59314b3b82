// ABOUTME: GitProvider trait and the request/response plumbing shared by providers
// ABOUTME: Key ids, request bodies with line breaks stripped, and created-key parsing

use crate::error::{GitError, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Provider-assigned handle of a registered key. The only way to revoke it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub u64);

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for KeyId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(KeyId)
    }
}

/// A Git hosting account's key-management API.
///
/// Every provider has its own request shape and its own way of saying
/// "deleted"; implementations normalize both into these two calls.
pub trait GitProvider: Send + Sync {
    /// Short lowercase name ("github", "gitlab").
    fn name(&self) -> &str;

    /// Host of the API endpoint.
    fn hostname(&self) -> &str;

    /// Whether `host` refers to this provider. Defaults to the API hostname.
    fn matches_host(&self, host: &str) -> bool {
        self.hostname().eq_ignore_ascii_case(host)
    }

    /// Register `public_key` (authorized_keys format) under `title`.
    fn add_key(&self, public_key: &str, title: &str, token: &SecretString) -> Result<KeyId>;

    /// Revoke a previously registered key.
    fn remove_key(&self, id: KeyId, token: &SecretString) -> Result<()>;
}

/// JSON body of a key registration request.
#[derive(Debug, Serialize)]
pub(crate) struct NewKeyRequest<'a> {
    pub title: &'a str,
    pub key: String,
}

impl<'a> NewKeyRequest<'a> {
    pub fn new(title: &'a str, public_key: &str) -> Self {
        Self {
            title,
            key: strip_line_breaks(public_key),
        }
    }
}

/// Fields common to GitHub and GitLab key responses.
#[derive(Debug, Deserialize)]
pub(crate) struct KeyResponse {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
}

/// Providers reject multi-line key values.
pub fn strip_line_breaks(key: &str) -> String {
    key.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

/// Interpret the answer to a key registration request.
pub(crate) fn parse_created_key(provider: &str, status: StatusCode, body: &str) -> Result<KeyId> {
    if !status.is_success() {
        return Err(GitError::from_status(provider, status, body.to_string()));
    }
    let created: KeyResponse =
        serde_json::from_str(body).map_err(|e| GitError::InvalidResponse {
            provider: provider.to_string(),
            message: format!("missing or malformed key id: {e}"),
        })?;
    tracing::debug!(provider, id = created.id, title = ?created.title, "key registered");
    Ok(KeyId(created.id))
}

pub(crate) fn parse_base_url(api_base: &str) -> Result<Url> {
    Url::parse(api_base).map_err(|e| GitError::InvalidBaseUrl {
        url: api_base.to_string(),
        source: e,
    })
}

/// `{base}/{path}` without doubling or losing slashes.
pub(crate) fn endpoint(base: &Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}

pub(crate) fn http_client(provider: &str) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("slingshot/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| GitError::Transport {
            provider: provider.to_string(),
            source: e,
        })
}

/// Status and body of a finished request; network failures become `Transport`.
pub(crate) fn send(
    provider: &str,
    request: reqwest::blocking::RequestBuilder,
) -> Result<(StatusCode, String)> {
    let transport = |e| GitError::Transport {
        provider: provider.to_string(),
        source: e,
    };
    let response = request.send().map_err(transport)?;
    let status = response.status();
    let body = response.text().map_err(transport)?;
    Ok((status, body))
}
