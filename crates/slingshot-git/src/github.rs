// ABOUTME: GitHub SSH key API client
// ABOUTME: POST/DELETE /user/keys with bearer auth; deletion succeeds only on 204

use crate::error::{GitError, Result};
use crate::provider::{
    endpoint, http_client, parse_base_url, parse_created_key, send, GitProvider, KeyId,
    NewKeyRequest,
};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Public GitHub API.
pub const GITHUB_API: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const MEDIA_TYPE: &str = "application/vnd.github+json";

/// GitHub (or GitHub Enterprise) account keys.
#[derive(Debug, Clone)]
pub struct GitHub {
    api_base: Url,
    client: Client,
}

impl GitHub {
    pub fn new() -> Result<Self> {
        Self::with_api_base(GITHUB_API)
    }

    /// Point at a GitHub Enterprise API root, e.g. `https://ghe.example.com/api/v3`.
    pub fn with_api_base(api_base: &str) -> Result<Self> {
        Ok(Self {
            api_base: parse_base_url(api_base)?,
            client: http_client("github")?,
        })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }
}

impl GitProvider for GitHub {
    fn name(&self) -> &str {
        "github"
    }

    fn hostname(&self) -> &str {
        self.api_base.host_str().unwrap_or_default()
    }

    fn matches_host(&self, host: &str) -> bool {
        let api_host = self.hostname();
        api_host.eq_ignore_ascii_case(host)
            || (api_host.eq_ignore_ascii_case("api.github.com")
                && host.eq_ignore_ascii_case("github.com"))
    }

    fn add_key(&self, public_key: &str, title: &str, token: &SecretString) -> Result<KeyId> {
        let request = self
            .client
            .post(endpoint(&self.api_base, "user/keys"))
            .bearer_auth(token.expose_secret())
            .header(ACCEPT, MEDIA_TYPE)
            .header("X-GitHub-Api-Version", API_VERSION)
            .json(&NewKeyRequest::new(title, public_key));

        let (status, body) = send(self.name(), request)?;
        parse_created_key(self.name(), status, &body)
    }

    fn remove_key(&self, id: KeyId, token: &SecretString) -> Result<()> {
        let request = self
            .client
            .delete(endpoint(&self.api_base, &format!("user/keys/{id}")))
            .bearer_auth(token.expose_secret())
            .header(ACCEPT, MEDIA_TYPE)
            .header("X-GitHub-Api-Version", API_VERSION);

        let (status, body) = send(self.name(), request)?;
        interpret_removal(status, body)?;
        tracing::debug!(%id, "github key removed");
        Ok(())
    }
}

/// GitHub documents exactly 204 No Content for a deleted key.
fn interpret_removal(status: StatusCode, body: String) -> Result<()> {
    if status == StatusCode::NO_CONTENT {
        Ok(())
    } else if status.is_success() {
        Err(GitError::InvalidResponse {
            provider: "github".to_string(),
            message: format!("expected 204 No Content for key deletion, got {status}"),
        })
    } else {
        Err(GitError::from_status("github", status, body))
    }
}
