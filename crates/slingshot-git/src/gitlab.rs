// ABOUTME: GitLab SSH key API client
// ABOUTME: POST/DELETE /user/keys with PRIVATE-TOKEN; any 2xx on delete means removed

use crate::error::{GitError, Result};
use crate::provider::{
    endpoint, http_client, parse_base_url, parse_created_key, send, GitProvider, KeyId,
    NewKeyRequest,
};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Public GitLab API.
pub const GITLAB_API: &str = "https://gitlab.com/api/v4";

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// GitLab (gitlab.com or self-hosted) account keys.
#[derive(Debug, Clone)]
pub struct GitLab {
    name: String,
    api_base: Url,
    client: Client,
}

impl GitLab {
    pub fn new() -> Result<Self> {
        Self::with_api_base(GITLAB_API)
    }

    /// Self-hosted instance, e.g. `https://git.example.com/api/v4`.
    pub fn with_api_base(api_base: &str) -> Result<Self> {
        Ok(Self {
            name: "gitlab".to_string(),
            api_base: parse_base_url(api_base)?,
            client: http_client("gitlab")?,
        })
    }

    /// Register under a different name, so several instances can coexist.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }
}

impl GitProvider for GitLab {
    fn name(&self) -> &str {
        &self.name
    }

    fn hostname(&self) -> &str {
        self.api_base.host_str().unwrap_or_default()
    }

    fn add_key(&self, public_key: &str, title: &str, token: &SecretString) -> Result<KeyId> {
        let request = self
            .client
            .post(endpoint(&self.api_base, "user/keys"))
            .header(TOKEN_HEADER, token.expose_secret())
            .json(&NewKeyRequest::new(title, public_key));

        let (status, body) = send(self.name(), request)?;
        parse_created_key(self.name(), status, &body)
    }

    fn remove_key(&self, id: KeyId, token: &SecretString) -> Result<()> {
        let request = self
            .client
            .delete(endpoint(&self.api_base, &format!("user/keys/{id}")))
            .header(TOKEN_HEADER, token.expose_secret());

        let (status, body) = send(self.name(), request)?;
        interpret_removal(self.name(), status, body)?;
        tracing::debug!(provider = self.name(), %id, "gitlab key removed");
        Ok(())
    }
}

/// GitLab answers 204, older instances 200; anything in 2xx means removed.
fn interpret_removal(provider: &str, status: StatusCode, body: String) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(GitError::from_status(provider, status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_and_host() {
        let gitlab = GitLab::new().unwrap();
        assert_eq!(gitlab.name(), "gitlab");
        assert_eq!(gitlab.hostname(), "gitlab.com");
        assert!(gitlab.matches_host("gitlab.com"));
        assert_eq!(gitlab.api_base().path(), "/api/v4");
    }

    #[test]
    fn test_self_hosted_named_instance() {
        let gitlab = GitLab::with_api_base("https://git.example.com/api/v4")
            .unwrap()
            .named("work");
        assert_eq!(gitlab.name(), "work");
        assert!(gitlab.matches_host("git.example.com"));
    }

    #[test]
    fn test_removal_succeeds_on_any_2xx() {
        assert!(interpret_removal("gitlab", StatusCode::NO_CONTENT, String::new()).is_ok());
        assert!(interpret_removal("gitlab", StatusCode::OK, "{}".into()).is_ok());
    }

    #[test]
    fn test_removal_of_unknown_id_fails() {
        let err = interpret_removal(
            "gitlab",
            StatusCode::NOT_FOUND,
            r#"{"message":"404 Not Found"}"#.into(),
        )
        .unwrap_err();
        assert!(matches!(err, GitError::Api { .. }));
    }

    #[test]
    fn test_removal_with_expired_token() {
        let err = interpret_removal(
            "gitlab",
            StatusCode::UNAUTHORIZED,
            r#"{"message":"401 Unauthorized"}"#.into(),
        )
        .unwrap_err();
        assert!(err.is_auth());
    }
}
