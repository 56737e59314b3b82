// ABOUTME: Registry of known Git providers
// ABOUTME: Looks providers up by name or hostname; later registrations shadow earlier ones

use crate::error::{GitError, Result};
use crate::github::GitHub;
use crate::gitlab::GitLab;
use crate::provider::GitProvider;

/// Known provider implementations, selectable by name or hostname.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn GitProvider>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// GitHub and GitLab against their public APIs.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Box::new(GitHub::new()?));
        registry.register(Box::new(GitLab::new()?));
        Ok(registry)
    }

    /// Add a provider. A later provider with the same name or host takes precedence.
    pub fn register(&mut self, provider: Box<dyn GitProvider>) {
        tracing::debug!(
            provider = provider.name(),
            host = provider.hostname(),
            "registered git provider"
        );
        self.providers.push(provider);
    }

    /// Resolve `selector` as a provider name (case-insensitive) or a hostname.
    /// A full URL is reduced to its host first.
    pub fn get(&self, selector: &str) -> Result<&dyn GitProvider> {
        let selector = selector.trim();
        let host = url::Url::parse(selector)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| selector.to_string());

        self.providers
            .iter()
            .rev()
            .find(|p| p.name().eq_ignore_ascii_case(selector) || p.matches_host(&host))
            .map(|p| p.as_ref())
            .ok_or_else(|| GitError::UnknownProvider(selector.to_string()))
    }

    /// Names of all registered providers, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
