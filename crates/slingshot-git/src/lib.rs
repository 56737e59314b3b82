// ABOUTME: Git hosting provider key lifecycle for slingshot
// ABOUTME: GitProvider trait, GitHub and GitLab clients, and a provider registry

pub mod error;
pub mod github;
pub mod gitlab;
pub mod provider;
pub mod registry;

pub use error::{GitError, Result};
pub use github::{GitHub, GITHUB_API};
pub use gitlab::{GitLab, GITLAB_API};
pub use provider::{strip_line_breaks, GitProvider, KeyId};
pub use registry::ProviderRegistry;
