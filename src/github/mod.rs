//! GitHub repository metadata client.

pub mod api_types;
mod backoff;
mod client;
mod error;
mod identifier;
mod types;

pub use backoff::BackoffPolicy;
pub use client::{GitHubClient, HttpResponse, ReqwestTransport, Transport};
pub use error::FetchError;
pub use identifier::{IdentifierError, RepoId};
pub use types::{RepoMetadata, RepoReadme, RepoSnapshot, RepoStats};
