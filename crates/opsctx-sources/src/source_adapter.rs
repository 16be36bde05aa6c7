use async_trait::async_trait;

use crate::{FetchScope, Identity, SourceError, SourceKind};

/// Result of one adapter call: every record of the source, or the cause.
pub type FetchOutcome<T> = Result<Vec<T>, SourceError>;

/// Resolves the primary lookup key into an [`Identity`].
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, key: &str) -> Result<Identity, SourceError>;
}

/// Uniform fetch capability over one external system's records.
///
/// Implementations own their transport and pagination, keep no state between
/// calls, and report an empty result set as success.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    type Record: Send + 'static;

    fn kind(&self) -> SourceKind;

    async fn fetch(&self, identity: &Identity, scope: &FetchScope) -> FetchOutcome<Self::Record>;
}
