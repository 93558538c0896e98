//! The `ExternalSource` trait every retrieval source implements.

use async_trait::async_trait;

use crate::types::{Reference, Result};

#[async_trait]
pub trait ExternalSource: Send + Sync {
    fn name(&self) -> &str;

    /// Check reachability once, at router construction time.
    async fn probe(&self) -> bool;

    /// Search for `query`, returning candidate references. Failures are the
    /// caller's (router's) responsibility to swallow — this returns `Err`
    /// for any failure and lets the router decide.
    async fn search(&self, query: &str) -> Result<Vec<Reference>>;
}
