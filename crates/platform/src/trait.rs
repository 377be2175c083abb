//! PlatformConfigurator trait

use crate::error::PlatformError;

/// A source of the initial machine configuration.
#[async_trait::async_trait]
pub trait PlatformConfigurator: Send + Sync {
    /// Platform name, recorded in the configuration source trail.
    fn name(&self) -> &str;

    /// Fetch the raw configuration, possibly gzip-compressed.
    ///
    /// Returns [`PlatformError::NoConfigSource`] when the platform has no
    /// configuration for this node.
    async fn configuration(&self) -> Result<Vec<u8>, PlatformError>;
}
