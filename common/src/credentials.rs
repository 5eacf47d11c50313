use crate::models::{Credential, Platform};
use crate::Result;
use async_trait::async_trait;

/// Supplies decrypted per-platform credentials on demand.
///
/// `Ok(None)` means no credential is configured for the platform, which the
/// caller reports as a per-platform condition. `Err` means the provider
/// itself failed and is treated as an infrastructure failure.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_credential(&self, platform: Platform) -> Result<Option<Credential>>;
}
