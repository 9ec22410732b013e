//! Bearer tokens for Azure Storage.
//!
//! Tokens are issued by [`azure_identity`], which discovers the identity of the process from its
//! environment: service principal or workload identity variables, the managed identity of App
//! Service, Container Apps and virtual machines, or a local Azure CLI login. Set
//! `AZURE_CREDENTIAL_KIND` to pin one of these sources. Issued tokens are cached by the
//! credential until shortly before they expire.

use std::fmt;
use std::sync::Arc;

use super::common::{BackendError, BackendResult};

/// OAuth scope granting access to Azure Storage.
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// A source of bearer tokens for Azure Storage requests.
#[async_trait::async_trait]
pub trait TokenCredential: fmt::Debug + Send + Sync + 'static {
    /// Returns a valid access token.
    async fn token(&self) -> BackendResult<String>;
}

/// Creates the credential for the identity configured in the process environment.
pub fn default_credential() -> BackendResult<Arc<dyn TokenCredential>> {
    let inner = azure_identity::create_credential().map_err(BackendError::Credential)?;
    Ok(Arc::new(IdentityCredential(inner)))
}

struct IdentityCredential(Arc<dyn azure_core::auth::TokenCredential>);

impl fmt::Debug for IdentityCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityCredential").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl TokenCredential for IdentityCredential {
    async fn token(&self) -> BackendResult<String> {
        let token = self
            .0
            .get_token(&[STORAGE_SCOPE])
            .await
            .map_err(BackendError::Credential)?;
        Ok(token.token.secret().to_owned())
    }
}
