use async_trait::async_trait;
use common::credentials::CredentialProvider;
use common::models::{Credential, Platform};
use common::Result;

/// Credential provider backed by environment variables.
///
/// Stands in for the external key storage: each platform's key material is
/// read on demand and never cached here, so rotating an env var takes
/// effect on the next fetch.
pub struct EnvCredentialProvider;

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn get_credential(&self, platform: Platform) -> Result<Option<Credential>> {
        let credential = match platform {
            Platform::Bybit => env("BYBIT_API_KEY").map(|api_key| Credential {
                platform,
                api_key,
                api_secret: env("BYBIT_API_SECRET"),
                wallet_address: None,
                private_key: None,
            }),
            Platform::Woox => env("WOOX_API_KEY").map(|api_key| Credential {
                platform,
                api_key,
                api_secret: env("WOOX_API_SECRET"),
                wallet_address: None,
                private_key: None,
            }),
            Platform::Paradex => env("PARADEX_L2_ADDRESS").map(|address| Credential {
                platform,
                api_key: address.clone(),
                api_secret: None,
                wallet_address: Some(address),
                private_key: env("PARADEX_L2_PRIVATE_KEY"),
            }),
            Platform::Hyperliquid => env("HYPERLIQUID_WALLET_ADDRESS").map(|address| Credential {
                platform,
                api_key: address.clone(),
                api_secret: None,
                wallet_address: Some(address),
                private_key: None,
            }),
        };
        Ok(credential)
    }
}
