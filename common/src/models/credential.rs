use crate::models::Platform;

/// Decrypted credential bundle for one platform.
///
/// Borrowed read-only by connectors for the duration of a fetch call; the
/// key material is never persisted or logged by this crate, which is why
/// there is no Debug or Serialize derive here.
#[derive(Clone)]
pub struct Credential {
    pub platform: Platform,
    pub api_key: String,
    pub api_secret: Option<String>,
    pub wallet_address: Option<String>,
    pub private_key: Option<String>,
}

impl Credential {
    pub fn api_secret(&self) -> crate::Result<&str> {
        self.api_secret.as_deref().ok_or_else(|| {
            crate::Error::Auth(format!("{}: API secret not configured", self.platform))
        })
    }

    pub fn wallet_address(&self) -> crate::Result<&str> {
        self.wallet_address.as_deref().ok_or_else(|| {
            crate::Error::Auth(format!("{}: wallet address not configured", self.platform))
        })
    }

    pub fn private_key(&self) -> crate::Result<&str> {
        self.private_key.as_deref().ok_or_else(|| {
            crate::Error::Auth(format!("{}: private key not configured", self.platform))
        })
    }
}
