use crate::GatewayError;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Seconds a signed request stays valid
const EXPIRES_IN_SECS: i64 = 5;

/// Signed request headers
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    pub api_expires: String,
    pub api_key: String,
    pub api_signature: String,
}

/// API key pair for authenticated exchange calls
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Headers for a request to `path` (including any query string)
    pub fn headers(&self, verb: &str, path: &str, body: &str) -> Result<AuthHeaders, GatewayError> {
        let expires = Utc::now().timestamp() + EXPIRES_IN_SECS;
        let signature = self.sign(verb, path, expires, body)?;

        Ok(AuthHeaders {
            api_expires: expires.to_string(),
            api_key: self.api_key.clone(),
            api_signature: signature,
        })
    }

    /// hex(HMAC-SHA256(secret, verb + path + expires + body))
    pub fn sign(
        &self,
        verb: &str,
        path: &str,
        expires: i64,
        body: &str,
    ) -> Result<String, GatewayError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| GatewayError::Auth(format!("invalid secret: {}", e)))?;
        mac.update(verb.as_bytes());
        mac.update(path.as_bytes());
        mac.update(expires.to_string().as_bytes());
        mac.update(body.as_bytes());

        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}
