use crate::error::{Error, Result};
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use std::time::Duration;

type HmacSha1 = Hmac<Sha1>;

/// Produces the credential part of a request or a presigned URL.
pub trait Signer: Send + Sync {
    fn authorization(&self, method: &str, key: &str, start: i64, ttl: Duration) -> Result<String>;
}

/// Object storage request signature (`q-sign-algorithm=sha1`).
pub struct CosSigner {
    secret_id: String,
    secret_key: String,
}

impl CosSigner {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
        }
    }
}

fn hmac_hex(key: &[u8], message: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| Error::Upstream(format!("signing key rejected: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

impl Signer for CosSigner {
    fn authorization(&self, method: &str, key: &str, start: i64, ttl: Duration) -> Result<String> {
        if self.secret_id.is_empty() || self.secret_key.is_empty() {
            return Err(Error::Upstream(String::from(
                "storage credentials are not configured",
            )));
        }
        let key_time = format!("{};{}", start, start + ttl.as_secs() as i64);
        let sign_key = hmac_hex(self.secret_key.as_bytes(), &key_time)?;
        let http_string = format!(
            "{}\n/{}\n\n\n",
            method.to_lowercase(),
            key.trim_start_matches('/')
        );
        let string_to_sign = format!(
            "sha1\n{}\n{}\n",
            key_time,
            hex::encode(Sha1::digest(http_string.as_bytes()))
        );
        let signature = hmac_hex(sign_key.as_bytes(), &string_to_sign)?;
        Ok(format!(
            "q-sign-algorithm=sha1&q-ak={ak}&q-sign-time={kt}&q-key-time={kt}&q-header-list=&q-url-param-list=&q-signature={sig}",
            ak = self.secret_id,
            kt = key_time,
            sig = signature,
        ))
    }
}
