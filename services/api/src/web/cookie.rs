//! services/api/src/web/cookie.rs
//!
//! The signed session cookie. One `SessionCookie` is built at startup and shared
//! by the HTTP session middleware and the push gateway, so both always agree on
//! the cookie name and the signing secret.

use chrono::Duration;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Why a cookie header did not yield a session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CookieError {
    #[error("session cookie not present")]
    Missing,
    #[error("session cookie signature is invalid")]
    BadSignature,
}

#[derive(Clone)]
pub struct SessionCookie {
    name: String,
    secret: Vec<u8>,
    max_age: Duration,
}

impl std::fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, secret: impl AsRef<[u8]>, max_age: Duration) -> Self {
        Self {
            name: name.into(),
            secret: secret.as_ref().to_vec(),
            max_age,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// `<session_id>.<hex hmac-sha256(session_id)>`
    pub fn sign(&self, session_id: &str) -> String {
        format!("{}.{}", session_id, hex::encode(self.mac(session_id)))
    }

    /// Checks the signature on a cookie value and returns the session id.
    pub fn verify(&self, value: &str) -> Result<String, CookieError> {
        let (session_id, signature) = value.rsplit_once('.').ok_or(CookieError::BadSignature)?;
        let signature = hex::decode(signature).ok_or(CookieError::BadSignature)?;

        let mut mac = self.hasher();
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| CookieError::BadSignature)?;
        Ok(session_id.to_string())
    }

    /// Finds this cookie in a raw `Cookie` header and verifies it.
    pub fn session_id_from_header(&self, cookie_header: Option<&str>) -> Result<String, CookieError> {
        let value = cookie_header
            .and_then(|header| {
                header.split(';').find_map(|pair| {
                    let (name, value) = pair.trim().split_once('=')?;
                    (name == self.name).then_some(value)
                })
            })
            .ok_or(CookieError::Missing)?;
        self.verify(value)
    }

    /// A `Set-Cookie` value carrying a freshly signed session id.
    pub fn set_cookie(&self, session_id: &str) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
            self.name,
            self.sign(session_id),
            self.max_age.num_seconds()
        )
    }

    pub fn clear_cookie(&self) -> String {
        format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", self.name)
    }

    fn hasher(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length")
    }

    fn mac(&self, session_id: &str) -> Vec<u8> {
        let mut mac = self.hasher();
        mac.update(session_id.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

// ---------------------------------------------------------------------------
// hex encoding helper (no extra dep)
// ---------------------------------------------------------------------------

mod hex {
    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Decode a hex string; `None` on odd length or non-hex characters.
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
            .collect()
    }
}
