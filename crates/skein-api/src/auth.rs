//! Bearer tokens and credential digests.
//!
//! Tokens are HS256 JWTs whose `sub` claim is the author ID. Credentials are
//! never stored in the clear: the catalog keeps `salt$mac`, where `mac` is an
//! HMAC-SHA256 over salt and secret keyed by a server-side pepper.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use skein_catalog::{Authenticator, CatalogError, IssuedToken, Principal, Result};
use skein_core::AuthorId;

type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;

/// Minimum accepted length of a plaintext secret.
pub const MIN_SECRET_LEN: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// HS256 JWT implementation of [`Authenticator`].
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl JwtAuthenticator {
    /// Creates an authenticator signing with `secret`; tokens live `ttl_seconds`.
    #[must_use]
    pub fn new(secret: &[u8], ttl_seconds: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::seconds(i64::try_from(ttl_seconds).unwrap_or(i64::MAX / 1000)),
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn verify(&self, token: &str) -> Result<Principal> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| CatalogError::unauthenticated("invalid or expired token"))?;
        let author_id: AuthorId = data
            .claims
            .sub
            .parse()
            .map_err(|_| CatalogError::unauthenticated("invalid or expired token"))?;
        Ok(Principal::new(author_id))
    }

    fn issue(&self, principal: &Principal) -> Result<IssuedToken> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: principal.author_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, "failed to sign token");
            CatalogError::store_unavailable("token signing failed")
        })?;
        Ok(IssuedToken { token, expires_at })
    }
}

/// Produces and checks stored credential digests.
#[derive(Clone)]
pub struct CredentialDigest {
    pepper: Vec<u8>,
    /// Well-formed digest that no author owns, checked when a login names an
    /// unknown handle.
    decoy: String,
}

impl std::fmt::Debug for CredentialDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialDigest")
            .field("pepper", &"[REDACTED]")
            .finish()
    }
}

impl CredentialDigest {
    /// Creates a digester keyed by `pepper`.
    #[must_use]
    pub fn new(pepper: impl Into<Vec<u8>>) -> Self {
        let mut digester = Self {
            pepper: pepper.into(),
            decoy: String::new(),
        };
        digester.decoy = digester
            .encode(&[0_u8; SALT_LEN], "")
            .unwrap_or_default();
        digester
    }

    /// Digests a plaintext secret with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` if the secret is shorter than [`MIN_SECRET_LEN`].
    pub fn digest(&self, secret: &str) -> Result<String> {
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(CatalogError::validation(format!(
                "secret must be at least {MIN_SECRET_LEN} characters"
            )));
        }
        let mut salt = [0_u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        self.encode(&salt, secret)
    }

    /// Checks a plaintext secret against a stored digest in constant time.
    ///
    /// A malformed stored digest never matches.
    #[must_use]
    pub fn verify(&self, secret: &str, stored: &str) -> bool {
        let Some((salt, expected)) = stored.split_once('$') else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (
            URL_SAFE_NO_PAD.decode(salt),
            URL_SAFE_NO_PAD.decode(expected),
        ) else {
            return false;
        };
        self.mac(&salt, secret)
            .is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
    }

    /// Spends the same work as [`verify`](Self::verify) on a login whose
    /// handle matched no author, so response time does not reveal which
    /// handles exist.
    pub fn reject_unknown(&self, secret: &str) {
        std::hint::black_box(self.verify(secret, &self.decoy));
    }

    fn encode(&self, salt: &[u8], secret: &str) -> Result<String> {
        let mac = self.mac(salt, secret)?.finalize().into_bytes();
        Ok(format!(
            "{}${}",
            URL_SAFE_NO_PAD.encode(salt),
            URL_SAFE_NO_PAD.encode(mac)
        ))
    }

    fn mac(&self, salt: &[u8], secret: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.pepper)
            .map_err(|_| CatalogError::store_unavailable("credential key is unusable"))?;
        mac.update(salt);
        mac.update(secret.as_bytes());
        Ok(mac)
    }
}

/// Compares a presented shared secret with the configured one.
///
/// Both sides are hashed first so the comparison time does not depend on
/// where the inputs first differ.
#[must_use]
pub fn shared_secret_matches(presented: &str, configured: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(configured.as_bytes())
}

/// Returns a random secret for debug runs that configured none.
#[must_use]
pub fn ephemeral_secret() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
