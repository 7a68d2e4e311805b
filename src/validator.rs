use crate::credentials::CredentialStore;
use crate::digest::{AuthorizationRequest, WwwAuthenticateHeader};
use crate::enums::Algorithm;
use crate::nonce::{NonceConfig, NonceRegistry};
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;

/// Stand-in HA1 for users missing from the store. Never accepted.
const UNKNOWN_USER_HA1: &str = "00000000000000000000000000000000";

/// Parse `nc` as plain hex digits. Unlike `from_str_radix`, a sign prefix is refused.
fn parse_nonce_count(nc: &str) -> Option<u64> {
    if nc.is_empty() || !nc.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(nc, 16).ok()
}

/// Server side of Digest authentication.
///
/// Owns the credential store and the nonce registry. It is `Sync`; share one
/// instance (e.g. in an `Arc`) between all request handlers of a server.
#[derive(Debug)]
pub struct DigestValidator {
    credentials: CredentialStore,
    nonces: NonceRegistry,
    algorithm: Algorithm,
}

impl DigestValidator {
    pub fn new(credentials: CredentialStore) -> Self {
        Self::with_config(credentials, NonceConfig::default())
    }

    pub fn with_config(credentials: CredentialStore, config: NonceConfig) -> Self {
        DigestValidator {
            credentials,
            nonces: NonceRegistry::new(config),
            algorithm: Algorithm,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn nonces(&self) -> &NonceRegistry {
        &self.nonces
    }

    /// Issue a fresh nonce for a challenge
    pub fn issue_nonce(&self) -> String {
        self.nonces.issue()
    }

    /// Issue a fresh nonce and wrap it in a `WWW-Authenticate` challenge for `realm`
    pub fn challenge(&self, realm: &str) -> WwwAuthenticateHeader {
        WwwAuthenticateHeader::new(realm, self.issue_nonce())
    }

    /// Check a client's digest response. Accepts each (nonce, nc) pair at most once.
    pub fn validate(&self, request: &AuthorizationRequest) -> bool {
        self.validate_at(request, Instant::now())
    }

    /// Like [`validate()`](#method.validate), with an explicit time for the nonce bookkeeping
    pub fn validate_at(&self, request: &AuthorizationRequest, now: Instant) -> bool {
        // unknown users still go through the digest computation, against a
        // placeholder HA1, and are turned away only at the end
        let (ha1, known_user) = match self.credentials.lookup(&request.username, &request.realm) {
            Some(ha1) => (ha1, true),
            None => (UNKNOWN_USER_HA1, false),
        };

        let record = match self.nonces.get(&request.nonce) {
            Some(record) => record,
            None => {
                tracing::debug!(user = %request.username, "unknown or expired nonce");
                return false;
            }
        };

        let nc = match parse_nonce_count(&request.nc) {
            Some(nc) => nc,
            None => {
                tracing::debug!(user = %request.username, nc = %request.nc, "malformed nonce count");
                return false;
            }
        };

        if nc <= record.last_counter {
            tracing::debug!(
                user = %request.username,
                nc,
                last = record.last_counter,
                "nonce count replayed"
            );
            return false;
        }

        let h = self.algorithm;
        let ha2 = h.hash_str(&format!(
            "{method}:{uri}",
            method = request.method,
            uri = request.uri
        ));

        let expected = h.hash_str(&format!(
            "{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}",
            ha1 = ha1,
            nonce = request.nonce,
            nc = request.nc,
            cnonce = request.cnonce,
            qop = request.qop,
            ha2 = ha2
        ));

        let matches = bool::from(expected.as_bytes().ct_eq(request.response.as_bytes()));

        if !known_user {
            tracing::debug!(user = %request.username, realm = %request.realm, "unknown user");
            return false;
        }

        if !matches {
            tracing::debug!(user = %request.username, "digest mismatch");
            return false;
        }

        // re-checked under the registry lock; a concurrent request may have
        // committed a higher count or the sweep may have removed the nonce
        if !self.nonces.record_success(&request.nonce, nc, now) {
            tracing::debug!(user = %request.username, nc, "lost race on nonce count");
            return false;
        }

        true
    }

    /// Drop nonces idle for longer than the configured inactivity limit
    pub fn expire_nonces(&self) -> usize {
        self.nonces.expire_stale()
    }

    /// Sweep with an explicit time and inactivity limit
    pub fn expire_nonces_at(&self, now: Instant, limit: Duration) -> usize {
        self.nonces.expire(now, limit)
    }
}
