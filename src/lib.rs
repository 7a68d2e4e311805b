//! This crate implements the server side of HTTP Digest Auth (IETF RFC 2617, `qop=auth`, MD5).
//!
//! Credentials come from an `htdigest` file (`user:realm:HA1` lines). The server issues
//! a nonce with every challenge and remembers the highest `nc` counter accepted for it,
//! so captured requests can't be replayed. Idle nonces are dropped by a sweep that the
//! application runs periodically.
//!
//! The HTTP plumbing stays with the application: it sends the challenge header,
//! hands the parsed `Authorization` header to [`DigestValidator::validate()`] and maps
//! `false` to a 401.
//!
//! # Examples
//!
//! Basic usage:
//!
//! ```
//! use htdigest_auth::{Algorithm, AuthorizationRequest, CredentialStore, DigestValidator, HttpMethod};
//!
//! // Normally loaded with CredentialStore::from_file(".htdigest")
//! let store: CredentialStore = "Mufasa:testrealm@host.com:939e7578ed9e3c518a452acee763bce9"
//!     .parse()
//!     .unwrap();
//! let validator = DigestValidator::new(store);
//!
//! // Unauthenticated request: answer 401 with this header
//! let challenge = validator.challenge("testrealm@host.com");
//! assert!(challenge.to_string().starts_with(r#"Digest realm="testrealm@host.com", qop="auth""#));
//!
//! // ... the client computes its response (done by hand here) ...
//! let ha1 = Algorithm.hash_str("Mufasa:testrealm@host.com:Circle Of Life");
//! let ha2 = Algorithm.hash_str("GET:/dir/index.html");
//! let response = Algorithm.hash_str(&format!("{}:{}:00000001:0a4f113b:auth:{}", ha1, challenge.nonce, ha2));
//!
//! // ... and retries with an Authorization header
//! let header = format!(
//!     r#"Digest username="Mufasa", realm="testrealm@host.com", nonce="{}", uri="/dir/index.html", qop=auth, nc=00000001, cnonce="0a4f113b", response="{}""#,
//!     challenge.nonce, response
//! );
//! let request = AuthorizationRequest::parse(&header, HttpMethod::GET).unwrap();
//!
//! assert!(validator.validate(&request));
//! // the same nonce count can't be used twice
//! assert!(!validator.validate(&request));
//!
//! // run this from a timer
//! validator.expire_nonces();
//! ```

mod credentials;
mod digest;
mod enums;
mod error;
mod nonce;
mod utils;
mod validator;

pub use error::{Error, Result};

pub use crate::credentials::CredentialStore;
pub use crate::digest::{parse_header_map, AuthorizationRequest, WwwAuthenticateHeader};
pub use crate::nonce::{
    NonceConfig, NonceRecord, NonceRegistry, DEFAULT_INACTIVITY_LIMIT, DEFAULT_MAX_LIVE_NONCES,
};
pub use crate::validator::DigestValidator;

pub use crate::enums::*;

/// Load an htdigest file and build a validator with the default nonce settings.
/// It's just a convenience method to call [`CredentialStore::from_file()`] and [`DigestValidator::new()`].
pub fn from_htdigest_file<P: AsRef<std::path::Path>>(path: P) -> Result<DigestValidator> {
    Ok(DigestValidator::new(CredentialStore::from_file(path)?))
}

#[test]
fn test_alice_scenario() {
    let ha1 = Algorithm.hash_str("alice:example.com:secret");
    assert_eq!(ha1, "b1726872c344b6dc8365b774f8fd6412");

    let src = format!(
        "# htdigest\nalice:example.com:{}\nbob:example.com:0123456789abcdef0123456789abcdef\n",
        ha1
    );
    let validator = DigestValidator::new(src.parse().unwrap());

    let nonce = validator.issue_nonce();
    let ha2 = Algorithm.hash_str("GET:/private");
    let response = Algorithm.hash_str(&format!("{}:{}:00000001:abc123:auth:{}", ha1, nonce, ha2));

    let header = format!(
        r#"Digest username="alice", realm="example.com", nonce="{}", uri="/private", qop=auth, nc=00000001, cnonce="abc123", response="{}", algorithm=MD5"#,
        nonce, response
    );
    let request = AuthorizationRequest::parse(&header, HttpMethod::GET).unwrap();

    assert!(validator.validate(&request));
    assert!(!validator.validate(&request));
}

#[test]
fn test_from_htdigest_file() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "alice:example.com:b1726872c344b6dc8365b774f8fd6412").unwrap();
    writeln!(file, "broken:line").unwrap();

    match from_htdigest_file(file.path()) {
        Err(Error::InvalidRecord { line: 2, fields: 2 }) => {}
        other => panic!("unexpected result {:?}", other),
    }
}
