use crate::{Error, Error::*, Result};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use digest::Digest;
use md5::Md5;

/// Hashing algorithm used for HA1, HA2 and the response digest.
///
/// Only MD5 is supported; this is what `htdigest` files are generated with.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Algorithm;

impl Algorithm {
    /// Calculate a hash of bytes, lowercase hex encoded
    pub fn hash(self, bytes: &[u8]) -> String {
        let mut hash = Md5::new();
        hash.update(bytes);
        hex::encode(hash.finalize())
    }

    /// Calculate a hash of string's bytes
    pub fn hash_str(self, bytes: &str) -> String {
        self.hash(bytes.as_bytes())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    /// Parse from the format used in the Authorization header
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MD5" => Ok(Algorithm),
            _ => Err(UnknownAlgorithm(s.into())),
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str("MD5")
    }
}

/// QOP field values. `auth-int` is not accepted.
#[derive(Debug, PartialEq, Clone, Copy)]
#[allow(non_camel_case_types)]
pub enum Qop {
    AUTH,
}

impl FromStr for Qop {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auth" => Ok(Qop::AUTH),
            _ => Err(BadQop(s.into())),
        }
    }
}

impl Display for Qop {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Qop::AUTH => "auth",
        })
    }
}

/// HTTP method of the request being authenticated (part of HA2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpMethod<'a> {
    GET,
    POST,
    HEAD,
    PUT,
    DELETE,
    OTHER(&'a str),
}

impl<'a> Default for HttpMethod<'a> {
    fn default() -> Self {
        HttpMethod::GET
    }
}

impl<'a> From<&'a str> for HttpMethod<'a> {
    fn from(s: &'a str) -> Self {
        match s {
            "GET" => HttpMethod::GET,
            "POST" => HttpMethod::POST,
            "HEAD" => HttpMethod::HEAD,
            "PUT" => HttpMethod::PUT,
            "DELETE" => HttpMethod::DELETE,
            other => HttpMethod::OTHER(other),
        }
    }
}

#[cfg(feature = "http")]
impl<'a> From<&'a http::Method> for HttpMethod<'a> {
    fn from(method: &'a http::Method) -> Self {
        HttpMethod::from(method.as_str())
    }
}

impl<'a> Display for HttpMethod<'a> {
    /// Convert to uppercase string
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::OTHER(s) => s,
        })
    }
}
