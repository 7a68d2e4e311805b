use rand::Rng;
use std::string::ToString;

/// slash quoting for digest strings
pub trait QuoteForDigest {
    fn quote_for_digest(&self) -> String;
}

impl QuoteForDigest for &str {
    fn quote_for_digest(&self) -> String {
        self.to_string().quote_for_digest()
    }
}

impl QuoteForDigest for String {
    fn quote_for_digest(&self) -> String {
        self.replace('\\', "\\\\").replace('"', "\\\"")
    }
}

/// Number of random bytes in a nonce token (hex encoded to twice as many chars)
pub const TOKEN_BYTES: usize = 16;

/// Generate a fresh nonce token from the thread-local CSPRNG
pub fn random_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; TOKEN_BYTES] = rng.gen();
    hex::encode(bytes)
}
