use crate::enums::{Algorithm, HttpMethod, Qop};
use crate::utils::QuoteForDigest;
use crate::{Error, Error::*, Result};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

//region AuthorizationRequest

/// Fields of a client's `Authorization: Digest ...` header, plus the request method.
///
/// This is everything the validator needs for one request. The HTTP layer can
/// fill it in directly, or use [`AuthorizationRequest::parse()`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequest {
    pub username: String,
    pub realm: String,
    /// Server nonce echoed back by the client
    pub nonce: String,
    /// HTTP method of the request, uppercase
    pub method: String,
    /// Request URI as sent in the digest header
    pub uri: String,
    /// Claimed response digest (lowercase hex)
    pub response: String,
    pub qop: Qop,
    /// Nonce count, 8 hex digits as sent by the client
    pub nc: String,
    /// Client nonce
    pub cnonce: String,
}

impl AuthorizationRequest {
    /// Parse the `Authorization` header value of a request made with `method`.
    ///
    /// # Errors
    /// If the header is malformed (missing closing quote), lacks any of the fields
    /// needed for `qop=auth` validation, or asks for an unsupported qop/algorithm.
    pub fn parse(input: &str, method: HttpMethod) -> Result<Self> {
        let input = strip_scheme(input);
        let mut kv = parse_header_map(input)?;

        if let Some(a) = kv.get("algorithm") {
            Algorithm::from_str(a)?;
        }

        let mut take = |key: &'static str| match kv.remove(key) {
            Some(v) => Ok(v),
            None => Err(MissingRequired(key, input.to_string())),
        };

        Ok(Self {
            username: take("username")?,
            realm: take("realm")?,
            nonce: take("nonce")?,
            method: method.to_string(),
            uri: take("uri")?,
            response: take("response")?,
            qop: Qop::from_str(&take("qop")?)?,
            nc: take("nc")?,
            cnonce: take("cnonce")?,
        })
    }
}

/// Drop surrounding whitespace and the auth scheme name, which is case-insensitive
fn strip_scheme(input: &str) -> &str {
    const SCHEME: &str = "Digest";

    let input = input.trim();
    match input.get(..SCHEME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(SCHEME) => &input[SCHEME.len()..],
        _ => input,
    }
}

/// Helper func that parses the key-value list of a digest header.
/// Keys are lowercased, quoted values are unescaped.
pub fn parse_header_map(input: &str) -> Result<HashMap<String, String>> {
    #[derive(Debug)]
    #[allow(non_camel_case_types)]
    enum ParserState<'i> {
        P_WHITE,
        P_NAME(usize),
        P_VALUE_BEGIN(&'i str),
        P_VALUE_QUOTED(&'i str),
        P_VALUE_QUOTED_NEXTLITERAL(&'i str),
        P_VALUE_PLAIN(&'i str),
    }

    let mut state = ParserState::P_WHITE;

    let mut parsed = HashMap::<String, String>::new();
    let mut current_value = String::new();

    let mut commit = |name: &str, value: &mut String| {
        parsed.insert(name.to_ascii_lowercase(), std::mem::take(value));
    };

    for (pos, c) in input.char_indices() {
        state = match state {
            ParserState::P_WHITE => {
                if c.is_alphabetic() {
                    ParserState::P_NAME(pos)
                } else {
                    ParserState::P_WHITE
                }
            }
            ParserState::P_NAME(name_start) => {
                if c == '=' {
                    ParserState::P_VALUE_BEGIN(input[name_start..pos].trim())
                } else {
                    ParserState::P_NAME(name_start)
                }
            }
            ParserState::P_VALUE_BEGIN(name) => {
                current_value.clear();
                match c {
                    '"' => ParserState::P_VALUE_QUOTED(name),
                    _ => {
                        current_value.push(c);
                        ParserState::P_VALUE_PLAIN(name)
                    }
                }
            }
            ParserState::P_VALUE_QUOTED(name) => match c {
                '"' => {
                    commit(name, &mut current_value);
                    ParserState::P_WHITE
                }
                '\\' => ParserState::P_VALUE_QUOTED_NEXTLITERAL(name),
                _ => {
                    current_value.push(c);
                    ParserState::P_VALUE_QUOTED(name)
                }
            },
            ParserState::P_VALUE_PLAIN(name) => {
                if c == ',' || c.is_ascii_whitespace() {
                    commit(name, &mut current_value);
                    ParserState::P_WHITE
                } else {
                    current_value.push(c);
                    ParserState::P_VALUE_PLAIN(name)
                }
            }
            ParserState::P_VALUE_QUOTED_NEXTLITERAL(name) => {
                current_value.push(c);
                ParserState::P_VALUE_QUOTED(name)
            }
        };
    }

    match state {
        ParserState::P_VALUE_PLAIN(name) => commit(name, &mut current_value),
        ParserState::P_WHITE => {}
        _ => {
            return Err(InvalidHeaderSyntax(format!(
                "Unexpected end state {:?} in: {}",
                state, input
            )))
        }
    }

    Ok(parsed)
}

//endregion

//region WwwAuthenticateHeader

/// Challenge sent to an unauthenticated client in the `WWW-Authenticate` header
#[derive(Debug, Clone, PartialEq)]
pub struct WwwAuthenticateHeader {
    /// Authorization realm
    pub realm: String,
    /// Freshly issued server nonce
    pub nonce: String,
    /// Set when re-challenging a client whose nonce expired, so it can retry
    /// without asking the user for the password again
    pub stale: bool,
    pub algorithm: Algorithm,
    pub qop: Qop,
}

impl WwwAuthenticateHeader {
    pub fn new(realm: &str, nonce: String) -> Self {
        WwwAuthenticateHeader {
            realm: realm.to_owned(),
            nonce,
            stale: false,
            algorithm: Algorithm,
            qop: Qop::AUTH,
        }
    }

    pub fn set_stale(&mut self, stale: bool) {
        self.stale = stale;
    }

    /// Produce a header string (also accessible through the Display trait)
    pub fn to_header_string(&self) -> String {
        self.to_string()
    }
}

impl Display for WwwAuthenticateHeader {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "Digest realm=\"{}\", qop=\"{}\", nonce=\"{}\"",
            self.realm.quote_for_digest(),
            self.qop,
            self.nonce.quote_for_digest()
        )?;

        if self.stale {
            f.write_str(", stale=true")?;
        }

        write!(f, ", algorithm={}", self.algorithm)
    }
}

impl FromStr for WwwAuthenticateHeader {
    type Err = Error;

    /// Parse a challenge header. This is the inverse of the `Display` impl, for
    /// clients and test harnesses that need to read back what the server sent.
    fn from_str(input: &str) -> Result<Self> {
        let input = strip_scheme(input);
        let mut kv = parse_header_map(input)?;

        Ok(WwwAuthenticateHeader {
            realm: kv
                .remove("realm")
                .ok_or_else(|| MissingRequired("realm", input.to_string()))?,
            nonce: kv
                .remove("nonce")
                .ok_or_else(|| MissingRequired("nonce", input.to_string()))?,
            stale: match kv.get("stale") {
                Some(v) => v.eq_ignore_ascii_case("true"),
                None => false,
            },
            algorithm: match kv.get("algorithm") {
                Some(a) => Algorithm::from_str(a)?,
                None => Algorithm,
            },
            qop: match kv.get("qop") {
                Some(q) => Qop::from_str(q.trim())?,
                None => Qop::AUTH,
            },
        })
    }
}

//endregion

//region TESTS


//endregion
