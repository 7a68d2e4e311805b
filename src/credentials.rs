//! htdigest-style credential store.
//!
//! Each non-comment line has the form `user:realm:ha1`, where `ha1` is the
//! lowercase hex MD5 of `user:realm:password`. This is what Apache's
//! `htdigest` tool writes.

use crate::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Read-only lookup of (username, realm) to the precomputed HA1 digest
#[derive(Debug, Default, Clone)]
pub struct CredentialStore {
    /// realm -> user -> HA1
    realms: HashMap<String, HashMap<String, String>>,
}

impl CredentialStore {
    /// Read and parse all records from a reader.
    ///
    /// # Errors
    /// `Error::Io` if reading fails, `Error::InvalidRecord` if any line does not
    /// have exactly 3 fields. Nothing is indexed in either case.
    pub fn load<R: Read>(mut source: R) -> Result<Self> {
        let mut text = String::new();
        source.read_to_string(&mut text)?;
        Self::parse(&text)
    }

    /// Load a credential file from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        tracing::debug!(path = %path.as_ref().display(), "reading htdigest file");
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Parse the htdigest text format. Later duplicates of a (user, realm) pair win.
    ///
    /// Only empty lines are skipped; a line of blanks is a 1-field record and fails.
    pub fn parse(text: &str) -> Result<Self> {
        let mut realms: HashMap<String, HashMap<String, String>> = HashMap::new();

        for (n, line) in text.lines().enumerate() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split(':').map(str::trim_start).collect();
            match fields.as_slice() {
                [user, realm, ha1] => {
                    realms
                        .entry(realm.to_string())
                        .or_default()
                        .insert(user.to_string(), ha1.to_string());
                }
                _ => {
                    return Err(Error::InvalidRecord {
                        line: n + 1,
                        fields: fields.len(),
                    })
                }
            }
        }

        let store = CredentialStore { realms };
        tracing::info!(entries = store.len(), "loaded htdigest credentials");
        Ok(store)
    }

    /// Get the HA1 digest stored for a user in a realm
    pub fn lookup(&self, username: &str, realm: &str) -> Option<&str> {
        self.realms
            .get(realm)
            .and_then(|users| users.get(username))
            .map(String::as_str)
    }

    /// Number of (user, realm) entries
    pub fn len(&self) -> usize {
        self.realms.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromStr for CredentialStore {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::CredentialStore;
    use crate::Error;
    use std::io::Write;

    const SAMPLE: &str = "\
# generated by htdigest
alice:example.com:b1726872c344b6dc8365b774f8fd6412
bob: example.com: 0123456789abcdef0123456789abcdef

alice:other.realm:ffffffffffffffffffffffffffffffff
";

    #[test]
    fn test_parse() {
        let store: CredentialStore = SAMPLE.parse().unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(
            store.lookup("alice", "example.com"),
            Some("b1726872c344b6dc8365b774f8fd6412")
        );
        // leading whitespace of each field is trimmed
        assert_eq!(
            store.lookup("bob", "example.com"),
            Some("0123456789abcdef0123456789abcdef")
        );
        assert_eq!(
            store.lookup("alice", "other.realm"),
            Some("ffffffffffffffffffffffffffffffff")
        );
        assert_eq!(store.lookup("alice", "nope"), None);
        assert_eq!(store.lookup("carol", "example.com"), None);
    }

    #[test]
    fn test_duplicates_last_wins() {
        let store = CredentialStore::parse("a:r:1111\na:r:2222\n").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup("a", "r"), Some("2222"));
    }

    #[test]
    fn test_crlf_and_comments() {
        let store = CredentialStore::parse("#a:b\r\nu:r:h\r\n").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup("u", "r"), Some("h"));
    }

    #[test]
    fn test_bad_field_count_fails_whole_load() {
        for src in &[
            "alice:example.com:abcd\nbob:example.com\n",
            "alice:example.com:abcd\nbob:example.com:abcd:extra\n",
        ] {
            match CredentialStore::parse(src) {
                Err(Error::InvalidRecord { line, fields }) => {
                    assert_eq!(line, 2);
                    assert!(fields == 2 || fields == 4);
                }
                other => panic!("unexpected result {:?}", other),
            }
        }
    }

    #[test]
    fn test_blank_line_fails_whole_load() {
        match CredentialStore::parse("alice:r:h\n   \nbob:r:h\n") {
            Err(Error::InvalidRecord { line: 2, fields: 1 }) => {}
            other => panic!("unexpected result {:?}", other),
        }

        // truly empty lines are fine
        assert_eq!(CredentialStore::parse("alice:r:h\n\nbob:r:h\n").unwrap().len(), 2);
    }

    #[test]
    fn test_load_from_reader() {
        let store = CredentialStore::load(SAMPLE.as_bytes()).unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let store = CredentialStore::from_file(file.path()).unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("htdigest");
        assert!(matches!(
            CredentialStore::from_file(&missing),
            Err(Error::Io(_))
        ));
    }
}
