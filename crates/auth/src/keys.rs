//! RSA key lookup by key id.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use jsonwebtoken::{DecodingKey, EncodingKey};

use crate::AuthError;

const PUBLIC_SUFFIX: &str = ".pub.pem";
const PRIVATE_SUFFIX: &str = ".pem";

/// Resolves signing and verification keys by key id.
pub trait KeyLookup: Send + Sync {
    /// Key used to sign new tokens.
    fn private_key(&self, kid: &str) -> Result<&EncodingKey, AuthError>;

    /// Key used to verify tokens carrying `kid`.
    fn public_key(&self, kid: &str) -> Result<&DecodingKey, AuthError>;
}

struct KeyPair {
    private: Option<EncodingKey>,
    public: DecodingKey,
}

/// In-memory key set.
#[derive(Default)]
pub struct KeyStore {
    keys: HashMap<String, KeyPair>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key from PEM text. The private half is optional; without it
    /// the key can only verify.
    pub fn add_pem(
        &mut self,
        kid: impl Into<String>,
        private_pem: Option<&[u8]>,
        public_pem: &[u8],
    ) -> Result<(), AuthError> {
        let kid = kid.into();
        let invalid = |reason: jsonwebtoken::errors::Error| AuthError::Key {
            kid: kid.clone(),
            reason: reason.to_string(),
        };

        let private = private_pem
            .map(EncodingKey::from_rsa_pem)
            .transpose()
            .map_err(invalid)?;
        let public = DecodingKey::from_rsa_pem(public_pem).map_err(invalid)?;

        self.keys.insert(kid, KeyPair { private, public });
        Ok(())
    }

    /// Loads every `<kid>.pub.pem` in `dir`, with its `<kid>.pem` private
    /// key when present.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, AuthError> {
        let dir = dir.as_ref();
        let io_err = |source| AuthError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut files: BTreeMap<String, (Option<Vec<u8>>, Option<Vec<u8>>)> = BTreeMap::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if let Some(kid) = name.strip_suffix(PUBLIC_SUFFIX) {
                let pem = std::fs::read(&path).map_err(io_err)?;
                files.entry(kid.to_string()).or_default().1 = Some(pem);
            } else if let Some(kid) = name.strip_suffix(PRIVATE_SUFFIX) {
                let pem = std::fs::read(&path).map_err(io_err)?;
                files.entry(kid.to_string()).or_default().0 = Some(pem);
            }
        }

        let mut store = Self::new();
        for (kid, (private, public)) in files {
            let Some(public) = public else {
                return Err(AuthError::Key {
                    kid,
                    reason: format!("missing {PUBLIC_SUFFIX} file"),
                });
            };
            store.add_pem(kid, private.as_deref(), &public)?;
        }

        if store.is_empty() {
            tracing::warn!(path = %dir.display(), "no keys found, every token will be rejected");
        } else {
            tracing::info!(path = %dir.display(), keys = store.len(), "keys loaded");
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }
}

impl KeyLookup for KeyStore {
    fn private_key(&self, kid: &str) -> Result<&EncodingKey, AuthError> {
        self.keys
            .get(kid)
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))?
            .private
            .as_ref()
            .ok_or_else(|| AuthError::NoSigningKey(kid.to_string()))
    }

    fn public_key(&self, kid: &str) -> Result<&DecodingKey, AuthError> {
        self.keys
            .get(kid)
            .map(|pair| &pair.public)
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KID: &str = "54bb2165-71e1-41a6-af3e-7da4a0e1e2c1";

    fn testdata() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata")
    }

    #[test]
    fn loads_key_pairs_from_dir() {
        let store = KeyStore::load_from_dir(testdata()).unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.contains(KID));
        assert!(store.contains("rogue"));
        assert!(store.private_key(KID).is_ok());
        assert!(store.public_key(KID).is_ok());
    }

    #[test]
    fn dir_without_pem_files_loads_empty() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
        let store = KeyStore::load_from_dir(dir).unwrap();
        assert!(store.is_empty());
        assert!(!KeyStore::load_from_dir(testdata()).unwrap().is_empty());
    }

    #[test]
    fn unknown_kid_is_rejected() {
        let store = KeyStore::load_from_dir(testdata()).unwrap();
        assert!(matches!(
            store.public_key("nope"),
            Err(AuthError::UnknownKey(_))
        ));
    }

    #[test]
    fn public_only_key_cannot_sign() {
        let public = std::fs::read(testdata().join(format!("{KID}.pub.pem"))).unwrap();
        let mut store = KeyStore::new();
        store.add_pem(KID, None, &public).unwrap();

        assert!(store.public_key(KID).is_ok());
        assert!(matches!(
            store.private_key(KID),
            Err(AuthError::NoSigningKey(_))
        ));
    }

    #[test]
    fn garbage_pem_is_rejected() {
        let mut store = KeyStore::new();
        let err = store.add_pem("bad", None, b"not a key").unwrap_err();
        assert!(matches!(err, AuthError::Key { .. }));
    }

    #[test]
    fn missing_dir_is_an_io_error() {
        let err = KeyStore::load_from_dir(testdata().join("missing")).err().unwrap();
        assert!(matches!(err, AuthError::Io { .. }));
    }
}
