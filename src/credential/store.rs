//! Credential storage backed by a single JSON file
//!
//! Persists a one-way digest of the spoken password plus a non-secret
//! hint. The plaintext phrase is never written anywhere.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Stored credential record: digest plus display hint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Hex-encoded SHA-256 of the lowercased phrase
    pub password_hash: String,
    /// First three characters of the phrase plus an ellipsis
    pub password_hint: String,
}

/// Errors from credential persistence
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to read credential file: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write credential file: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to encode credential: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("credential file is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
}

/// Reads and writes the credential file
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store for the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Digest and persist a confirmed phrase. The only durable write the
    /// store performs.
    pub fn store(&self, phrase: &str) -> Result<Credential, CredentialError> {
        let normalized = phrase.to_lowercase();
        let credential = Credential {
            password_hash: digest(&normalized),
            password_hint: hint(&normalized),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(CredentialError::Write)?;
        }

        let json =
            serde_json::to_string_pretty(&credential).map_err(CredentialError::Encode)?;
        std::fs::write(&self.path, json).map_err(CredentialError::Write)?;

        info!(path = ?self.path, hint = %credential.password_hint, "credential stored");
        Ok(credential)
    }

    /// Load the stored credential. `Ok(None)` when no file exists; a
    /// corrupt file is reported so the caller can fall back to setup.
    pub fn load(&self) -> Result<Option<Credential>, CredentialError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CredentialError::Read(e)),
        };

        match serde_json::from_str(&contents) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!(path = ?self.path, ?e, "credential file corrupt");
                Err(CredentialError::Corrupt(e))
            }
        }
    }

    /// Check a spoken phrase against a stored credential. Case-insensitive
    /// via the lowercase normalization used at store time.
    pub fn verify(&self, spoken: &str, credential: &Credential) -> bool {
        digest(&spoken.to_lowercase()) == credential.password_hash
    }
}

fn digest(normalized: &str) -> String {
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

fn hint(normalized: &str) -> String {
    let prefix: String = normalized.chars().take(3).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("voice_password.json"))
    }

    #[test]
    fn test_round_trip_verify() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let credential = store.store("open sesame").unwrap();
        assert!(store.verify("open sesame", &credential));
        assert!(store.verify("OPEN SESAME", &credential));
        assert!(!store.verify("open seasame", &credential));
    }

    #[test]
    fn test_load_absent_is_none() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.store("alpha gamma").unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert!(store.verify("alpha gamma", &loaded));
        assert_eq!(loaded.password_hint, "alp...");
    }

    #[test]
    fn test_no_plaintext_persisted() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.store("my secret code").unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("my secret code"));
        assert!(raw.contains("password_hash"));
    }

    #[test]
    fn test_corrupt_file_reported() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        std::fs::write(store.path(), "not json {").unwrap();
        assert!(matches!(store.load(), Err(CredentialError::Corrupt(_))));
    }

    #[test]
    fn test_hint_is_first_three_chars() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let credential = store.store("Open Sesame").unwrap();
        assert_eq!(credential.password_hint, "ope...");
    }
}
