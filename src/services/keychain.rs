// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Encrypted secret store persisted to a JSON file.
//!
//! Entries are sealed with ChaCha20-Poly1305 under a key derived from the
//! master secret with HKDF-SHA256. The service name and account are bound
//! as associated data, so an entry copied under another account fails to
//! decrypt.

use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, CHACHA20_POLY1305, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub const SERVICE: &str = "com.Knock.RideReport";

/// Well-known account names.
pub mod accounts {
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const ACCESS_TOKEN_EXPIRES_IN: &str = "accessTokenExpiresIn";
    pub const JWT_SIGNING_KEY: &str = "jwtSigningKey";
    pub const OPENWEATHERMAP_API_KEY: &str = "openWeatherMapAPIKey";
}

const KEY_INFO: &[u8] = b"ride-report keychain v1";

#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    #[error("Keychain I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keychain file is malformed: {0}")]
    Format(String),

    #[error("Keychain belongs to service {0}")]
    WrongService(String),

    #[error("Failed to decrypt entry {0}")]
    Decrypt(String),

    #[error("Keychain crypto failure")]
    Crypto,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeychainFile {
    service: String,
    /// account -> base64(nonce || ciphertext || tag)
    entries: BTreeMap<String, String>,
}

pub struct Keychain {
    path: PathBuf,
    key: LessSafeKey,
    rng: SystemRandom,
    entries: Mutex<BTreeMap<String, String>>,
}

impl Keychain {
    /// Open the keychain at `path`, creating an empty one if it does not exist.
    pub async fn open(path: impl AsRef<Path>, secret: &str) -> Result<Self, KeychainError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: KeychainFile = serde_json::from_slice(&bytes)
                    .map_err(|e| KeychainError::Format(e.to_string()))?;
                if file.service != SERVICE {
                    return Err(KeychainError::WrongService(file.service));
                }
                file.entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), entries = entries.len(), "Opened keychain");

        Ok(Self {
            path,
            key: derive_key(secret)?,
            rng: SystemRandom::new(),
            entries: Mutex::new(entries),
        })
    }

    pub async fn get(&self, account: &str) -> Result<Option<String>, KeychainError> {
        let entries = self.entries.lock().await;
        entries
            .get(account)
            .map(|sealed| self.open_entry(account, sealed))
            .transpose()
    }

    pub async fn set(&self, account: &str, value: &str) -> Result<(), KeychainError> {
        let sealed = self.seal_entry(account, value)?;
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(account.to_string(), sealed);
        self.replace(&mut entries, next).await
    }

    /// Remove an entry. Returns whether it was present.
    pub async fn remove(&self, account: &str) -> Result<bool, KeychainError> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(account) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.remove(account);
        self.replace(&mut entries, next).await?;
        Ok(true)
    }

    /// Return the stored value, or store and return `init()`.
    pub async fn get_or_insert_with<F>(&self, account: &str, init: F) -> Result<String, KeychainError>
    where
        F: FnOnce() -> String,
    {
        let mut entries = self.entries.lock().await;
        if let Some(sealed) = entries.get(account) {
            return self.open_entry(account, sealed);
        }

        let value = init();
        let mut next = entries.clone();
        next.insert(account.to_string(), self.seal_entry(account, &value)?);
        self.replace(&mut entries, next).await?;
        tracing::info!(account, "Created keychain entry");
        Ok(value)
    }

    /// Random bytes from the keychain's generator.
    pub fn random_bytes(&self, len: usize) -> Result<Vec<u8>, KeychainError> {
        let mut bytes = vec![0u8; len];
        self.rng.fill(&mut bytes).map_err(|_| KeychainError::Crypto)?;
        Ok(bytes)
    }

    fn seal_entry(&self, account: &str, value: &str) -> Result<String, KeychainError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| KeychainError::Crypto)?;

        let mut in_out = value.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(associated_data(account)),
                &mut in_out,
            )
            .map_err(|_| KeychainError::Crypto)?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&in_out);
        Ok(STANDARD.encode(sealed))
    }

    fn open_entry(&self, account: &str, sealed: &str) -> Result<String, KeychainError> {
        let decrypt_error = || KeychainError::Decrypt(account.to_string());

        let mut bytes = STANDARD.decode(sealed).map_err(|_| decrypt_error())?;
        if bytes.len() < NONCE_LEN {
            return Err(decrypt_error());
        }
        let mut in_out = bytes.split_off(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(&bytes).map_err(|_| decrypt_error())?;

        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(associated_data(account)), &mut in_out)
            .map_err(|_| decrypt_error())?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| decrypt_error())
    }

    /// Write `next` to disk, then make it current. `current` is untouched
    /// if the write fails.
    async fn replace(
        &self,
        current: &mut BTreeMap<String, String>,
        next: BTreeMap<String, String>,
    ) -> Result<(), KeychainError> {
        let file = KeychainFile {
            service: SERVICE.to_string(),
            entries: next,
        };
        let bytes =
            serde_json::to_vec_pretty(&file).map_err(|e| KeychainError::Format(e.to_string()))?;

        // Readers see either the old file or the new one.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        *current = file.entries;
        Ok(())
    }
}

fn derive_key(secret: &str) -> Result<LessSafeKey, KeychainError> {
    let hkdf = Hkdf::<Sha256>::new(Some(SERVICE.as_bytes()), secret.as_bytes());
    let mut okm = [0u8; 32];
    hkdf.expand(KEY_INFO, &mut okm)
        .map_err(|_| KeychainError::Crypto)?;
    let unbound = UnboundKey::new(&CHACHA20_POLY1305, &okm).map_err(|_| KeychainError::Crypto)?;
    Ok(LessSafeKey::new(unbound))
}

fn associated_data(account: &str) -> Vec<u8> {
    format!("{}/{}", SERVICE, account).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.keychain");

        let keychain = Keychain::open(&path, "master").await.unwrap();
        assert_eq!(keychain.get(accounts::ACCESS_TOKEN).await.unwrap(), None);
        keychain.set(accounts::ACCESS_TOKEN, "tok-123").await.unwrap();

        let reopened = Keychain::open(&path, "master").await.unwrap();
        assert_eq!(
            reopened.get(accounts::ACCESS_TOKEN).await.unwrap().as_deref(),
            Some("tok-123")
        );

        // Plaintext never hits the disk.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("tok-123"));
        assert!(raw.contains(SERVICE));
    }

    #[tokio::test]
    async fn test_wrong_secret_fails_to_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.keychain");
        Keychain::open(&path, "right")
            .await
            .unwrap()
            .set("account", "value")
            .await
            .unwrap();

        let keychain = Keychain::open(&path, "wrong").await.unwrap();
        let err = keychain.get("account").await.unwrap_err();
        assert!(matches!(err, KeychainError::Decrypt(ref a) if a == "account"));
    }

    #[tokio::test]
    async fn test_entry_moved_between_accounts_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.keychain");
        let keychain = Keychain::open(&path, "master").await.unwrap();
        keychain.set("a", "secret").await.unwrap();

        let mut file: KeychainFile =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let sealed = file.entries["a"].clone();
        file.entries.insert("b".to_string(), sealed);
        std::fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

        let reopened = Keychain::open(&path, "master").await.unwrap();
        assert!(matches!(
            reopened.get("b").await,
            Err(KeychainError::Decrypt(_))
        ));
    }

    #[tokio::test]
    async fn test_get_or_insert_with_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let keychain = Keychain::open(dir.path().join("k"), "master").await.unwrap();

        let first = keychain
            .get_or_insert_with(accounts::JWT_SIGNING_KEY, || "generated".to_string())
            .await
            .unwrap();
        let second = keychain
            .get_or_insert_with(accounts::JWT_SIGNING_KEY, || "other".to_string())
            .await
            .unwrap();
        assert_eq!(first, "generated");
        assert_eq!(second, "generated");

        assert!(keychain.remove(accounts::JWT_SIGNING_KEY).await.unwrap());
        assert!(!keychain.remove(accounts::JWT_SIGNING_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_entries_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let keychain = Keychain::open(dir.path().join("k"), "master").await.unwrap();
        keychain.set("a", "first").await.unwrap();

        std::fs::remove_dir_all(dir.path()).unwrap();

        assert!(matches!(
            keychain.set("a", "second").await,
            Err(KeychainError::Io(_))
        ));
        assert!(keychain.remove("a").await.is_err());
        assert!(keychain
            .get_or_insert_with("b", || "generated".to_string())
            .await
            .is_err());

        assert_eq!(keychain.get("a").await.unwrap().as_deref(), Some("first"));
        assert_eq!(keychain.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_foreign_service_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k");
        std::fs::write(&path, r#"{"service": "com.example", "entries": {}}"#).unwrap();

        assert!(matches!(
            Keychain::open(&path, "master").await,
            Err(KeychainError::WrongService(_))
        ));
    }
}
