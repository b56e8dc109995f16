// ABOUTME: Encrypted file-backed token store (ChaCha20-Poly1305, Argon2id-derived key)
// ABOUTME: A file that exists but cannot be decrypted is StoreCorrupt, never an empty store

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use argon2::{Argon2, ParamsBuilder, Version};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ring::{
    aead::{self, Nonce, UnboundKey},
    rand::{SecureRandom, SystemRandom},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SecretsError, SecretsResult};
use crate::store::{StoreData, TokenStore};
use crate::token::{normalize_email, Token};

/// Nonce size for ChaCha20-Poly1305
const NONCE_SIZE: usize = 12;

/// Salt size for Argon2id key derivation
const SALT_SIZE: usize = 32;

const ENVELOPE_VERSION: u32 = 1;

/// On-disk envelope: the key-derivation salt is public, the payload is
/// base64(nonce || ciphertext || tag).
#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    salt: String,
    data: String,
}

/// Token store kept in a single password-encrypted JSON file.
pub struct EncryptedFileStore {
    path: PathBuf,
    encryption_key: Vec<u8>,
    salt: Vec<u8>,
    rng: SystemRandom,
    // Serializes load-modify-save cycles within the process.
    lock: Mutex<()>,
}

impl EncryptedFileStore {
    /// Open (or initialize) the store at the default path `~/.gwc/credentials.enc`.
    pub fn open_default(password: &str) -> SecretsResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| SecretsError::Config("could not determine home directory".to_string()))?;
        Self::open(home.join(".gwc").join("credentials.enc"), password)
    }

    /// Open (or initialize) the store at an explicit path.
    ///
    /// An existing file is decrypted immediately so a wrong password or a
    /// damaged file fails here, not on first use.
    pub fn open(path: PathBuf, password: &str) -> SecretsResult<Self> {
        let rng = SystemRandom::new();

        let salt = match read_envelope(&path)? {
            Some(envelope) => BASE64
                .decode(&envelope.salt)
                .map_err(|_| SecretsError::StoreCorrupt("invalid salt encoding".to_string()))?,
            None => {
                let mut salt = vec![0u8; SALT_SIZE];
                rng.fill(&mut salt)
                    .map_err(|_| SecretsError::Crypto("failed to generate salt".to_string()))?;
                salt
            }
        };

        let encryption_key = derive_key(password, &salt)?;
        let store = Self {
            path,
            encryption_key,
            salt,
            rng,
            lock: Mutex::new(()),
        };

        // Validate the password against existing content up front.
        store.load()?;
        Ok(store)
    }

    fn load(&self) -> SecretsResult<StoreData> {
        let Some(envelope) = read_envelope(&self.path)? else {
            return Ok(StoreData::default());
        };
        if envelope.version != ENVELOPE_VERSION {
            return Err(SecretsError::StoreCorrupt(format!(
                "unsupported store version: {}",
                envelope.version
            )));
        }

        let sealed = BASE64
            .decode(&envelope.data)
            .map_err(|_| SecretsError::StoreCorrupt("invalid payload encoding".to_string()))?;
        if sealed.len() < NONCE_SIZE + aead::CHACHA20_POLY1305.tag_len() {
            return Err(SecretsError::StoreCorrupt("payload too short".to_string()));
        }

        let (nonce_bytes, ciphertext_and_tag) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| SecretsError::StoreCorrupt("invalid nonce".to_string()))?;

        let unbound_key = UnboundKey::new(&aead::CHACHA20_POLY1305, &self.encryption_key)
            .map_err(|_| SecretsError::Crypto("failed to build decryption key".to_string()))?;
        let opening_key = aead::LessSafeKey::new(unbound_key);

        let mut in_out = ciphertext_and_tag.to_vec();
        let plaintext = opening_key
            .open_in_place(nonce, aead::Aad::empty(), &mut in_out)
            .map_err(|_| {
                SecretsError::StoreCorrupt("decryption failed (wrong password?)".to_string())
            })?;

        serde_json::from_slice(plaintext)
            .map_err(|e| SecretsError::StoreCorrupt(format!("invalid store contents: {}", e)))
    }

    fn save(&self, data: &StoreData) -> SecretsResult<()> {
        let plaintext = serde_json::to_vec(data)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| SecretsError::Crypto("failed to generate nonce".to_string()))?;
        let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
            .map_err(|_| SecretsError::Crypto("invalid nonce".to_string()))?;

        let unbound_key = UnboundKey::new(&aead::CHACHA20_POLY1305, &self.encryption_key)
            .map_err(|_| SecretsError::Crypto("failed to build encryption key".to_string()))?;
        let sealing_key = aead::LessSafeKey::new(unbound_key);

        let mut in_out = plaintext;
        sealing_key
            .seal_in_place_append_tag(nonce, aead::Aad::empty(), &mut in_out)
            .map_err(|_| SecretsError::Crypto("seal operation failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);

        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            salt: BASE64.encode(&self.salt),
            data: BASE64.encode(&sealed),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write via a sibling temp file so a crash mid-write cannot corrupt
        // the previous store contents.
        let tmp = self.path.with_extension("enc.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&envelope)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "token store written");
        Ok(())
    }
}

fn read_envelope(path: &Path) -> SecretsResult<Option<Envelope>> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let envelope = serde_json::from_slice(&raw)
        .map_err(|e| SecretsError::StoreCorrupt(format!("invalid store envelope: {}", e)))?;
    Ok(Some(envelope))
}

/// Derive a 256-bit key from the password using Argon2id
/// (64 MB memory, 3 iterations, 4 lanes).
fn derive_key(password: &str, salt: &[u8]) -> SecretsResult<Vec<u8>> {
    let params = ParamsBuilder::new()
        .m_cost(65536)
        .t_cost(3)
        .p_cost(4)
        .output_len(32)
        .build()
        .map_err(|e| SecretsError::Crypto(format!("invalid argon2 params: {}", e)))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

    let mut key = vec![0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| SecretsError::Crypto(format!("argon2 derivation failed: {}", e)))?;
    Ok(key)
}

impl TokenStore for EncryptedFileStore {
    fn keys(&self) -> SecretsResult<Vec<String>> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        Ok(self.load()?.tokens.keys().cloned().collect())
    }

    fn get_token(&self, email: &str) -> SecretsResult<Token> {
        let key = normalize_email(email);
        let _guard = self.lock.lock().expect("store lock poisoned");
        self.load()?
            .tokens
            .get(&key)
            .cloned()
            .ok_or(SecretsError::TokenNotFound { email: key })
    }

    fn set_token(&self, email: &str, token: Token) -> SecretsResult<()> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let mut data = self.load()?;
        data.set_token(email, token);
        self.save(&data)
    }

    fn delete_token(&self, email: &str) -> SecretsResult<()> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let mut data = self.load()?;
        data.delete_token(email);
        self.save(&data)
    }

    fn list_tokens(&self) -> SecretsResult<Vec<Token>> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        Ok(self.load()?.tokens.values().cloned().collect())
    }

    fn get_default_account(&self) -> SecretsResult<Option<String>> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        Ok(self.load()?.default_account)
    }

    fn set_default_account(&self, email: &str) -> SecretsResult<()> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        let mut data = self.load()?;
        data.default_account = Some(normalize_email(email));
        self.save(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn token(email: &str) -> Token {
        Token {
            email: email.to_string(),
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expiry: Utc::now() + Duration::hours(1),
            services: vec!["gmail".to_string()],
        }
    }

    fn store_in(dir: &TempDir, password: &str) -> SecretsResult<EncryptedFileStore> {
        EncryptedFileStore::open(dir.path().join("credentials.enc"), password)
    }

    #[test]
    fn test_round_trip_across_reopens() {
        let dir = TempDir::new().unwrap();
        {
            let store = store_in(&dir, "pw").unwrap();
            store.set_token("a@b.com", token("a@b.com")).unwrap();
            store.set_default_account("a@b.com").unwrap();
        }

        let store = store_in(&dir, "pw").unwrap();
        let stored = store.get_token("a@b.com").unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("rt"));
        assert_eq!(
            store.get_default_account().unwrap().as_deref(),
            Some("a@b.com")
        );
    }

    #[test]
    fn test_wrong_password_is_store_corrupt() {
        let dir = TempDir::new().unwrap();
        {
            let store = store_in(&dir, "correct").unwrap();
            store.set_token("a@b.com", token("a@b.com")).unwrap();
        }

        // The store itself is not Debug, so unwrap the error side directly.
        let err = store_in(&dir, "wrong").err().unwrap();
        assert!(
            matches!(err, SecretsError::StoreCorrupt(_)),
            "got: {}",
            err
        );
    }

    #[test]
    fn test_damaged_file_is_store_corrupt_not_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.enc");
        {
            let store = EncryptedFileStore::open(path.clone(), "pw").unwrap();
            store.set_token("a@b.com", token("a@b.com")).unwrap();
        }

        std::fs::write(&path, b"not an envelope").unwrap();
        let err = EncryptedFileStore::open(path, "pw").err().unwrap();
        assert!(matches!(err, SecretsError::StoreCorrupt(_)));
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, "pw").unwrap();
        assert!(store.keys().unwrap().is_empty());
        assert_eq!(store.get_default_account().unwrap(), None);
    }

    #[test]
    fn test_delete_default_account_clears_default() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, "pw").unwrap();
        store.set_token("a@b.com", token("a@b.com")).unwrap();
        store.set_default_account("a@b.com").unwrap();

        store.delete_token("a@b.com").unwrap();
        assert_eq!(store.get_default_account().unwrap(), None);
        // Idempotent delete.
        store.delete_token("a@b.com").unwrap();
    }

    #[test]
    fn test_salt_is_stable_across_writes() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, "pw").unwrap();
        store.set_token("a@b.com", token("a@b.com")).unwrap();
        let salt1 = store.salt.clone();
        store.set_token("c@d.com", token("c@d.com")).unwrap();

        let reopened = store_in(&dir, "pw").unwrap();
        assert_eq!(reopened.salt, salt1);
    }
}
