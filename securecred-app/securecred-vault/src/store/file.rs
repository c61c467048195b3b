//! Software tier store: an AES-256-GCM encrypted file.
//!
//! All entries live in one `vault.enc` file next to an installation-specific
//! `salt.bin`. The file key is derived from a passphrase with Argon2id, so the
//! passphrase itself is never stored. File format:
//! `[12-byte nonce][ciphertext with 16-byte auth tag]`, where the plaintext is
//! the JSON-serialized entry map.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{ReadOptions, SecureStore, WriteOptions};
use crate::config::KdfParams;
use crate::error::{Error, Result};
use crate::models::{BiometryType, SecretStorageMethod, StoredSecret};

/// Nonce size for AES-GCM (96 bits = 12 bytes)
const NONCE_SIZE: usize = 12;

/// Salt size in bytes (128 bits)
const SALT_SIZE: usize = 16;

const KEY_LEN: usize = 32; // 256-bit key for AES-256

pub const VAULT_FILE_NAME: &str = "vault.enc";
pub const SALT_FILE_NAME: &str = "salt.bin";

/// A 256-bit file key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct FileKey {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the actual key material
        f.debug_struct("FileKey").field("key", &"[REDACTED]").finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    #[serde(flatten)]
    secret: StoredSecret,
    options: WriteOptions,
}

/// Everything in the encrypted file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileVaultData {
    #[serde(default)]
    entries: BTreeMap<String, FileEntry>,
    #[serde(default)]
    internet: BTreeMap<String, StoredSecret>,
}

/// Encrypted file store.
pub struct EncryptedFileStore {
    dir: PathBuf,
    key: FileKey,
    /// Held across the file write so saves never interleave.
    data: Mutex<FileVaultData>,
}

impl EncryptedFileStore {
    /// Open (or create) the store in `dir` with the given passphrase.
    ///
    /// # Errors
    /// Returns `AuthenticationFailed` if the passphrase does not decrypt an
    /// existing vault file.
    pub async fn open(dir: impl Into<PathBuf>, passphrase: &str, kdf: KdfParams) -> Result<Self> {
        let dir = dir.into();
        let passphrase = passphrase.to_string();

        let worker_dir = dir.clone();
        let (key, data) = tokio::task::spawn_blocking(move || -> Result<(FileKey, FileVaultData)> {
            std::fs::create_dir_all(&worker_dir)?;
            let salt = get_or_create_salt(&worker_dir)?;
            let key = derive_key(&passphrase, &salt, &kdf)?;

            let vault_path = worker_dir.join(VAULT_FILE_NAME);
            let data = if vault_path.exists() {
                info!("Opening encrypted vault at {:?}", vault_path);
                read_vault(&vault_path, &key)?
            } else {
                info!("No vault at {:?} yet, starting empty", vault_path);
                FileVaultData::default()
            };
            Ok((key, data))
        })
        .await
        .map_err(|e| Error::Internal(format!("Vault open task failed: {}", e)))??;

        Ok(Self {
            dir,
            key,
            data: Mutex::new(data),
        })
    }

    pub fn vault_path(&self) -> PathBuf {
        self.dir.join(VAULT_FILE_NAME)
    }

    /// Delete the vault and salt files. All entries are permanently lost.
    pub async fn destroy(self) -> Result<()> {
        warn!("Destroying encrypted vault in {:?} - all entries will be lost!", self.dir);
        for name in [VAULT_FILE_NAME, SALT_FILE_NAME] {
            match tokio::fs::remove_file(self.dir.join(name)).await {
                Ok(()) => debug!("Deleted {}", name),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn persist(&self, data: &FileVaultData) -> Result<()> {
        let output = encrypt_vault(data, &self.key)?;
        let vault_path = self.vault_path();

        // Write atomically (write to temp file, then rename)
        let temp_path = vault_path.with_extension("enc.tmp");
        tokio::fs::write(&temp_path, &output).await?;
        tokio::fs::rename(&temp_path, &vault_path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&vault_path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        debug!("Vault flushed to disk ({} entries)", data.entries.len());
        Ok(())
    }
}

/// Derive the file key from the passphrase using Argon2id.
fn derive_key(passphrase: &str, salt: &[u8; SALT_SIZE], kdf: &KdfParams) -> Result<FileKey> {
    let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(KEY_LEN))
        .map_err(|e| Error::Config(format!("Invalid Argon2 params: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| Error::Encryption(format!("Key derivation failed: {}", e)))?;

    let file_key = FileKey { key };
    key.zeroize();
    Ok(file_key)
}

/// Get the existing salt or create a new one.
fn get_or_create_salt(dir: &Path) -> Result<[u8; SALT_SIZE]> {
    let path = dir.join(SALT_FILE_NAME);

    if path.exists() {
        let bytes = std::fs::read(&path)?;
        if bytes.len() != SALT_SIZE {
            return Err(Error::Io(format!(
                "Invalid salt file size: expected {} bytes, got {}",
                SALT_SIZE,
                bytes.len()
            )));
        }
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes);
        return Ok(salt);
    }

    let mut salt = [0u8; SALT_SIZE];
    rand::rng().fill_bytes(&mut salt);
    std::fs::write(&path, salt)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(salt)
}

fn encrypt_vault(data: &FileVaultData, key: &FileKey) -> Result<Vec<u8>> {
    let plaintext = serde_json::to_vec(data)?;

    let cipher = Aes256Gcm::new_from_slice(&key.key)
        .map_err(|e| Error::Encryption(format!("Invalid key: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_ref())
        .map_err(|e| Error::Encryption(format!("Encryption failed: {}", e)))?;

    let mut output = nonce_bytes.to_vec();
    output.extend(ciphertext);
    Ok(output)
}

fn read_vault(path: &Path, key: &FileKey) -> Result<FileVaultData> {
    let encrypted = std::fs::read(path)?;

    if encrypted.len() < NONCE_SIZE {
        return Err(Error::Io("Vault file too short".into()));
    }

    let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key.key)
        .map_err(|e| Error::Encryption(format!("Invalid key: {}", e)))?;

    // Decryption failure = wrong passphrase or corrupted file
    let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|_| {
        Error::AuthenticationFailed("Invalid passphrase or corrupted vault file".into())
    })?;

    serde_json::from_slice(&plaintext)
        .map_err(|e| Error::Serialization(format!("Vault data corrupted: {}", e)))
}

#[async_trait]
impl SecureStore for EncryptedFileStore {
    async fn write(
        &self,
        namespace: &str,
        account: &str,
        secret: &str,
        options: &WriteOptions,
    ) -> Result<()> {
        if options.requires_hardware() {
            return Err(Error::NotAvailable(
                "Encrypted file store is software-only".into(),
            ));
        }

        let mut data = self.data.lock().await;
        let mut updated = data.clone();
        updated.entries.insert(
            namespace.to_string(),
            FileEntry {
                secret: StoredSecret {
                    account: account.to_string(),
                    secret: secret.to_string(),
                },
                options: *options,
            },
        );
        self.persist(&updated).await?;
        *data = updated;
        Ok(())
    }

    async fn read(&self, namespace: &str, _options: &ReadOptions) -> Result<Option<StoredSecret>> {
        let data = self.data.lock().await;
        Ok(data.entries.get(namespace).map(|entry| entry.secret.clone()))
    }

    async fn reset(&self, namespace: &str) -> Result<()> {
        let mut data = self.data.lock().await;
        if !data.entries.contains_key(namespace) {
            return Ok(());
        }
        let mut updated = data.clone();
        updated.entries.remove(namespace);
        self.persist(&updated).await?;
        *data = updated;
        Ok(())
    }

    async fn supported_biometry(&self) -> Result<Option<BiometryType>> {
        Ok(None)
    }

    async fn write_internet(&self, server: &str, account: &str, secret: &str) -> Result<()> {
        let mut data = self.data.lock().await;
        let mut updated = data.clone();
        updated.internet.insert(
            server.to_string(),
            StoredSecret {
                account: account.to_string(),
                secret: secret.to_string(),
            },
        );
        self.persist(&updated).await?;
        *data = updated;
        Ok(())
    }

    async fn read_internet(&self, server: &str) -> Result<Option<StoredSecret>> {
        Ok(self.data.lock().await.internet.get(server).cloned())
    }

    async fn reset_internet(&self, server: &str) -> Result<()> {
        let mut data = self.data.lock().await;
        if !data.internet.contains_key(server) {
            return Ok(());
        }
        let mut updated = data.clone();
        updated.internet.remove(server);
        self.persist(&updated).await?;
        *data = updated;
        Ok(())
    }

    fn method(&self) -> SecretStorageMethod {
        SecretStorageMethod::EncryptedFile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cheap parameters so tests don't spend seconds in Argon2.
    fn test_kdf() -> KdfParams {
        KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = [1u8; SALT_SIZE];
        let key1 = derive_key("hunter2", &salt, &test_kdf()).unwrap();
        let key2 = derive_key("hunter2", &salt, &test_kdf()).unwrap();
        let key3 = derive_key("hunter3", &salt, &test_kdf()).unwrap();

        assert_eq!(key1.key, key2.key, "Same passphrase and salt should produce same key");
        assert_ne!(key1.key, key3.key, "Different passphrases should produce different keys");
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = EncryptedFileStore::open(dir.path(), "pass", test_kdf()).await.unwrap();
            store.write("NS", "alice", "p@ss1", &WriteOptions::when_unlocked()).await.unwrap();
            store.write_internet("example.com", "bob", "pw").await.unwrap();
        }

        let store = EncryptedFileStore::open(dir.path(), "pass", test_kdf()).await.unwrap();
        let read = store.read("NS", &ReadOptions::default()).await.unwrap().unwrap();
        assert_eq!(read.account, "alice");
        assert_eq!(read.secret, "p@ss1");
        assert_eq!(store.read_internet("example.com").await.unwrap().unwrap().secret, "pw");

        let raw = std::fs::read(store.vault_path()).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("p@ss1"));
    }

    #[tokio::test]
    async fn test_wrong_passphrase_is_an_authentication_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), "right", test_kdf()).await.unwrap();
        store.write("NS", "a", "b", &WriteOptions::plain()).await.unwrap();
        drop(store);

        let err = EncryptedFileStore::open(dir.path(), "wrong", test_kdf()).await.err().unwrap();
        assert!(matches!(err, Error::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_hardware_writes_refused_and_reset_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), "pass", test_kdf()).await.unwrap();

        let err = store.write("NS", "a", "b", &WriteOptions::strong_tier()).await.unwrap_err();
        assert!(err.is_unsupported());
        store.write("NS", "a", "b", &WriteOptions::software_tier()).await.unwrap();

        store.reset("NS").await.unwrap();
        store.reset("NS").await.unwrap();
        assert!(store.read("NS", &ReadOptions::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_destroy_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), "pass", test_kdf()).await.unwrap();
        store.write("NS", "a", "b", &WriteOptions::plain()).await.unwrap();
        assert!(dir.path().join(VAULT_FILE_NAME).exists());

        store.destroy().await.unwrap();
        assert!(!dir.path().join(VAULT_FILE_NAME).exists());
        assert!(!dir.path().join(SALT_FILE_NAME).exists());
    }
}
