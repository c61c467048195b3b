//! Encrypted documents kept in the vault.
//!
//! Each document is AES-256-GCM encrypted with a per-installation document
//! key and stored as biometric sensitive data under `doc_<id>`. The key itself
//! is biometric sensitive data too. The index of saved documents is a plain
//! JSON entry, readable without a prompt.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::store::SecureStore;
use crate::vault::{SecureVault, VaultOutcome};

const DOCUMENT_KEY_PREFIX: &str = "doc_";
const DOCUMENT_LIST_KEY: &str = "document_list";
const ENCRYPTION_KEY_NAME: &str = "document_encryption_key";

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Statement,
    Invoice,
    Report,
    #[default]
    Other,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Statement => "statement",
            Self::Invoice => "invoice",
            Self::Report => "report",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "statement" => Ok(Self::Statement),
            "invoice" => Ok(Self::Invoice),
            "report" => Ok(Self::Report),
            "other" => Ok(Self::Other),
            other => Err(Error::Serialization(format!("Unknown document type: {}", other))),
        }
    }
}

/// Index entry for a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureDocument {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    /// Size of the stored ciphertext, e.g. "3 KB".
    pub size: String,
    pub downloaded: bool,
    /// Unix millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_at: Option<i64>,
}

pub struct DocumentService<S: ?Sized = dyn SecureStore> {
    vault: Arc<SecureVault<S>>,
}

impl<S: SecureStore + ?Sized> DocumentService<S> {
    pub fn new(vault: Arc<SecureVault<S>>) -> Self {
        Self { vault }
    }

    /// Load the document key, creating it on first use.
    ///
    /// A new key is only minted when none is stored; a cancelled or refused
    /// read must not replace the key the existing documents depend on.
    async fn encryption_key(&self, prompt_message: Option<&str>) -> VaultOutcome<Zeroizing<Vec<u8>>> {
        match self
            .vault
            .try_get_sensitive_data(ENCRYPTION_KEY_NAME, true, prompt_message)
            .await
        {
            VaultOutcome::Success(encoded) => {
                let encoded = Zeroizing::new(encoded);
                match hex::decode(encoded.as_str()) {
                    Ok(key) if key.len() == KEY_SIZE => VaultOutcome::Success(Zeroizing::new(key)),
                    _ => {
                        error!("Stored document key is malformed");
                        VaultOutcome::StoreError("Document key is malformed".into())
                    }
                }
            }
            VaultOutcome::NotFound => {
                let mut key = Zeroizing::new(vec![0u8; KEY_SIZE]);
                rand::rng().fill_bytes(key.as_mut_slice());
                let encoded = Zeroizing::new(hex::encode(key.as_slice()));

                let saved = self
                    .vault
                    .try_save_sensitive_data(ENCRYPTION_KEY_NAME, &encoded, true)
                    .await;
                match saved {
                    VaultOutcome::Success(tier) => {
                        info!("Created document encryption key ({:?} tier)", tier);
                        VaultOutcome::Success(key)
                    }
                    failed => failed.map(|_| key),
                }
            }
            failed => {
                warn!("Document key unavailable ({})", failed.kind());
                failed.map(|_| Zeroizing::new(Vec::new()))
            }
        }
    }

    pub async fn save_encrypted_document(
        &self,
        id: &str,
        name: &str,
        kind: DocumentKind,
        data: &str,
        prompt_message: Option<&str>,
    ) -> bool {
        let key = match self.encryption_key(prompt_message).await {
            VaultOutcome::Success(key) => key,
            _ => {
                error!("Failed to get document encryption key");
                return false;
            }
        };

        let encoded = match encrypt_document(data.as_bytes(), &key) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Error encrypting document {}: {}", id, e);
                return false;
            }
        };

        let storage_key = document_storage_key(id);
        if !self.vault.save_sensitive_data(&storage_key, &encoded, true).await {
            return false;
        }

        let document = SecureDocument {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            size: format!("{} KB", (encoded.len() as f64 / 1024.0).round() as u64),
            downloaded: true,
            encrypted_at: Some(Utc::now().timestamp_millis()),
        };
        if !self.upsert_listing(document).await {
            warn!("Document {} is stored but missing from the list", id);
            return false;
        }
        info!("Saved encrypted document {}", id);
        true
    }

    pub async fn get_decrypted_document(&self, id: &str, prompt_message: Option<&str>) -> Option<String> {
        let key = self.encryption_key(prompt_message).await.ok()?;

        let Some(encoded) = self
            .vault
            .get_sensitive_data(&document_storage_key(id), true, prompt_message)
            .await
        else {
            warn!("Document {} not found", id);
            return None;
        };

        let plaintext = match decrypt_document(&encoded, &key) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                error!("Error decrypting document {}: {}", id, e);
                return None;
            }
        };
        match String::from_utf8(plaintext) {
            Ok(text) => Some(text),
            Err(_) => {
                error!("Document {} is not valid UTF-8", id);
                None
            }
        }
    }

    pub async fn delete_document(&self, id: &str) -> bool {
        if !self.vault.delete_sensitive_data(&document_storage_key(id), true).await {
            return false;
        }

        if !self.remove_listing(id).await {
            return false;
        }
        debug!("Deleted document {}", id);
        true
    }

    /// Saved documents, empty when the index is missing or unreadable.
    pub async fn document_list(&self) -> Vec<SecureDocument> {
        self.load_listing().await.unwrap_or_default()
    }

    /// The stored index, `None` when it could not be read.
    ///
    /// A missing index is an empty one. So is one that no longer parses,
    /// since nothing can recover its entries.
    async fn load_listing(&self) -> Option<Vec<SecureDocument>> {
        match self
            .vault
            .try_get_sensitive_data(DOCUMENT_LIST_KEY, false, None)
            .await
        {
            VaultOutcome::Success(json) => match serde_json::from_str(&json) {
                Ok(list) => Some(list),
                Err(e) => {
                    warn!("Document list is unreadable, starting a new one: {}", e);
                    Some(Vec::new())
                }
            },
            VaultOutcome::NotFound => Some(Vec::new()),
            failed => {
                error!("Failed to read document list ({})", failed.kind());
                None
            }
        }
    }

    /// Delete every listed document and the index. The document key is kept.
    pub async fn clear_all_documents(&self) -> bool {
        let Some(list) = self.load_listing().await else {
            return false;
        };
        let mut ok = true;
        for doc in list {
            ok &= self.delete_document(&doc.id).await;
        }
        ok &= self.vault.delete_sensitive_data(DOCUMENT_LIST_KEY, false).await;
        info!("Cleared all documents");
        ok
    }

    /// The index is only rewritten when it was read back successfully.
    async fn upsert_listing(&self, document: SecureDocument) -> bool {
        let Some(mut list) = self.load_listing().await else {
            return false;
        };
        match list.iter_mut().find(|doc| doc.id == document.id) {
            Some(existing) => *existing = document,
            None => list.push(document),
        }
        self.save_listing(&list).await
    }

    async fn remove_listing(&self, id: &str) -> bool {
        let Some(mut list) = self.load_listing().await else {
            return false;
        };
        list.retain(|doc| doc.id != id);
        self.save_listing(&list).await
    }

    async fn save_listing(&self, list: &[SecureDocument]) -> bool {
        match serde_json::to_string(list) {
            Ok(json) => {
                let saved = self.vault.save_sensitive_data(DOCUMENT_LIST_KEY, &json, false).await;
                if !saved {
                    error!("Failed to update document list");
                }
                saved
            }
            Err(e) => {
                error!("Failed to serialize document list: {}", e);
                false
            }
        }
    }
}

fn document_storage_key(id: &str) -> String {
    format!("{}{}", DOCUMENT_KEY_PREFIX, id)
}

/// base64 of `[nonce][ciphertext]`.
fn encrypt_document(plaintext: &[u8], key: &[u8]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Encryption(format!("Invalid key: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| Error::Encryption(format!("Encryption failed: {}", e)))?;

    let mut output = nonce_bytes.to_vec();
    output.extend(ciphertext);
    Ok(STANDARD.encode(output))
}

fn decrypt_document(encoded: &str, key: &[u8]) -> Result<Vec<u8>> {
    let encrypted = STANDARD
        .decode(encoded)
        .map_err(|e| Error::Encryption(format!("Invalid document encoding: {}", e)))?;
    if encrypted.len() < NONCE_SIZE {
        return Err(Error::Encryption("Data too short".into()));
    }

    let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Encryption(format!("Invalid key: {}", e)))?;
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::Encryption("Document failed authentication".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use crate::models::StoreTier;
    use crate::store::{MemoryStore, PromptResponse};

    fn documents() -> (Arc<MemoryStore>, Arc<SecureVault<MemoryStore>>, DocumentService<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = VaultConfig::default().with_service_name("DocTest");
        let vault = Arc::new(SecureVault::new(Arc::clone(&store), config));
        (store, Arc::clone(&vault), DocumentService::new(vault))
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = [7u8; KEY_SIZE];
        let encoded = encrypt_document(b"quarterly numbers", &key).unwrap();
        assert!(!encoded.contains("quarterly"));
        assert_eq!(decrypt_document(&encoded, &key).unwrap(), b"quarterly numbers");

        assert!(decrypt_document(&encoded, &[8u8; KEY_SIZE]).is_err());
        assert!(decrypt_document("AAAA", &key).is_err());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Invoice".parse::<DocumentKind>().unwrap(), DocumentKind::Invoice);
        assert!("memo".parse::<DocumentKind>().is_err());
        assert_eq!(serde_json::to_string(&DocumentKind::Report).unwrap(), "\"report\"");
    }

    #[tokio::test]
    async fn test_save_and_read_document() {
        let (store, vault, docs) = documents();
        assert!(docs.document_list().await.is_empty());

        assert!(
            docs.save_encrypted_document("1", "March statement", DocumentKind::Statement, "balance: 42", None)
                .await
        );
        assert_eq!(
            docs.get_decrypted_document("1", None).await.as_deref(),
            Some("balance: 42")
        );

        let list = docs.document_list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "March statement");
        assert_eq!(list[0].kind, DocumentKind::Statement);
        assert!(list[0].downloaded);
        assert!(list[0].encrypted_at.is_some());

        // Stored ciphertext, biometric slot
        let stored = vault.get_sensitive_data("doc_1", true, None).await.unwrap();
        assert!(!stored.contains("balance"));
        assert_eq!(vault.stored_tier("doc_1").await, Some(StoreTier::Strong));
        assert!(store.contains("DocTest_DOCUMENT_LIST").await);
    }

    #[tokio::test]
    async fn test_resave_updates_listing_in_place() {
        let (_, _, docs) = documents();
        docs.save_encrypted_document("1", "Draft", DocumentKind::Other, "v1", None).await;
        docs.save_encrypted_document("2", "Invoice", DocumentKind::Invoice, "x", None).await;
        docs.save_encrypted_document("1", "Final", DocumentKind::Report, "v2", None).await;

        let list = docs.document_list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Final");
        assert_eq!(docs.get_decrypted_document("1", None).await.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_key_is_created_once() {
        let (_, vault, docs) = documents();
        docs.save_encrypted_document("1", "a", DocumentKind::Other, "one", None).await;
        let key = vault.get_sensitive_data(ENCRYPTION_KEY_NAME, true, None).await.unwrap();
        assert_eq!(key.len(), KEY_SIZE * 2);

        docs.save_encrypted_document("2", "b", DocumentKind::Other, "two", None).await;
        assert_eq!(
            vault.get_sensitive_data(ENCRYPTION_KEY_NAME, true, None).await.unwrap(),
            key
        );
    }

    #[tokio::test]
    async fn test_cancelled_prompt_keeps_existing_key() {
        let (store, _, docs) = documents();
        docs.save_encrypted_document("1", "a", DocumentKind::Other, "secret", Some("Unlock documents"))
            .await;

        store.set_prompt_response(PromptResponse::Cancel).await;
        assert!(!docs.save_encrypted_document("2", "b", DocumentKind::Other, "x", None).await);
        assert_eq!(docs.get_decrypted_document("1", None).await, None);

        store.set_prompt_response(PromptResponse::Approve).await;
        assert_eq!(docs.get_decrypted_document("1", None).await.as_deref(), Some("secret"));
        assert_eq!(docs.document_list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let (_, vault, docs) = documents();
        docs.save_encrypted_document("1", "a", DocumentKind::Other, "one", None).await;
        docs.save_encrypted_document("2", "b", DocumentKind::Other, "two", None).await;

        assert!(docs.delete_document("1").await);
        assert_eq!(docs.get_decrypted_document("1", None).await, None);
        assert_eq!(docs.document_list().await.len(), 1);

        assert!(docs.clear_all_documents().await);
        assert!(docs.document_list().await.is_empty());
        assert_eq!(docs.get_decrypted_document("2", None).await, None);
        // The key survives so re-downloaded documents stay readable
        assert!(vault.get_sensitive_data(ENCRYPTION_KEY_NAME, true, None).await.is_some());
    }

    #[tokio::test]
    async fn test_unreadable_list_is_empty() {
        let (_, vault, docs) = documents();
        vault.save_sensitive_data(DOCUMENT_LIST_KEY, "not json", false).await;
        assert!(docs.document_list().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_list_read_never_overwrites_the_index() {
        let (store, _, docs) = documents();
        docs.save_encrypted_document("1", "a", DocumentKind::Other, "one", None).await;
        docs.save_encrypted_document("2", "b", DocumentKind::Other, "two", None).await;

        store
            .fail_next_read("DocTest_DOCUMENT_LIST", Error::Io("keystore busy".into()))
            .await;
        assert!(!docs.save_encrypted_document("3", "c", DocumentKind::Other, "three", None).await);
        let ids: Vec<String> = docs.document_list().await.into_iter().map(|doc| doc.id).collect();
        assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);

        store
            .fail_next_read("DocTest_DOCUMENT_LIST", Error::Io("keystore busy".into()))
            .await;
        assert!(!docs.delete_document("1").await);
        assert_eq!(docs.document_list().await.len(), 2);

        store
            .fail_next_read("DocTest_DOCUMENT_LIST", Error::Io("keystore busy".into()))
            .await;
        assert!(!docs.clear_all_documents().await);
        assert_eq!(docs.document_list().await.len(), 2);
        assert_eq!(docs.get_decrypted_document("2", None).await.as_deref(), Some("two"));
    }
}
