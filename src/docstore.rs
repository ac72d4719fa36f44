//! Narrow interface to the document store holding each account's uploads.
//!
//! Layout, per account: one entry per uploaded file name, and under each entry
//! the upload batches written for it. Timestamps and batch ids are assigned by
//! the store at write time.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::account::{AccountContext, AccountProfile};
use crate::error::StoreError;
use crate::normalizer::{BatchData, UploadBatch};
use crate::value::Timestamp;

/// Entry written once per uploaded file name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub original_file_name: String,
    pub uploaded_at: Timestamp,
}

/// One persisted upload batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBatch {
    pub id: Uuid,
    pub created_at: Timestamp,
    pub data: BatchData,
}

impl StoredBatch {
    pub fn new(data: BatchData) -> Self {
        StoredBatch {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            data,
        }
    }
}

impl From<StoredBatch> for UploadBatch {
    fn from(batch: StoredBatch) -> Self {
        UploadBatch::new(batch.created_at, batch.data)
    }
}

/// Check that a file name or account id can be used as a storage key
///
/// Keys become single directory names in [`JsonDirStore`](crate::jsondb::JsonDirStore),
/// so every store applies the same rule: not empty, not `.` or `..`, and no
/// `/`, `\` or NUL characters.
///
/// # Returns
/// * `Result<&str, StoreError>` - The name unchanged, or `InvalidName`
pub fn check_segment(name: &str) -> Result<&str, StoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(&['/', '\\', '\0'][..]);
    if invalid {
        Err(StoreError::InvalidName(name.to_string()))
    } else {
        Ok(name)
    }
}

/// Read/write/delete access to account documents.
pub trait DocumentStore: Send + Sync {
    /// Names of all stored file entries, in ascending name order.
    fn list_files(
        &self,
        account: &AccountContext,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Create or overwrite the entry for `file_name`, stamped with server time.
    fn put_file(
        &self,
        account: &AccountContext,
        file_name: &str,
    ) -> impl Future<Output = Result<FileEntry, StoreError>> + Send;

    /// Append a batch under an existing file entry.
    fn add_batch(
        &self,
        account: &AccountContext,
        file_name: &str,
        data: BatchData,
    ) -> impl Future<Output = Result<StoredBatch, StoreError>> + Send;

    /// All batches stored under `file_name`, oldest first.
    fn list_batches(
        &self,
        account: &AccountContext,
        file_name: &str,
    ) -> impl Future<Output = Result<Vec<UploadBatch>, StoreError>> + Send;

    /// Delete a file entry together with its batches.
    fn delete_file(
        &self,
        account: &AccountContext,
        file_name: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_profile(
        &self,
        account: &AccountContext,
    ) -> impl Future<Output = Result<Option<AccountProfile>, StoreError>> + Send;

    fn put_profile(
        &self,
        account: &AccountContext,
        profile: AccountProfile,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug)]
struct StoredFile {
    entry: FileEntry,
    batches: Vec<StoredBatch>,
}

#[derive(Debug, Default)]
struct AccountDocuments {
    profile: Option<AccountProfile>,
    files: BTreeMap<String, StoredFile>,
}

/// Document store kept entirely in memory. Used by tests and the demo server.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, AccountDocuments>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    async fn list_files(&self, account: &AccountContext) -> Result<Vec<String>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .get(&account.uid)
            .map(|docs| docs.files.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn put_file(&self, account: &AccountContext, file_name: &str) -> Result<FileEntry, StoreError> {
        let entry = FileEntry {
            original_file_name: file_name.to_string(),
            uploaded_at: Utc::now(),
        };
        let mut accounts = self.accounts.write().await;
        let docs = accounts.entry(account.uid.clone()).or_default();
        match docs.files.get_mut(file_name) {
            Some(existing) => existing.entry = entry.clone(),
            None => {
                docs.files.insert(
                    file_name.to_string(),
                    StoredFile {
                        entry: entry.clone(),
                        batches: Vec::new(),
                    },
                );
            }
        }
        Ok(entry)
    }

    async fn add_batch(
        &self,
        account: &AccountContext,
        file_name: &str,
        data: BatchData,
    ) -> Result<StoredBatch, StoreError> {
        let mut accounts = self.accounts.write().await;
        let file = accounts
            .get_mut(&account.uid)
            .and_then(|docs| docs.files.get_mut(file_name))
            .ok_or_else(|| StoreError::NotFound(file_name.to_string()))?;
        let batch = StoredBatch::new(data);
        file.batches.push(batch.clone());
        Ok(batch)
    }

    async fn list_batches(
        &self,
        account: &AccountContext,
        file_name: &str,
    ) -> Result<Vec<UploadBatch>, StoreError> {
        let accounts = self.accounts.read().await;
        let file = accounts
            .get(&account.uid)
            .and_then(|docs| docs.files.get(file_name))
            .ok_or_else(|| StoreError::NotFound(file_name.to_string()))?;
        Ok(file.batches.iter().cloned().map(UploadBatch::from).collect())
    }

    async fn delete_file(&self, account: &AccountContext, file_name: &str) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        accounts
            .get_mut(&account.uid)
            .and_then(|docs| docs.files.remove(file_name))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(file_name.to_string()))
    }

    async fn get_profile(&self, account: &AccountContext) -> Result<Option<AccountProfile>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&account.uid).and_then(|docs| docs.profile.clone()))
    }

    async fn put_profile(&self, account: &AccountContext, profile: AccountProfile) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        accounts.entry(account.uid.clone()).or_default().profile = Some(profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Row;

    #[tokio::test]
    async fn batches_live_under_their_file() {
        let store = MemoryStore::new();
        let alice = AccountContext::new("alice");
        let bob = AccountContext::new("bob");

        store.put_file(&alice, "a.csv").await.unwrap();
        store
            .add_batch(&alice, "a.csv", BatchData::Rows(vec![Row::from_pairs([("x", "1")])]))
            .await
            .unwrap();

        assert_eq!(store.list_files(&alice).await.unwrap(), vec!["a.csv"]);
        assert!(store.list_files(&bob).await.unwrap().is_empty());
        assert_eq!(store.list_batches(&alice, "a.csv").await.unwrap().len(), 1);

        store.delete_file(&alice, "a.csv").await.unwrap();
        assert!(matches!(
            store.list_batches(&alice, "a.csv").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn storage_keys_are_single_segments() {
        for name in ["../evil.csv", "a/b.csv", "a\\b.csv", "..", ".", ""] {
            assert!(matches!(check_segment(name), Err(StoreError::InvalidName(_))));
        }
        assert_eq!(check_segment("report 2024.xlsx").unwrap(), "report 2024.xlsx");
    }

    #[tokio::test]
    async fn add_batch_requires_entry() {
        let store = MemoryStore::new();
        let result = store
            .add_batch(&AccountContext::new("u"), "missing.csv", BatchData::Rows(Vec::new()))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
