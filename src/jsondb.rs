use chrono::Utc;
use log::{debug, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::account::{AccountContext, AccountProfile};
use crate::docstore::{DocumentStore, FileEntry, StoredBatch, check_segment};
use crate::error::StoreError;
use crate::normalizer::{BatchData, UploadBatch};

const PROFILE_FILE: &str = "profile.json";
const FILES_DIR: &str = "files";
const ENTRY_FILE: &str = "entry.json";
const BATCHES_DIR: &str = "batches";

/// Document store backed by JSON files under a database directory.
///
/// ```text
/// <root>/<uid>/profile.json
/// <root>/<uid>/files/<file name>/entry.json
/// <root>/<uid>/files/<file name>/batches/<batch id>.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    /// Open a store rooted at `root`, creating the directory if needed
    ///
    /// # Arguments
    /// * `root` - The database directory
    ///
    /// # Returns
    /// * `Result<JsonDirStore, StoreError>` - The store, or an I/O error
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(JsonDirStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn account_dir(&self, account: &AccountContext) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(check_segment(&account.uid)?))
    }

    fn file_dir(&self, account: &AccountContext, file_name: &str) -> Result<PathBuf, StoreError> {
        Ok(self
            .account_dir(account)?
            .join(FILES_DIR)
            .join(check_segment(file_name)?))
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl DocumentStore for JsonDirStore {
    async fn list_files(&self, account: &AccountContext) -> Result<Vec<String>, StoreError> {
        let files_dir = self.account_dir(account)?.join(FILES_DIR);
        let mut entries = match fs::read_dir(&files_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!("Skipping non UTF-8 file entry {:?}", raw),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn put_file(&self, account: &AccountContext, file_name: &str) -> Result<FileEntry, StoreError> {
        let dir = self.file_dir(account, file_name)?;
        fs::create_dir_all(dir.join(BATCHES_DIR)).await?;

        let entry = FileEntry {
            original_file_name: file_name.to_string(),
            uploaded_at: Utc::now(),
        };
        write_json(&dir.join(ENTRY_FILE), &entry).await?;
        debug!("Wrote file entry {}", dir.display());
        Ok(entry)
    }

    async fn add_batch(
        &self,
        account: &AccountContext,
        file_name: &str,
        data: BatchData,
    ) -> Result<StoredBatch, StoreError> {
        let dir = self.file_dir(account, file_name)?;
        if !fs::try_exists(dir.join(ENTRY_FILE)).await? {
            return Err(StoreError::NotFound(file_name.to_string()));
        }

        let batch = StoredBatch::new(data);
        let path = dir.join(BATCHES_DIR).join(format!("{}.json", batch.id));
        write_json(&path, &batch).await?;
        debug!("Wrote batch {}", path.display());
        Ok(batch)
    }

    async fn list_batches(
        &self,
        account: &AccountContext,
        file_name: &str,
    ) -> Result<Vec<UploadBatch>, StoreError> {
        let batches_dir = self.file_dir(account, file_name)?.join(BATCHES_DIR);
        let mut entries = match fs::read_dir(&batches_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(file_name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut batches = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(batch) = read_json::<UploadBatch>(&path).await? {
                batches.push(batch);
            }
        }
        // Batches without a timestamp sort first; normalization drops them anyway
        batches.sort_by_key(|batch| batch.created_at);
        Ok(batches)
    }

    async fn delete_file(&self, account: &AccountContext, file_name: &str) -> Result<(), StoreError> {
        let dir = self.file_dir(account, file_name)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(file_name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_profile(&self, account: &AccountContext) -> Result<Option<AccountProfile>, StoreError> {
        read_json(&self.account_dir(account)?.join(PROFILE_FILE)).await
    }

    async fn put_profile(&self, account: &AccountContext, profile: AccountProfile) -> Result<(), StoreError> {
        let dir = self.account_dir(account)?;
        fs::create_dir_all(&dir).await?;
        write_json(&dir.join(PROFILE_FILE), &profile).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Row;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trips_batches_on_disk() {
        let tmp = TempDir::new().unwrap();
        let store = JsonDirStore::open(tmp.path()).await.unwrap();
        let account = AccountContext::new("u1");

        store.put_file(&account, "data.csv").await.unwrap();
        let rows = vec![Row::from_pairs([("name", "Alice")])];
        let written = store
            .add_batch(&account, "data.csv", BatchData::Rows(rows.clone()))
            .await
            .unwrap();

        let batches = store.list_batches(&account, "data.csv").await.unwrap();
        assert_eq!(batches, vec![UploadBatch::new(written.created_at, BatchData::Rows(rows))]);
        assert_eq!(store.list_files(&account).await.unwrap(), vec!["data.csv"]);

        // A second store over the same directory sees the same documents
        let reopened = JsonDirStore::open(tmp.path()).await.unwrap();
        assert_eq!(reopened.list_batches(&account, "data.csv").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_entry_and_batches() {
        let tmp = TempDir::new().unwrap();
        let store = JsonDirStore::open(tmp.path()).await.unwrap();
        let account = AccountContext::new("u1");

        store.put_file(&account, "x.tsv").await.unwrap();
        store.add_batch(&account, "x.tsv", BatchData::Rows(Vec::new())).await.unwrap();
        store.delete_file(&account, "x.tsv").await.unwrap();

        assert!(store.list_files(&account).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_file(&account, "x.tsv").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_path_like_names() {
        let tmp = TempDir::new().unwrap();
        let store = JsonDirStore::open(tmp.path()).await.unwrap();
        let account = AccountContext::new("u1");
        for name in ["../evil.csv", "a/b.csv", "..", ""] {
            assert!(matches!(
                store.put_file(&account, name).await,
                Err(StoreError::InvalidName(_))
            ));
        }
    }

    #[tokio::test]
    async fn profile_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = JsonDirStore::open(tmp.path()).await.unwrap();
        let account = AccountContext::new("u1");
        assert_eq!(store.get_profile(&account).await.unwrap(), None);

        let profile = AccountProfile {
            username: Some("alice".into()),
            display_name: None,
        };
        store.put_profile(&account, profile.clone()).await.unwrap();
        assert_eq!(store.get_profile(&account).await.unwrap(), Some(profile));
    }
}
