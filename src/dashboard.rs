use futures::future::try_join_all;
use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::account::{AccountContext, AccountProfile};
use crate::decoder;
use crate::docstore::{DocumentStore, check_segment};
use crate::error::ActionError;
use crate::normalizer::{BatchData, normalize};
use crate::store::{FileGroup, RecordStore, SearchInput};

/// A file chosen by the user, already read into memory.
#[derive(Clone, Debug)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        UploadFile {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Result of a successful upload.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub file_name: String,
    pub rows: usize,
    pub batch_id: Uuid,
}

/// Decode a file and persist it as one batch under its own file entry
///
/// Nothing is written when the name is not a valid storage key or decoding fails.
///
/// # Arguments
/// * `store` - The document store collaborator
/// * `account` - The signed-in account
/// * `file` - The uploaded file
///
/// # Returns
/// * `Result<UploadReceipt, ActionError>` - Row count and batch id, or the decode/store error
pub async fn upload<S: DocumentStore>(
    store: &S,
    account: &AccountContext,
    file: &UploadFile,
) -> Result<UploadReceipt, ActionError> {
    check_segment(&file.name)?;
    let rows = decoder::decode(&file.name, &file.bytes)?;
    let row_count = rows.len();

    store.put_file(account, &file.name).await?;
    let batch = store
        .add_batch(account, &file.name, BatchData::Rows(rows))
        .await?;

    info!(
        "Uploaded '{}' for account {} ({} rows, batch {})",
        file.name, account.uid, row_count, batch.id
    );
    Ok(UploadReceipt {
        file_name: file.name.clone(),
        rows: row_count,
        batch_id: batch.id,
    })
}

/// Upload several files in order, stopping at the first failure.
pub async fn upload_all<S: DocumentStore>(
    store: &S,
    account: &AccountContext,
    files: &[UploadFile],
) -> Result<Vec<UploadReceipt>, ActionError> {
    let mut receipts = Vec::with_capacity(files.len());
    for file in files {
        receipts.push(upload(store, account, file).await?);
    }
    Ok(receipts)
}

pub async fn delete_file<S: DocumentStore>(
    store: &S,
    account: &AccountContext,
    file_name: &str,
) -> Result<(), ActionError> {
    store.delete_file(account, file_name).await?;
    info!("Deleted '{}' for account {}", file_name, account.uid);
    Ok(())
}

/// Delete `old_name`, upload `file` in its place, then re-read the file list.
pub async fn replace_file<S: DocumentStore>(
    store: &S,
    account: &AccountContext,
    old_name: &str,
    file: &UploadFile,
) -> Result<Vec<String>, ActionError> {
    // Validate up front so a bad replacement leaves the old entry intact
    check_segment(&file.name)?;
    decoder::decode(&file.name, &file.bytes)?;

    store.delete_file(account, old_name).await?;
    upload(store, account, file).await?;
    info!("Replaced '{}' with '{}' for account {}", old_name, file.name, account.uid);
    list_files(store, account).await
}

pub async fn list_files<S: DocumentStore>(
    store: &S,
    account: &AccountContext,
) -> Result<Vec<String>, ActionError> {
    Ok(store.list_files(account).await?)
}

/// Read every file's batches concurrently and assemble normalized groups.
pub async fn fetch_groups<S: DocumentStore>(
    store: &S,
    account: &AccountContext,
) -> Result<Vec<FileGroup>, ActionError> {
    let file_names = store.list_files(account).await?;

    let groups = try_join_all(file_names.into_iter().map(|file_name| async move {
        let batches = store.list_batches(account, &file_name).await?;
        Ok::<_, ActionError>(FileGroup::new(file_name, normalize(&batches)))
    }))
    .await?;

    info!("Fetched {} file groups for account {}", groups.len(), account.uid);
    Ok(groups)
}

/// Store a new username on the account profile, keeping its other fields.
pub async fn update_username<S: DocumentStore>(
    store: &S,
    account: &AccountContext,
    username: &str,
) -> Result<AccountProfile, ActionError> {
    let mut profile = store.get_profile(account).await?.unwrap_or_default();
    profile.username = Some(username.trim().to_string());
    store.put_profile(account, profile.clone()).await?;
    info!("Updated username for account {}", account.uid);
    Ok(profile)
}

/// Name to greet the account with.
pub async fn display_name<S: DocumentStore>(
    store: &S,
    account: &AccountContext,
) -> Result<String, ActionError> {
    let profile = store.get_profile(account).await?.unwrap_or_default();
    Ok(profile.shown_name().to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Info,
    Error,
}

/// User-visible outcome of the last action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        StatusMessage {
            kind: StatusKind::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        StatusMessage {
            kind: StatusKind::Error,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == StatusKind::Error
    }
}

pub const FETCH_FAILED: &str = "An error occurred while fetching data";
pub const UPLOAD_FAILED: &str = "An error occurred while uploading";
pub const REPLACE_FAILED: &str = "An error occurred while replacing";
pub const DELETE_FAILED: &str = "An error occurred while deleting";
pub const ACCOUNT_UPDATE_FAILED: &str = "Failed to update account";

/// Identifies one fetch; results from an older ticket are discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchTicket(u64);

/// State behind one dashboard view: the record store, the search box and the
/// status line.
///
/// Every mutation re-fetches from the document store instead of patching the
/// local groups, except a confirmed delete which drops the group directly.
#[derive(Debug, Default)]
pub struct Dashboard {
    records: RecordStore,
    search: SearchInput,
    status: Option<StatusMessage>,
    file_names: Vec<String>,
    generation: u64,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Groups currently shown (after the last committed search).
    pub fn visible(&self) -> &[FileGroup] {
        self.records.filtered()
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn file_names(&self) -> &[String] {
        &self.file_names
    }

    /// Update the search box text. The visible groups do not change.
    pub fn type_search(&mut self, text: impl Into<String>) {
        self.search.set_draft(text);
    }

    /// Apply the search box text (the "enter" key).
    pub fn commit_search(&mut self) -> &[FileGroup] {
        self.records.commit_search(&self.search)
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.generation += 1;
        FetchTicket(self.generation)
    }

    /// Invalidate any fetch still in flight; its result will be ignored.
    pub fn unmount(&mut self) {
        self.generation += 1;
    }

    /// Apply a fetch result if its ticket is still current
    ///
    /// On failure the previously loaded groups stay in place and an error
    /// status is shown. A later successful fetch clears that error.
    ///
    /// # Returns
    /// * `bool` - Whether the result was applied
    pub fn apply_fetch(&mut self, ticket: FetchTicket, result: Result<Vec<FileGroup>, ActionError>) -> bool {
        if ticket.0 != self.generation {
            warn!("Discarding stale fetch result (ticket {}, current {})", ticket.0, self.generation);
            return false;
        }
        match result {
            Ok(groups) => {
                if self.status.as_ref().is_some_and(|s| s.is_error() && s.text == FETCH_FAILED) {
                    self.status = None;
                }
                self.file_names = groups.iter().map(|g| g.file_name.clone()).collect();
                self.records.load(groups);
            }
            Err(e) => {
                warn!("Fetch failed: {}", e);
                self.status = Some(StatusMessage::error(FETCH_FAILED));
            }
        }
        true
    }

    /// Re-read every group from the store.
    pub async fn refresh<S: DocumentStore>(&mut self, store: &S, account: &AccountContext) -> bool {
        let ticket = self.begin_fetch();
        let result = fetch_groups(store, account).await;
        self.apply_fetch(ticket, result)
    }

    pub async fn upload<S: DocumentStore>(&mut self, store: &S, account: &AccountContext, file: &UploadFile) {
        self.status = Some(StatusMessage::info(format!("Uploading '{}'...", file.name)));
        match upload(store, account, file).await {
            Ok(_) => {
                self.status = Some(StatusMessage::info(format!("Upload of '{}' complete!", file.name)));
                self.refresh(store, account).await;
            }
            Err(e) => {
                warn!("Upload of '{}' failed: {}", file.name, e);
                self.status = Some(StatusMessage::error(UPLOAD_FAILED));
            }
        }
    }

    pub async fn delete<S: DocumentStore>(&mut self, store: &S, account: &AccountContext, file_name: &str) {
        match delete_file(store, account, file_name).await {
            Ok(()) => {
                self.records.remove_group(file_name);
                self.file_names.retain(|name| name != file_name);
                self.status = Some(StatusMessage::info(format!("Deleted '{}'", file_name)));
            }
            Err(e) => {
                warn!("Delete of '{}' failed: {}", file_name, e);
                self.status = Some(StatusMessage::error(DELETE_FAILED));
            }
        }
    }

    pub async fn replace<S: DocumentStore>(
        &mut self,
        store: &S,
        account: &AccountContext,
        old_name: &str,
        file: &UploadFile,
    ) {
        match replace_file(store, account, old_name, file).await {
            Ok(_) => {
                self.status = Some(StatusMessage::info(format!(
                    "Replaced '{}' with '{}'",
                    old_name, file.name
                )));
                self.refresh(store, account).await;
            }
            Err(e) => {
                warn!("Replace of '{}' failed: {}", old_name, e);
                // The store may have changed before the failure
                self.refresh(store, account).await;
                self.status = Some(StatusMessage::error(REPLACE_FAILED));
            }
        }
    }
}
