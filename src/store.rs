use log::debug;
use serde::Serialize;

use crate::normalizer::NormalizedRecord;

/// All normalized records belonging to one uploaded file.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileGroup {
    pub file_name: String,
    pub records: Vec<NormalizedRecord>,
}

impl FileGroup {
    pub fn new(file_name: impl Into<String>, records: Vec<NormalizedRecord>) -> Self {
        FileGroup {
            file_name: file_name.into(),
            records,
        }
    }
}

/// Draft text of the search box.
///
/// Typing only changes the draft; the displayed set changes when the draft is
/// committed with [`RecordStore::commit_search`].
#[derive(Clone, Debug, Default)]
pub struct SearchInput {
    draft: String,
}

impl SearchInput {
    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }
}

/// In-memory file groups plus the filtered subset shown to the user.
///
/// `groups` is the unfiltered superset and is only replaced by [`load`](Self::load)
/// or shrunk by [`remove_group`](Self::remove_group); `filtered` is always derived from it.
#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    groups: Vec<FileGroup>,
    filtered: Vec<FileGroup>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both the superset and the view with a freshly fetched list.
    pub fn load(&mut self, groups: Vec<FileGroup>) {
        self.filtered = groups.clone();
        self.groups = groups;
    }

    pub fn groups(&self) -> &[FileGroup] {
        &self.groups
    }

    pub fn filtered(&self) -> &[FileGroup] {
        &self.filtered
    }

    /// Filter the groups by a case-insensitive substring over every field's string form
    ///
    /// An empty (or whitespace-only) query returns the unfiltered groups. Groups
    /// left without matching records are dropped. Never mutates the store.
    ///
    /// # Arguments
    /// * `query` - Search text as typed by the user
    ///
    /// # Returns
    /// * `Vec<FileGroup>` - A new list of groups containing only matching records
    pub fn search(&self, query: &str) -> Vec<FileGroup> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.groups.clone();
        }

        let hits: Vec<FileGroup> = self
            .groups
            .iter()
            .filter_map(|group| {
                let records: Vec<NormalizedRecord> = group
                    .records
                    .iter()
                    .filter(|record| {
                        record
                            .values()
                            .any(|value| value.to_string().to_lowercase().contains(&needle))
                    })
                    .cloned()
                    .collect();
                (!records.is_empty()).then(|| FileGroup::new(group.file_name.clone(), records))
            })
            .collect();

        debug!(
            "Search '{}' matched {} records in {} groups",
            needle,
            count_records(&hits),
            hits.len()
        );
        hits
    }

    /// Apply the committed search text to the displayed set.
    pub fn commit_search(&mut self, input: &SearchInput) -> &[FileGroup] {
        self.filtered = self.search(input.draft());
        &self.filtered
    }

    /// Drop a file's group after the store confirmed its deletion.
    pub fn remove_group(&mut self, file_name: &str) -> bool {
        let before = self.groups.len();
        self.groups.retain(|group| group.file_name != file_name);
        self.filtered.retain(|group| group.file_name != file_name);
        self.groups.len() != before
    }

    pub fn total_records(&self) -> usize {
        count_records(&self.groups)
    }
}

pub fn count_records(groups: &[FileGroup]) -> usize {
    groups.iter().map(|group| group.records.len()).sum()
}
