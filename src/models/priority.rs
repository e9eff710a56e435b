//! Durable provider ordering
//!
//! The priority store is a JSON array of `{id, priority, enabled, model}`
//! entries. It is read once at startup and cached; `reload()` re-reads it so
//! edits made outside the process become visible without a restart. Every
//! mutation persists the whole collection before the in-memory cache changes,
//! using write-to-temp-then-rename so readers of the file never observe a
//! partial write.
//!
//! Stored order carries no meaning. Callers always see entries sorted by
//! ascending `priority` (lower = tried earlier), ties broken by id.

use crate::config::ProviderDescriptor;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// One provider's position in the fallback order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityEntry {
    pub id: String,
    pub priority: i32,
    pub enabled: bool,
    pub model: String,
}

/// Changes to one entry, applied and persisted together
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryPatch {
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
    pub model: Option<String>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.priority.is_none() && self.enabled.is_none() && self.model.is_none()
    }
}

/// Cached, reloadable provider ranking backed by a JSON file
#[derive(Debug)]
pub struct PriorityStore {
    path: PathBuf,
    entries: RwLock<Vec<PriorityEntry>>,
}

impl PriorityStore {
    /// Load the store from disk
    ///
    /// # Errors
    /// Fails if the file is missing, is not a JSON array of entries, or
    /// contains duplicate ids. No default is created implicitly.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = read_entries(&path).await?;

        tracing::info!(
            path = %path.display(),
            entries = entries.len(),
            enabled = entries.iter().filter(|e| e.enabled).count(),
            "Priority store loaded"
        );

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Write the default ordering for `descriptors` and load it
    ///
    /// Default ordering is config order, priorities 1..=N, all enabled, each
    /// provider on its descriptor's default model. Refuses to replace an
    /// existing file unless `overwrite` is set.
    pub async fn create_default(
        path: impl Into<PathBuf>,
        descriptors: &[ProviderDescriptor],
        overwrite: bool,
    ) -> Result<Self, StoreError> {
        let path = path.into();

        if !overwrite && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StoreError::Invalid {
                path: path.display().to_string(),
                reason: "file already exists (pass --force to overwrite)".to_string(),
            });
        }

        let entries = default_entries(descriptors);
        persist(&path, &entries).await?;
        Self::load(path).await
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Discard the cache and re-read the backing file
    ///
    /// On failure the previous cache is kept and the error returned.
    pub async fn reload(&self) -> Result<(), StoreError> {
        // Hold the write lock across the read so a concurrent mutation cannot
        // be overwritten by an older file snapshot.
        let mut guard = self.entries.write().await;
        let entries = read_entries(&self.path).await?;

        tracing::info!(
            path = %self.path.display(),
            entries = entries.len(),
            "Priority store reloaded"
        );

        *guard = entries;
        Ok(())
    }

    /// Snapshot of all entries, sorted by ascending priority
    pub async fn entries(&self) -> Vec<PriorityEntry> {
        let mut entries = self.entries.read().await.clone();
        sort_entries(&mut entries);
        entries
    }

    /// Enabled provider ids in the order they should be attempted
    pub async fn ordered_enabled_provider_ids(&self) -> Vec<String> {
        self.entries()
            .await
            .into_iter()
            .filter(|e| e.enabled)
            .map(|e| e.id)
            .collect()
    }

    /// Model currently selected for a provider
    pub async fn model_for(&self, provider_id: &str) -> Result<String, StoreError> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.id == provider_id)
            .map(|e| e.model.clone())
            .ok_or_else(|| StoreError::NotFound {
                provider_id: provider_id.to_string(),
            })
    }

    pub async fn set_priority(
        &self,
        provider_id: &str,
        priority: i32,
    ) -> Result<PriorityEntry, StoreError> {
        self.update(provider_id, |entry| entry.priority = priority).await
    }

    pub async fn set_enabled(
        &self,
        provider_id: &str,
        enabled: bool,
    ) -> Result<PriorityEntry, StoreError> {
        self.update(provider_id, |entry| entry.enabled = enabled).await
    }

    pub async fn set_model(
        &self,
        provider_id: &str,
        model: &str,
    ) -> Result<PriorityEntry, StoreError> {
        let model = model.trim();
        if model.is_empty() {
            return Err(StoreError::Invalid {
                path: self.path.display().to_string(),
                reason: format!("model for '{}' cannot be empty", provider_id),
            });
        }
        self.update(provider_id, |entry| entry.model = model.to_string())
            .await
    }

    /// Apply every field of `patch` to one entry in a single persisted write
    ///
    /// Either all fields change or none do.
    pub async fn apply(
        &self,
        provider_id: &str,
        patch: &EntryPatch,
    ) -> Result<PriorityEntry, StoreError> {
        let model = patch.model.as_deref().map(str::trim);
        if model.is_some_and(str::is_empty) {
            return Err(StoreError::Invalid {
                path: self.path.display().to_string(),
                reason: format!("model for '{}' cannot be empty", provider_id),
            });
        }

        self.update(provider_id, |entry| {
            if let Some(priority) = patch.priority {
                entry.priority = priority;
            }
            if let Some(enabled) = patch.enabled {
                entry.enabled = enabled;
            }
            if let Some(model) = model {
                entry.model = model.to_string();
            }
        })
        .await
    }

    /// Mutate one entry and persist the whole collection
    ///
    /// The cache is swapped only after the file write succeeded, so a failed
    /// persist leaves both disk and memory on the previous collection.
    async fn update<F>(&self, provider_id: &str, apply: F) -> Result<PriorityEntry, StoreError>
    where
        F: FnOnce(&mut PriorityEntry),
    {
        let mut guard = self.entries.write().await;
        let mut next = guard.clone();

        let entry = next
            .iter_mut()
            .find(|e| e.id == provider_id)
            .ok_or_else(|| StoreError::NotFound {
                provider_id: provider_id.to_string(),
            })?;
        apply(entry);
        let updated = entry.clone();

        persist(&self.path, &next).await?;
        *guard = next;

        tracing::info!(
            provider_id = %updated.id,
            priority = updated.priority,
            enabled = updated.enabled,
            model = %updated.model,
            "Priority entry updated"
        );

        Ok(updated)
    }
}

/// Default ordering derived from configuration order
pub fn default_entries(descriptors: &[ProviderDescriptor]) -> Vec<PriorityEntry> {
    descriptors
        .iter()
        .enumerate()
        .map(|(index, d)| PriorityEntry {
            id: d.id().to_string(),
            priority: i32::try_from(index + 1).unwrap_or(i32::MAX),
            enabled: true,
            model: d.model().to_string(),
        })
        .collect()
}

fn sort_entries(entries: &mut [PriorityEntry]) {
    entries.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
}

async fn read_entries(path: &Path) -> Result<Vec<PriorityEntry>, StoreError> {
    let path_display = path.display().to_string();

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StoreError::Read {
            path: path_display.clone(),
            source,
        })?;

    let entries: Vec<PriorityEntry> =
        serde_json::from_str(&content).map_err(|source| StoreError::Malformed {
            path: path_display.clone(),
            source,
        })?;

    let mut seen = HashSet::new();
    for entry in &entries {
        if entry.id.trim().is_empty() {
            return Err(StoreError::Invalid {
                path: path_display,
                reason: "entry with empty id".to_string(),
            });
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(StoreError::Invalid {
                path: path_display,
                reason: format!("duplicate provider id '{}'", entry.id),
            });
        }
        if entry.model.trim().is_empty() {
            return Err(StoreError::Invalid {
                path: path_display,
                reason: format!("entry '{}' has an empty model", entry.id),
            });
        }
    }

    if !entries.iter().any(|e| e.enabled) {
        tracing::warn!(
            path = %path_display,
            "Priority store has no enabled providers; every chat request will fail"
        );
    }

    Ok(entries)
}

async fn persist(path: &Path, entries: &[PriorityEntry]) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.display().to_string(),
        source,
    };

    let body = serde_json::to_vec_pretty(entries).map_err(|e| {
        write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let written = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(source) = written {
        if let Err(e) = tokio::fs::remove_file(&tmp_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(
                path = %tmp_path.display(),
                error = %e,
                "Failed to remove temporary priority store file"
            );
        }
        return Err(write_err(source));
    }
    Ok(())
}
