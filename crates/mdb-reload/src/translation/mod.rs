//! Community translation text.
//!
//! Translation files are JSON documents in one of three shapes, chosen by
//! their location in the repository:
//!
//! - `localify/ui.json`: a flat object of original text to translation
//! - `mdb/**`: an object whose `text` member maps original to translation
//! - anything else: an object whose `text` member is an array of
//!   `{"jpText": ..., "enText": ...}` entries
//!
//! All files are merged into one dictionary keyed by original text. The first
//! file (in path order) to provide a key wins.

use std::collections::BTreeMap;
use std::path::Path;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::TranslationConfig;
use crate::core::schema::{ColumnDescriptor, TableSnapshot};
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};
use crate::fetch::{GithubClient, RepoTree};

/// JSON layout of a translation file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationFormat {
    Flat,
    TextObject,
    TextArray,
}

impl TranslationFormat {
    /// Format of the file at `path`, relative to the first `prefix` segment.
    pub fn for_path(path: &str, prefix: &str) -> Self {
        let relative = path
            .find(prefix)
            .map(|idx| &path[idx + prefix.len()..])
            .unwrap_or(path);

        if relative == "localify/ui.json" {
            TranslationFormat::Flat
        } else if relative.starts_with("mdb/") {
            TranslationFormat::TextObject
        } else {
            TranslationFormat::TextArray
        }
    }
}

/// JSON strings are taken verbatim; anything else as its JSON text.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn text_member<'a>(root: &'a Value, path: &str) -> Result<&'a Value> {
    root.get("text").ok_or_else(|| {
        MigrateError::transfer(path, "translation file has no \"text\" member")
    })
}

/// Parse one translation file into `(original, translated)` pairs. Array
/// entries keep document order; object members come back sorted by key.
pub fn parse_translation(
    path: &str,
    format: TranslationFormat,
    content: &str,
) -> Result<Vec<(String, String)>> {
    let root: Value = serde_json::from_str(content)?;

    let pairs = match format {
        TranslationFormat::Flat => object_pairs(&root, path)?,
        TranslationFormat::TextObject => object_pairs(text_member(&root, path)?, path)?,
        TranslationFormat::TextArray => {
            let entries = text_member(&root, path)?.as_array().ok_or_else(|| {
                MigrateError::transfer(path, "\"text\" member is not an array")
            })?;
            entries
                .iter()
                .filter_map(|entry| {
                    let original = entry.get("jpText").map(value_text).unwrap_or_default();
                    if original.is_empty() {
                        return None;
                    }
                    let translated = entry.get("enText").map(value_text).unwrap_or_default();
                    Some((original, translated))
                })
                .collect()
        }
    };

    Ok(pairs)
}

fn object_pairs(value: &Value, path: &str) -> Result<Vec<(String, String)>> {
    let object = value
        .as_object()
        .ok_or_else(|| MigrateError::transfer(path, "expected a JSON object"))?;
    Ok(object
        .iter()
        .map(|(k, v)| (k.clone(), value_text(v)))
        .collect())
}

/// Merged translations, ordered by original text.
#[derive(Debug, Clone, Default)]
pub struct TranslationDictionary {
    entries: BTreeMap<String, String>,
}

impl TranslationDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add pairs whose original text is not present yet. Returns how many
    /// were added.
    pub fn merge(&mut self, pairs: impl IntoIterator<Item = (String, String)>) -> usize {
        let mut added = 0;
        for (original, translated) in pairs {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.entries.entry(original)
            {
                slot.insert(translated);
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, original: &str) -> Option<&str> {
        self.entries.get(original).map(String::as_str)
    }

    /// Two-column snapshot for a positional load into the translation table.
    pub fn to_snapshot(&self, table: &str) -> TableSnapshot {
        let rows = self
            .entries
            .iter()
            .map(|(k, v)| vec![SqlValue::from(k.as_str()), SqlValue::from(v.as_str())])
            .collect();
        TableSnapshot::new(
            table,
            vec![
                ColumnDescriptor::new("OriginalText", "TEXT", false),
                ColumnDescriptor::new("TranslatedText", "TEXT", true),
            ],
        )
        .with_rows(rows)
    }
}

/// Paths of translation JSON files in a tree listing, sorted.
pub fn translation_paths(tree: &RepoTree, prefix: &str) -> Vec<String> {
    let mut paths: Vec<String> = tree
        .tree
        .iter()
        .filter(|e| e.is_file() && e.path.contains(prefix) && e.path.ends_with(".json"))
        .map(|e| e.path.clone())
        .collect();
    paths.sort();
    paths
}

async fn fetch_one(
    client: &GithubClient,
    config: &TranslationConfig,
    work_dir: &Path,
    path: &str,
) -> Result<Vec<(String, String)>> {
    let local = work_dir.join(path);
    client
        .download(&config.repository, &config.branch, path, &local)
        .await?;

    let parsed = match tokio::fs::read_to_string(&local).await {
        Ok(content) => parse_translation(
            path,
            TranslationFormat::for_path(path, &config.path_prefix),
            &content,
        ),
        Err(e) => Err(e.into()),
    };

    if let Err(e) = tokio::fs::remove_file(&local).await {
        warn!("Could not delete {}: {}", local.display(), e);
    } else {
        debug!("Deleted \"{}\"", local.display());
    }

    parsed
}

/// Download every translation file and merge them.
///
/// Files that fail to download or parse are logged and skipped. Only a
/// failed tree listing is an error.
pub async fn download_translations(
    client: &GithubClient,
    config: &TranslationConfig,
    work_dir: &Path,
) -> Result<TranslationDictionary> {
    let tree = client.list_tree(&config.repository, &config.branch).await?;
    if tree.truncated {
        warn!(
            "Tree listing of {}/{} is truncated; some translations will be missing",
            config.repository, config.branch
        );
    }

    let paths = translation_paths(&tree, &config.path_prefix);
    let total = paths.len();
    info!("Started downloading {} JSON translation files", total);

    // buffered keeps completion order equal to path order
    let mut results = stream::iter(paths.iter())
        .map(|path| async move { (path, fetch_one(client, config, work_dir, path).await) })
        .buffered(config.max_concurrent_downloads.max(1));

    let mut dictionary = TranslationDictionary::new();
    let mut done = 0usize;
    while let Some((path, result)) = results.next().await {
        done += 1;
        match result {
            Ok(pairs) => {
                dictionary.merge(pairs);
            }
            Err(e) => warn!("Skipping translation file {}: {}", path, e),
        }
        if done % config.max_concurrent_downloads.max(1) == 0 {
            info!("Downloaded {} of {} files", done, total);
        }
    }

    info!(
        "Finished downloading JSON translation files: {} entries",
        dictionary.len()
    );
    Ok(dictionary)
}
