// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Durable record of which episodes have already been materialized.
//!
//! The ledger is one JSON document, loaded whole when opened and
//! rewritten atomically on every commit. Only one process may write a
//! given ledger at a time; concurrent runs are not coordinated.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::LedgerError;

const LEDGER_VERSION: u32 = 1;

/// Timestamp format of the legacy `last_updated` field
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Durable proof that one identifier was materialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub materialized_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl LedgerEntry {
    pub fn new(sink_reference: Option<String>) -> Self {
        Self {
            materialized_at: Utc::now(),
            sink_reference,
            size_bytes: None,
            content_hash: None,
        }
    }

    pub fn with_content(mut self, size_bytes: u64, content_hash: String) -> Self {
        self.size_bytes = Some(size_bytes);
        self.content_hash = Some(content_hash);
        self
    }
}

#[derive(Serialize)]
struct LedgerDocumentRef<'a> {
    version: u32,
    entries: BTreeMap<&'a str, &'a LedgerEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LedgerDocument {
    Current {
        #[serde(default)]
        #[allow(dead_code)]
        version: u32,
        entries: HashMap<String, LedgerEntry>,
    },
    Legacy {
        downloaded_shiurim: Vec<serde_json::Value>,
        #[serde(default)]
        last_updated: Option<String>,
    },
}

/// The dedup ledger for one sink
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: HashMap<String, LedgerEntry>,
    dirty: bool,
}

impl Ledger {
    /// Load the ledger at `path`, starting empty when the file does not exist.
    ///
    /// A file that exists but cannot be parsed is an error rather than an
    /// empty ledger, since treating it as empty would re-download everything.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => parse_document(path, &content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no ledger yet, starting empty");
                HashMap::new()
            }
            Err(e) => {
                return Err(LedgerError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        info!(path = %path.display(), entries = entries.len(), "ledger loaded");

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        })
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&LedgerEntry> {
        self.entries.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifier whose entry points at `location`, if any
    pub fn owner_of_location(&self, location: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.sink_reference.as_deref() == Some(location))
            .map(|(id, _)| id.as_str())
    }

    /// Record `identifier` as materialized and persist immediately.
    ///
    /// Committing an identifier that is already present changes nothing
    /// and returns `Ok(false)`.
    pub fn commit(&mut self, identifier: &str, entry: LedgerEntry) -> Result<bool, LedgerError> {
        if self.entries.contains_key(identifier) {
            debug!(identifier, "already in ledger");
            return Ok(false);
        }

        self.entries.insert(identifier.to_string(), entry);
        self.dirty = true;
        self.flush()?;
        debug!(identifier, "committed to ledger");
        Ok(true)
    }

    /// Write the ledger to disk via a temporary file and rename
    pub fn flush(&mut self) -> Result<(), LedgerError> {
        let document = LedgerDocumentRef {
            version: LEDGER_VERSION,
            entries: self.entries.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::WriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let tmp_path = tmp_path_for(&self.path);
        write_synced(&tmp_path, json.as_bytes()).map_err(|e| LedgerError::WriteFailed {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| LedgerError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })?;

        self.dirty = false;
        Ok(())
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        if self.dirty
            && let Err(e) = self.flush()
        {
            warn!(path = %self.path.display(), error = %e, "failed to flush ledger on close");
        }
    }
}

fn parse_document(path: &Path, content: &str) -> Result<HashMap<String, LedgerEntry>, LedgerError> {
    let document: LedgerDocument =
        serde_json::from_str(content).map_err(|e| LedgerError::Corrupt {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(match document {
        LedgerDocument::Current { entries, .. } => entries,
        LedgerDocument::Legacy {
            downloaded_shiurim,
            last_updated,
        } => {
            let materialized_at = last_updated
                .as_deref()
                .and_then(|s| NaiveDateTime::parse_from_str(s, LEGACY_TIMESTAMP_FORMAT).ok())
                .map(|naive| naive.and_utc())
                .unwrap_or(DateTime::UNIX_EPOCH);

            info!(
                path = %path.display(),
                count = downloaded_shiurim.len(),
                "importing legacy ledger"
            );

            downloaded_shiurim
                .into_iter()
                .filter_map(|value| match value {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .map(|id| {
                    (
                        id,
                        LedgerEntry {
                            materialized_at,
                            sink_reference: None,
                            size_bytes: None,
                            content_hash: None,
                        },
                    )
                })
                .collect()
        }
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut file = std::fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
