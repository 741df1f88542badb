//! Installation state store.
//!
//! Tracks which components are installed, the metadata their installers
//! produced (generated secrets, domains, network names) and any lifecycle
//! transition that is in flight. This is machine-generated state, separate
//! from the user configuration.
//!
//! The store is the only writer of the state document. Every mutation is
//! written through immediately, via a temp file in the same directory and a
//! rename, so an interrupted process leaves the last completed write behind.
//! A document that cannot be parsed is replaced by a fresh default rather
//! than failing the process.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StateError;
use crate::lifecycle::TransitionPhase;

/// Schema version written into new documents.
pub const STATE_VERSION: &str = "1.0";

/// Keys owned by the store inside a component record.
pub const RESERVED_KEYS: &[&str] = &["installed", "installed_at"];

/// Install-time metadata of a component, in insertion order.
pub type Metadata = IndexMap<String, Value>;

/// Persisted record of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Set by the store on every successful install.
    #[serde(default)]
    pub installed: bool,
    /// When the component was (re)installed.
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub installed_at: Option<DateTime<Utc>>,
    /// Everything the component's installer recorded.
    #[serde(flatten)]
    pub metadata: Metadata,
}

impl ComponentRecord {
    /// Look up a metadata value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Look up a metadata value that is expected to be a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// A lifecycle transition that has started but not finished.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub phase: TransitionPhase,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub started_at: DateTime<Utc>,
}

/// The whole on-disk document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub components: IndexMap<String, ComponentRecord>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub pending: IndexMap<String, PendingOperation>,
}

impl StateDocument {
    /// A fresh, empty document.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION.to_string(),
            created_at: now,
            last_updated: now,
            components: IndexMap::new(),
            pending: IndexMap::new(),
        }
    }
}

fn default_version() -> String {
    STATE_VERSION.to_string()
}

/// Timestamps as written by this store (RFC 3339) or by older installers,
/// which wrote naive ISO 8601 local times. Unparseable values fall back to
/// "now" (or `None`) instead of rejecting the whole document.
mod timestamp {
    use super::*;

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()?
            .and_local_timezone(Local)
            .earliest()
            .map(|ts| ts.with_timezone(&Utc))
    }

    pub(super) fn deserialize_opt<'de, D>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(|raw| {
            let parsed = parse(raw);
            if parsed.is_none() {
                debug!("ignoring unparseable timestamp {raw:?}");
            }
            parsed
        }))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(deserialize_opt(deserializer)?.unwrap_or_else(Utc::now))
    }
}

impl Default for StateDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// One line of the status view.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEntry {
    pub name: String,
    pub version: Option<String>,
    pub installed_at: Option<DateTime<Utc>>,
}

/// Snapshot used by the "system status" view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusSummary {
    pub installed: Vec<StatusEntry>,
    pub interrupted: Vec<(String, PendingOperation)>,
}

/// Handle on the state document at a fixed path.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    document: StateDocument,
}

impl StateStore {
    /// Load the document at `path`, or start from an empty one.
    ///
    /// Missing, unreadable and malformed files all yield a fresh default
    /// document; the last two are logged as warnings.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = load_document(&path);
        Self { path, document }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only view of the whole document.
    pub fn document(&self) -> &StateDocument {
        &self.document
    }

    /// Current record of `name`, if any.
    pub fn get(&self, name: &str) -> Option<&ComponentRecord> {
        self.document.components.get(name)
    }

    /// Record a successful install of `name` with the given metadata.
    ///
    /// Replaces any previous record (keeping its position), stamps
    /// `installed=true` and the install time, and persists immediately.
    /// Reserved keys in `metadata` are dropped.
    pub fn set(&mut self, name: &str, mut metadata: Metadata) -> Result<(), StateError> {
        for key in RESERVED_KEYS {
            metadata.shift_remove(*key);
        }

        let record = ComponentRecord {
            installed: true,
            installed_at: Some(Utc::now()),
            metadata,
        };
        self.document.components.insert(name.to_string(), record);
        debug!(component = name, "recorded install");
        self.save()
    }

    /// Delete the record of `name`.
    ///
    /// Returns `Ok(false)` without writing if there was nothing to remove.
    pub fn remove(&mut self, name: &str) -> Result<bool, StateError> {
        if self.document.components.shift_remove(name).is_none() {
            return Ok(false);
        }
        debug!(component = name, "removed record");
        self.save()?;
        Ok(true)
    }

    /// Whether `name` has a record with `installed=true`.
    pub fn is_installed(&self, name: &str) -> bool {
        self.get(name).is_some_and(|record| record.installed)
    }

    /// Names of installed components, in insertion order.
    pub fn list_installed(&self) -> Vec<String> {
        self.document
            .components
            .iter()
            .filter(|(_, record)| record.installed)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Set one metadata field on an existing record.
    ///
    /// Returns `Ok(false)` without writing if the record does not exist or
    /// `field` is a reserved key.
    pub fn update_field(
        &mut self,
        name: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<bool, StateError> {
        if RESERVED_KEYS.contains(&field) {
            return Ok(false);
        }
        let Some(record) = self.document.components.get_mut(name) else {
            return Ok(false);
        };
        record.metadata.insert(field.to_string(), value.into());
        self.save()?;
        Ok(true)
    }

    /// Write a copy of the in-memory document to `path`.
    ///
    /// The in-memory document (including `last_updated`) is left untouched.
    pub fn export(&self, path: &Path) -> Result<(), StateError> {
        write_document(path, &self.document)
    }

    /// Record that a lifecycle transition of `name` has started.
    pub fn begin(&mut self, name: &str, phase: TransitionPhase) -> Result<(), StateError> {
        let op = PendingOperation {
            phase,
            started_at: Utc::now(),
        };
        self.document.pending.insert(name.to_string(), op);
        self.save()
    }

    /// Clear the pending transition of `name`, if any.
    pub fn finish(&mut self, name: &str) -> Result<(), StateError> {
        if self.document.pending.shift_remove(name).is_none() {
            return Ok(());
        }
        self.save()
    }

    /// The pending transition of `name`, if any.
    pub fn pending(&self, name: &str) -> Option<&PendingOperation> {
        self.document.pending.get(name)
    }

    /// All transitions that were started and never finished.
    pub fn interrupted(&self) -> Vec<(String, PendingOperation)> {
        self.document
            .pending
            .iter()
            .map(|(name, op)| (name.clone(), *op))
            .collect()
    }

    /// Forget everything: delete the file and start from an empty document.
    pub fn clear(&mut self) -> Result<(), StateError> {
        self.document = StateDocument::new();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Clear {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Installed components and interrupted transitions.
    pub fn summary(&self) -> StatusSummary {
        let installed = self
            .document
            .components
            .iter()
            .filter(|(_, record)| record.installed)
            .map(|(name, record)| StatusEntry {
                name: name.clone(),
                version: record.get_str("version").map(String::from),
                installed_at: record.installed_at,
            })
            .collect();

        StatusSummary {
            installed,
            interrupted: self.interrupted(),
        }
    }

    /// Password generated by the database installer.
    pub fn postgres_password(&self) -> Option<&str> {
        self.get("pgvector").and_then(|r| r.get_str("password"))
    }

    /// Overlay network chosen by the prerequisites installer.
    pub fn network_name(&self) -> Option<&str> {
        self.get("prerequisites").and_then(|r| r.get_str("network"))
    }

    fn save(&mut self) -> Result<(), StateError> {
        self.document.last_updated = Utc::now();
        write_document(&self.path, &self.document)
    }
}

fn load_document(path: &Path) -> StateDocument {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return StateDocument::new(),
        Err(err) => {
            warn!(
                "cannot read state file {}: {}; starting from an empty state",
                path.display(),
                err
            );
            return StateDocument::new();
        }
    };

    match serde_json::from_str(&contents) {
        Ok(document) => document,
        Err(err) => {
            warn!(
                "state file {} is corrupt ({}); starting from an empty state",
                path.display(),
                err
            );
            StateDocument::new()
        }
    }
}

fn write_document(path: &Path, document: &StateDocument) -> Result<(), StateError> {
    let persist_err = |source: io::Error| StateError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(persist_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(persist_err)?;
    serde_json::to_writer_pretty(&mut tmp, document)?;
    tmp.write_all(b"\n").map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(path).map_err(|err| persist_err(err.error))?;
    Ok(())
}
