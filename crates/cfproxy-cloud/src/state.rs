//! Proxy state file
//!
//! Keeps the original `proxied` value of every record `disable` has turned
//! off, keyed by `<zone_id>/<record_id>`. The file is the restore source of
//! truth: entries are created once and never overwritten or removed by a run.

use crate::error::{CloudError, Result};
use crate::provider::{DnsRecord, Zone};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use tokio::sync::Mutex;

const STATE_VERSION: u32 = 2;
const LOCK_STALE_HOURS: i64 = 1;

pub const DEFAULT_STATE_FILE: &str = "proxy_state.json";

/// `(zone_id, record_id)`, serialized as `"<zone_id>/<record_id>"`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateKey {
    pub zone_id: String,
    pub record_id: String,
}

impl StateKey {
    pub fn new(zone_id: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            record_id: record_id.into(),
        }
    }

    pub fn for_record(record: &DnsRecord) -> Self {
        Self::new(&record.zone_id, &record.id)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone_id, self.record_id)
    }
}

impl FromStr for StateKey {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((zone_id, record_id)) if !zone_id.is_empty() && !record_id.is_empty() => {
                Ok(Self::new(zone_id, record_id))
            }
            _ => Err(CloudError::StateError(format!(
                "Invalid state key '{}', expected <zone_id>/<record_id>",
                s
            ))),
        }
    }
}

impl Serialize for StateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Captured original of a single record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub account: String,
    pub zone_id: String,
    pub zone_name: String,
    pub record_id: String,
    pub record_name: String,
    pub record_type: String,
    pub content: String,

    /// Value observed immediately before the first mutation
    pub original_proxied: bool,

    pub captured_at: DateTime<Utc>,
}

/// Whole contents of the state file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyState {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub entries: BTreeMap<StateKey, StateEntry>,
}

impl Default for ProxyState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }
}

impl ProxyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StateKey) -> Option<&StateEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &StateEntry)> {
        self.entries.iter()
    }

    /// Record `current_proxied` as the original value unless an entry already
    /// exists. Returns the stored entry and whether it was created.
    pub fn merge_capture(
        &mut self,
        account: &str,
        zone: &Zone,
        record: &DnsRecord,
        current_proxied: bool,
    ) -> (StateEntry, bool) {
        let key = StateKey::for_record(record);
        if let Some(existing) = self.entries.get(&key) {
            return (existing.clone(), false);
        }

        let entry = StateEntry {
            account: account.to_string(),
            zone_id: zone.id.clone(),
            zone_name: zone.name.clone(),
            record_id: record.id.clone(),
            record_name: record.name.clone(),
            record_type: record.record_type.clone(),
            content: record.content.clone(),
            original_proxied: current_proxied,
            captured_at: Utc::now(),
        };
        self.entries.insert(key, entry.clone());
        self.updated_at = Utc::now();
        (entry, true)
    }
}

/// Reads and writes the state file and its sidecars
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.sibling(".backup")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    /// Load the current state. A missing file is an empty state
    pub async fn load(&self) -> Result<ProxyState> {
        if !fs::try_exists(&self.path).await? {
            tracing::debug!("State file {} not found, starting empty", self.path.display());
            return Ok(ProxyState::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        let unreadable = |e: serde_json::Error| {
            CloudError::StateError(format!(
                "State file {} is unreadable ({}); fix it or move it aside",
                self.path.display(),
                e
            ))
        };
        let raw: serde_json::Value = serde_json::from_str(&content).map_err(unreadable)?;

        let version = raw.get("version").and_then(serde_json::Value::as_u64);
        if let Some(version) = version.filter(|v| *v > u64::from(STATE_VERSION)) {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                version, STATE_VERSION
            )));
        }
        // v1 nested captures under `accounts.<name>.<zone_id>.records`
        if version == Some(1) || (version.is_none() && raw.get("accounts").is_some()) {
            return Err(CloudError::StateError(format!(
                "State file {}: legacy v1 state format is not supported; \
                 restore with the tool that wrote it, then move it aside",
                self.path.display()
            )));
        }

        let state: ProxyState = serde_json::from_value(raw).map_err(unreadable)?;
        tracing::debug!("Loaded state with {} entries", state.len());
        Ok(state)
    }

    /// Atomically replace the state file
    ///
    /// Runs on a blocking task: once started, the write and rename complete
    /// even if the caller is dropped.
    pub async fn save(&self, state: &ProxyState) -> Result<()> {
        let content = serde_json::to_string_pretty(state)?;
        let path = self.path.clone();
        let temp = self.temp_path();
        let backup = self.backup_path();
        let count = state.len();

        tokio::task::spawn_blocking(move || write_atomic(&path, &temp, &backup, content.as_bytes()))
            .await
            .map_err(|e| CloudError::StateError(format!("State write task failed: {}", e)))??;

        tracing::debug!("Saved state with {} entries", count);
        Ok(())
    }

    /// Acquire the cross-process lock for exclusive read-modify-write
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        if fs::try_exists(&lock_path).await? {
            let content = fs::read_to_string(&lock_path).await?;
            match serde_json::from_str::<LockInfo>(&content) {
                Ok(info) => {
                    let age = Utc::now().signed_duration_since(info.acquired_at);
                    if age.num_hours() < LOCK_STALE_HOURS {
                        return Err(CloudError::LockError(format!(
                            "{} is held by {} (pid {}) since {}",
                            lock_path.display(),
                            info.holder,
                            info.pid,
                            info.acquired_at
                        )));
                    }
                    tracing::warn!("Removing stale lock from {} (pid {})", info.holder, info.pid);
                }
                Err(_) => tracing::warn!("Removing unreadable lock file {}", lock_path.display()),
            }
            fs::remove_file(&lock_path).await?;
        }

        let info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&info)?;

        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(CloudError::LockError(format!(
                    "{} was taken by another process",
                    lock_path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes())?;

        tracing::debug!("Acquired state lock {}", lock_path.display());
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

fn write_atomic(path: &Path, temp: &Path, backup: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    {
        let mut file = std::fs::File::create(temp)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    if path.exists() {
        std::fs::copy(path, backup)?;
    }
    std::fs::rename(temp, path)?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock
#[derive(Debug)]
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if fs::try_exists(&self.lock_path).await? {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

/// Loaded state shared across concurrently running accounts
///
/// Every merge-and-save cycle happens under one async mutex, so cycles from
/// different accounts never interleave.
pub struct StateHandle {
    store: StateStore,
    state: Mutex<ProxyState>,
}

impl StateHandle {
    pub async fn open(store: StateStore) -> Result<Self> {
        let state = store.load().await?;
        Ok(Self {
            store,
            state: Mutex::new(state),
        })
    }

    /// Wrap an already loaded state
    pub fn with_state(store: StateStore, state: ProxyState) -> Self {
        Self {
            store,
            state: Mutex::new(state),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub async fn entry(&self, key: &StateKey) -> Option<StateEntry> {
        self.state.lock().await.get(key).cloned()
    }

    pub async fn snapshot(&self) -> ProxyState {
        self.state.lock().await.clone()
    }

    /// Merge captures for `records` (all currently proxied) and persist them.
    ///
    /// The file is re-read first, so entries written by another process
    /// since this handle was opened are kept. It is written only when at
    /// least one entry is new. On a failed save the in-memory state is left
    /// untouched. Returns the number of new entries.
    pub async fn capture(&self, account: &str, zone: &Zone, records: &[&DnsRecord]) -> Result<usize> {
        let mut guard = self.state.lock().await;
        let mut next = self.store.load().await?;
        for (key, entry) in guard.iter() {
            next.entries
                .entry(key.clone())
                .or_insert_with(|| entry.clone());
        }

        let created = records
            .iter()
            .filter(|record| next.merge_capture(account, zone, record, true).1)
            .count();

        if created > 0 {
            self.store.save(&next).await?;
            tracing::debug!(account, zone = %zone.name, created, "Captured original proxied values");
        }
        *guard = next;
        Ok(created)
    }
}
