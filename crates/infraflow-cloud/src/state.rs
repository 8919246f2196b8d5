//! State management for cloud resources
//!
//! Manages the `.infraflow/state.json` file which records, per logical
//! resource name, what was declared, what was sent to the provider and what
//! the provider returned.

use crate::error::{CloudError, Result};
use crate::provider::ResourceOutputs;
use chrono::{DateTime, Utc};
use infraflow_core::{DependencyGraph, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
/// Default state directory, relative to the project root
pub const STATE_DIR: &str = ".infraflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Recorded state of a whole stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Stack the state belongs to
    #[serde(default)]
    pub stack: Option<String>,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by logical name
    pub resources: BTreeMap<String, ResourceState>,

    /// Resolved stack outputs
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            stack: None,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a resource
    pub fn set_resource(&mut self, name: String, state: ResourceState) {
        self.resources.insert(name, state);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, name: &str) -> Option<ResourceState> {
        let result = self.resources.remove(name);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    /// Get a resource by logical name
    pub fn get_resource(&self, name: &str) -> Option<&ResourceState> {
        self.resources.get(name)
    }

    pub fn get_resource_mut(&mut self, name: &str) -> Option<&mut ResourceState> {
        self.resources.get_mut(name)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Dependency graph of the recorded resources
    ///
    /// Used to order deletions of resources that are no longer declared, so
    /// only the recorded dependencies are available.
    pub fn dependency_graph(&self) -> Result<DependencyGraph> {
        let graph = DependencyGraph::from_dependencies(
            self.resources
                .iter()
                .map(|(name, r)| (name.clone(), r.depends_on.clone())),
        )?;
        Ok(graph)
    }
}

/// State of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider-specific resource ID
    pub id: String,

    /// Resource kind
    pub kind: ResourceKind,

    /// Current status
    pub status: ResourceStatus,

    /// Declared properties, references unresolved
    pub config: serde_json::Value,

    /// Resolved inputs last sent to the provider
    pub inputs: serde_json::Value,

    /// Outputs returned by the provider
    pub outputs: ResourceOutputs,

    /// Logical names this resource depends on
    pub depends_on: BTreeSet<String>,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            status: ResourceStatus::Unknown,
            config: serde_json::Value::Null,
            inputs: serde_json::Value::Null,
            outputs: ResourceOutputs::new(),
            depends_on: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_inputs(mut self, inputs: serde_json::Value) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: ResourceOutputs) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_depends_on(mut self, depends_on: BTreeSet<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn set_status(&mut self, status: ResourceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// An input value as a string
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(|v| v.as_str())
    }

    pub fn get_output<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.outputs
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Provisioned and in sync with the last apply
    Succeeded,
    /// The last operation on the resource failed
    Failed,
    /// Status is unknown
    Unknown,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Succeeded => write!(f, "succeeded"),
            ResourceStatus::Failed => write!(f, "failed"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    /// Directory holding state and lock files
    state_dir: PathBuf,
}

impl StateManager {
    /// State under `<project_root>/.infraflow`
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self::with_state_dir(project_root.as_ref().join(STATE_DIR))
    }

    /// State in an explicit directory
    pub fn with_state_dir(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    /// Get the state directory path
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    /// Get the backup file path
    fn backup_path(&self) -> PathBuf {
        self.state_dir.join(STATE_BACKUP)
    }

    /// Get the lock file path
    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    /// Ensure the state directory exists
    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!("Created state directory: {}", self.state_dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content)?;

        // Version check
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Save the state
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        // Create backup if state file exists
        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // stale after one hour
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn ip_state() -> ResourceState {
        ResourceState::new(
            "/subscriptions/local/resourceGroups/net/providers/Microsoft.Network/publicIPAddresses/ip",
            ResourceKind::PublicIp,
        )
        .with_status(ResourceStatus::Succeeded)
        .with_config(json!({"name": {"type": "literal", "value": "ip"}}))
        .with_inputs(json!({"name": "ip"}))
        .with_outputs(ResourceOutputs::from([(
            "ip_address".to_string(),
            json!("20.0.0.4"),
        )]))
        .with_depends_on(BTreeSet::from(["net".to_string()]))
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        state.set_resource("ip".to_string(), ip_state());
        state
            .outputs
            .insert("application_url".to_string(), json!("ip.westeurope.cloudapp.local"));

        manager.save(&state).await.unwrap();
        assert!(temp_dir.path().join(".infraflow/state.json").exists());

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
        assert_eq!(loaded.get_resource("ip"), Some(&ip_state_like(&loaded)));
        assert_eq!(
            loaded.get_resource("ip").unwrap().get_output::<String>("ip_address"),
            Some("20.0.0.4".to_string())
        );
        assert_eq!(loaded.outputs.len(), 1);
    }

    // timestamps differ between two calls to ip_state()
    fn ip_state_like(loaded: &GlobalState) -> ResourceState {
        let recorded = loaded.get_resource("ip").unwrap();
        let mut expected = ip_state();
        expected.created_at = recorded.created_at;
        expected.updated_at = recorded.updated_at;
        expected
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load().await.unwrap();
        assert!(state.resources.is_empty());
    }

    #[tokio::test]
    async fn test_save_creates_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::with_state_dir(temp_dir.path().join("custom"));

        manager.save(&GlobalState::new()).await.unwrap();
        manager.save(&GlobalState::new()).await.unwrap();

        assert!(temp_dir.path().join("custom/state.json").exists());
        assert!(temp_dir.path().join("custom/state.json.backup").exists());
    }

    #[tokio::test]
    async fn test_newer_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        state.version = STATE_VERSION + 1;
        manager.save(&state).await.unwrap();

        assert!(matches!(
            manager.load().await,
            Err(CloudError::StateError(_))
        ));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        drop(again);
        assert!(!temp_dir.path().join(".infraflow/lock.json").exists());
    }

    #[test]
    fn test_dependency_graph_from_state() {
        let mut state = GlobalState::new();
        state.set_resource(
            "net".to_string(),
            ResourceState::new("net-id", ResourceKind::ResourceGroup),
        );
        state.set_resource("ip".to_string(), ip_state());

        let graph = state.dependency_graph().unwrap();
        assert_eq!(graph.reverse_order(), vec!["ip", "net"]);
    }
}
