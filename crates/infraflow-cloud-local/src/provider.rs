//! Local emulator provider implementation

use crate::control_plane::{ControlPlane, EmulatedResource};
use crate::error::LocalError;
use async_trait::async_trait;
use infraflow_cloud::{
    AuthStatus, CloudProvider, ResourceOutputs, ResourceRequest, ResourceState,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;

/// Subscription used when none is configured
pub const DEFAULT_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

/// Failure injected for a provider-side resource name
#[derive(Debug, Clone)]
enum Failure {
    /// Fail every call with this message
    Always(String),
    /// Throttle the next `n` calls
    Throttle(u32),
}

/// Provider backed by an in-process control plane
///
/// With a persistence path the emulated resources survive across
/// processes, which is what the CLI relies on between `up` runs.
pub struct LocalProvider {
    plane: tokio::sync::Mutex<ControlPlane>,
    persist_path: Option<PathBuf>,
    failures: Mutex<HashMap<String, Failure>>,
    calls: Mutex<Vec<String>>,
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalProvider {
    pub fn new() -> Self {
        Self::with_subscription(DEFAULT_SUBSCRIPTION)
    }

    pub fn with_subscription(subscription: impl Into<String>) -> Self {
        Self::from_plane(ControlPlane::new(subscription), None)
    }

    /// Open an emulator persisted at `path`, starting empty if the file is missing
    pub async fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let plane = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            let plane: ControlPlane = serde_json::from_str(&content)?;
            tracing::debug!(
                path = %path.display(),
                resources = plane.len(),
                "Loaded emulator state"
            );
            plane
        } else {
            ControlPlane::new(DEFAULT_SUBSCRIPTION)
        };
        Ok(Self::from_plane(plane, Some(path)))
    }

    fn from_plane(plane: ControlPlane, persist_path: Option<PathBuf>) -> Self {
        Self {
            plane: tokio::sync::Mutex::new(plane),
            persist_path,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make every call on `name` fail with `message`
    pub fn fail_on(&self, name: impl Into<String>, message: impl Into<String>) {
        self.lock_failures()
            .insert(name.into(), Failure::Always(message.into()));
    }

    /// Throttle the next `times` calls on `name`
    pub fn throttle(&self, name: impl Into<String>, times: u32) {
        self.lock_failures()
            .insert(name.into(), Failure::Throttle(times));
    }

    pub fn clear_failures(&self) {
        self.lock_failures().clear();
    }

    /// Calls received so far, as `verb:provider-name`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Snapshot of the emulated resources
    pub async fn resources(&self) -> Vec<EmulatedResource> {
        self.plane.lock().await.resources().cloned().collect()
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, HashMap<String, Failure>> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call, then apply any injected failure
    fn intercept(&self, verb: &str, resource: &str, name: &str) -> crate::Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("{}:{}", verb, name));

        let mut failures = self.lock_failures();
        match failures.get_mut(name) {
            Some(Failure::Always(message)) => Err(LocalError::Injected {
                resource: resource.to_string(),
                message: message.clone(),
            }),
            Some(Failure::Throttle(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(LocalError::Throttled {
                    resource: resource.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    async fn persist(&self, plane: &ControlPlane) -> crate::Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(plane)?;
        fs::write(path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl CloudProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn display_name(&self) -> &str {
        "Local emulator"
    }

    async fn check_auth(&self) -> infraflow_cloud::Result<AuthStatus> {
        let plane = self.plane.lock().await;
        Ok(AuthStatus::ok(format!("subscription {}", plane.subscription())))
    }

    async fn create(&self, request: &ResourceRequest) -> infraflow_cloud::Result<ResourceOutputs> {
        self.intercept("create", &request.name, request.provider_name())?;

        let mut plane = self.plane.lock().await;
        let outputs = plane.create(request)?;
        self.persist(&plane).await?;

        tracing::info!(resource = %request.name, kind = %request.kind, "Created");
        Ok(outputs)
    }

    async fn update(
        &self,
        request: &ResourceRequest,
        current: &ResourceState,
    ) -> infraflow_cloud::Result<ResourceOutputs> {
        self.intercept("update", &request.name, request.provider_name())?;

        let mut plane = self.plane.lock().await;
        let outputs = plane.update(request, &current.id)?;
        self.persist(&plane).await?;

        tracing::info!(resource = %request.name, kind = %request.kind, "Updated");
        Ok(outputs)
    }

    async fn delete(&self, current: &ResourceState) -> infraflow_cloud::Result<()> {
        let mut plane = self.plane.lock().await;
        let name = plane
            .get(&current.id)
            .map(|r| r.name.clone())
            .or_else(|| current.input_str("name").map(str::to_string))
            .unwrap_or_else(|| current.id.clone());
        self.intercept("delete", &name, &name)?;

        plane.delete(&current.id)?;
        self.persist(&plane).await?;

        tracing::info!(id = %current.id, "Deleted");
        Ok(())
    }
}
