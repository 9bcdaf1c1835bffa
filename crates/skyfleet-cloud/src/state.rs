//! Deployment records and their persistence
//!
//! A [`Deployment`] is only ever replaced as a whole: every commit carries
//! the version it was read at, and a stale version is rejected. Readers
//! therefore observe either the previous phase or the next one, never a mix.

use crate::error::{CloudError, Result};
use crate::model::{CloudProviderEndpoint, ServiceType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".skyfleet";
const STATE_FILE: &str = "deployments.json";
const STATE_BACKUP: &str = "deployments.json.backup";
const STATE_TEMP: &str = "deployments.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// How many times a read-modify-write is retried after a version conflict
const CONFLICT_RETRIES: usize = 3;

/// Operation a status belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    CreateInProgress,
    CreateComplete,
    CreateFailed,
    UpdateInProgress,
    UpdateComplete,
    UpdateFailed,
    DeleteInProgress,
    DeleteComplete,
    DeleteFailed,
}

impl Status {
    pub fn in_progress(operation: Operation) -> Self {
        match operation {
            Operation::Create => Status::CreateInProgress,
            Operation::Update => Status::UpdateInProgress,
            Operation::Delete => Status::DeleteInProgress,
        }
    }

    pub fn complete(operation: Operation) -> Self {
        match operation {
            Operation::Create => Status::CreateComplete,
            Operation::Update => Status::UpdateComplete,
            Operation::Delete => Status::DeleteComplete,
        }
    }

    pub fn failed(operation: Operation) -> Self {
        match operation {
            Operation::Create => Status::CreateFailed,
            Operation::Update => Status::UpdateFailed,
            Operation::Delete => Status::DeleteFailed,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Status::CreateInProgress | Status::CreateComplete | Status::CreateFailed => {
                Operation::Create
            }
            Status::UpdateInProgress | Status::UpdateComplete | Status::UpdateFailed => {
                Operation::Update
            }
            Status::DeleteInProgress | Status::DeleteComplete | Status::DeleteFailed => {
                Operation::Delete
            }
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Status::CreateInProgress | Status::UpdateInProgress | Status::DeleteInProgress
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            Status::CreateFailed | Status::UpdateFailed | Status::DeleteFailed
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_progress()
    }

    /// Edges the workflow may follow
    ///
    /// `X_IN_PROGRESS` ends in `X_COMPLETE` or `X_FAILED`. A settled
    /// deployment may start an update or a delete; a failed one may retry
    /// its own operation. Nothing leaves `DELETE_COMPLETE`.
    pub fn can_transition_to(&self, next: Status) -> bool {
        if self.is_in_progress() {
            let op = self.operation();
            return next == Status::complete(op) || next == Status::failed(op);
        }
        match self {
            Status::DeleteComplete => false,
            Status::DeleteFailed => next == Status::DeleteInProgress,
            _ => {
                next == Status::UpdateInProgress
                    || next == Status::DeleteInProgress
                    || (self.is_failed() && next == Status::in_progress(self.operation()))
            }
        }
    }

    /// Edges available to an administrative reset
    ///
    /// A failed deployment may be put back into any in-progress state to
    /// re-enter the workflow, and a stuck in-progress deployment may be
    /// forced into the failed state of its own operation.
    pub fn can_reset_to(&self, next: Status) -> bool {
        (self.is_failed() && next.is_in_progress())
            || (self.is_in_progress() && next == Status::failed(self.operation()))
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::CreateInProgress => "CREATE_IN_PROGRESS",
            Status::CreateComplete => "CREATE_COMPLETE",
            Status::CreateFailed => "CREATE_FAILED",
            Status::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Status::UpdateComplete => "UPDATE_COMPLETE",
            Status::UpdateFailed => "UPDATE_FAILED",
            Status::DeleteInProgress => "DELETE_IN_PROGRESS",
            Status::DeleteComplete => "DELETE_COMPLETE",
            Status::DeleteFailed => "DELETE_FAILED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Status {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_ascii_uppercase()))
            .map_err(|_| CloudError::Store(format!("unknown status: {s}")))
    }
}

/// A provisioned side effect owned by a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    /// Kind of infrastructure node (e.g. "tosca.nodes.indigo.S3Bucket")
    pub resource_type: String,
    pub metadata: BTreeMap<String, String>,
    /// Set once the backing infrastructure is gone
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            resource_type: resource_type.into(),
            metadata: BTreeMap::new(),
            deleted: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// The unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub status: Status,
    pub status_reason: Option<String>,
    /// Chosen provider, unset until selection completes
    pub endpoint: Option<CloudProviderEndpoint>,
    pub owner: Option<String>,
    pub user_group: Option<String>,
    /// Resources indexed by resource id
    pub resources: BTreeMap<String, Resource>,
    /// Opaque infrastructure template
    pub template: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Service types the template needs; the first one drives selection
    pub service_types: Vec<ServiceType>,
    pub callback: Option<String>,
    pub timeout_mins: Option<u32>,
    pub cancel_requested: bool,
    /// Bumped by every commit
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// A freshly submitted deployment in `CREATE_IN_PROGRESS`
    pub fn new(template: impl Into<String>, service_types: Vec<ServiceType>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: Status::CreateInProgress,
            status_reason: None,
            endpoint: None,
            owner: None,
            user_group: None,
            resources: BTreeMap::new(),
            template: template.into(),
            parameters: serde_json::Map::new(),
            service_types,
            callback: None,
            timeout_mins: None,
            cancel_requested: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_user_group(mut self, user_group: impl Into<String>) -> Self {
        self.user_group = Some(user_group.into());
        self
    }

    pub fn with_timeout_mins(mut self, minutes: u32) -> Self {
        self.timeout_mins = Some(minutes);
        self
    }

    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Map<String, serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Move along a workflow edge
    pub fn transition(&mut self, next: Status) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CloudError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn add_resource(&mut self, resource: Resource) {
        self.resources.insert(resource.id.clone(), resource);
        self.updated_at = Utc::now();
    }

    /// Resources whose infrastructure still exists
    pub fn live_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values().filter(|r| !r.deleted)
    }
}

/// Persistence boundary for deployments
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert a new deployment; fails if the id already exists
    async fn insert(&self, deployment: Deployment) -> Result<Deployment>;

    /// Load a deployment by id
    async fn get(&self, id: &str) -> Result<Deployment>;

    /// Atomically replace a deployment
    ///
    /// Fails with [`CloudError::Conflict`] unless `deployment.version`
    /// matches the stored record. Returns the committed record.
    async fn commit(&self, deployment: &Deployment) -> Result<Deployment>;

    /// All deployments, oldest first
    async fn list(&self) -> Result<Vec<Deployment>>;
}

/// Read-modify-write a deployment, retrying on version conflicts
pub async fn update_deployment<F>(
    store: &dyn DeploymentStore,
    id: &str,
    mut mutate: F,
) -> Result<Deployment>
where
    F: FnMut(&mut Deployment) -> Result<()> + Send,
{
    let mut attempt = 0;
    loop {
        let mut deployment = store.get(id).await?;
        mutate(&mut deployment)?;
        match store.commit(&deployment).await {
            Err(CloudError::Conflict(_)) if attempt + 1 < CONFLICT_RETRIES => {
                attempt += 1;
                tracing::debug!(deployment_id = id, attempt, "Retrying commit after conflict");
            }
            other => return other,
        }
    }
}

fn stamp_commit(stored: &Deployment, deployment: &Deployment) -> Result<Deployment> {
    if stored.version != deployment.version {
        return Err(CloudError::Conflict(deployment.id.clone()));
    }
    let mut committed = deployment.clone();
    committed.version += 1;
    committed.updated_at = Utc::now();
    Ok(committed)
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    deployments: RwLock<BTreeMap<String, Deployment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn insert(&self, deployment: Deployment) -> Result<Deployment> {
        let mut deployments = self.deployments.write().await;
        if deployments.contains_key(&deployment.id) {
            return Err(CloudError::Conflict(deployment.id));
        }
        deployments.insert(deployment.id.clone(), deployment.clone());
        Ok(deployment)
    }

    async fn get(&self, id: &str) -> Result<Deployment> {
        self.deployments
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(id.to_string()))
    }

    async fn commit(&self, deployment: &Deployment) -> Result<Deployment> {
        let mut deployments = self.deployments.write().await;
        let stored = deployments
            .get(&deployment.id)
            .ok_or_else(|| CloudError::NotFound(deployment.id.clone()))?;
        let committed = stamp_commit(stored, deployment)?;
        deployments.insert(committed.id.clone(), committed.clone());
        Ok(committed)
    }

    async fn list(&self) -> Result<Vec<Deployment>> {
        let mut all: Vec<Deployment> = self.deployments.read().await.values().cloned().collect();
        all.sort_by_key(|d| d.created_at);
        Ok(all)
    }
}

/// On-disk state file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    updated_at: DateTime<Utc>,
    deployments: BTreeMap<String, Deployment>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            deployments: BTreeMap::new(),
        }
    }
}

/// File-backed store (`<root>/.skyfleet/deployments.json`)
///
/// Writes take the lock file, keep one backup of the previous state and
/// replace the state file as a whole.
pub struct FileStore {
    root: PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    async fn load(&self) -> Result<StateFile> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(StateFile::default());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateFile = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::Store(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        Ok(state)
    }

    fn temp_path(&self) -> PathBuf {
        self.state_dir().join(STATE_TEMP)
    }

    /// Replace the state file atomically
    ///
    /// The new state is written to a temporary file and renamed over the
    /// live one, so readers without the lock always see a complete file.
    async fn save(&self, state: &mut StateFile) -> Result<()> {
        self.ensure_state_dir().await?;
        state.updated_at = Utc::now();

        let path = self.state_path();
        let temp = self.temp_path();

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&temp, content).await?;

        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }
        fs::rename(&temp, &path).await?;

        tracing::debug!("Saved state with {} deployments", state.deployments.len());
        Ok(())
    }

    /// Acquire the cross-process lock file
    ///
    /// The lock file is created exclusively; an existing lock older than an
    /// hour is taken over once.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&lock_info)?;

        let mut took_over = false;
        loop {
            match create_exclusive(&lock_path, &content).await {
                Ok(()) => {
                    return Ok(StateLock {
                        lock_path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && !took_over => {
                    let existing = fs::read_to_string(&lock_path).await?;
                    let holder: LockInfo = serde_json::from_str(&existing)?;

                    // Locks older than an hour are considered abandoned
                    let age = Utc::now().signed_duration_since(holder.acquired_at);
                    if age.num_hours() < 1 {
                        return Err(CloudError::Store(format!(
                            "State is locked by {} since {}",
                            holder.holder, holder.acquired_at
                        )));
                    }

                    tracing::warn!("Removing stale lock from {}", holder.holder);
                    match fs::remove_file(&lock_path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                    took_over = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Err(CloudError::Store(
                        "State lock was taken by another process".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn write_with<F>(&self, apply: F) -> Result<Deployment>
    where
        F: FnOnce(&mut StateFile) -> Result<Deployment> + Send,
    {
        let _guard = self.guard.lock().await;
        let lock = self.acquire_lock().await?;
        let result = async {
            let mut state = self.load().await?;
            let deployment = apply(&mut state)?;
            self.save(&mut state).await?;
            Ok(deployment)
        }
        .await;
        lock.release().await?;
        result
    }
}

#[async_trait]
impl DeploymentStore for FileStore {
    async fn insert(&self, deployment: Deployment) -> Result<Deployment> {
        self.write_with(move |state| {
            if state.deployments.contains_key(&deployment.id) {
                return Err(CloudError::Conflict(deployment.id));
            }
            state
                .deployments
                .insert(deployment.id.clone(), deployment.clone());
            Ok(deployment)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Deployment> {
        let _guard = self.guard.lock().await;
        self.load()
            .await?
            .deployments
            .remove(id)
            .ok_or_else(|| CloudError::NotFound(id.to_string()))
    }

    async fn commit(&self, deployment: &Deployment) -> Result<Deployment> {
        self.write_with(|state| {
            let stored = state
                .deployments
                .get(&deployment.id)
                .ok_or_else(|| CloudError::NotFound(deployment.id.clone()))?;
            let committed = stamp_commit(stored, deployment)?;
            state
                .deployments
                .insert(committed.id.clone(), committed.clone());
            Ok(committed)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Deployment>> {
        let _guard = self.guard.lock().await;
        let mut all: Vec<Deployment> = self.load().await?.deployments.into_values().collect();
        all.sort_by_key(|d| d.created_at);
        Ok(all)
    }
}

async fn create_exclusive(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock file
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
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
    use tempfile::tempdir;

    fn sample() -> Deployment {
        Deployment::new("tosca_definitions_version: v1", vec![ServiceType::Compute])
            .with_user_group("group-a")
            .with_timeout_mins(30)
    }

    #[test]
    fn test_status_edges() {
        use Status::*;
        assert!(CreateInProgress.can_transition_to(CreateComplete));
        assert!(CreateInProgress.can_transition_to(CreateFailed));
        assert!(!CreateInProgress.can_transition_to(UpdateComplete));
        assert!(!CreateInProgress.can_transition_to(DeleteInProgress));
        assert!(CreateComplete.can_transition_to(UpdateInProgress));
        assert!(CreateComplete.can_transition_to(DeleteInProgress));
        assert!(!CreateComplete.can_transition_to(CreateFailed));
        assert!(CreateFailed.can_transition_to(CreateInProgress));
        assert!(DeleteFailed.can_transition_to(DeleteInProgress));
        assert!(!DeleteFailed.can_transition_to(UpdateInProgress));
        assert!(!DeleteComplete.can_transition_to(DeleteInProgress));
    }

    #[test]
    fn test_reset_edges() {
        use Status::*;
        assert!(CreateFailed.can_reset_to(CreateInProgress));
        assert!(UpdateFailed.can_reset_to(DeleteInProgress));
        assert!(UpdateInProgress.can_reset_to(UpdateFailed));
        assert!(!UpdateInProgress.can_reset_to(CreateFailed));
        assert!(!CreateComplete.can_reset_to(CreateInProgress));
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        let status: Status = "delete_failed".parse().unwrap();
        assert_eq!(status, Status::DeleteFailed);
        assert_eq!(status.to_string(), "DELETE_FAILED");
        assert!("BROKEN".parse::<Status>().is_err());
    }

    #[test]
    fn test_transition_rejects_invalid_edge() {
        let mut deployment = sample();
        let err = deployment.transition(Status::DeleteComplete).unwrap_err();
        assert!(matches!(err, CloudError::InvalidTransition { .. }));
        assert_eq!(deployment.status, Status::CreateInProgress);
    }

    #[tokio::test]
    async fn test_memory_store_commit_bumps_version() {
        let store = MemoryStore::new();
        let deployment = store.insert(sample()).await.unwrap();

        let mut working = deployment.clone();
        working.transition(Status::CreateComplete).unwrap();
        let committed = store.commit(&working).await.unwrap();
        assert_eq!(committed.version, 1);

        // The pre-commit copy is now stale
        let err = store.commit(&working).await.unwrap_err();
        assert!(matches!(err, CloudError::Conflict(_)));
        assert_eq!(store.get(&deployment.id).await.unwrap().status, Status::CreateComplete);
    }

    #[tokio::test]
    async fn test_update_deployment_reloads_latest() {
        let store = MemoryStore::new();
        let deployment = store.insert(sample()).await.unwrap();

        update_deployment(&store, &deployment.id, |d| {
            d.cancel_requested = true;
            Ok(())
        })
        .await
        .unwrap();
        let updated = update_deployment(&store, &deployment.id, |d| {
            d.transition(Status::CreateFailed)
        })
        .await
        .unwrap();

        assert!(updated.cancel_requested);
        assert_eq!(updated.status, Status::CreateFailed);
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn test_file_store_save_load() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());

        let mut deployment = sample();
        deployment.add_resource(
            Resource::new("tosca.nodes.indigo.S3Bucket")
                .with_metadata("bucket_name", "b1")
                .with_metadata("s3_url", "https://s3.example.org"),
        );
        let deployment = store.insert(deployment).await.unwrap();

        let reopened = FileStore::new(temp_dir.path());
        let loaded = reopened.get(&deployment.id).await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
        assert_eq!(loaded.user_group.as_deref(), Some("group-a"));
        assert!(!temp_dir.path().join(".skyfleet/lock.json").exists());
    }

    #[tokio::test]
    async fn test_file_store_missing_deployment() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());

        assert!(store.list().await.unwrap().is_empty());
        assert!(matches!(
            store.get("nope").await.unwrap_err(),
            CloudError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_file_store_refuses_fresh_foreign_lock() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());

        let lock = store.acquire_lock().await.unwrap();
        let err = store.insert(sample()).await.unwrap_err();
        assert!(matches!(err, CloudError::Store(_)));
        lock.release().await.unwrap();

        store.insert(sample()).await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());
        let other = FileStore::new(temp_dir.path());

        let lock = store.acquire_lock().await.unwrap();
        assert!(matches!(
            other.acquire_lock().await.err(),
            Some(CloudError::Store(_))
        ));
        lock.release().await.unwrap();

        other.acquire_lock().await.unwrap().release().await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());
        store.ensure_state_dir().await.unwrap();

        let stale = LockInfo {
            holder: "crashed-host".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        std::fs::write(store.lock_path(), serde_json::to_string(&stale).unwrap()).unwrap();

        let deployment = store.insert(sample()).await.unwrap();
        assert_eq!(store.get(&deployment.id).await.unwrap().id, deployment.id);
        assert!(!store.lock_path().exists());
    }

    #[tokio::test]
    async fn test_save_replaces_state_file_whole() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());

        let first = store.insert(sample()).await.unwrap();
        let second = store.insert(sample()).await.unwrap();

        assert!(!store.temp_path().exists());
        let backup: StateFile =
            serde_json::from_str(&std::fs::read_to_string(store.backup_path()).unwrap()).unwrap();
        assert!(backup.deployments.contains_key(&first.id));
        assert!(!backup.deployments.contains_key(&second.id));

        let reader = FileStore::new(temp_dir.path());
        assert_eq!(reader.list().await.unwrap().len(), 2);
    }
}
