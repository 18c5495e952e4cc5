//! Local-first synchronization of the link list.
//!
//! [`LinkSync`] keeps an in-memory view that is persisted to a local
//! [`SnapshotStore`] and mirrored to the server through a [`LinkRemote`].
//! Every mutation is a [`LinkCommand`]: it is applied and persisted locally
//! first, then confirmed with the server. When the server rejects it (or
//! cannot be reached) the pre-command snapshot is restored, so only the
//! failed change is lost. There is no merge step; the server list replaces
//! the local one on every sync.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::models::Link;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The server answered and refused; carries its error message.
    #[error("{0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

/// Server side of the link list.
#[async_trait]
pub trait LinkRemote: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Link>, RemoteError>;
    async fn create(&self, link: &Link) -> Result<(), RemoteError>;
    async fn update(&self, link: &Link) -> Result<(), RemoteError>;
    async fn delete(&self, id: &str) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub links: Vec<Link>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Local persistence for the link list.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Snapshot, SnapshotError>;
    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;
}

/// Snapshot kept as a JSON file; a missing file reads as empty.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Snapshot, SnapshotError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    inner: Mutex<Snapshot>,
}

impl MemorySnapshotStore {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: Mutex::new(snapshot),
        }
    }

    pub fn current(&self) -> Snapshot {
        self.inner.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Snapshot, SnapshotError> {
        Ok(self.current())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        if let Ok(mut inner) = self.inner.lock() {
            *inner = snapshot.clone();
        }
        Ok(())
    }
}

/// One optimistic change to the link list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    Add(Link),
    Edit(Link),
    Remove(String),
}

impl LinkCommand {
    /// The list as it looks once the command has taken effect.
    pub fn apply(&self, links: &[Link]) -> Vec<Link> {
        match self {
            LinkCommand::Add(link) => std::iter::once(link.clone())
                .chain(links.iter().cloned())
                .collect(),
            LinkCommand::Edit(updated) => links
                .iter()
                .map(|l| if l.id == updated.id { updated.clone() } else { l.clone() })
                .collect(),
            LinkCommand::Remove(id) => links.iter().filter(|l| &l.id != id).cloned().collect(),
        }
    }

    async fn confirm<R: LinkRemote + ?Sized>(&self, remote: &R) -> Result<(), RemoteError> {
        match self {
            LinkCommand::Add(link) => remote.create(link).await,
            LinkCommand::Edit(link) => remote.update(link).await,
            LinkCommand::Remove(id) => remote.delete(id).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            LinkCommand::Add(_) => "add",
            LinkCommand::Edit(_) => "edit",
            LinkCommand::Remove(_) => "remove",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

pub struct LinkSync<R, S> {
    remote: R,
    store: S,
    links: Vec<Link>,
    status: SyncStatus,
}

impl<R: LinkRemote, S: SnapshotStore> LinkSync<R, S> {
    pub fn new(remote: R, store: S) -> Self {
        Self {
            remote,
            store,
            links: Vec::new(),
            status: SyncStatus::default(),
        }
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Shows the local snapshot, then replaces it with the server list.
    pub async fn load(&mut self) -> Result<usize, RemoteError> {
        match self.store.load() {
            Ok(snapshot) => {
                self.links = snapshot.links;
                self.status.last_sync = snapshot.last_sync;
            }
            Err(e) => tracing::warn!(error = %e, "could not read local snapshot"),
        }
        self.sync().await
    }

    /// Fetches the authoritative list. On failure local data is kept and
    /// the error is recorded in [`SyncStatus`].
    pub async fn sync(&mut self) -> Result<usize, RemoteError> {
        self.status.syncing = true;
        self.status.error = None;
        let result = self.remote.fetch_all().await;
        self.status.syncing = false;

        match result {
            Ok(links) => {
                let count = links.len();
                self.links = links;
                self.status.last_sync = Some(Utc::now());
                self.persist();
                tracing::info!(count, "synced links from server");
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, "sync failed, keeping local links");
                self.status.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn manual_sync(&mut self) -> Result<usize, RemoteError> {
        self.sync().await
    }

    /// Applies `command` locally, then confirms it with the server,
    /// rolling back to the previous list if that fails.
    pub async fn execute(&mut self, command: LinkCommand) -> Result<(), RemoteError> {
        let previous = std::mem::take(&mut self.links);
        self.links = command.apply(&previous);
        self.persist();

        match command.confirm(&self.remote).await {
            Ok(()) => {
                tracing::debug!(command = command.name(), "change confirmed by server");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(command = command.name(), error = %e, "server rejected change, reverting");
                self.links = previous;
                self.persist();
                Err(e)
            }
        }
    }

    pub async fn add_link(&mut self, link: Link) -> Result<(), RemoteError> {
        self.execute(LinkCommand::Add(link)).await
    }

    pub async fn edit_link(&mut self, link: Link) -> Result<(), RemoteError> {
        self.execute(LinkCommand::Edit(link)).await
    }

    pub async fn remove_link(&mut self, id: &str) -> Result<(), RemoteError> {
        self.execute(LinkCommand::Remove(id.to_string())).await
    }

    /// Local slug check against the current view.
    pub fn check_slug_exists(&self, slug: &str, exclude_id: Option<&str>) -> bool {
        self.links
            .iter()
            .any(|l| l.slug == slug && Some(l.id.as_str()) != exclude_id)
    }

    fn persist(&self) {
        let snapshot = Snapshot {
            links: self.links.clone(),
            last_sync: self.status.last_sync,
        };
        if let Err(e) = self.store.save(&snapshot) {
            tracing::warn!(error = %e, "could not persist local snapshot");
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// [`LinkRemote`] speaking to the `/api/links` routes of this service.
#[derive(Clone)]
pub struct HttpLinkRemote {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpLinkRemote {
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::Transport(format!("invalid base url {base_url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, base_url })
    }

    fn links_url(&self, id: Option<&str>) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RemoteError::Transport("base url cannot have a path".to_string()))?;
            segments.pop_if_empty().extend(["api", "links"]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<Option<T>, RemoteError> {
        let response = request.send().await?;
        let status = response.status();
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| RemoteError::Transport(format!("unexpected response ({status}): {e}")))?;
        if !status.is_success() || !envelope.success {
            return Err(RemoteError::Rejected(
                envelope.error.unwrap_or_else(|| format!("request failed ({status})")),
            ));
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl LinkRemote for HttpLinkRemote {
    async fn fetch_all(&self) -> Result<Vec<Link>, RemoteError> {
        let url = self.links_url(None)?;
        Ok(self.send(self.client.get(url)).await?.unwrap_or_default())
    }

    async fn create(&self, link: &Link) -> Result<(), RemoteError> {
        let url = self.links_url(None)?;
        self.send::<Link>(self.client.post(url).json(link)).await?;
        Ok(())
    }

    async fn update(&self, link: &Link) -> Result<(), RemoteError> {
        let url = self.links_url(Some(&link.id))?;
        self.send::<Link>(self.client.put(url).json(link)).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        let url = self.links_url(Some(id))?;
        self.send::<serde_json::Value>(self.client.delete(url)).await?;
        Ok(())
    }
}
