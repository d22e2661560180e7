//! Session store (C8): content-addressed chunked blobs with a JSON metadata
//! index, group-scoped access control, and write-temp-then-rename atomic
//! persistence.

use crate::config::AppConfig;
use crate::error::{AppError, ErrorCode};
use crate::types::{Session, SessionContentType, SessionSummary};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const CHUNK_SIZE_BOUNDS: (usize, usize) = (256, 65536);
pub const DEFAULT_CHUNK_SIZE: usize = 4000;
pub const DEFAULT_GET_FULL_MAX_BYTES: usize = 5_242_880;

/// Durable content storage, keyed by session id. The shipped implementation
/// is a flat directory of `<id>.bin` files; a test double can be an in-memory
/// map.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn write(&self, session_id: &str, bytes: &[u8]) -> io::Result<()>;
    async fn read(&self, session_id: &str) -> io::Result<Vec<u8>>;
    async fn delete(&self, session_id: &str) -> io::Result<()>;
    async fn exists(&self, session_id: &str) -> bool;
}

/// Durable session metadata, keyed by session id. Reads take a shared lock;
/// writes (create/delete) take an exclusive one.
#[async_trait::async_trait]
pub trait MetadataIndex: Send + Sync {
    async fn insert(&self, session: Session) -> io::Result<()>;
    async fn get(&self, session_id: &str) -> Option<Session>;
    async fn list(&self) -> Vec<Session>;
    async fn remove(&self, session_id: &str) -> io::Result<()>;
}

pub struct FsBlobStore {
    blobs_dir: PathBuf,
}

impl FsBlobStore {
    pub fn new(blobs_dir: PathBuf) -> Self {
        Self { blobs_dir }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.blobs_dir.join(format!("{session_id}.bin"))
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn write(&self, session_id: &str, bytes: &[u8]) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.blobs_dir).await?;
        let final_path = self.path_for(session_id);
        let tmp_path = self.blobs_dir.join(format!(".{session_id}.tmp"));
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await
    }

    async fn read(&self, session_id: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.path_for(session_id)).await
    }

    async fn delete(&self, session_id: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.path_for(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn exists(&self, session_id: &str) -> bool {
        tokio::fs::metadata(self.path_for(session_id)).await.is_ok()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataFile {
    sessions: HashMap<String, Session>,
}

pub struct FsMetadataIndex {
    path: PathBuf,
    state: RwLock<MetadataFile>,
}

impl FsMetadataIndex {
    pub async fn load(path: PathBuf) -> io::Result<Self> {
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => MetadataFile::default(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, state: RwLock::new(state) })
    }

    async fn persist(&self, state: &MetadataFile) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await
    }
}

#[async_trait::async_trait]
impl MetadataIndex for FsMetadataIndex {
    async fn insert(&self, session: Session) -> io::Result<()> {
        let mut guard = self.state.write().await;
        guard.sessions.insert(session.session_id.clone(), session);
        self.persist(&guard).await
    }

    async fn get(&self, session_id: &str) -> Option<Session> {
        self.state.read().await.sessions.get(session_id).cloned()
    }

    async fn list(&self) -> Vec<Session> {
        self.state.read().await.sessions.values().cloned().collect()
    }

    async fn remove(&self, session_id: &str) -> io::Result<()> {
        let mut guard = self.state.write().await;
        guard.sessions.remove(session_id);
        self.persist(&guard).await
    }
}

pub struct SessionStore<B: BlobStore, M: MetadataIndex> {
    blobs: B,
    metadata: M,
}

/// Any-group match: a session owned by a group is readable by a token that
/// carries that group anywhere in its group set, not just as the first one.
fn readable(session: &Session, requesting_groups: &[String]) -> bool {
    match &session.group {
        None => true,
        Some(g) => requesting_groups.iter().any(|rg| rg == g),
    }
}

impl<B: BlobStore, M: MetadataIndex> SessionStore<B, M> {
    pub fn new(blobs: B, metadata: M) -> Self {
        Self { blobs, metadata }
    }

    pub async fn create(&self, content: &[u8], url: &str, group: Option<String>, chunk_size: usize, content_type: SessionContentType) -> Result<String, AppError> {
        let chunk_size = chunk_size.clamp(CHUNK_SIZE_BOUNDS.0, CHUNK_SIZE_BOUNDS.1);
        let session_id = Uuid::new_v4().to_string();
        let total_chunks = content.len().div_ceil(chunk_size).max(1);

        self.blobs.write(&session_id, content).await.map_err(internal_error)?;

        let session = Session {
            session_id: session_id.clone(),
            url: url.to_string(),
            group,
            created_at: Utc::now(),
            chunk_size,
            total_chunks,
            total_size_bytes: content.len(),
            content_type,
        };
        self.metadata.insert(session).await.map_err(internal_error)?;
        Ok(session_id)
    }

    pub async fn info(&self, session_id: &str, requesting_groups: &[String]) -> Result<Session, AppError> {
        let session = self.metadata.get(session_id).await.ok_or_else(session_not_found)?;
        if !readable(&session, requesting_groups) {
            return Err(permission_denied());
        }
        Ok(session)
    }

    pub async fn chunk(&self, session_id: &str, index: usize, requesting_groups: &[String]) -> Result<Vec<u8>, AppError> {
        let session = self.info(session_id, requesting_groups).await?;
        if index >= session.total_chunks {
            return Err(AppError::new(ErrorCode::InvalidChunkIndex, format!("chunk index {index} out of range [0, {})", session.total_chunks)));
        }
        let full = self.blobs.read(session_id).await.map_err(internal_error)?;
        let start = index * session.chunk_size;
        let end = (start + session.chunk_size).min(full.len());
        Ok(full[start..end].to_vec())
    }

    pub async fn list(&self, requesting_groups: &[String]) -> Vec<SessionSummary> {
        self.metadata
            .list()
            .await
            .iter()
            .filter(|s| readable(s, requesting_groups))
            .map(SessionSummary::from)
            .collect()
    }

    pub async fn urls(&self, session_id: &str, requesting_groups: &[String], base_url: Option<&str>) -> Result<Vec<String>, AppError> {
        let session = self.info(session_id, requesting_groups).await?;
        Ok((0..session.total_chunks)
            .map(|i| match base_url {
                Some(base) => format!("{}/sessions/{}/chunks/{}", base.trim_end_matches('/'), session_id, i),
                None => format!("{i}"),
            })
            .collect())
    }

    pub async fn get_full(&self, session_id: &str, requesting_groups: &[String], max_bytes: usize) -> Result<Vec<u8>, AppError> {
        let session = self.info(session_id, requesting_groups).await?;
        if session.total_size_bytes > max_bytes {
            return Err(AppError::new(ErrorCode::ContentTooLarge, format!("session {session_id} is {} bytes, exceeds max_bytes {max_bytes}", session.total_size_bytes)));
        }
        self.blobs.read(session_id).await.map_err(internal_error)
    }

    /// Housekeeper-only deletion: no ACL check, caller already holds the
    /// prune lock and is operating over all sessions.
    pub async fn delete(&self, session_id: &str) -> Result<(), AppError> {
        self.blobs.delete(session_id).await.map_err(internal_error)?;
        self.metadata.remove(session_id).await.map_err(internal_error)
    }

    pub async fn all_sessions(&self) -> Vec<Session> {
        self.metadata.list().await
    }

    /// Housekeeper-only: whether `session_id`'s blob is still present on
    /// disk. A metadata entry with no backing blob is an anomaly, not a
    /// normal deletion target.
    pub async fn blob_exists(&self, session_id: &str) -> bool {
        self.blobs.exists(session_id).await
    }
}

fn session_not_found() -> AppError {
    AppError::new(ErrorCode::SessionNotFound, "session not found")
}

fn permission_denied() -> AppError {
    AppError::new(ErrorCode::PermissionDenied, "caller's group does not have access to this session")
}

fn internal_error(e: io::Error) -> AppError {
    AppError::new(ErrorCode::InternalError, e.to_string())
}

pub async fn open_default(config: &AppConfig) -> io::Result<Arc<SessionStore<FsBlobStore, FsMetadataIndex>>> {
    let blobs = FsBlobStore::new(config.blobs_dir());
    let metadata = FsMetadataIndex::load(config.metadata_path()).await?;
    Ok(Arc::new(SessionStore::new(blobs, metadata)))
}
