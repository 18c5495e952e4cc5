//! Shared handler state.

use std::sync::Arc;

use crate::blob::{BlobStore, LocalBlobStore, VercelBlobStore};
use crate::config::{BlobConfig, Config};
use crate::db::{self, DbConnection};
use crate::error::{AppError, AppResult};
use crate::suggestions::SuggestionService;

/// Everything a handler may need. Services the environment did not
/// configure are `None` and surface as [`AppError::NotConfigured`].
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Option<DbConnection>,
    pub blobs: Option<Arc<dyn BlobStore>>,
    pub suggestions: SuggestionService,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Option<DbConnection>,
        blobs: Option<Arc<dyn BlobStore>>,
        suggestions: SuggestionService,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db,
            blobs,
            suggestions,
        }
    }

    /// Opens the database and blob store named by `config`.
    pub async fn from_config(config: Config) -> AppResult<Self> {
        let db = match &config.database_path {
            Some(path) => {
                let conn = db::establish_connection(path)?;
                tracing::info!(%path, "database ready");
                Some(conn)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, link and file routes are disabled");
                None
            }
        };

        let blobs: Option<Arc<dyn BlobStore>> = match &config.blob {
            Some(BlobConfig::Vercel { token, api_url }) => {
                tracing::info!(%api_url, "using Vercel Blob storage");
                Some(Arc::new(VercelBlobStore::new(token.clone(), api_url.clone())?))
            }
            Some(BlobConfig::Local { dir }) => {
                tracing::info!(dir = %dir.display(), "using local blob storage");
                Some(Arc::new(LocalBlobStore::new(dir, &config.public_base_url).await?))
            }
            None => {
                tracing::warn!("no blob storage configured, uploads are disabled");
                None
            }
        };

        let suggestions =
            SuggestionService::from_config(&config).map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(Self::new(config, db, blobs, suggestions))
    }

    pub fn db(&self) -> AppResult<&DbConnection> {
        self.db.as_ref().ok_or(AppError::NotConfigured("Database"))
    }

    pub fn blobs(&self) -> AppResult<&dyn BlobStore> {
        self.blobs
            .as_deref()
            .ok_or(AppError::NotConfigured("File storage"))
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}{}", self.config.public_base_url, path)
    }
}
