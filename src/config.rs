use std::env;
use std::path::PathBuf;

pub const DEFAULT_MAX_FILE_SIZE: usize = 50 * 1024 * 1024;
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_BLOB_API_URL: &str = "https://blob.vercel-storage.com";

/// Where uploaded bytes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobConfig {
    Vercel { token: String, api_url: String },
    Local { dir: PathBuf },
}

/// Runtime settings read from the environment.
///
/// Every external service is optional; handlers answer with a
/// "not configured" error when the one they need is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub public_base_url: String,
    pub database_path: Option<String>,
    pub blob: Option<BlobConfig>,
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub gemini_model: String,
    pub max_file_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            database_path: None,
            blob: None,
            gemini_api_key: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let blob = match (get("BLOB_READ_WRITE_TOKEN"), get("BLOB_DIR")) {
            (Some(token), _) => Some(BlobConfig::Vercel {
                token,
                api_url: get("BLOB_API_URL").unwrap_or_else(|| DEFAULT_BLOB_API_URL.to_string()),
            }),
            (None, Some(dir)) => Some(BlobConfig::Local { dir: PathBuf::from(dir) }),
            (None, None) => None,
        };

        let max_file_size = match get("MAX_FILE_SIZE") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "MAX_FILE_SIZE is not a number, using default");
                DEFAULT_MAX_FILE_SIZE
            }),
            None => DEFAULT_MAX_FILE_SIZE,
        };

        Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            public_base_url: get("PUBLIC_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            database_path: get("DATABASE_URL").map(|u| database_path_from_url(&u)),
            blob,
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_api_base: get("GEMINI_API_BASE").unwrap_or(defaults.gemini_api_base),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            max_file_size,
        }
    }
}

fn database_path_from_url(url: &str) -> String {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn empty_environment_leaves_services_unconfigured() {
        let config = config_from(&[]);
        assert!(config.database_path.is_none());
        assert!(config.blob.is_none());
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
    }

    #[test]
    fn sqlite_prefix_is_stripped() {
        let config = config_from(&[("DATABASE_URL", "sqlite://data/atalho.db")]);
        assert_eq!(config.database_path.as_deref(), Some("data/atalho.db"));
    }

    #[test]
    fn blob_token_wins_over_local_dir() {
        let config = config_from(&[("BLOB_READ_WRITE_TOKEN", "tok"), ("BLOB_DIR", "/tmp/blobs")]);
        assert_eq!(
            config.blob,
            Some(BlobConfig::Vercel {
                token: "tok".into(),
                api_url: DEFAULT_BLOB_API_URL.into()
            })
        );
    }

    #[test]
    fn blank_values_count_as_missing() {
        let config = config_from(&[("GEMINI_API_KEY", "   "), ("PUBLIC_BASE_URL", "https://a.b/")]);
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.public_base_url, "https://a.b");
    }
}
