use std::path::PathBuf;

use portraify_kolors::DEFAULT_ENDPOINT;
use portraify_store::backend::DEFAULT_QUOTA_BYTES;

/// CLI configuration loaded from environment variables.
///
/// All fields have defaults suitable for local use; the API key has no
/// default -- without one the remote path is skipped entirely.
#[derive(Debug, Clone)]
pub struct Config {
    /// Kolors generation endpoint.
    pub kolors_endpoint: String,
    /// Kolors API key; empty means "remote generation disabled".
    pub kolors_api_key: String,
    /// Directory the persisted store lives in.
    pub data_dir: PathBuf,
    /// Hard byte capacity for the persistence backend.
    pub quota_bytes: u64,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                          |
    /// |-------------------------|----------------------------------|
    /// | `KOLORS_API_ENDPOINT`   | the production Kolors endpoint   |
    /// | `KOLORS_API_KEY`        | (empty -- remote disabled)        |
    /// | `PORTRAIFY_DATA_DIR`    | `.portraify`                     |
    /// | `PORTRAIFY_QUOTA_BYTES` | `5242880` (5 MiB)                |
    pub fn from_env() -> Self {
        let kolors_endpoint =
            std::env::var("KOLORS_API_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.into());
        let kolors_api_key = std::env::var("KOLORS_API_KEY").unwrap_or_default();
        let data_dir: PathBuf = std::env::var("PORTRAIFY_DATA_DIR")
            .unwrap_or_else(|_| ".portraify".into())
            .into();
        let quota_bytes: u64 = std::env::var("PORTRAIFY_QUOTA_BYTES")
            .unwrap_or_else(|_| DEFAULT_QUOTA_BYTES.to_string())
            .parse()
            .expect("PORTRAIFY_QUOTA_BYTES must be a valid u64");

        Self {
            kolors_endpoint,
            kolors_api_key,
            data_dir,
            quota_bytes,
        }
    }
}
