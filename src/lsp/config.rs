//! Server configuration resolved from the command line and environment.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::lsp::backend::document_cache::DEFAULT_CAPACITY;
use crate::state_schema::StateSchema;

/// Environment variable naming a states file used when none is given on the
/// command line.
pub const STATES_FILE_ENV: &str = "SALT_LSP_STATES_FILE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Schema to load instead of the bundled one.
    pub states_file: Option<PathBuf>,
    /// Maximum number of on-disk files kept parsed.
    pub cache_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { states_file: None, cache_capacity: DEFAULT_CAPACITY }
    }
}

impl ServerConfig {
    /// Checks in order:
    /// 1. The explicit `states_file` argument
    /// 2. Environment variable SALT_LSP_STATES_FILE
    /// 3. Falls back to the bundled schema
    pub fn from_env_or_default(states_file: Option<PathBuf>, cache_capacity: Option<usize>) -> Self {
        let states_file = states_file.or_else(|| std::env::var_os(STATES_FILE_ENV).map(PathBuf::from));
        Self {
            states_file,
            cache_capacity: cache_capacity.filter(|n| *n > 0).unwrap_or(DEFAULT_CAPACITY),
        }
    }

    /// Loads the configured schema. A file that cannot be read or parsed
    /// yields an empty schema rather than failing startup.
    pub fn load_schema(&self) -> Arc<StateSchema> {
        let Some(path) = &self.states_file else {
            return StateSchema::bundled();
        };
        match StateSchema::load(path) {
            Ok(schema) => {
                info!("Loaded {} state modules from {}", schema.len(), path.display());
                Arc::new(schema)
            }
            Err(e) => {
                warn!("Could not load states file {}: {}; completions are disabled", path.display(), e);
                Arc::new(StateSchema::empty())
            }
        }
    }
}
