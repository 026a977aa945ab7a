//! Static table of Salt state modules, their functions and parameters.
//!
//! The table is read once at startup from a JSON asset and never mutated
//! afterwards, so it is shared as `Arc<StateSchema>` without any locking.
//! Declaration order of modules, submodules and parameters is kept exactly
//! as written in the asset.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Parameter name marking a function that accepts arbitrary keyword arguments.
pub const KWARGS_MARKER: &str = "kwargs";

const BUNDLED_STATES: &str = include_str!("../data/states.json");

static BUNDLED: Lazy<Arc<StateSchema>> = Lazy::new(|| match StateSchema::from_json(BUNDLED_STATES) {
    Ok(schema) => Arc::new(schema),
    Err(e) => {
        warn!("Bundled state schema is unreadable: {}", e);
        Arc::new(StateSchema::empty())
    }
});

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read state schema {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed state schema: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl ParameterSchema {
    pub fn is_kwargs_marker(&self) -> bool {
        self.name == KWARGS_MARKER
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmoduleSchema {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
}

/// Everything known about one state module, e.g. `file`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateNameCompletion {
    pub name: String,
    pub submodules: Vec<SubmoduleSchema>,
    /// Keyed by `"module"` and `"module.submodule"`. An empty string is a
    /// documented-as-empty entry, distinct from a missing key.
    #[serde(default)]
    pub docs: HashMap<String, String>,
}

impl StateNameCompletion {
    pub fn submodule(&self, name: &str) -> Option<&SubmoduleSchema> {
        self.submodules.iter().find(|s| s.name == name)
    }

    pub fn module_doc(&self) -> Option<&str> {
        self.docs.get(&self.name).map(String::as_str)
    }

    pub fn submodule_doc(&self, submodule: &str) -> Option<&str> {
        self.docs
            .get(&format!("{}.{}", self.name, submodule))
            .map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct RawSchema {
    #[serde(default)]
    modules: Vec<serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct StateSchema {
    modules: Vec<StateNameCompletion>,
    by_name: FxHashMap<String, usize>,
}

impl StateSchema {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Schema compiled into the binary.
    pub fn bundled() -> Arc<StateSchema> {
        BUNDLED.clone()
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let schema = Self::from_json(&text)?;
        debug!("Loaded {} state modules from {}", schema.len(), path.display());
        Ok(schema)
    }

    /// Parses a schema document. Module entries that do not match the
    /// expected shape are skipped; only a document that is not JSON at all
    /// is an error.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let raw: RawSchema = serde_json::from_str(text)?;
        let mut schema = Self::empty();
        for (i, value) in raw.modules.into_iter().enumerate() {
            match serde_json::from_value::<StateNameCompletion>(value) {
                Ok(module) => schema.insert(module),
                Err(e) => warn!("Skipping malformed state module entry #{}: {}", i, e),
            }
        }
        Ok(schema)
    }

    fn insert(&mut self, module: StateNameCompletion) {
        if self.by_name.contains_key(&module.name) {
            warn!("Duplicate state module '{}' ignored", module.name);
            return;
        }
        self.by_name.insert(module.name.clone(), self.modules.len());
        self.modules.push(module);
    }

    pub fn module(&self, name: &str) -> Option<&StateNameCompletion> {
        self.by_name.get(name).map(|&i| &self.modules[i])
    }

    /// Modules in declaration order.
    pub fn modules(&self) -> &[StateNameCompletion] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
