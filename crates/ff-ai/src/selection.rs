//! Persisted model selection
//!
//! The selection lives in a small JSON key-value document
//! (`~/.local/share/flashfusion/settings.json` by default) under the keys
//! [`MODEL_KEY`] and [`PROVIDER_KEY`]. Other keys in the document are left
//! alone.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use ff_protocol::{ProviderId, SelectionState};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{AiError, Result};

/// Settings key holding the selected model id
pub const MODEL_KEY: &str = "ff_selected_ai_model";
/// Settings key holding the selected provider id
pub const PROVIDER_KEY: &str = "ff_selected_ai_provider";

/// Trait for selection persistence
pub trait SelectionStore: Send + Sync {
    /// Read the persisted selection, if any
    fn load(&self) -> Result<Option<SelectionState>>;

    /// Overwrite the persisted selection
    fn save(&self, state: &SelectionState) -> Result<()>;
}

/// File-backed selection store
#[derive(Debug, Clone)]
pub struct FileSelectionStore {
    path: PathBuf,
}

impl FileSelectionStore {
    /// Store backed by the given settings document
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the settings document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Option<Map<String, Value>>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Settings file does not exist");
            return Ok(None);
        }
        let data = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Value>(&data)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(AiError::InvalidConfig(format!(
                "{} is not a JSON object",
                self.path.display()
            ))),
        }
    }

    fn write_document(&self, doc: &Map<String, Value>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        // Write next to the target and rename so readers never see a partial file
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_json::to_string_pretty(doc)?.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| AiError::Storage(e.error))?;
        Ok(())
    }
}

impl SelectionStore for FileSelectionStore {
    fn load(&self) -> Result<Option<SelectionState>> {
        let Some(doc) = self.read_document()? else {
            return Ok(None);
        };
        let model = doc.get(MODEL_KEY).and_then(Value::as_str);
        let provider = doc.get(PROVIDER_KEY).and_then(Value::as_str);

        match (model, provider) {
            (Some(model_id), Some(provider)) => match provider.parse::<ProviderId>() {
                Ok(provider) => {
                    debug!(model_id, %provider, "Loaded persisted selection");
                    Ok(Some(SelectionState {
                        model_id: model_id.to_string(),
                        provider,
                    }))
                }
                Err(e) => {
                    warn!(error = %e, "Ignoring persisted selection");
                    Ok(None)
                }
            },
            (None, None) => Ok(None),
            _ => {
                warn!("Ignoring incomplete persisted selection");
                Ok(None)
            }
        }
    }

    fn save(&self, state: &SelectionState) -> Result<()> {
        let mut doc = match self.read_document() {
            Ok(doc) => doc.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Replacing unreadable settings file");
                Map::new()
            }
        };
        doc.insert(MODEL_KEY.to_string(), Value::String(state.model_id.clone()));
        doc.insert(
            PROVIDER_KEY.to_string(),
            Value::String(state.provider.to_string()),
        );
        self.write_document(&doc)?;
        info!(model_id = %state.model_id, provider = %state.provider, "Saved selection");
        Ok(())
    }
}

/// In-memory store for testing
#[derive(Debug, Clone, Default)]
pub struct MemorySelectionStore {
    state: Arc<Mutex<Option<SelectionState>>>,
}

impl MemorySelectionStore {
    /// Store holding an initial selection
    pub fn with_state(state: SelectionState) -> Self {
        Self {
            state: Arc::new(Mutex::new(Some(state))),
        }
    }
}

impl SelectionStore for MemorySelectionStore {
    fn load(&self) -> Result<Option<SelectionState>> {
        let state = self
            .state
            .lock()
            .map_err(|_| AiError::Storage(std::io::Error::other("Mutex poisoned")))?;
        Ok(state.clone())
    }

    fn save(&self, state: &SelectionState) -> Result<()> {
        let mut stored = self
            .state
            .lock()
            .map_err(|_| AiError::Storage(std::io::Error::other("Mutex poisoned")))?;
        *stored = Some(state.clone());
        Ok(())
    }
}
