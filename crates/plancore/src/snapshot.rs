use crate::{FlowError, HolderId, Token};
use serde::{Deserialize, Serialize};

/// Token placement of a paused workplan instance.
///
/// Only holders carrying at least one token are recorded. The snapshot is
/// opaque to the engine's callers; persisting it is up to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkplanSnapshot {
    pub workplan_name: String,
    pub holders: Vec<HolderSnapshot>,
}

impl WorkplanSnapshot {
    pub fn new(workplan_name: impl Into<String>) -> Self {
        Self {
            workplan_name: workplan_name.into(),
            holders: Vec::new(),
        }
    }

    pub fn holder(&self, id: HolderId) -> Option<&HolderSnapshot> {
        self.holders.iter().find(|h| h.holder_id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.holders.iter().map(|h| h.tokens.len()).sum()
    }

    pub fn to_json(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderSnapshot {
    pub holder_id: HolderId,
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub state: serde_json::Value,
}

impl HolderSnapshot {
    pub fn new(holder_id: HolderId, tokens: Vec<Token>, state: serde_json::Value) -> Self {
        Self {
            holder_id,
            tokens,
            state,
        }
    }
}
