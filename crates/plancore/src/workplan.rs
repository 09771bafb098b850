use crate::{HolderId, NodeClassification, Place, WorkplanError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

pub type WorkplanId = Uuid;

/// Immutable workflow definition: connectors plus the transition templates
/// a compiler turns into executable transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workplan {
    pub id: WorkplanId,
    pub name: String,
    pub version: u32,
    pub connectors: Vec<Connector>,
    pub transitions: Vec<TransitionTemplate>,
}

impl Workplan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: 1,
            connectors: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connectors.push(connector);
        self
    }

    pub fn with_transition(mut self, template: TransitionTemplate) -> Self {
        self.transitions.push(template);
        self
    }

    pub fn find_connector(&self, id: HolderId) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.id == id)
    }

    pub fn find_transition(&self, id: HolderId) -> Option<&TransitionTemplate> {
        self.transitions.iter().find(|t| t.id == id)
    }

    /// Check ids are unique, templates only reference existing connectors and
    /// the plan can both start and end.
    pub fn validate(&self) -> Result<(), WorkplanError> {
        let mut seen = HashSet::new();
        let ids = self
            .connectors
            .iter()
            .map(|c| c.id)
            .chain(self.transitions.iter().map(|t| t.id));
        for id in ids {
            if !seen.insert(id) {
                return Err(WorkplanError::DuplicateHolder(id));
            }
        }

        for template in &self.transitions {
            for place in template.inputs.iter().chain(&template.outputs) {
                if self.find_connector(*place).is_none() {
                    return Err(WorkplanError::PlaceNotFound(*place));
                }
            }
        }

        let has = |flag| self.connectors.iter().any(|c| c.classification.contains(flag));
        if !has(NodeClassification::START) {
            return Err(WorkplanError::MissingStart);
        }
        if !has(NodeClassification::EXIT) {
            return Err(WorkplanError::MissingExit);
        }

        Ok(())
    }
}

/// Static definition of a place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub id: HolderId,
    pub name: String,
    pub classification: NodeClassification,
}

impl Connector {
    pub fn new(id: HolderId, name: impl Into<String>, classification: NodeClassification) -> Self {
        Self {
            id,
            name: name.into(),
            classification,
        }
    }

    pub fn start(id: HolderId, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeClassification::START)
    }

    pub fn intermediate(id: HolderId, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeClassification::INTERMEDIATE)
    }

    pub fn exit(id: HolderId, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeClassification::EXIT)
    }

    pub fn failed(id: HolderId, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeClassification::EXIT | NodeClassification::FAILED)
    }

    /// Runtime counterpart with the same id and classification.
    pub fn create_place(&self) -> Place {
        Place::new(self.id, self.name.clone(), self.classification)
    }
}

/// Static wiring of a transition. Inputs and outputs are connector ids; the
/// output order is significant for transitions that pick a result branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionTemplate {
    pub id: HolderId,
    pub name: String,
    pub inputs: Vec<HolderId>,
    pub outputs: Vec<HolderId>,
}

impl TransitionTemplate {
    pub fn new(id: HolderId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, place: HolderId) -> Self {
        self.inputs.push(place);
        self
    }

    pub fn with_output(mut self, place: HolderId) -> Self {
        self.outputs.push(place);
        self
    }
}
