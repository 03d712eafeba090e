use chat_backend::{Chat, RunStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CATALOG_VERSION: u32 = 1;

/// Node type that carries the flow's chat settings.
pub const INITIALIZER_NODE: &str = "initializer";

/// On-disk catalog document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogFile {
    pub version: u32,
    #[serde(default)]
    pub chats: Vec<Chat>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub templates: Vec<Template>,
}

impl Default for CatalogFile {
    fn default() -> Self {
        Self {
            version: CATALOG_VERSION,
            chats: Vec::new(),
            projects: Vec::new(),
            templates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub flow: Flow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

/// A published project snapshot that chats can be started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub project: Project,
}

/// Agent graph of a project; only nodes are interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Value>,
}

impl Flow {
    /// Sample opening messages of the flow's initializer node.
    ///
    /// A missing node or a non-array `sample_messages` yields nothing;
    /// non-string entries are skipped.
    #[must_use]
    pub fn sample_messages(&self) -> Vec<String> {
        self.nodes
            .iter()
            .find(|node| node.kind == INITIALIZER_NODE)
            .and_then(|node| node.data.get("sample_messages"))
            .and_then(Value::as_array)
            .map(|samples| {
                samples
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// Partial update of a chat; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatPatch {
    pub name: Option<String>,
    pub status: Option<RunStatus>,
}

impl ChatPatch {
    #[must_use]
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.status.is_none()
    }
}
