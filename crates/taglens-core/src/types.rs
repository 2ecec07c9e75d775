use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A resolved symbol definition, including the source snippet for the
/// inclusive line range `line..=end` within `file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: String,
    pub line: u32,
    pub end: u32,
    pub content: String,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typeref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub res_list: Vec<SymbolInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SymbolResponse {
    pub fn success(res_list: Vec<SymbolInfo>) -> Self {
        Self {
            status: "success".to_string(),
            res_list,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: "failed".to_string(),
            res_list: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The callers of a symbol: one entry per distinct enclosing function body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefResponse {
    #[serde(default)]
    pub callers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RefResponse {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            callers: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A unit of analysis work. Ids are caller-assigned and intentionally
/// non-unique: batch submissions share one id across every expanded task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt: String,
    #[serde(default)]
    pub code_server_name: String,
    #[serde(default)]
    pub llm_config_name: String,
}

/// The persisted outcome of one dialogue. `results/<id>.json` holds an array
/// of these, one per completed task that carried the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub has_problem_info: bool,
    pub problem_info: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub conversation: Vec<ChatMessage>,
}
